use std::fmt;

use atomig::Atom;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueType {
    Graphics,
    Compute,
    Copy,
}

impl QueueType {
    pub const ALL: [QueueType; 3] = [QueueType::Graphics, QueueType::Compute, QueueType::Copy];

    pub(crate) fn index(self) -> usize {
        match self {
            QueueType::Graphics => 0,
            QueueType::Compute => 1,
            QueueType::Copy => 2,
        }
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueType::Graphics => f.write_str("graphics"),
            QueueType::Compute => f.write_str("compute"),
            QueueType::Copy => f.write_str("copy"),
        }
    }
}

bitflags::bitflags! {
    /// Resource usage states. Bit values match `D3D12_RESOURCE_STATES`.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct ResourceStates: i32 {
        const Common = 0;
        const VertexAndConstantBuffer = 0x1;
        const IndexBuffer = 0x2;
        const RenderTarget = 0x4;
        const UnorderedAccess = 0x8;
        const DepthWrite = 0x10;
        const DepthRead = 0x20;
        const NonPixelShaderResource = 0x40;
        const PixelShaderResource = 0x80;
        const IndirectArgument = 0x200;
        const CopyDst = 0x400;
        const CopySrc = 0x800;
        const GenericRead = 0x1 | 0x2 | 0x40 | 0x80 | 0x200 | 0x800;
        const AllShaderResource = 0x40 | 0x80;
        const Present = 0;
    }
}

impl Atom for ResourceStates {
    type Repr = i32;

    fn pack(self) -> Self::Repr {
        self.bits()
    }

    fn unpack(src: Self::Repr) -> Self {
        ResourceStates::from_bits_retain(src)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Format {
    #[default]
    Unknown,
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba16Float,
    Rgba32Float,
    Rgb32Float,
    Rg32Float,
    R32Float,
    R32Uint,
    R16Uint,
    D32Float,
    D24UnormS8Uint,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    Sampler,
    Rtv,
    Dsv,
    CbvSrvUav,
}

impl DescriptorKind {
    pub const ALL: [DescriptorKind; 4] = [
        DescriptorKind::Sampler,
        DescriptorKind::Rtv,
        DescriptorKind::Dsv,
        DescriptorKind::CbvSrvUav,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            DescriptorKind::Sampler => 0,
            DescriptorKind::Rtv => 1,
            DescriptorKind::Dsv => 2,
            DescriptorKind::CbvSrvUav => 3,
        }
    }

    pub fn default_capacity(self) -> usize {
        match self {
            DescriptorKind::Sampler => 256,
            DescriptorKind::Rtv => 512,
            DescriptorKind::Dsv => 256,
            DescriptorKind::CbvSrvUav => 65536,
        }
    }

    /// Only sampler and CBV/SRV/UAV heaps can be bound to shaders.
    pub fn is_shader_visible(self) -> bool {
        matches!(self, DescriptorKind::Sampler | DescriptorKind::CbvSrvUav)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CpuDescriptorHandle(pub usize);

impl CpuDescriptorHandle {
    pub fn advance(self, index: usize, increment_size: usize) -> Self {
        Self(self.0 + index * increment_size)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GpuDescriptorHandle(pub u64);

impl GpuDescriptorHandle {
    pub fn advance(self, index: usize, increment_size: usize) -> Self {
        Self(self.0 + (index * increment_size) as u64)
    }
}

#[cfg(test)]
mod tests {
    use atomig::{Atomic, Ordering};

    use super::{CpuDescriptorHandle, GpuDescriptorHandle, ResourceStates};

    #[test]
    fn resource_states_roundtrip_through_atomic() {
        let state = Atomic::new(ResourceStates::Common);
        state.store(ResourceStates::GenericRead, Ordering::Relaxed);

        assert_eq!(state.load(Ordering::Relaxed), ResourceStates::GenericRead);
        assert!(ResourceStates::GenericRead.contains(ResourceStates::CopySrc));
    }

    #[test]
    fn handles_advance_by_increment() {
        assert_eq!(CpuDescriptorHandle(64).advance(3, 32), CpuDescriptorHandle(160));
        assert_eq!(GpuDescriptorHandle(0).advance(2, 8), GpuDescriptorHandle(16));
    }
}
