//! Direct3D 12 backend over `oxidx`.
//!
//! Descriptor handles handed to the framework are offsets from the start of
//! their heap. [`Dx12DescriptorHeap::cpu`] and [`Dx12DescriptorHeap::gpu`] turn
//! them back into native handles.

use std::{fmt, ops::Deref, sync::Arc, time::Duration};

use oxidx::dx::{
    self, IBlob, IBlobExt, ICommandAllocator, ICommandQueue, IDescriptorHeap, IDevice, IFence,
    IGraphicsCommandList,
};
use smallvec::SmallVec;
use thiserror::Error;

use super::{
    backend::Backend,
    pipelines::{BlendMode, ComparisonFunc, CullMode, FillMode, GraphicsPipelineDesc, PrimitiveTopology},
    types::{
        CpuDescriptorHandle, DescriptorKind, Format, GpuDescriptorHandle, QueueType,
        ResourceStates,
    },
};

#[derive(Error, Debug, Clone)]
pub enum Dx12Error {
    #[error("{operation} failed: {message}")]
    Call {
        operation: &'static str,
        message: String,
    },
    #[error("Input semantic {0:?} is not supported")]
    UnknownSemantic(String),
    #[error("Pipeline state needs a layout")]
    MissingLayout,
    #[error("Shader bytecode is empty")]
    EmptyShader,
    #[error("Descriptor heap capacity {0} does not fit in 32 bits")]
    HeapTooLarge(usize),
}

fn call<E: fmt::Debug>(operation: &'static str) -> impl FnOnce(E) -> Dx12Error {
    move |error| Dx12Error::Call {
        operation,
        message: format!("{error:?}"),
    }
}

#[derive(Clone, Debug)]
pub struct Dx12Device(Arc<Dx12DeviceInner>);

#[derive(Debug)]
pub struct Dx12DeviceInner {
    pub(crate) raw: dx::Device,
}

impl Dx12Device {
    pub fn new(adapter: &dx::Adapter3) -> Result<Self, Dx12Error> {
        let raw: dx::Device = dx::create_device(Some(adapter), dx::FeatureLevel::Level11)
            .map_err(call("create_device"))?;

        Ok(Self::from_raw(raw))
    }

    pub fn from_raw(raw: dx::Device) -> Self {
        Self(Arc::new(Dx12DeviceInner { raw }))
    }
}

impl Deref for Dx12Device {
    type Target = Dx12DeviceInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
pub struct Dx12CommandList {
    ty: QueueType,
    pub(crate) raw: dx::GraphicsCommandList,
}

impl Dx12CommandList {
    pub fn queue_type(&self) -> QueueType {
        self.ty
    }

    pub fn raw(&self) -> &dx::GraphicsCommandList {
        &self.raw
    }

    pub fn clear_render_target(&self, handle: dx::CpuDescriptorHandle, color: [f32; 4]) {
        self.raw.clear_render_target_view(handle, color, &[]);
    }

    pub fn barrier(&self, barriers: &[dx::ResourceBarrier<'_>]) {
        self.raw.resource_barrier(barriers);
    }
}

#[derive(Debug)]
pub struct Dx12DescriptorHeap {
    kind: DescriptorKind,
    shader_visible: bool,
    pub(crate) raw: dx::DescriptorHeap,
}

impl Dx12DescriptorHeap {
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn cpu(&self, handle: CpuDescriptorHandle) -> dx::CpuDescriptorHandle {
        self.raw
            .get_cpu_descriptor_handle_for_heap_start()
            .offset(handle.0)
    }

    pub fn gpu(&self, handle: GpuDescriptorHandle) -> dx::GpuDescriptorHandle {
        self.raw
            .get_gpu_descriptor_handle_for_heap_start()
            .offset(handle.0)
    }
}

#[derive(Clone, Debug)]
pub struct Dx12PipelineState(Arc<dx::PipelineState>);

impl Dx12PipelineState {
    pub fn raw(&self) -> &dx::PipelineState {
        &self.0
    }
}

impl QueueType {
    fn as_raw(self) -> dx::CommandListType {
        match self {
            QueueType::Graphics => dx::CommandListType::Direct,
            QueueType::Compute => dx::CommandListType::Compute,
            QueueType::Copy => dx::CommandListType::Copy,
        }
    }

    fn queue_desc(self) -> dx::CommandQueueDesc {
        match self {
            QueueType::Graphics => dx::CommandQueueDesc::direct(),
            QueueType::Compute => dx::CommandQueueDesc::compute(),
            QueueType::Copy => dx::CommandQueueDesc::copy(),
        }
    }
}

impl DescriptorKind {
    fn as_raw(self) -> dx::DescriptorHeapType {
        match self {
            DescriptorKind::Sampler => dx::DescriptorHeapType::Sampler,
            DescriptorKind::Rtv => dx::DescriptorHeapType::Rtv,
            DescriptorKind::Dsv => dx::DescriptorHeapType::Dsv,
            DescriptorKind::CbvSrvUav => dx::DescriptorHeapType::CbvSrvUav,
        }
    }

    fn heap_desc(self, capacity: usize) -> Result<dx::DescriptorHeapDesc, Dx12Error> {
        let num = u32::try_from(capacity).map_err(|_| Dx12Error::HeapTooLarge(capacity))?;

        Ok(match self {
            DescriptorKind::Sampler => dx::DescriptorHeapDesc::sampler(num),
            DescriptorKind::Rtv => dx::DescriptorHeapDesc::rtv(num),
            DescriptorKind::Dsv => dx::DescriptorHeapDesc::dsv(num),
            DescriptorKind::CbvSrvUav => dx::DescriptorHeapDesc::cbr_srv_uav(num),
        })
    }
}

impl ResourceStates {
    pub(crate) fn as_raw(&self) -> dx::ResourceStates {
        dx::ResourceStates::from_bits_truncate(self.bits())
    }
}

impl Format {
    pub(crate) fn as_raw(self) -> dx::Format {
        match self {
            Format::Unknown => dx::Format::Unknown,
            Format::Rgba8Unorm => dx::Format::Rgba8Unorm,
            Format::Bgra8Unorm => dx::Format::Bgra8Unorm,
            Format::Rgba16Float => dx::Format::Rgba16Float,
            Format::Rgba32Float => dx::Format::Rgba32Float,
            Format::Rgb32Float => dx::Format::Rgb32Float,
            Format::Rg32Float => dx::Format::Rg32Float,
            Format::R32Float => dx::Format::R32Float,
            Format::R32Uint => dx::Format::R32Uint,
            Format::R16Uint => dx::Format::R16Uint,
            Format::D32Float => dx::Format::D32Float,
            Format::D24UnormS8Uint => dx::Format::D24UnormS8Uint,
        }
    }
}

fn semantic(name: &str, index: u32) -> Result<dx::SemanticName, Dx12Error> {
    let index = index as u8;
    let semantic = match name {
        "POSITION" => dx::SemanticName::Position(index),
        "NORMAL" => dx::SemanticName::Normal(index),
        "TANGENT" => dx::SemanticName::Tangent(index),
        "TEXCOORD" => dx::SemanticName::Texcoord(index),
        "COLOR" => dx::SemanticName::Color(index),
        "BINORMAL" => dx::SemanticName::Binormal(index),
        "BLENDINDICES" => dx::SemanticName::BlendIndices(index),
        "BLENDWEIGHT" => dx::SemanticName::BlendWeight(index),
        "PSIZE" => dx::SemanticName::Psize(index),
        "POSITIONT" => dx::SemanticName::PositionT,
        other => return Err(Dx12Error::UnknownSemantic(other.to_string())),
    };

    Ok(semantic)
}

fn rasterizer(desc: &GraphicsPipelineDesc<Dx12Device>) -> dx::RasterizerDesc {
    let state = desc.rasterizer();

    let fill = match state.fill {
        FillMode::Solid => dx::FillMode::Solid,
        FillMode::Wireframe => dx::FillMode::Wireframe,
    };
    let cull = match state.cull {
        CullMode::None => dx::CullMode::None,
        CullMode::Front => dx::CullMode::Front,
        CullMode::Back => dx::CullMode::Back,
    };

    let raw = dx::RasterizerDesc::default()
        .with_fill_mode(fill)
        .with_cull_mode(cull);

    if state.front_counter_clockwise {
        raw.enable_front_facing()
    } else {
        raw
    }
}

/// Copies shader bytecode into a D3D blob.
fn blob(bytes: &[u8]) -> Result<dx::Blob, Dx12Error> {
    if bytes.is_empty() {
        return Err(Dx12Error::EmptyShader);
    }

    let blob = dx::Blob::create_blob(bytes.len()).map_err(call("create_blob"))?;
    debug_assert!(blob.get_buffer_size() >= bytes.len());

    // SAFETY: D3DCreateBlob allocated `bytes.len()` writable bytes.
    unsafe {
        std::ptr::copy_nonoverlapping(
            bytes.as_ptr(),
            blob.get_buffer_ptr::<u8>().as_ptr(),
            bytes.len(),
        );
    }

    Ok(blob)
}

fn blend(mode: BlendMode) -> dx::BlendDesc {
    let target = match mode {
        BlendMode::Opaque => dx::RenderTargetBlendDesc::default(),
        BlendMode::Alpha => dx::RenderTargetBlendDesc::blend(
            dx::Blend::SrcAlpha,
            dx::Blend::InvSrcAlpha,
            dx::BlendOp::Add,
            dx::ColorWriteEnable::all(),
        ),
        BlendMode::Additive => dx::RenderTargetBlendDesc::blend(
            dx::Blend::One,
            dx::Blend::One,
            dx::BlendOp::Add,
            dx::ColorWriteEnable::all(),
        ),
    };

    dx::BlendDesc::default().with_render_targets([target])
}

fn comparison(func: ComparisonFunc) -> dx::ComparisonFunc {
    match func {
        ComparisonFunc::Never => dx::ComparisonFunc::Never,
        ComparisonFunc::Less => dx::ComparisonFunc::Less,
        ComparisonFunc::Equal => dx::ComparisonFunc::Equal,
        ComparisonFunc::LessEqual => dx::ComparisonFunc::LessEqual,
        ComparisonFunc::Greater => dx::ComparisonFunc::Greater,
        ComparisonFunc::NotEqual => dx::ComparisonFunc::NotEqual,
        ComparisonFunc::GreaterEqual => dx::ComparisonFunc::GreaterEqual,
        ComparisonFunc::Always => dx::ComparisonFunc::Always,
    }
}

impl Backend for Dx12Device {
    type Error = Dx12Error;

    type Queue = dx::CommandQueue;
    type Fence = dx::Fence;
    type CommandAllocator = dx::CommandAllocator;
    type CommandList = Dx12CommandList;
    type DescriptorHeap = Dx12DescriptorHeap;
    type RootSignature = dx::RootSignature;
    type PipelineState = Dx12PipelineState;
    type Resource = dx::Resource;

    fn create_queue(&self, ty: QueueType) -> Result<Self::Queue, Self::Error> {
        self.raw
            .create_command_queue(&ty.queue_desc())
            .map_err(call("create_command_queue"))
    }

    fn create_fence(&self, initial_value: u64) -> Result<Self::Fence, Self::Error> {
        self.raw
            .create_fence(initial_value, dx::FenceFlags::empty())
            .map_err(call("create_fence"))
    }

    fn create_command_allocator(
        &self,
        ty: QueueType,
    ) -> Result<Self::CommandAllocator, Self::Error> {
        self.raw
            .create_command_allocator(ty.as_raw())
            .map_err(call("create_command_allocator"))
    }

    fn create_command_list(
        &self,
        ty: QueueType,
        allocator: &Self::CommandAllocator,
    ) -> Result<Self::CommandList, Self::Error> {
        let raw: dx::GraphicsCommandList = self
            .raw
            .create_command_list(0, ty.as_raw(), allocator, dx::PSO_NONE)
            .map_err(call("create_command_list"))?;
        raw.close().map_err(call("close"))?;

        Ok(Dx12CommandList { ty, raw })
    }

    fn reset_command_allocator(
        &self,
        allocator: &Self::CommandAllocator,
    ) -> Result<(), Self::Error> {
        allocator.reset().map_err(call("reset_command_allocator"))
    }

    fn reset_command_list(
        &self,
        list: &mut Self::CommandList,
        allocator: &Self::CommandAllocator,
        pso: Option<&Self::PipelineState>,
    ) -> Result<(), Self::Error> {
        list.raw
            .reset(allocator, pso.map(Dx12PipelineState::raw))
            .map_err(call("reset_command_list"))
    }

    fn close_command_list(&self, list: &mut Self::CommandList) -> Result<(), Self::Error> {
        list.raw.close().map_err(call("close"))
    }

    fn execute_command_lists(
        &self,
        queue: &Self::Queue,
        lists: &[&Self::CommandList],
    ) -> Result<(), Self::Error> {
        let lists = lists
            .iter()
            .map(|list| Some(list.raw.clone()))
            .collect::<SmallVec<[_; 16]>>();
        queue.execute_command_lists(lists.as_slice());

        Ok(())
    }

    fn signal(
        &self,
        queue: &Self::Queue,
        fence: &Self::Fence,
        value: u64,
    ) -> Result<(), Self::Error> {
        queue.signal(fence, value).map_err(call("signal"))
    }

    fn completed_value(&self, fence: &Self::Fence) -> u64 {
        fence.get_completed_value()
    }

    fn wait_fence(
        &self,
        fence: &Self::Fence,
        value: u64,
        timeout: Option<Duration>,
    ) -> Result<bool, Self::Error> {
        if fence.get_completed_value() >= value {
            return Ok(true);
        }

        let event = dx::Event::create(false, false).map_err(call("create_event"))?;
        fence
            .set_event_on_completion(value, event)
            .map_err(call("set_event_on_completion"))?;

        let millis = timeout.map_or(u32::MAX, |t| t.as_millis().min(u32::MAX as u128 - 1) as u32);
        event.wait(millis);
        event.close().map_err(call("close_event"))?;

        Ok(fence.get_completed_value() >= value)
    }

    fn create_descriptor_heap(
        &self,
        kind: DescriptorKind,
        capacity: usize,
        shader_visible: bool,
    ) -> Result<Self::DescriptorHeap, Self::Error> {
        let mut desc = kind.heap_desc(capacity)?;
        if shader_visible {
            desc = desc.with_flags(dx::DescriptorHeapFlags::ShaderVisible);
        }

        let raw = self
            .raw
            .create_descriptor_heap(&desc)
            .map_err(call("create_descriptor_heap"))?;

        Ok(Dx12DescriptorHeap {
            kind,
            shader_visible,
            raw,
        })
    }

    fn descriptor_increment_size(&self, kind: DescriptorKind) -> usize {
        self.raw.get_descriptor_handle_increment_size(kind.as_raw()) as usize
    }

    fn descriptor_heap_start(
        &self,
        heap: &Self::DescriptorHeap,
    ) -> (CpuDescriptorHandle, Option<GpuDescriptorHandle>) {
        let gpu = heap.shader_visible.then_some(GpuDescriptorHandle(0));

        (CpuDescriptorHandle(0), gpu)
    }

    fn create_pipeline_state(
        &self,
        desc: &GraphicsPipelineDesc<Self>,
    ) -> Result<Self::PipelineState, Self::Error> {
        let layout = desc.layout().ok_or(Dx12Error::MissingLayout)?;

        let vs = blob(desc.vertex_shader().as_bytes())?;
        let ps = desc
            .pixel_shader()
            .map(|ps| blob(ps.as_bytes()))
            .transpose()?;

        let input_layout = desc
            .input_layout()
            .iter()
            .map(|element| {
                Ok(dx::InputElementDesc::per_vertex(
                    semantic(&element.semantic, element.semantic_index)?,
                    element.format.as_raw(),
                    element.slot,
                )
                .with_offset(element.offset))
            })
            .collect::<Result<SmallVec<[_; 8]>, Dx12Error>>()?;

        let topology = match desc.topology() {
            PrimitiveTopology::Point => dx::PipelinePrimitiveTopology::Point,
            PrimitiveTopology::Line => dx::PipelinePrimitiveTopology::Line,
            PrimitiveTopology::Triangle => dx::PipelinePrimitiveTopology::Triangle,
        };

        let mut raw = dx::GraphicsPipelineDesc::new(&vs)
            .with_root_signature(layout.raw())
            .with_input_layout(&input_layout)
            .with_primitive_topology(topology)
            .with_rasterizer_state(rasterizer(desc))
            .with_blend_desc(blend(desc.blend()))
            .with_render_targets(desc.render_target_formats().iter().map(|f| f.as_raw()))
            .with_sample_desc(dx::SampleDesc::new(desc.sample_count(), 0));

        if let Some(ps) = &ps {
            raw = raw.with_ps(ps);
        }

        if let Some(depth) = desc.depth() {
            let depth_desc = dx::DepthStencilDesc::default()
                .enable_depth(comparison(depth.func))
                .with_depth_write_mask(if depth.write {
                    dx::DepthWriteMask::All
                } else {
                    dx::DepthWriteMask::empty()
                });
            raw = raw.with_depth_stencil(depth_desc, desc.depth_format().as_raw());
        }

        let pso = self
            .raw
            .create_graphics_pipeline(&raw)
            .map_err(call("create_graphics_pipeline"))?;

        Ok(Dx12PipelineState(Arc::new(pso)))
    }

    fn transition_barrier(
        list: &mut Self::CommandList,
        resource: &Self::Resource,
        before: ResourceStates,
        after: ResourceStates,
    ) {
        list.barrier(&[dx::ResourceBarrier::transition(
            resource,
            before.as_raw(),
            after.as_raw(),
        )]);
    }
}
