use std::sync::atomic::{AtomicUsize, Ordering};

use super::{
    backend::Backend,
    error::DeviceError,
    types::{CpuDescriptorHandle, DescriptorKind, GpuDescriptorHandle},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorRange {
    kind: DescriptorKind,
    index: usize,
    count: usize,
    increment_size: usize,
    cpu: CpuDescriptorHandle,
    gpu: Option<GpuDescriptorHandle>,
}

impl DescriptorRange {
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn cpu(&self, offset: usize) -> CpuDescriptorHandle {
        debug_assert!(offset < self.count);
        self.cpu.advance(offset, self.increment_size)
    }

    /// `None` unless the heap is shader visible.
    pub fn gpu(&self, offset: usize) -> Option<GpuDescriptorHandle> {
        debug_assert!(offset < self.count);
        self.gpu.map(|gpu| gpu.advance(offset, self.increment_size))
    }
}

/// Fixed-capacity arena over one descriptor heap. Slots are handed out in
/// order and never returned.
#[derive(Debug)]
pub struct DescriptorPool<B: Backend> {
    pub(crate) raw: B::DescriptorHeap,
    kind: DescriptorKind,
    capacity: usize,
    increment_size: usize,
    cpu_start: CpuDescriptorHandle,
    gpu_start: Option<GpuDescriptorHandle>,
    next: AtomicUsize,
}

impl<B: Backend> DescriptorPool<B> {
    pub(crate) fn inner_new(
        device: &B,
        kind: DescriptorKind,
        capacity: usize,
    ) -> Result<Self, DeviceError> {
        let raw = device
            .create_descriptor_heap(kind, capacity, kind.is_shader_visible())
            .map_err(DeviceError::backend)?;
        let increment_size = device.descriptor_increment_size(kind);
        let (cpu_start, gpu_start) = device.descriptor_heap_start(&raw);

        tracing::debug!(?kind, capacity, increment_size, "created descriptor pool");

        Ok(Self {
            raw,
            kind,
            capacity,
            increment_size,
            cpu_start,
            gpu_start,
            next: AtomicUsize::new(0),
        })
    }

    pub fn allocate(&self, count: usize) -> Result<DescriptorRange, DeviceError> {
        let exhausted = || DeviceError::DescriptorPoolExhausted {
            kind: self.kind,
            capacity: self.capacity,
            requested: count,
        };

        if count == 0 || count > self.capacity {
            return Err(exhausted());
        }

        let index = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                next.checked_add(count)
                    .filter(|end| *end <= self.capacity)
            })
            .map_err(|_| exhausted())?;

        Ok(DescriptorRange {
            kind: self.kind,
            index,
            count,
            increment_size: self.increment_size,
            cpu: self.cpu_start.advance(index, self.increment_size),
            gpu: self
                .gpu_start
                .map(|gpu| gpu.advance(index, self.increment_size)),
        })
    }

    pub fn allocate_one(&self) -> Result<DescriptorRange, DeviceError> {
        self.allocate(1)
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn raw(&self) -> &B::DescriptorHeap {
        &self.raw
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn allocated(&self) -> usize {
        self.next.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.allocated()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc, thread};

    use super::DescriptorPool;
    use crate::graphics::{
        error::DeviceError, headless::HeadlessDevice, types::DescriptorKind,
    };

    #[test]
    fn allocations_are_contiguous() {
        let device = HeadlessDevice::new();
        let pool =
            DescriptorPool::<HeadlessDevice>::inner_new(&device, DescriptorKind::Rtv, 8).unwrap();

        let first = pool.allocate(3).unwrap();
        let second = pool.allocate_one().unwrap();

        assert_eq!(first.index(), 0);
        assert_eq!(second.index(), 3);
        assert_eq!(first.cpu(2).advance(1, 32), second.cpu(0));
        assert_eq!(first.gpu(0), None);
        assert_eq!(pool.remaining(), 4);
    }

    #[test]
    fn shader_visible_heaps_hand_out_gpu_handles() {
        let device = HeadlessDevice::new();
        let pool =
            DescriptorPool::<HeadlessDevice>::inner_new(&device, DescriptorKind::CbvSrvUav, 16)
                .unwrap();

        let range = pool.allocate(2).unwrap();
        let base = range.gpu(0).unwrap();

        assert_eq!(range.gpu(1), Some(base.advance(1, 32)));
    }

    #[test]
    fn exhaustion_is_reported() {
        let device = HeadlessDevice::new();
        let pool =
            DescriptorPool::<HeadlessDevice>::inner_new(&device, DescriptorKind::Dsv, 4).unwrap();

        pool.allocate(3).unwrap();
        let err = pool.allocate(2).unwrap_err();

        assert!(matches!(
            err,
            DeviceError::DescriptorPoolExhausted {
                kind: DescriptorKind::Dsv,
                capacity: 4,
                requested: 2
            }
        ));
        assert_eq!(pool.allocated(), 3);
        assert!(pool.allocate(1).is_ok());
        assert!(pool.allocate(0).is_err());
    }

    #[test]
    fn concurrent_allocations_never_overlap() {
        let device = HeadlessDevice::new();
        let pool = Arc::new(
            DescriptorPool::<HeadlessDevice>::inner_new(&device, DescriptorKind::Sampler, 256)
                .unwrap(),
        );

        let handles = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    (0..64)
                        .map(|_| pool.allocate_one().unwrap().index())
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();

        let indices = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect::<HashSet<_>>();

        assert_eq!(indices.len(), 256);
        assert!(pool.allocate_one().is_err());
    }
}
