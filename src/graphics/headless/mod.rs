//! Software backend. Commands are recorded as values and submissions are kept
//! on the queue for inspection, which makes it suitable for tests and for
//! hosts without a GPU.

mod command_list;
mod fence;
mod queue;

use std::{
    ops::Deref,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use thiserror::Error;

use super::{
    backend::Backend,
    pipelines::GraphicsPipelineDesc,
    types::{CpuDescriptorHandle, DescriptorKind, GpuDescriptorHandle, QueueType, ResourceStates},
};

pub use command_list::*;
pub use fence::*;
pub use queue::*;

const DESCRIPTOR_INCREMENT: usize = 32;
const HEAP_STRIDE: usize = 1 << 24;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeadlessError {
    #[error("Command list {0} is still open")]
    ListNotClosed(u64),
    #[error("Command list {0} is not recording")]
    NotRecording(u64),
    #[error("Command allocator {allocator} is still in use until fence value {value}")]
    AllocatorInUse { allocator: u64, value: u64 },
    #[error("{found} command list submitted to {expected} queue")]
    QueueMismatch {
        expected: QueueType,
        found: QueueType,
    },
    #[error("{command} is not supported on {queue} command lists")]
    UnsupportedCommand {
        command: &'static str,
        queue: QueueType,
    },
    #[error("Pipeline state has no vertex shader")]
    MissingVertexShader,
    #[error("Device fault: {0}")]
    Fault(String),
}

#[derive(Clone, Debug, Default)]
pub struct HeadlessDevice(Arc<HeadlessDeviceInner>);

#[derive(Debug, Default)]
pub struct HeadlessDeviceInner {
    next_id: AtomicU64,
    allocators_created: AtomicUsize,
    command_lists_created: AtomicUsize,
    pipelines_created: AtomicUsize,
    fail_closes: AtomicBool,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn allocators_created(&self) -> usize {
        self.allocators_created.load(Ordering::Relaxed)
    }

    pub fn command_lists_created(&self) -> usize {
        self.command_lists_created.load(Ordering::Relaxed)
    }

    pub fn pipelines_created(&self) -> usize {
        self.pipelines_created.load(Ordering::Relaxed)
    }

    /// While set, closing a command list fails and leaves it open.
    pub fn fail_closes(&self, fail: bool) {
        self.fail_closes.store(fail, Ordering::Relaxed);
    }

    pub fn create_resource(&self, name: impl Into<String>) -> HeadlessResource {
        HeadlessResource {
            id: self.next_id(),
            name: name.into(),
        }
    }

    pub fn create_root_signature(&self) -> HeadlessRootSignature {
        HeadlessRootSignature { id: self.next_id() }
    }
}

impl Deref for HeadlessDevice {
    type Target = HeadlessDeviceInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadlessResource {
    id: u64,
    name: String,
}

impl HeadlessResource {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
pub struct HeadlessRootSignature {
    id: u64,
}

impl HeadlessRootSignature {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadlessPipeline(Arc<u64>);

impl HeadlessPipeline {
    pub fn id(&self) -> u64 {
        *self.0
    }
}

#[derive(Debug)]
pub struct HeadlessDescriptorHeap {
    id: u64,
    kind: DescriptorKind,
    capacity: usize,
    shader_visible: bool,
}

impl HeadlessDescriptorHeap {
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Backend for HeadlessDevice {
    type Error = HeadlessError;

    type Queue = HeadlessQueue;
    type Fence = HeadlessFence;
    type CommandAllocator = HeadlessCommandAllocator;
    type CommandList = HeadlessCommandList;
    type DescriptorHeap = HeadlessDescriptorHeap;
    type RootSignature = HeadlessRootSignature;
    type PipelineState = HeadlessPipeline;
    type Resource = HeadlessResource;

    fn create_queue(&self, ty: QueueType) -> Result<Self::Queue, Self::Error> {
        Ok(HeadlessQueue::inner_new(ty))
    }

    fn create_fence(&self, initial_value: u64) -> Result<Self::Fence, Self::Error> {
        Ok(HeadlessFence::inner_new(initial_value))
    }

    fn create_command_allocator(
        &self,
        ty: QueueType,
    ) -> Result<Self::CommandAllocator, Self::Error> {
        self.allocators_created.fetch_add(1, Ordering::Relaxed);
        Ok(HeadlessCommandAllocator::inner_new(self.next_id(), ty))
    }

    fn create_command_list(
        &self,
        ty: QueueType,
        allocator: &Self::CommandAllocator,
    ) -> Result<Self::CommandList, Self::Error> {
        if allocator.0.ty != ty {
            return Err(HeadlessError::QueueMismatch {
                expected: ty,
                found: allocator.0.ty,
            });
        }

        self.command_lists_created.fetch_add(1, Ordering::Relaxed);
        Ok(HeadlessCommandList::inner_new(self.next_id(), ty, allocator))
    }

    fn reset_command_allocator(
        &self,
        allocator: &Self::CommandAllocator,
    ) -> Result<(), Self::Error> {
        allocator.reset()
    }

    fn reset_command_list(
        &self,
        list: &mut Self::CommandList,
        allocator: &Self::CommandAllocator,
        pso: Option<&Self::PipelineState>,
    ) -> Result<(), Self::Error> {
        if list.open {
            return Err(HeadlessError::ListNotClosed(list.id));
        }

        list.allocator = Arc::clone(&allocator.0);
        list.pipeline = pso.map(HeadlessPipeline::id);
        list.commands.clear();
        list.open = true;

        Ok(())
    }

    fn close_command_list(&self, list: &mut Self::CommandList) -> Result<(), Self::Error> {
        if !list.open {
            return Err(HeadlessError::NotRecording(list.id));
        }

        if self.fail_closes.load(Ordering::Relaxed) {
            return Err(HeadlessError::Fault(format!("closing command list {}", list.id)));
        }

        list.open = false;
        Ok(())
    }

    fn execute_command_lists(
        &self,
        queue: &Self::Queue,
        lists: &[&Self::CommandList],
    ) -> Result<(), Self::Error> {
        queue.execute(lists)
    }

    fn signal(
        &self,
        queue: &Self::Queue,
        fence: &Self::Fence,
        value: u64,
    ) -> Result<(), Self::Error> {
        queue.signal(fence, value);
        Ok(())
    }

    fn completed_value(&self, fence: &Self::Fence) -> u64 {
        fence.completed_value()
    }

    fn wait_fence(
        &self,
        fence: &Self::Fence,
        value: u64,
        timeout: Option<Duration>,
    ) -> Result<bool, Self::Error> {
        Ok(fence.wait(value, timeout))
    }

    fn create_descriptor_heap(
        &self,
        kind: DescriptorKind,
        capacity: usize,
        shader_visible: bool,
    ) -> Result<Self::DescriptorHeap, Self::Error> {
        Ok(HeadlessDescriptorHeap {
            id: self.next_id(),
            kind,
            capacity,
            shader_visible,
        })
    }

    fn descriptor_increment_size(&self, _kind: DescriptorKind) -> usize {
        DESCRIPTOR_INCREMENT
    }

    fn descriptor_heap_start(
        &self,
        heap: &Self::DescriptorHeap,
    ) -> (CpuDescriptorHandle, Option<GpuDescriptorHandle>) {
        let base = heap.id as usize * HEAP_STRIDE;
        let gpu = heap
            .shader_visible
            .then(|| GpuDescriptorHandle(base as u64));

        (CpuDescriptorHandle(base), gpu)
    }

    fn create_pipeline_state(
        &self,
        desc: &GraphicsPipelineDesc<Self>,
    ) -> Result<Self::PipelineState, Self::Error> {
        if desc.vertex_shader().is_empty() {
            return Err(HeadlessError::MissingVertexShader);
        }

        self.pipelines_created.fetch_add(1, Ordering::Relaxed);
        Ok(HeadlessPipeline(Arc::new(self.next_id())))
    }

    fn transition_barrier(
        list: &mut Self::CommandList,
        resource: &Self::Resource,
        before: ResourceStates,
        after: ResourceStates,
    ) {
        list.barrier(resource.id, before, after);
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, HeadlessDevice, HeadlessError};
    use crate::graphics::{backend::Backend, types::QueueType};

    const fn is_send_sync<T: Send + Sync>() {}

    const _: () = is_send_sync::<HeadlessDevice>();
    const _: () = is_send_sync::<super::HeadlessQueue>();

    #[test]
    fn lists_must_be_closed_before_execution() {
        let device = HeadlessDevice::new();
        let queue = device.create_queue(QueueType::Graphics).unwrap();
        let allocator = device.create_command_allocator(QueueType::Graphics).unwrap();
        let mut list = device
            .create_command_list(QueueType::Graphics, &allocator)
            .unwrap();

        device.reset_command_list(&mut list, &allocator, None).unwrap();
        list.marker("clear").unwrap();

        assert_eq!(
            device.execute_command_lists(&queue, &[&list]),
            Err(HeadlessError::ListNotClosed(list.id()))
        );

        device.close_command_list(&mut list).unwrap();
        device.execute_command_lists(&queue, &[&list]).unwrap();

        let submissions = queue.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].markers(), ["clear"]);
    }

    #[test]
    fn allocator_reset_waits_for_retirement() {
        let device = HeadlessDevice::new();
        let queue = device.create_queue(QueueType::Copy).unwrap();
        let fence = device.create_fence(0).unwrap();
        let allocator = device.create_command_allocator(QueueType::Copy).unwrap();
        let mut list = device.create_command_list(QueueType::Copy, &allocator).unwrap();

        device.reset_command_list(&mut list, &allocator, None).unwrap();
        device.close_command_list(&mut list).unwrap();

        queue.stall();
        device.execute_command_lists(&queue, &[&list]).unwrap();
        device.signal(&queue, &fence, 1).unwrap();

        assert_eq!(
            device.reset_command_allocator(&allocator),
            Err(HeadlessError::AllocatorInUse {
                allocator: allocator.id(),
                value: 1
            })
        );

        queue.resume();
        device.reset_command_allocator(&allocator).unwrap();
        assert_eq!(allocator.reset_count(), 1);
    }

    #[test]
    fn copy_lists_reject_draws() {
        let device = HeadlessDevice::new();
        let allocator = device.create_command_allocator(QueueType::Copy).unwrap();
        let mut list = device.create_command_list(QueueType::Copy, &allocator).unwrap();
        device.reset_command_list(&mut list, &allocator, None).unwrap();

        assert!(matches!(
            list.draw_indexed(3, 1),
            Err(HeadlessError::UnsupportedCommand { .. })
        ));

        let src = device.create_resource("staging");
        let dst = device.create_resource("vertices");
        list.copy_resource(&dst, &src).unwrap();
        assert_eq!(
            list.commands(),
            [Command::CopyResource {
                dst: dst.id(),
                src: src.id()
            }]
        );
    }

    #[test]
    fn recording_into_closed_list_fails() {
        let device = HeadlessDevice::new();
        let allocator = device.create_command_allocator(QueueType::Graphics).unwrap();
        let mut list = device
            .create_command_list(QueueType::Graphics, &allocator)
            .unwrap();

        assert_eq!(
            list.marker("late"),
            Err(HeadlessError::NotRecording(list.id()))
        );
    }

    #[test]
    fn retire_next_completes_in_order() {
        let device = HeadlessDevice::new();
        let queue = device.create_queue(QueueType::Graphics).unwrap();
        let fence = device.create_fence(0).unwrap();

        queue.stall();
        device.signal(&queue, &fence, 1).unwrap();
        device.signal(&queue, &fence, 2).unwrap();
        assert_eq!(queue.pending_signals(), 2);

        assert_eq!(queue.retire_next(), Some(1));
        assert_eq!(device.completed_value(&fence), 1);
        assert_eq!(queue.retire_next(), Some(2));
        assert_eq!(queue.retire_next(), None);
        assert_eq!(device.completed_value(&fence), 2);
    }
}
