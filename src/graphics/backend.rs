use std::{error::Error, fmt::Debug, time::Duration};

use super::{
    pipelines::GraphicsPipelineDesc,
    types::{CpuDescriptorHandle, DescriptorKind, GpuDescriptorHandle, QueueType, ResourceStates},
};

/// Native API surface consumed by the framework.
///
/// Handles are reference counted by the backend, cloning one never duplicates
/// the underlying object. Command lists are handed out closed and must be reset
/// before recording.
pub trait Backend: Debug + Send + Sync + Sized + 'static {
    type Error: Error + Send + Sync + 'static;

    type Queue: Debug + Send + Sync;
    type Fence: Debug + Send + Sync;
    type CommandAllocator: Debug + Send + Sync;
    type CommandList: Debug + Send;
    type DescriptorHeap: Debug + Send + Sync;
    type RootSignature: Debug + Send + Sync;
    type PipelineState: Clone + Debug + Send + Sync;
    type Resource: Debug + Send + Sync;

    fn create_queue(&self, ty: QueueType) -> Result<Self::Queue, Self::Error>;

    fn create_fence(&self, initial_value: u64) -> Result<Self::Fence, Self::Error>;

    fn create_command_allocator(&self, ty: QueueType)
        -> Result<Self::CommandAllocator, Self::Error>;

    fn create_command_list(
        &self,
        ty: QueueType,
        allocator: &Self::CommandAllocator,
    ) -> Result<Self::CommandList, Self::Error>;

    fn reset_command_allocator(&self, allocator: &Self::CommandAllocator)
        -> Result<(), Self::Error>;

    fn reset_command_list(
        &self,
        list: &mut Self::CommandList,
        allocator: &Self::CommandAllocator,
        pso: Option<&Self::PipelineState>,
    ) -> Result<(), Self::Error>;

    fn close_command_list(&self, list: &mut Self::CommandList) -> Result<(), Self::Error>;

    fn execute_command_lists(
        &self,
        queue: &Self::Queue,
        lists: &[&Self::CommandList],
    ) -> Result<(), Self::Error>;

    fn signal(
        &self,
        queue: &Self::Queue,
        fence: &Self::Fence,
        value: u64,
    ) -> Result<(), Self::Error>;

    fn completed_value(&self, fence: &Self::Fence) -> u64;

    /// Blocks until `fence` reaches `value` or `timeout` elapses. `None` waits
    /// forever. Returns whether the value was reached.
    fn wait_fence(
        &self,
        fence: &Self::Fence,
        value: u64,
        timeout: Option<Duration>,
    ) -> Result<bool, Self::Error>;

    fn create_descriptor_heap(
        &self,
        kind: DescriptorKind,
        capacity: usize,
        shader_visible: bool,
    ) -> Result<Self::DescriptorHeap, Self::Error>;

    fn descriptor_increment_size(&self, kind: DescriptorKind) -> usize;

    fn descriptor_heap_start(
        &self,
        heap: &Self::DescriptorHeap,
    ) -> (CpuDescriptorHandle, Option<GpuDescriptorHandle>);

    fn create_pipeline_state(
        &self,
        desc: &GraphicsPipelineDesc<Self>,
    ) -> Result<Self::PipelineState, Self::Error>;

    fn transition_barrier(
        list: &mut Self::CommandList,
        resource: &Self::Resource,
        before: ResourceStates,
        after: ResourceStates,
    );
}
