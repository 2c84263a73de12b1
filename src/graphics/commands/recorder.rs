use std::ops::{Deref, DerefMut};

use crate::graphics::{
    backend::Backend,
    frame::FrameContext,
    resources::Transition,
    types::ResourceStates,
};

/// Open command list handed to node callbacks, together with the frame being
/// recorded and the worker doing the recording.
pub struct CommandRecorder<'l, B: Backend> {
    list: &'l mut B::CommandList,
    frame: FrameContext,
    worker: usize,
}

impl<'l, B: Backend> CommandRecorder<'l, B> {
    pub(crate) fn new(list: &'l mut B::CommandList, frame: FrameContext, worker: usize) -> Self {
        Self {
            list,
            frame,
            worker,
        }
    }

    pub fn frame(&self) -> FrameContext {
        self.frame
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn transition(&mut self, resource: &impl Transition<B>, state: ResourceStates) -> bool {
        resource.transition(self.list, state)
    }

    /// Untracked transition for resources whose state is known statically,
    /// such as a swapchain image moving between nodes of the same frame.
    pub fn barrier(&mut self, resource: &B::Resource, before: ResourceStates, after: ResourceStates) {
        B::transition_barrier(self.list, resource, before, after);
    }
}

impl<B: Backend> Deref for CommandRecorder<'_, B> {
    type Target = B::CommandList;

    fn deref(&self) -> &Self::Target {
        self.list
    }
}

impl<B: Backend> DerefMut for CommandRecorder<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.list
    }
}
