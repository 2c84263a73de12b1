use std::{ops::Deref, sync::Arc};

use atomig::{Atomic, Ordering};

use crate::graphics::{backend::Backend, types::ResourceStates};

/// State is tracked in recording order. Nodes recorded on different workers
/// must not transition the same resource within one frame.
pub trait Transition<B: Backend> {
    /// Moves the resource into `state`, recording a barrier only when it is not
    /// already there. Returns whether a barrier was recorded.
    fn transition(&self, list: &mut B::CommandList, state: ResourceStates) -> bool;
}

/// Native resource with its current state tracked on the CPU.
pub struct TrackedResource<B: Backend>(Arc<TrackedResourceInner<B>>);

pub struct TrackedResourceInner<B: Backend> {
    raw: B::Resource,
    state: Atomic<ResourceStates>,
}

impl<B: Backend> TrackedResource<B> {
    pub fn new(raw: B::Resource, state: ResourceStates) -> Self {
        Self(Arc::new(TrackedResourceInner {
            raw,
            state: Atomic::new(state),
        }))
    }

    pub fn raw(&self) -> &B::Resource {
        &self.raw
    }

    pub fn state(&self) -> ResourceStates {
        self.state.load(Ordering::Acquire)
    }
}

impl<B: Backend> Transition<B> for TrackedResource<B> {
    fn transition(&self, list: &mut B::CommandList, state: ResourceStates) -> bool {
        let before = self.state.swap(state, Ordering::AcqRel);
        if before == state {
            return false;
        }

        B::transition_barrier(list, &self.raw, before, state);
        true
    }
}

impl<B: Backend> Clone for TrackedResource<B> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<B: Backend> Deref for TrackedResource<B> {
    type Target = TrackedResourceInner<B>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
