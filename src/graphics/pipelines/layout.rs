use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::graphics::backend::Backend;

static NEXT_LAYOUT_ID: AtomicU64 = AtomicU64::new(1);

/// Root signature registered with the framework. Pipeline descriptions refer to
/// it by identity, so two layouts never compare equal unless they are clones.
pub struct PipelineLayout<B: Backend>(Arc<PipelineLayoutInner<B>>);

pub struct PipelineLayoutInner<B: Backend> {
    id: u64,
    pub(crate) raw: B::RootSignature,
}

impl<B: Backend> PipelineLayout<B> {
    pub fn new(raw: B::RootSignature) -> Self {
        Self(Arc::new(PipelineLayoutInner {
            id: NEXT_LAYOUT_ID.fetch_add(1, Ordering::Relaxed),
            raw,
        }))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn raw(&self) -> &B::RootSignature {
        &self.raw
    }
}

impl<B: Backend> Clone for PipelineLayout<B> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<B: Backend> Deref for PipelineLayout<B> {
    type Target = PipelineLayoutInner<B>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<B: Backend> PartialEq for PipelineLayout<B> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<B: Backend> Eq for PipelineLayout<B> {}

impl<B: Backend> Hash for PipelineLayout<B> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<B: Backend> fmt::Debug for PipelineLayout<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineLayout").field("id", &self.id).finish()
    }
}
