use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;

use crate::graphics::types::{CpuDescriptorHandle, QueueType, ResourceStates};

use super::{fence::HeadlessFence, HeadlessError, HeadlessResource};

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Marker(String),
    Barrier {
        resource: u64,
        before: ResourceStates,
        after: ResourceStates,
    },
    ClearRenderTarget {
        handle: CpuDescriptorHandle,
        color: [f32; 4],
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    CopyResource {
        dst: u64,
        src: u64,
    },
}

#[derive(Clone, Debug)]
pub struct HeadlessCommandAllocator(pub(super) Arc<AllocatorState>);

#[derive(Debug)]
pub(super) struct AllocatorState {
    pub(super) id: u64,
    pub(super) ty: QueueType,
    pub(super) retire: Mutex<Option<(HeadlessFence, u64)>>,
    pub(super) resets: AtomicUsize,
}

impl HeadlessCommandAllocator {
    pub(super) fn inner_new(id: u64, ty: QueueType) -> Self {
        Self(Arc::new(AllocatorState {
            id,
            ty,
            retire: Mutex::new(None),
            resets: AtomicUsize::new(0),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn reset_count(&self) -> usize {
        self.0.resets.load(Ordering::Relaxed)
    }

    /// Fails while a submission that used this allocator is still on the GPU.
    pub(super) fn reset(&self) -> Result<(), HeadlessError> {
        if let Some((fence, value)) = &*self.0.retire.lock() {
            if fence.completed_value() < *value {
                return Err(HeadlessError::AllocatorInUse {
                    allocator: self.0.id,
                    value: *value,
                });
            }
        }

        self.0.resets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug)]
pub struct HeadlessCommandList {
    pub(super) id: u64,
    pub(super) ty: QueueType,
    pub(super) allocator: Arc<AllocatorState>,
    pub(super) pipeline: Option<u64>,
    pub(super) commands: Vec<Command>,
    pub(super) open: bool,
}

impl HeadlessCommandList {
    pub(super) fn inner_new(id: u64, ty: QueueType, allocator: &HeadlessCommandAllocator) -> Self {
        Self {
            id,
            ty,
            allocator: Arc::clone(&allocator.0),
            pipeline: None,
            commands: vec![],
            open: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn queue_type(&self) -> QueueType {
        self.ty
    }

    pub fn allocator_id(&self) -> u64 {
        self.allocator.id
    }

    pub fn pipeline(&self) -> Option<u64> {
        self.pipeline
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn push(&mut self, command: Command) -> Result<(), HeadlessError> {
        if !self.open {
            return Err(HeadlessError::NotRecording(self.id));
        }

        self.commands.push(command);
        Ok(())
    }

    pub fn marker(&mut self, label: impl Into<String>) -> Result<(), HeadlessError> {
        self.push(Command::Marker(label.into()))
    }

    pub fn clear_render_target(
        &mut self,
        handle: CpuDescriptorHandle,
        color: [f32; 4],
    ) -> Result<(), HeadlessError> {
        if self.ty != QueueType::Graphics {
            return Err(HeadlessError::UnsupportedCommand {
                command: "clear_render_target",
                queue: self.ty,
            });
        }

        self.push(Command::ClearRenderTarget { handle, color })
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
    ) -> Result<(), HeadlessError> {
        if self.ty != QueueType::Graphics {
            return Err(HeadlessError::UnsupportedCommand {
                command: "draw_indexed",
                queue: self.ty,
            });
        }

        self.push(Command::DrawIndexed {
            index_count,
            instance_count,
        })
    }

    pub fn copy_resource(
        &mut self,
        dst: &HeadlessResource,
        src: &HeadlessResource,
    ) -> Result<(), HeadlessError> {
        self.push(Command::CopyResource {
            dst: dst.id(),
            src: src.id(),
        })
    }

    pub(super) fn barrier(&mut self, resource: u64, before: ResourceStates, after: ResourceStates) {
        self.commands.push(Command::Barrier {
            resource,
            before,
            after,
        });
    }
}
