use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::graphics::{
    backend::Backend, error::DeviceError, fence::QueueFence, types::QueueType,
};

/// Native queue paired with its fence. Every submission is followed by a
/// signal, and both happen under the queue lock so tickets are handed out in
/// submission order.
#[derive(Debug)]
pub struct CommandQueue<B: Backend> {
    ty: QueueType,
    pub(crate) raw: Mutex<B::Queue>,
    pub(crate) fence: QueueFence<B>,
}

impl<B: Backend> CommandQueue<B> {
    pub(crate) fn inner_new(device: &B, ty: QueueType) -> Result<Self, DeviceError> {
        let raw = device.create_queue(ty).map_err(DeviceError::backend)?;
        let fence = QueueFence::inner_new(device, ty)?;

        tracing::debug!(queue = %ty, "created command queue");

        Ok(Self {
            ty,
            raw: Mutex::new(raw),
            fence,
        })
    }

    pub fn queue_type(&self) -> QueueType {
        self.ty
    }

    pub fn raw(&self) -> MutexGuard<'_, B::Queue> {
        self.raw.lock()
    }

    pub fn fence(&self) -> &QueueFence<B> {
        &self.fence
    }

    pub(crate) fn signal(&self, device: &B) -> Result<u64, DeviceError> {
        let raw = self.raw.lock();
        self.fence.signal(device, &raw)
    }

    /// Executes `lists` in order and signals the fence. An empty batch only
    /// signals.
    pub(crate) fn submit(
        &self,
        device: &B,
        lists: &[&B::CommandList],
    ) -> Result<u64, DeviceError> {
        let raw = self.raw.lock();

        if !lists.is_empty() {
            device
                .execute_command_lists(&raw, lists)
                .map_err(DeviceError::backend)?;
        }

        let value = self.fence.signal(device, &raw)?;
        tracing::trace!(queue = %self.ty, lists = lists.len(), value, "submitted");

        Ok(value)
    }

    pub(crate) fn wait_on_cpu(
        &self,
        device: &B,
        value: u64,
        timeout: Option<Duration>,
    ) -> Result<(), DeviceError> {
        self.fence.wait(device, value, timeout)
    }
}
