use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use super::{backend::Backend, error::DeviceError, types::QueueType};

/// Native fence paired with the last value requested from the GPU.
#[derive(Debug)]
pub struct QueueFence<B: Backend> {
    pub(crate) raw: B::Fence,
    queue: QueueType,
    value: AtomicU64,
}

impl<B: Backend> QueueFence<B> {
    pub(crate) fn inner_new(device: &B, queue: QueueType) -> Result<Self, DeviceError> {
        let raw = device.create_fence(0).map_err(DeviceError::backend)?;

        Ok(Self {
            raw,
            queue,
            value: AtomicU64::new(0),
        })
    }

    /// Enqueues the next value on `queue`. Callers hold the queue lock, so the
    /// requested value only moves once the signal is on the GPU timeline.
    pub(crate) fn signal(&self, device: &B, queue: &B::Queue) -> Result<u64, DeviceError> {
        let value = self.last_requested() + 1;
        device
            .signal(queue, &self.raw, value)
            .map_err(DeviceError::backend)?;
        self.value.store(value, Ordering::Release);

        Ok(value)
    }

    pub fn last_requested(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    pub fn completed_value(&self, device: &B) -> u64 {
        device.completed_value(&self.raw)
    }

    pub fn is_complete(&self, device: &B, value: u64) -> bool {
        self.completed_value(device) >= value
    }

    pub(crate) fn wait(
        &self,
        device: &B,
        value: u64,
        timeout: Option<Duration>,
    ) -> Result<(), DeviceError> {
        if self.is_complete(device, value) {
            return Ok(());
        }

        tracing::trace!(queue = %self.queue, value, "waiting on fence");

        if device
            .wait_fence(&self.raw, value, timeout)
            .map_err(DeviceError::backend)?
        {
            return Ok(());
        }

        let completed = self.completed_value(device);
        tracing::warn!(queue = %self.queue, value, completed, "fence wait timed out");

        Err(DeviceError::FenceTimeout {
            queue: self.queue,
            value,
            completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::QueueFence;
    use crate::graphics::{
        backend::Backend, error::DeviceError, headless::HeadlessDevice, types::QueueType,
    };

    #[test]
    fn tickets_increase_by_one() {
        let device = HeadlessDevice::new();
        let queue = device.create_queue(QueueType::Graphics).unwrap();
        let fence = QueueFence::<HeadlessDevice>::inner_new(&device, QueueType::Graphics).unwrap();

        assert_eq!(fence.signal(&device, &queue).unwrap(), 1);
        assert_eq!(fence.signal(&device, &queue).unwrap(), 2);
        assert_eq!(fence.last_requested(), 2);
        assert!(fence.is_complete(&device, 2));
    }

    #[test]
    fn completed_value_skips_wait() {
        let device = HeadlessDevice::new();
        let fence = QueueFence::<HeadlessDevice>::inner_new(&device, QueueType::Copy).unwrap();

        assert!(fence.wait(&device, 0, Some(Duration::ZERO)).is_ok());
    }

    #[test]
    fn pending_value_times_out() {
        let device = HeadlessDevice::new();
        let fence = QueueFence::<HeadlessDevice>::inner_new(&device, QueueType::Compute).unwrap();
        let queue = device.create_queue(QueueType::Compute).unwrap();
        queue.stall();
        fence.signal(&device, &queue).unwrap();

        let err = fence
            .wait(&device, 1, Some(Duration::from_millis(10)))
            .unwrap_err();

        assert!(matches!(
            err,
            DeviceError::FenceTimeout {
                queue: QueueType::Compute,
                value: 1,
                completed: 0
            }
        ));
    }
}
