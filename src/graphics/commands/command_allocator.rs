use crate::graphics::{
    backend::Backend,
    buffered_resource::BufferedResource,
    error::DeviceError,
    frame::FrameContext,
    types::QueueType,
};

/// One native allocator per frame slot. A slot is only reset once the frame
/// that last used it has retired on the GPU.
#[derive(Debug)]
pub(crate) struct CommandAllocator<B: Backend> {
    pub(crate) slots: BufferedResource<B::CommandAllocator>,
}

impl<B: Backend> CommandAllocator<B> {
    pub(crate) fn inner_new(device: &B, ty: QueueType) -> Result<Self, DeviceError> {
        let slots = BufferedResource::try_new(|_| {
            device
                .create_command_allocator(ty)
                .map_err(DeviceError::backend)
        })?;

        Ok(Self { slots })
    }

    pub(crate) fn get(&self, frame: FrameContext) -> &B::CommandAllocator {
        self.slots.get(frame)
    }

    pub(crate) fn reset(
        &self,
        device: &B,
        frame: FrameContext,
    ) -> Result<&B::CommandAllocator, DeviceError> {
        let allocator = self.slots.get(frame);
        device
            .reset_command_allocator(allocator)
            .map_err(DeviceError::backend)?;

        Ok(allocator)
    }
}

#[cfg(test)]
mod tests {
    use super::CommandAllocator;
    use crate::graphics::{
        frame::FrameContext, headless::HeadlessDevice, types::QueueType,
    };

    const fn is_send_sync<T: Send + Sync>() {}

    const _: () = is_send_sync::<CommandAllocator<HeadlessDevice>>();

    #[test]
    fn one_allocator_per_slot() {
        let device = HeadlessDevice::new();
        let allocator = CommandAllocator::inner_new(&device, QueueType::Compute).unwrap();

        assert_eq!(device.allocators_created(), 3);

        let first = allocator.get(FrameContext::new(1)).id();
        assert_eq!(allocator.get(FrameContext::new(4)).id(), first);
        assert_ne!(allocator.get(FrameContext::new(2)).id(), first);

        let reset = allocator.reset(&device, FrameContext::new(1)).unwrap();
        assert_eq!(reset.reset_count(), 1);
    }
}
