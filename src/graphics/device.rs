use std::{
    ops::Deref,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use super::{
    backend::Backend,
    commands::CommandQueue,
    descriptor_heap::DescriptorPool,
    error::DeviceError,
    frame::{FrameContext, FrameCounter, RESOURCE_BUFFER_COUNT},
    pipelines::{GraphicsPipelineDesc, PipelineLayout, PsoPool},
    types::{DescriptorKind, QueueType},
};

/// Creation parameters for [`Device`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceDesc {
    descriptor_capacities: [usize; 4],
    wait_timeout: Option<Duration>,
}

impl Default for DeviceDesc {
    fn default() -> Self {
        Self {
            descriptor_capacities: DescriptorKind::ALL.map(|kind| kind.default_capacity()),
            wait_timeout: None,
        }
    }
}

impl DeviceDesc {
    pub fn with_descriptor_capacity(mut self, kind: DescriptorKind, capacity: usize) -> Self {
        self.descriptor_capacities[kind.index()] = capacity;
        self
    }

    /// Upper bound for every blocking fence wait the device does on its own.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn descriptor_capacity(&self, kind: DescriptorKind) -> usize {
        self.descriptor_capacities[kind.index()]
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout
    }
}

#[derive(Debug)]
pub struct Device<B: Backend>(Arc<DeviceInner<B>>);

#[derive(Debug)]
pub struct DeviceInner<B: Backend> {
    raw: B,
    desc: DeviceDesc,

    queues: [CommandQueue<B>; 3],
    descriptor_pools: [DescriptorPool<B>; 4],
    pso_pool: PsoPool<B>,

    frame: FrameCounter,
    // Highest ticket signaled on each queue while a frame slot was current.
    frame_tickets: [[AtomicU64; 3]; RESOURCE_BUFFER_COUNT],
}

impl<B: Backend> Device<B> {
    pub fn new(raw: B) -> Result<Self, DeviceError> {
        Self::with_desc(raw, DeviceDesc::default())
    }

    pub fn with_desc(raw: B, desc: DeviceDesc) -> Result<Self, DeviceError> {
        let queues = [
            CommandQueue::inner_new(&raw, QueueType::Graphics)?,
            CommandQueue::inner_new(&raw, QueueType::Compute)?,
            CommandQueue::inner_new(&raw, QueueType::Copy)?,
        ];

        let pool = |kind| DescriptorPool::inner_new(&raw, kind, desc.descriptor_capacity(kind));
        let descriptor_pools = [
            pool(DescriptorKind::Sampler)?,
            pool(DescriptorKind::Rtv)?,
            pool(DescriptorKind::Dsv)?,
            pool(DescriptorKind::CbvSrvUav)?,
        ];

        tracing::debug!(?desc, "created device");

        Ok(Self(Arc::new(DeviceInner {
            raw,
            desc,
            queues,
            descriptor_pools,
            pso_pool: PsoPool::inner_new(),
            frame: FrameCounter::default(),
            frame_tickets: Default::default(),
        })))
    }

    pub fn raw(&self) -> &B {
        &self.raw
    }

    pub fn desc(&self) -> &DeviceDesc {
        &self.desc
    }

    pub fn queue(&self, ty: QueueType) -> &CommandQueue<B> {
        &self.queues[ty.index()]
    }
}

impl<B: Backend> Device<B> {
    /// Signals `ty` without submitting anything and returns the ticket.
    pub fn signal_queue_work(&self, ty: QueueType) -> Result<u64, DeviceError> {
        let ticket = self.queue(ty).signal(&self.raw)?;
        self.record_ticket(ty, ticket);

        Ok(ticket)
    }

    /// Executes `lists` in order on `ty` and signals it.
    pub fn submit(&self, ty: QueueType, lists: &[&B::CommandList]) -> Result<u64, DeviceError> {
        let ticket = self.queue(ty).submit(&self.raw, lists)?;
        self.record_ticket(ty, ticket);

        Ok(ticket)
    }

    /// Blocks until everything signaled on `ty` so far has retired.
    pub fn wait_for_queue(&self, ty: QueueType) -> Result<(), DeviceError> {
        self.wait_for_work(ty, self.last_requested(ty))
    }

    pub fn wait_for_work(&self, ty: QueueType, ticket: u64) -> Result<(), DeviceError> {
        self.queue(ty)
            .wait_on_cpu(&self.raw, ticket, self.desc.wait_timeout)
    }

    pub fn wait_for_work_timeout(
        &self,
        ty: QueueType,
        ticket: u64,
        timeout: Duration,
    ) -> Result<(), DeviceError> {
        self.queue(ty).wait_on_cpu(&self.raw, ticket, Some(timeout))
    }

    pub fn wait_idle(&self) -> Result<(), DeviceError> {
        for ty in QueueType::ALL {
            self.wait_for_queue(ty)?;
        }

        Ok(())
    }

    pub fn completed_value(&self, ty: QueueType) -> u64 {
        self.queue(ty).fence.completed_value(&self.raw)
    }

    pub fn last_requested(&self, ty: QueueType) -> u64 {
        self.queue(ty).fence.last_requested()
    }

    fn record_ticket(&self, ty: QueueType, ticket: u64) {
        let slot = self.frame.current().index();
        self.frame_tickets[slot][ty.index()].fetch_max(ticket, Ordering::AcqRel);
    }
}

impl<B: Backend> Device<B> {
    pub fn frame(&self) -> FrameContext {
        self.frame.current()
    }

    /// Moves to the next frame once the GPU is done with the work recorded the
    /// last time its slot was current. Only the presenting thread calls this.
    /// On a timeout the frame stays where it was.
    pub fn advance_frame(&self) -> Result<FrameContext, DeviceError> {
        let next = self.frame.current().next();

        for ty in QueueType::ALL {
            let ticket = self.frame_tickets[next.index()][ty.index()].load(Ordering::Acquire);
            self.wait_for_work(ty, ticket)?;
        }

        let frame = self.frame.advance();
        tracing::trace!(frame = frame.frame(), index = frame.index(), "advanced frame");

        Ok(frame)
    }
}

impl<B: Backend> Device<B> {
    pub fn descriptor_pool(&self, kind: DescriptorKind) -> &DescriptorPool<B> {
        &self.descriptor_pools[kind.index()]
    }

    pub fn create_pipeline_layout(&self, raw: B::RootSignature) -> PipelineLayout<B> {
        PipelineLayout::new(raw)
    }

    pub fn get_pso(&self, desc: &GraphicsPipelineDesc<B>) -> Result<B::PipelineState, DeviceError> {
        self.pso_pool.get(&self.raw, desc)
    }

    pub fn pso_pool(&self) -> &PsoPool<B> {
        &self.pso_pool
    }
}

impl<B: Backend> Clone for Device<B> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<B: Backend> Deref for Device<B> {
    type Target = DeviceInner<B>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::{Device, DeviceDesc};
    use crate::graphics::{
        error::DeviceError,
        headless::HeadlessDevice,
        pipelines::{GraphicsPipelineDesc, ShaderBytecode},
        types::{DescriptorKind, QueueType},
    };

    const fn is_send_sync<T: Send + Sync>() {}

    const _: () = is_send_sync::<Device<HeadlessDevice>>();

    #[test]
    fn descriptor_pools_use_configured_capacities() {
        let desc = DeviceDesc::default().with_descriptor_capacity(DescriptorKind::Rtv, 4);
        let device = Device::with_desc(HeadlessDevice::new(), desc).unwrap();

        assert_eq!(device.descriptor_pool(DescriptorKind::Rtv).capacity(), 4);
        assert_eq!(device.descriptor_pool(DescriptorKind::Dsv).capacity(), 256);
        assert_eq!(device.descriptor_pool(DescriptorKind::Sampler).capacity(), 256);
        assert_eq!(
            device.descriptor_pool(DescriptorKind::CbvSrvUav).capacity(),
            65536
        );
    }

    #[test]
    fn tickets_are_per_queue() {
        let device = Device::new(HeadlessDevice::new()).unwrap();

        assert_eq!(device.signal_queue_work(QueueType::Graphics).unwrap(), 1);
        assert_eq!(device.signal_queue_work(QueueType::Graphics).unwrap(), 2);
        assert_eq!(device.signal_queue_work(QueueType::Copy).unwrap(), 1);

        assert_eq!(device.last_requested(QueueType::Graphics), 2);
        assert_eq!(device.last_requested(QueueType::Compute), 0);
        assert_eq!(device.completed_value(QueueType::Copy), 1);
    }

    #[test]
    fn wait_for_queue_returns_when_idle() {
        let device = Device::new(HeadlessDevice::new()).unwrap();
        device.queue(QueueType::Compute).raw().stall();

        device.wait_for_queue(QueueType::Compute).unwrap();

        device.signal_queue_work(QueueType::Compute).unwrap();
        device.queue(QueueType::Compute).raw().resume();
        device.wait_for_queue(QueueType::Compute).unwrap();
        device.wait_for_queue(QueueType::Compute).unwrap();
    }

    #[test]
    fn wait_for_queue_blocks_until_last_ticket() {
        let device = Device::new(HeadlessDevice::new()).unwrap();
        let queue = device.queue(QueueType::Graphics);
        queue.raw().stall();

        device.signal_queue_work(QueueType::Graphics).unwrap();
        device.signal_queue_work(QueueType::Graphics).unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(10));
                queue.raw().retire_next();
                thread::sleep(Duration::from_millis(10));
                queue.raw().retire_next();
            });

            device.wait_for_queue(QueueType::Graphics).unwrap();
            assert_eq!(device.completed_value(QueueType::Graphics), 2);
        });
    }

    #[test]
    fn older_tickets_can_be_awaited() {
        let device = Device::new(HeadlessDevice::new()).unwrap();
        let queue = device.queue(QueueType::Copy);
        queue.raw().stall();

        let first = device.signal_queue_work(QueueType::Copy).unwrap();
        device.signal_queue_work(QueueType::Copy).unwrap();
        queue.raw().retire_next();

        device.wait_for_work(QueueType::Copy, first).unwrap();
        assert!(matches!(
            device.wait_for_work_timeout(QueueType::Copy, first + 1, Duration::from_millis(5)),
            Err(DeviceError::FenceTimeout {
                queue: QueueType::Copy,
                value: 2,
                completed: 1
            })
        ));

        queue.raw().resume();
    }

    #[test]
    fn advance_frame_waits_for_reused_slot() {
        let desc = DeviceDesc::default().with_wait_timeout(Duration::from_millis(5));
        let device = Device::with_desc(HeadlessDevice::new(), desc).unwrap();
        let queue = device.queue(QueueType::Graphics);
        queue.raw().stall();

        for _ in 0..3 {
            device.signal_queue_work(QueueType::Graphics).unwrap();
            if device.frame().frame() < 2 {
                device.advance_frame().unwrap();
            }
        }

        assert!(matches!(
            device.advance_frame(),
            Err(DeviceError::FenceTimeout { value: 1, .. })
        ));
        assert_eq!(device.frame().frame(), 2);

        queue.raw().retire_next();
        let frame = device.advance_frame().unwrap();

        assert_eq!(frame.frame(), 3);
        assert_eq!(frame.index(), 0);
        queue.raw().resume();
    }

    #[test]
    fn identical_pipeline_descs_share_a_pso() {
        let raw = HeadlessDevice::new();
        let device = Device::new(raw.clone()).unwrap();
        let layout = device.create_pipeline_layout(raw.create_root_signature());

        let desc = GraphicsPipelineDesc::new(ShaderBytecode::new(vec![1u8, 2, 3]))
            .with_layout(&layout);

        let a = device.get_pso(&desc).unwrap();
        let b = device.get_pso(&desc.clone()).unwrap();

        assert_eq!(a, b);
        assert_eq!(raw.pipelines_created(), 1);
        assert_eq!(device.pso_pool().len(), 1);
    }
}
