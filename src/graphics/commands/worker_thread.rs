use crate::graphics::{
    backend::Backend,
    error::{DeviceError, GraphError},
    frame::FrameContext,
    types::QueueType,
};

use super::{
    command_allocator::CommandAllocator,
    node::NodeDesc,
    plan::Segment,
    recorder::CommandRecorder,
};

/// Everything one worker records into: its allocators and one command list per
/// segment it was assigned.
#[derive(Debug)]
pub(crate) struct WorkerThread<B: Backend> {
    index: usize,
    allocator: CommandAllocator<B>,
    pub(crate) lists: Vec<B::CommandList>,
    segments: Vec<Segment>,
}

/// Work a worker did for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct WorkerReport {
    pub(crate) lists: usize,
    pub(crate) instances: usize,
}

impl<B: Backend> WorkerThread<B> {
    pub(crate) fn inner_new(
        device: &B,
        ty: QueueType,
        index: usize,
        segments: Vec<Segment>,
    ) -> Result<Self, DeviceError> {
        let allocator = CommandAllocator::inner_new(device, ty)?;
        let lists = segments
            .iter()
            .map(|_| {
                device
                    .create_command_list(ty, allocator.get(FrameContext::default()))
                    .map_err(DeviceError::backend)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            index,
            allocator,
            lists,
            segments,
        })
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.segments.is_empty()
    }

    /// Records every assigned segment for `frame`. On failure the list being
    /// recorded is closed again so the worker stays reusable.
    pub(crate) fn record(
        &mut self,
        device: &B,
        frame: FrameContext,
        nodes: &[NodeDesc<'_, B>],
        pso: Option<&B::PipelineState>,
    ) -> Result<WorkerReport, GraphError> {
        let mut report = WorkerReport::default();
        if self.is_idle() {
            return Ok(report);
        }

        let allocator = self.allocator.reset(device, frame)?;

        for (segment, list) in self.segments.iter().zip(self.lists.iter_mut()) {
            let node = &nodes[segment.node];

            device
                .reset_command_list(list, allocator, pso)
                .map_err(DeviceError::backend)?;

            let recorded = Self::record_segment(list, node, segment, frame, self.index);
            if recorded.is_err() {
                if let Err(err) = device.close_command_list(list) {
                    tracing::warn!(
                        worker = self.index,
                        node = node.display_name(),
                        "failed to close command list after recording error: {err}"
                    );
                }
            }
            report.instances += recorded?;

            device
                .close_command_list(list)
                .map_err(DeviceError::backend)?;
            report.lists += 1;
        }

        Ok(report)
    }

    fn record_segment(
        list: &mut B::CommandList,
        node: &NodeDesc<'_, B>,
        segment: &Segment,
        frame: FrameContext,
        worker: usize,
    ) -> Result<usize, GraphError> {
        let failed = |error: B::Error| GraphError::Recording {
            node: node.display_name().to_string(),
            source: Box::new(error),
        };

        let mut recorder = CommandRecorder::new(list, frame, worker);

        if let Some(setup) = &node.setup {
            setup(&mut recorder).map_err(failed)?;
        }

        let mut instances = 0;
        if let Some(per_instance) = &node.per_instance {
            for instance in segment.instances() {
                per_instance(&mut recorder, instance).map_err(failed)?;
                instances += 1;
            }
        }

        Ok(instances)
    }
}
