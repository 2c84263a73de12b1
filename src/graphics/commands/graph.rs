use std::{
    collections::HashMap,
    fmt,
    time::{Duration, Instant},
};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::graphics::{
    backend::Backend,
    device::Device,
    error::{ConfigurationError, GraphError},
    frame::FrameContext,
    types::QueueType,
};

use super::{
    node::{NodeDesc, NodeId},
    plan::{self, ExecutionPlan, NodeShape},
    worker_thread::{WorkerReport, WorkerThread},
};

/// What the last `execute` did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub frame: Option<FrameContext>,
    pub ticket: Option<u64>,
    pub segments: usize,
    pub lists_submitted: usize,
    pub instances_recorded: usize,
    pub record_time: Duration,
}

struct BuiltGraph<B: Backend> {
    plan: ExecutionPlan,
    workers: Vec<WorkerThread<B>>,
}

/// Dependency graph of recording nodes bound to one queue.
///
/// Nodes are registered with [`CommandGraph::add_node`] and frozen by
/// [`CommandGraph::build`]. Every [`CommandGraph::execute`] records all nodes
/// in parallel on the graph's workers and submits the lists in dependency
/// order as a single batch.
///
/// Dropping a graph releases its command allocators. Call
/// [`CommandGraph::wait_idle`] first when its last submission may still be on
/// the GPU.
pub struct CommandGraph<'a, B: Backend> {
    queue: QueueType,
    worker_count: usize,
    pool: ThreadPool,

    nodes: Vec<NodeDesc<'a, B>>,
    names: HashMap<String, NodeId>,

    built: Option<BuiltGraph<B>>,
    stats: GraphStats,
}

impl<'a, B: Backend> CommandGraph<'a, B> {
    pub fn new(worker_count: usize, queue: QueueType) -> Result<Self, GraphError> {
        if worker_count == 0 {
            return Err(ConfigurationError::ZeroWorkers.into());
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|i| format!("command-graph-worker-{i}"))
            .build()?;

        Ok(Self {
            queue,
            worker_count,
            pool,
            nodes: vec![],
            names: HashMap::new(),
            built: None,
            stats: GraphStats::default(),
        })
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    pub fn add_node(&mut self, node: NodeDesc<'a, B>) -> Result<NodeId, GraphError> {
        if self.built.is_some() {
            return Err(ConfigurationError::GraphFinalized.into());
        }

        if node.instance_count == 0 {
            return Err(ConfigurationError::ZeroInstances(node.name.clone()).into());
        }

        let id = NodeId(self.nodes.len());
        if !node.is_anonymous() {
            if self.names.contains_key(&node.name) {
                return Err(ConfigurationError::DuplicateNode(node.name.clone()).into());
            }
            self.names.insert(node.name.clone(), id);
        }

        self.nodes.push(node);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeDesc<'a, B>> {
        self.nodes.get(id.0)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Validates the node set, computes the execution plan and allocates the
    /// workers' allocators and command lists. Nothing is allocated when
    /// validation fails.
    pub fn build(&mut self, device: &Device<B>) -> Result<(), GraphError> {
        let shapes = self
            .nodes
            .iter()
            .map(|node| NodeShape {
                name: &node.name,
                depends_on: &node.depends_on,
                has_setup: node.setup.is_some(),
                has_per_instance: node.per_instance.is_some(),
                instance_count: node.instance_count,
            })
            .collect::<Vec<_>>();

        let order = plan::topological_order(&shapes)?;
        let plan = plan::partition(order, &shapes, self.worker_count);

        if self.built.is_some() {
            self.wait_idle(device)?;
            self.built = None;
        }

        let workers = plan
            .workers
            .iter()
            .enumerate()
            .map(|(index, segments)| {
                WorkerThread::inner_new(device.raw(), self.queue, index, segments.clone())
            })
            .collect::<Result<Vec<_>, _>>()?;

        let order = plan
            .order
            .iter()
            .map(|&i| self.nodes[i].display_name())
            .collect::<Vec<_>>();
        tracing::debug!(
            queue = %self.queue,
            nodes = self.nodes.len(),
            segments = plan.segment_count(),
            workers = self.worker_count,
            ?order,
            "built command graph"
        );

        self.built = Some(BuiltGraph { plan, workers });
        Ok(())
    }

    /// Blocks until the last submission of this graph has retired.
    pub fn wait_idle(&self, device: &Device<B>) -> Result<(), GraphError> {
        if let Some(ticket) = self.stats.ticket {
            device.wait_for_work(self.queue, ticket)?;
        }

        Ok(())
    }

    /// Waits for the graph's last submission, then drops the plan and every
    /// node. On a failed wait the graph is left untouched.
    pub fn reset(&mut self, device: &Device<B>) -> Result<(), GraphError> {
        self.wait_idle(device)?;

        self.built = None;
        self.nodes.clear();
        self.names.clear();
        self.stats = GraphStats::default();

        Ok(())
    }

    /// Records the graph for the device's current frame and submits it.
    /// Returns the fence value that retires the submission.
    pub fn execute(
        &mut self,
        device: &Device<B>,
        pso: Option<&B::PipelineState>,
    ) -> Result<u64, GraphError> {
        let built = self.built.as_mut().ok_or(ConfigurationError::NotBuilt)?;
        let frame = device.frame();
        let raw = device.raw();
        let nodes = &self.nodes;

        let start = Instant::now();
        let mut reports = built
            .workers
            .iter()
            .map(|_| None)
            .collect::<Vec<Option<Result<WorkerReport, GraphError>>>>();

        self.pool.scope(|s| {
            for (worker, report) in built.workers.iter_mut().zip(reports.iter_mut()) {
                if worker.is_idle() {
                    continue;
                }

                s.spawn(move |_| *report = Some(worker.record(raw, frame, nodes, pso)));
            }
        });
        let record_time = start.elapsed();

        let mut lists_recorded = 0;
        let mut instances_recorded = 0;
        for report in reports.into_iter().flatten() {
            match report {
                Ok(report) => {
                    lists_recorded += report.lists;
                    instances_recorded += report.instances;
                }
                Err(err) => {
                    tracing::warn!(queue = %self.queue, frame = frame.frame(), "{err}");
                    return Err(err);
                }
            }
        }

        let lists = built
            .plan
            .submission
            .iter()
            .map(|&(worker, segment)| &built.workers[worker].lists[segment])
            .collect::<Vec<_>>();
        let ticket = device.submit(self.queue, &lists)?;

        tracing::trace!(
            queue = %self.queue,
            frame = frame.frame(),
            lists = lists.len(),
            ticket,
            ?record_time,
            "executed command graph"
        );

        self.stats = GraphStats {
            frame: Some(frame),
            ticket: Some(ticket),
            segments: lists_recorded,
            lists_submitted: lists.len(),
            instances_recorded,
            record_time,
        };

        Ok(ticket)
    }

    /// Node names in execution order. Anonymous nodes appear as `""`.
    pub fn order(&self) -> Option<Vec<&str>> {
        let built = self.built.as_ref()?;

        Some(
            built
                .plan
                .order
                .iter()
                .map(|&i| self.nodes[i].name())
                .collect(),
        )
    }

    pub fn stats(&self) -> GraphStats {
        self.stats
    }
}

impl<B: Backend> fmt::Debug for CommandGraph<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandGraph")
            .field("queue", &self.queue)
            .field("worker_count", &self.worker_count)
            .field("nodes", &self.nodes)
            .field("built", &self.built.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}
