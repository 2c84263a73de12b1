use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

use smallvec::SmallVec;

use crate::graphics::error::GraphError;

/// What planning needs to know about a node.
#[derive(Clone, Copy, Debug)]
pub(crate) struct NodeShape<'n> {
    pub(crate) name: &'n str,
    pub(crate) depends_on: &'n [String],
    pub(crate) has_setup: bool,
    pub(crate) has_per_instance: bool,
    pub(crate) instance_count: u32,
}

/// Contiguous piece of one node recorded by one worker into one command list.
/// Instances are `first, first + step, ...` for `count` entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Segment {
    pub(crate) node: usize,
    pub(crate) first: u32,
    pub(crate) step: u32,
    pub(crate) count: u32,
}

impl Segment {
    pub(crate) fn instances(&self) -> impl Iterator<Item = u32> {
        let Self { first, step, .. } = *self;
        (0..self.count).map(move |i| first + i * step)
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ExecutionPlan {
    /// Node indices in execution order.
    pub(crate) order: Vec<usize>,
    /// Segments each worker records, in execution order.
    pub(crate) workers: Vec<Vec<Segment>>,
    /// `(worker, segment)` pairs in the order their lists are submitted.
    pub(crate) submission: Vec<(usize, usize)>,
}

impl ExecutionPlan {
    pub(crate) fn segment_count(&self) -> usize {
        self.submission.len()
    }
}

/// Orders nodes so that every node comes after all of its dependencies. Ties
/// are broken by registration order.
pub(crate) fn topological_order(nodes: &[NodeShape<'_>]) -> Result<Vec<usize>, GraphError> {
    let by_name = nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| !node.name.is_empty())
        .map(|(i, node)| (node.name, i))
        .collect::<HashMap<_, _>>();

    let mut predecessors = Vec::<SmallVec<[usize; 4]>>::with_capacity(nodes.len());
    for node in nodes {
        let mut preds = SmallVec::new();
        for dependency in node.depends_on {
            let Some(&pred) = by_name.get(dependency.as_str()) else {
                return Err(GraphError::UnknownDependency {
                    node: node.name.to_string(),
                    dependency: dependency.clone(),
                });
            };

            if !preds.contains(&pred) {
                preds.push(pred);
            }
        }
        predecessors.push(preds);
    }

    let mut indegree = predecessors.iter().map(|p| p.len()).collect::<Vec<_>>();
    let mut dependents = vec![SmallVec::<[usize; 4]>::new(); nodes.len()];
    for (node, preds) in predecessors.iter().enumerate() {
        for &pred in preds {
            dependents[pred].push(node);
        }
    }

    let mut ready = indegree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| Reverse(i))
        .collect::<BinaryHeap<_>>();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &dependent in &dependents[node] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() < nodes.len() {
        let path = find_cycle(&predecessors, &indegree)
            .into_iter()
            .map(|i| nodes[i].name.to_string())
            .collect();

        return Err(GraphError::Cycle { path });
    }

    Ok(order)
}

/// Nodes left with a nonzero in-degree after sorting all have at least one
/// unsorted predecessor, so walking predecessors must revisit a node.
fn find_cycle(predecessors: &[SmallVec<[usize; 4]>], indegree: &[usize]) -> Vec<usize> {
    let Some(start) = indegree.iter().position(|d| *d > 0) else {
        return vec![];
    };

    let mut walk = vec![];
    let mut seen = HashMap::new();
    let mut current = start;

    loop {
        if let Some(&pos) = seen.get(&current) {
            let mut cycle = walk[pos..].to_vec();
            cycle.push(current);
            cycle.reverse();
            return cycle;
        }

        seen.insert(current, walk.len());
        walk.push(current);

        match predecessors[current]
            .iter()
            .find(|&&pred| indegree[pred] > 0)
        {
            Some(&pred) => current = pred,
            None => return walk,
        }
    }
}

/// Spreads the ordered nodes over `worker_count` workers.
///
/// Instances are dealt round-robin with a cursor that carries over between
/// nodes, so a run of small nodes does not pile onto worker 0. A node with
/// only a setup callback takes one list on the cursor's worker. Within a node
/// lists are submitted in worker order.
pub(crate) fn partition(
    order: Vec<usize>,
    nodes: &[NodeShape<'_>],
    worker_count: usize,
) -> ExecutionPlan {
    debug_assert!(worker_count > 0);

    let mut workers = vec![Vec::new(); worker_count];
    let mut submission = Vec::new();
    let mut cursor = 0usize;

    for &index in &order {
        let node = &nodes[index];

        if node.has_per_instance {
            let count = node.instance_count as usize;
            for (worker, segments) in workers.iter_mut().enumerate() {
                let first = (worker + worker_count - cursor) % worker_count;
                if first >= count {
                    continue;
                }

                segments.push(Segment {
                    node: index,
                    first: first as u32,
                    step: worker_count as u32,
                    count: ((count - first).div_ceil(worker_count)) as u32,
                });
                submission.push((worker, segments.len() - 1));
            }
            cursor = (cursor + count) % worker_count;
        } else if node.has_setup {
            let segments = &mut workers[cursor];
            segments.push(Segment {
                node: index,
                first: 0,
                step: 1,
                count: 0,
            });
            submission.push((cursor, segments.len() - 1));
            cursor = (cursor + 1) % worker_count;
        }
    }

    ExecutionPlan {
        order,
        workers,
        submission,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{partition, topological_order, NodeShape};
    use crate::graphics::error::GraphError;

    fn shape<'n>(name: &'n str, depends_on: &'n [String]) -> NodeShape<'n> {
        NodeShape {
            name,
            depends_on,
            has_setup: true,
            has_per_instance: false,
            instance_count: 1,
        }
    }

    fn deps(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn diamond_orders_by_registration() {
        let none = deps(&[]);
        let a = deps(&["A"]);
        let d = deps(&["C", "B"]);
        let nodes = [
            shape("D", &d),
            shape("C", &a),
            shape("B", &a),
            shape("A", &none),
        ];

        let order = topological_order(&nodes).unwrap();
        let names = order.iter().map(|&i| nodes[i].name).collect::<Vec<_>>();

        assert_eq!(names, ["A", "C", "B", "D"]);
    }

    #[test]
    fn independent_nodes_keep_registration_order() {
        let none = deps(&[]);
        let nodes = [shape("Z", &none), shape("Y", &none), shape("X", &none)];

        assert_eq!(topological_order(&nodes).unwrap(), [0, 1, 2]);
    }

    #[test]
    fn duplicate_dependencies_count_once() {
        let none = deps(&[]);
        let twice = deps(&["A", "A"]);
        let nodes = [shape("A", &none), shape("B", &twice)];

        assert_eq!(topological_order(&nodes).unwrap(), [0, 1]);
    }

    #[test]
    fn two_node_cycle_is_reported() {
        let on_b = deps(&["B"]);
        let on_a = deps(&["A"]);
        let nodes = [shape("A", &on_b), shape("B", &on_a)];

        let err = topological_order(&nodes).unwrap_err();
        let GraphError::Cycle { path } = err else {
            panic!("expected cycle, got {err}");
        };

        assert_eq!(path, ["A", "B", "A"]);
    }

    #[test]
    fn cycle_path_skips_downstream_nodes() {
        let none = deps(&[]);
        let on_c = deps(&["Root", "C"]);
        let on_b = deps(&["B"]);
        let on_c2 = deps(&["C"]);
        let nodes = [
            shape("Root", &none),
            shape("Tail", &on_c2),
            shape("B", &on_c),
            shape("C", &on_b),
        ];

        let err = topological_order(&nodes).unwrap_err();
        let GraphError::Cycle { path } = err else {
            panic!("expected cycle, got {err}");
        };

        assert_eq!(path.first(), path.last());
        assert!(!path.contains(&"Tail".to_string()));
        assert!(!path.contains(&"Root".to_string()));
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let on_self = deps(&["A"]);
        let nodes = [shape("A", &on_self)];

        assert!(matches!(
            topological_order(&nodes),
            Err(GraphError::Cycle { path }) if path == ["A", "A"]
        ));
    }

    #[test]
    fn anonymous_nodes_may_depend_on_named_nodes() {
        let none = deps(&[]);
        let on_a = deps(&["A"]);
        let nodes = [shape("", &on_a), shape("", &on_a), shape("A", &none)];

        assert_eq!(topological_order(&nodes).unwrap(), [2, 0, 1]);
    }

    #[test]
    fn unknown_and_anonymous_dependencies_fail() {
        let none = deps(&[]);
        let missing = deps(&["Missing"]);
        let nodes = [shape("", &none), shape("B", &missing)];

        assert!(matches!(
            topological_order(&nodes),
            Err(GraphError::UnknownDependency { node, dependency })
                if node == "B" && dependency == "Missing"
        ));

        let anonymous = deps(&[""]);
        let nodes = [shape("", &none), shape("B", &anonymous)];

        assert!(matches!(
            topological_order(&nodes),
            Err(GraphError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn instances_are_spread_evenly() {
        let none = deps(&[]);
        let nodes = [NodeShape {
            name: "Draw",
            depends_on: &none,
            has_setup: true,
            has_per_instance: true,
            instance_count: 100,
        }];

        let plan = partition(vec![0], &nodes, 4);

        let mut seen = BTreeSet::new();
        for segments in &plan.workers {
            let instances = segments
                .iter()
                .flat_map(|s| s.instances())
                .collect::<Vec<_>>();
            assert!(instances.len() <= 25);
            for i in instances {
                assert!(seen.insert(i), "instance {i} recorded twice");
            }
        }

        assert_eq!(seen, (0..100).collect::<BTreeSet<_>>());
        assert_eq!(plan.submission, [(0, 0), (1, 0), (2, 0), (3, 0)]);
    }

    #[test]
    fn cursor_carries_over_between_nodes() {
        let none = deps(&[]);
        let single = |name| NodeShape {
            name,
            depends_on: &none,
            has_setup: false,
            has_per_instance: true,
            instance_count: 1,
        };
        let nodes = [single("A"), single("B"), single("C")];

        let plan = partition(vec![0, 1, 2], &nodes, 2);

        assert_eq!(plan.workers[0].len(), 2);
        assert_eq!(plan.workers[1].len(), 1);
        assert_eq!(plan.submission, [(0, 0), (1, 0), (0, 1)]);
    }

    #[test]
    fn nodes_without_callbacks_record_nothing() {
        let none = deps(&[]);
        let nodes = [
            NodeShape {
                name: "Barrier",
                depends_on: &none,
                has_setup: false,
                has_per_instance: false,
                instance_count: 1,
            },
            shape("Present", &none),
        ];

        let plan = partition(vec![0, 1], &nodes, 3);

        assert_eq!(plan.order, [0, 1]);
        assert_eq!(plan.segment_count(), 1);
        assert_eq!(plan.workers[0][0].node, 1);
    }

    #[test]
    fn small_nodes_only_use_some_workers() {
        let none = deps(&[]);
        let nodes = [NodeShape {
            name: "Draw",
            depends_on: &none,
            has_setup: true,
            has_per_instance: true,
            instance_count: 2,
        }];

        let plan = partition(vec![0], &nodes, 4);

        assert_eq!(plan.segment_count(), 2);
        assert!(plan.workers[2].is_empty());
        assert!(plan.workers[3].is_empty());
    }
}
