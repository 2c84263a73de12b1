use std::error::Error;

use thiserror::Error;

use super::types::{DescriptorKind, QueueType};

pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Backend error: {0}")]
    Backend(#[source] BoxError),
    #[error("Waiting for {queue} queue value {value} timed out, GPU completed {completed}")]
    FenceTimeout {
        queue: QueueType,
        value: u64,
        completed: u64,
    },
    #[error("Descriptor pool {kind:?} exhausted. Capacity {capacity}, requested {requested}")]
    DescriptorPoolExhausted {
        kind: DescriptorKind,
        capacity: usize,
        requested: usize,
    },
}

impl DeviceError {
    pub(crate) fn backend<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Backend(Box::new(error))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Command graph needs at least one worker")]
    ZeroWorkers,
    #[error("Command graph is already built, reset it before adding nodes")]
    GraphFinalized,
    #[error("Node {0:?} is already registered")]
    DuplicateNode(String),
    #[error("Node {0:?} must have at least one instance")]
    ZeroInstances(String),
    #[error("Command graph must be built before execution")]
    NotBuilt,
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },
    #[error("Node {node:?} depends on unknown node {dependency:?}")]
    UnknownDependency { node: String, dependency: String },
    #[error("Recording node {node:?} failed: {source}")]
    Recording {
        node: String,
        #[source]
        source: BoxError,
    },
    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

#[cfg(test)]
mod tests {
    use super::{ConfigurationError, DeviceError, GraphError};
    use crate::graphics::types::QueueType;

    const fn is_send_sync<T: Send + Sync>() {}

    const _: () = is_send_sync::<DeviceError>();
    const _: () = is_send_sync::<GraphError>();

    #[test]
    fn cycle_message_lists_path() {
        let err = GraphError::Cycle {
            path: vec!["A".into(), "B".into(), "A".into()],
        };

        assert_eq!(err.to_string(), "Dependency cycle: A -> B -> A");
    }

    #[test]
    fn configuration_converts_into_graph_error() {
        let err: GraphError = ConfigurationError::NotBuilt.into();

        assert!(matches!(
            err,
            GraphError::Configuration(ConfigurationError::NotBuilt)
        ));
    }

    #[test]
    fn timeout_names_queue() {
        let err = DeviceError::FenceTimeout {
            queue: QueueType::Copy,
            value: 4,
            completed: 2,
        };

        assert_eq!(
            err.to_string(),
            "Waiting for copy queue value 4 timed out, GPU completed 2"
        );
    }
}
