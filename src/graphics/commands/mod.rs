mod command_allocator;
mod command_queue;
mod graph;
mod node;
mod plan;
mod recorder;
mod worker_thread;

pub use command_queue::*;
pub use graph::*;
pub use node::*;
pub use recorder::*;
