pub mod backend;
pub mod buffered_resource;
pub mod commands;
#[cfg(all(windows, feature = "d3d12"))]
pub mod d3d12;
pub mod descriptor_heap;
pub mod device;
pub mod error;
pub mod fence;
pub mod frame;
pub mod headless;
pub mod pipelines;
pub mod resources;
pub mod types;

pub use backend::Backend;
