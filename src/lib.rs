pub mod graphics;

pub use graphics::{
    buffered_resource::BufferedResource,
    commands::{CommandGraph, CommandRecorder, NodeDesc},
    device::{Device, DeviceDesc},
    error::{ConfigurationError, DeviceError, GraphError},
    frame::FrameContext,
    Backend,
};
