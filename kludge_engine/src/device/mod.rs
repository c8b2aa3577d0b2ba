/// Device module - the GPU boundary of the frame protocol

pub mod graphics_device;
pub mod types;
pub mod command_recorder;

#[cfg(test)]
pub mod mock_device;

pub use graphics_device::*;
pub use types::*;
pub use command_recorder::CommandRecorder;
