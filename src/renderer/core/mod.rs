// "Core" refers to the objects that bring up Vulkan and drive each frame.

pub mod adapter;
pub mod context;
pub mod device;
pub mod frame;
pub mod instance;
pub mod pipeline;
pub mod rebuild;
pub mod recorder;
pub mod state;
pub mod target;
