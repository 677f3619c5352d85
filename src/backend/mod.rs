// Backend module - Vulkan abstraction layer
//
// Design: everything above `device` talks to the `Driver` trait, so the
// resource code runs unchanged against the real device or a recording mock.

pub mod buffer;
pub mod device;
pub mod driver;
pub mod memory;
pub mod pipeline;
pub mod shader;
pub mod shape;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod uniform;

#[cfg(test)]
pub(crate) mod mock;

pub use device::VulkanDevice;
pub use driver::Driver;
pub use memory::MemoryPolicy;
pub use shader::ShaderPair;
pub use swapchain::RenderTargets;
