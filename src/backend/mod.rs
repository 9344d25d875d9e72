// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash. Each file owns one kind of Vulkan object.

pub mod buffer;
pub mod command;
pub mod device;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use buffer::Buffer;
pub use device::VulkanDevice;
pub use instance::VulkanInstance;
pub use surface::Surface;
pub use swapchain::Swapchain;
