/*!
# Kludge Engine - Vulkan Backend

Vulkan implementation of the `GraphicsDevice` trait of `kludge_engine`,
built on ash for the bindings and gpu-allocator for memory management.

```no_run
use kludge_engine::kludge::Config;
use kludge_engine_renderer_vulkan::kludge::VulkanDevice;
# fn run(window: &winit::window::Window) -> kludge_engine::kludge::Result<()> {
let device = VulkanDevice::new(window, &Config::default())?;
println!("running on {}", device.device_name());
# Ok(())
# }
```
*/

mod vulkan_context;
mod vulkan_device;
mod vulkan_format;
mod vulkan_objects;
mod vulkan_pipeline;
mod vulkan_swapchain;

#[cfg(feature = "vulkan-validation")]
mod vulkan_debug;

pub mod kludge {
    pub use crate::vulkan_device::VulkanDevice;
    pub use crate::vulkan_objects::{
        VulkanBuffer, VulkanCommandBuffer, VulkanCommandPool, VulkanDescriptorPool, VulkanDescriptorSet,
        VulkanDescriptorSetLayout, VulkanFramebuffer, VulkanImage, VulkanImageView, VulkanPipeline,
        VulkanRenderPass, VulkanSampler, VulkanSemaphore, VulkanShaderModule,
    };
    pub use crate::vulkan_swapchain::VulkanSwapchain;

    #[cfg(feature = "vulkan-validation")]
    pub use crate::vulkan_debug::{print_validation_stats_report, validation_stats, ValidationStats};
}
