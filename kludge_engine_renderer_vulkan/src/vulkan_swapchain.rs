/// VulkanSwapchain - one swapchain generation and its presentable images
///
/// Views over the images are created separately (`create_swapchain_views`)
/// so the session scope can release them before the chain itself.

use ash::vk;
use kludge_engine::kludge::device::{Extent2D, SurfaceCapabilities, SurfaceSupport, SwapchainDesc};
use kludge_engine::kludge::{Error, Result};
use kludge_engine::engine_debug;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{
    color_space_to_vk, format_to_vk, present_mode_from_vk, present_mode_to_vk, surface_formats_from_vk, vk_error,
};
use crate::vulkan_objects::{VulkanImageView, VulkanSemaphore};

pub struct VulkanSwapchain {
    ctx: Arc<GpuContext>,
    pub(crate) swapchain: vk::SwapchainKHR,
    pub(crate) images: Vec<vk::Image>,
    pub(crate) format: vk::Format,
    pub(crate) extent: vk::Extent2D,
}

impl VulkanSwapchain {
    /// Create a chain for `desc`; `old` is handed to the driver for image reuse
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &SwapchainDesc, old: Option<&VulkanSwapchain>) -> Result<Self> {
        let surface = ctx.surface()?;
        let loader = ctx.swapchain_loader()?;

        unsafe {
            let capabilities = surface
                .loader
                .get_physical_device_surface_capabilities(ctx.physical_device, surface.surface)
                .map_err(|e| vk_error("Failed to get surface capabilities", e))?;

            let format = format_to_vk(desc.surface_format.format);
            let extent = vk::Extent2D {
                width: desc.extent.width,
                height: desc.extent.height,
            };

            let graphics_family = ctx.graphics.family;
            let present_family = ctx.present.map_or(graphics_family, |p| p.family);
            let families = [graphics_family, present_family];

            let mut create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(surface.surface)
                .min_image_count(desc.min_image_count)
                .image_format(format)
                .image_color_space(color_space_to_vk(desc.surface_format.color_space))
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(present_mode_to_vk(desc.present_mode))
                .clipped(true)
                .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |old| old.swapchain));

            create_info = if graphics_family != present_family {
                create_info
                    .image_sharing_mode(vk::SharingMode::CONCURRENT)
                    .queue_family_indices(&families)
            } else {
                create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            };

            let swapchain = loader
                .create_swapchain(&create_info, None)
                .map_err(|e| vk_error("Failed to create swapchain", e))?;

            let images = match loader.get_swapchain_images(swapchain) {
                Ok(images) => images,
                Err(e) => {
                    loader.destroy_swapchain(swapchain, None);
                    return Err(vk_error("Failed to get swapchain images", e));
                }
            };

            engine_debug!(
                "kludge::vulkan",
                "Swapchain created: {}x{}, {} images, old chain {}",
                extent.width,
                extent.height,
                images.len(),
                if old.is_some() { "handed off" } else { "none" }
            );

            Ok(Self {
                ctx,
                swapchain,
                images,
                format,
                extent,
            })
        }
    }

    pub(crate) fn create_views(&self) -> Result<Vec<VulkanImageView>> {
        let mut views = Vec::with_capacity(self.images.len());
        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            // views already pushed are destroyed by their own Drop on error
            let view = unsafe {
                self.ctx
                    .device
                    .create_image_view(&create_info, None)
                    .map_err(|e| vk_error("Failed to create swapchain image view", e))?
            };
            views.push(VulkanImageView::new(self.ctx.clone(), view));
        }
        Ok(views)
    }

    /// Suboptimal acquires still deliver a usable image; present reports them
    pub(crate) fn acquire(&self, signal: &VulkanSemaphore) -> Result<u32> {
        let loader = self.ctx.swapchain_loader()?;
        unsafe {
            let (index, _suboptimal) = loader
                .acquire_next_image(self.swapchain, u64::MAX, signal.semaphore, vk::Fence::null())
                .map_err(|e| vk_error("Failed to acquire swapchain image", e))?;
            Ok(index)
        }
    }

    pub(crate) fn present(&self, image_index: u32, wait: &VulkanSemaphore) -> Result<()> {
        let loader = self.ctx.swapchain_loader()?;
        let queue = self
            .ctx
            .present
            .ok_or_else(|| Error::InitializationFailed("device has no present queue".to_string()))?
            .queue;

        let wait_semaphores = [wait.semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            let suboptimal = loader
                .queue_present(queue, &present_info)
                .map_err(|e| vk_error("Failed to present", e))?;
            if suboptimal {
                return Err(vk_error("Present", vk::Result::SUBOPTIMAL_KHR));
            }
        }
        Ok(())
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        if let Some(loader) = self.ctx.swapchain_loader.as_ref() {
            unsafe {
                loader.destroy_swapchain(self.swapchain, None);
            }
        }
    }
}

/// Formats, present modes and limits of the device surface
pub(crate) fn query_surface_support(ctx: &GpuContext) -> Result<SurfaceSupport> {
    let surface = ctx.surface()?;
    unsafe {
        let caps = surface
            .loader
            .get_physical_device_surface_capabilities(ctx.physical_device, surface.surface)
            .map_err(|e| vk_error("Failed to get surface capabilities", e))?;
        let formats = surface
            .loader
            .get_physical_device_surface_formats(ctx.physical_device, surface.surface)
            .map_err(|e| vk_error("Failed to get surface formats", e))?;
        let present_modes = surface
            .loader
            .get_physical_device_surface_present_modes(ctx.physical_device, surface.surface)
            .map_err(|e| vk_error("Failed to get surface present modes", e))?;

        Ok(SurfaceSupport {
            capabilities: SurfaceCapabilities {
                min_image_count: caps.min_image_count,
                max_image_count: caps.max_image_count,
                current_extent: Extent2D::new(caps.current_extent.width, caps.current_extent.height),
                min_image_extent: Extent2D::new(caps.min_image_extent.width, caps.min_image_extent.height),
                max_image_extent: Extent2D::new(caps.max_image_extent.width, caps.max_image_extent.height),
            },
            formats: surface_formats_from_vk(&formats),
            present_modes: present_modes.into_iter().filter_map(present_mode_from_vk).collect(),
        })
    }
}
