/// VulkanDevice - `GraphicsDevice` implementation over ash
///
/// All objects it creates hold the shared `GpuContext`, so the Vulkan device
/// outlives every handle regardless of the order the caller drops them in.

use ash::vk;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation as GpuMemoryLocation;
use kludge_engine::kludge::device::{
    BufferDesc, BufferUsage, ClearValue, CommandBufferUsage, CommandPoolFlags, DescriptorBinding, DescriptorKind, Extent2D,
    GraphicsDevice, GraphicsPipelineDesc, ImageBarrier, ImageDesc, ImageUsage, MemoryBarrier, MemoryLocation,
    QueueKind, RenderPassDesc, SamplerDesc, SemaphoreWait, SurfaceSupport, SwapchainDesc,
};
use kludge_engine::kludge::{Config, Error, Result, ShaderCode};
use kludge_engine::{engine_err, engine_info};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

use crate::vulkan_context::{GpuContext, QueueInfo};
use crate::vulkan_format::{
    access_to_vk, address_mode_to_vk, buffer_usage_to_vk, descriptor_kind_to_vk, filter_to_vk, format_to_vk,
    image_layout_to_vk, pipeline_stage_to_vk, stage_flags_to_vk, vk_error,
};
use crate::vulkan_objects::*;
use crate::vulkan_pipeline;
use crate::vulkan_swapchain::{query_surface_support, VulkanSwapchain};

pub struct VulkanDevice {
    ctx: Arc<GpuContext>,
}

/// Placeholder window type for headless construction
struct NoWindow;

impl HasWindowHandle for NoWindow {
    fn window_handle(&self) -> std::result::Result<raw_window_handle::WindowHandle<'_>, raw_window_handle::HandleError> {
        Err(raw_window_handle::HandleError::Unavailable)
    }
}

impl HasDisplayHandle for NoWindow {
    fn display_handle(&self) -> std::result::Result<raw_window_handle::DisplayHandle<'_>, raw_window_handle::HandleError> {
        Err(raw_window_handle::HandleError::Unavailable)
    }
}

impl VulkanDevice {
    /// Create a device able to present to `window`
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &Config) -> Result<Self> {
        let ctx = GpuContext::new(Some(window), config)?;
        Ok(Self { ctx: Arc::new(ctx) })
    }

    /// Create a compute-only device with no surface
    pub fn new_headless(config: &Config) -> Result<Self> {
        let ctx = GpuContext::new(None::<&NoWindow>, config)?;
        Ok(Self { ctx: Arc::new(ctx) })
    }

    /// Name reported by the driver
    pub fn device_name(&self) -> &str {
        &self.ctx.device_name
    }

    pub fn has_surface(&self) -> bool {
        self.ctx.surface.is_some()
    }

    fn queue(&self, kind: QueueKind) -> Result<QueueInfo> {
        match kind {
            QueueKind::Graphics => Ok(self.ctx.graphics),
            QueueKind::Compute => Ok(self.ctx.compute),
            QueueKind::Present => self
                .ctx
                .present
                .ok_or_else(|| Error::InitializationFailed("device has no present queue".to_string())),
        }
    }

    fn allocate_memory(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: GpuMemoryLocation,
        linear: bool,
    ) -> Result<gpu_allocator::vulkan::Allocation> {
        let mut allocator = self
            .ctx
            .allocator
            .lock()
            .map_err(|_| Error::BackendError("GPU allocator lock poisoned".to_string()))?;
        allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| match e {
                gpu_allocator::AllocationError::OutOfMemory => Error::OutOfMemory,
                other => engine_err!("kludge::vulkan", "Failed to allocate memory for '{}': {:?}", name, other),
            })
    }
}

impl GraphicsDevice for VulkanDevice {
    type Semaphore = VulkanSemaphore;
    type Swapchain = VulkanSwapchain;
    type Image = VulkanImage;
    type ImageView = VulkanImageView;
    type Sampler = VulkanSampler;
    type RenderPass = VulkanRenderPass;
    type Framebuffer = VulkanFramebuffer;
    type ShaderModule = VulkanShaderModule;
    type DescriptorSetLayout = VulkanDescriptorSetLayout;
    type DescriptorPool = VulkanDescriptorPool;
    type DescriptorSet = VulkanDescriptorSet;
    type Pipeline = VulkanPipeline;
    type CommandPool = VulkanCommandPool;
    type CommandBuffer = VulkanCommandBuffer;
    type Buffer = VulkanBuffer;

    // ===== SURFACE / SWAPCHAIN =====

    fn surface_support(&self) -> Result<SurfaceSupport> {
        query_surface_support(&self.ctx)
    }

    fn create_swapchain(&self, desc: &SwapchainDesc, old: Option<&VulkanSwapchain>) -> Result<VulkanSwapchain> {
        VulkanSwapchain::new(self.ctx.clone(), desc, old)
    }

    fn swapchain_image_count(&self, swapchain: &VulkanSwapchain) -> u32 {
        swapchain.images.len() as u32
    }

    fn create_swapchain_views(&self, swapchain: &VulkanSwapchain) -> Result<Vec<VulkanImageView>> {
        swapchain.create_views()
    }

    fn acquire_next_image(&self, swapchain: &VulkanSwapchain, signal: &VulkanSemaphore) -> Result<u32> {
        swapchain.acquire(signal)
    }

    fn present(&self, swapchain: &VulkanSwapchain, image_index: u32, wait: &VulkanSemaphore) -> Result<()> {
        swapchain.present(image_index, wait)
    }

    // ===== OBJECT CREATION =====

    fn create_semaphore(&self) -> Result<VulkanSemaphore> {
        let semaphore = unsafe {
            self.ctx
                .device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(|e| vk_error("Failed to create semaphore", e))?
        };
        Ok(VulkanSemaphore::new(self.ctx.clone(), semaphore))
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<VulkanImage> {
        let format = format_to_vk(desc.format);
        let (usage, aspect) = match desc.usage {
            ImageUsage::ColorAttachment => (vk::ImageUsageFlags::COLOR_ATTACHMENT, vk::ImageAspectFlags::COLOR),
            ImageUsage::DepthStencilAttachment => (
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::ImageAspectFlags::DEPTH,
            ),
            ImageUsage::Sampled => (
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                vk::ImageAspectFlags::COLOR,
            ),
        };

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        unsafe {
            let image = self
                .ctx
                .device
                .create_image(&image_info, None)
                .map_err(|e| vk_error("Failed to create image", e))?;
            let requirements = self.ctx.device.get_image_memory_requirements(image);

            let allocation = match self.allocate_memory("image", requirements, GpuMemoryLocation::GpuOnly, false) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.ctx.device.destroy_image(image, None);
                    return Err(e);
                }
            };
            let memory = allocation.memory();
            let offset = allocation.offset();
            // wrap first so a bind failure still frees both
            let image = VulkanImage::new(self.ctx.clone(), image, allocation, format, aspect);
            self.ctx
                .device
                .bind_image_memory(image.image, memory, offset)
                .map_err(|e| vk_error("Failed to bind image memory", e))?;
            Ok(image)
        }
    }

    fn create_image_view(&self, image: &VulkanImage) -> Result<VulkanImageView> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: image.aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = unsafe {
            self.ctx
                .device
                .create_image_view(&create_info, None)
                .map_err(|e| vk_error("Failed to create image view", e))?
        };
        Ok(VulkanImageView::new(self.ctx.clone(), view))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<VulkanSampler> {
        let filter = filter_to_vk(desc.filter);
        let address_mode = address_mode_to_vk(desc.address_mode);
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .anisotropy_enable(false)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .min_lod(0.0)
            .max_lod(0.0);
        let sampler = unsafe {
            self.ctx
                .device
                .create_sampler(&create_info, None)
                .map_err(|e| vk_error("Failed to create sampler", e))?
        };
        Ok(VulkanSampler::new(self.ctx.clone(), sampler))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<VulkanRenderPass> {
        vulkan_pipeline::create_render_pass(&self.ctx, desc)
    }

    fn create_framebuffer(
        &self,
        render_pass: &VulkanRenderPass,
        attachments: &[&VulkanImageView],
        extent: Extent2D,
    ) -> Result<VulkanFramebuffer> {
        let views: Vec<vk::ImageView> = attachments.iter().map(|view| view.view).collect();
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.render_pass)
            .attachments(&views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = unsafe {
            self.ctx
                .device
                .create_framebuffer(&create_info, None)
                .map_err(|e| vk_error("Failed to create framebuffer", e))?
        };
        Ok(VulkanFramebuffer::new(self.ctx.clone(), framebuffer))
    }

    fn create_shader_module(&self, code: &ShaderCode) -> Result<VulkanShaderModule> {
        vulkan_pipeline::create_shader_module(&self.ctx, code)
    }

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorBinding]) -> Result<VulkanDescriptorSetLayout> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(descriptor_kind_to_vk(binding.kind))
                    .descriptor_count(1)
                    .stage_flags(stage_flags_to_vk(binding.stages))
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe {
            self.ctx
                .device
                .create_descriptor_set_layout(&create_info, None)
                .map_err(|e| vk_error("Failed to create descriptor set layout", e))?
        };
        Ok(VulkanDescriptorSetLayout::new(self.ctx.clone(), layout))
    }

    fn create_descriptor_pool(&self, bindings: &[DescriptorBinding], max_sets: u32) -> Result<VulkanDescriptorPool> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = bindings
            .iter()
            .map(|binding| vk::DescriptorPoolSize {
                ty: descriptor_kind_to_vk(binding.kind),
                descriptor_count: max_sets,
            })
            .collect();
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(max_sets);
        let pool = unsafe {
            self.ctx
                .device
                .create_descriptor_pool(&create_info, None)
                .map_err(|e| vk_error("Failed to create descriptor pool", e))?
        };
        Ok(VulkanDescriptorPool::new(self.ctx.clone(), pool))
    }

    fn allocate_descriptor_set(
        &self,
        pool: &VulkanDescriptorPool,
        layout: &VulkanDescriptorSetLayout,
    ) -> Result<VulkanDescriptorSet> {
        let layouts = [layout.layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool.pool)
            .set_layouts(&layouts);
        let sets = unsafe {
            self.ctx
                .device
                .allocate_descriptor_sets(&allocate_info)
                .map_err(|e| vk_error("Failed to allocate descriptor set", e))?
        };
        Ok(VulkanDescriptorSet { set: sets[0] })
    }

    fn write_descriptor_buffer(
        &self,
        set: &VulkanDescriptorSet,
        binding: u32,
        kind: DescriptorKind,
        buffer: &VulkanBuffer,
    ) -> Result<()> {
        let buffer_info = vk::DescriptorBufferInfo {
            buffer: buffer.buffer,
            offset: 0,
            range: vk::WHOLE_SIZE,
        };
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set.set)
            .dst_binding(binding)
            .descriptor_type(descriptor_kind_to_vk(kind))
            .buffer_info(std::slice::from_ref(&buffer_info));
        unsafe {
            self.ctx.device.update_descriptor_sets(&[write], &[]);
        }
        Ok(())
    }

    fn write_descriptor_image(
        &self,
        set: &VulkanDescriptorSet,
        binding: u32,
        view: &VulkanImageView,
        sampler: &VulkanSampler,
    ) -> Result<()> {
        let image_info = vk::DescriptorImageInfo {
            sampler: sampler.sampler,
            image_view: view.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set.set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(std::slice::from_ref(&image_info));
        unsafe {
            self.ctx.device.update_descriptor_sets(&[write], &[]);
        }
        Ok(())
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_, Self>) -> Result<VulkanPipeline> {
        vulkan_pipeline::create_graphics_pipeline(&self.ctx, desc)
    }

    fn create_compute_pipeline(
        &self,
        shader: &VulkanShaderModule,
        layout: &VulkanDescriptorSetLayout,
    ) -> Result<VulkanPipeline> {
        vulkan_pipeline::create_compute_pipeline(&self.ctx, shader, layout)
    }

    fn create_command_pool(&self, queue: QueueKind, flags: CommandPoolFlags) -> Result<VulkanCommandPool> {
        let mut vk_flags = vk::CommandPoolCreateFlags::empty();
        if flags.contains(CommandPoolFlags::TRANSIENT) {
            vk_flags |= vk::CommandPoolCreateFlags::TRANSIENT;
        }
        if flags.contains(CommandPoolFlags::RESET_COMMAND_BUFFER) {
            vk_flags |= vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
        }
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.queue(queue)?.family)
            .flags(vk_flags);
        let pool = unsafe {
            self.ctx
                .device
                .create_command_pool(&create_info, None)
                .map_err(|e| vk_error("Failed to create command pool", e))?
        };
        Ok(VulkanCommandPool::new(self.ctx.clone(), pool))
    }

    fn allocate_command_buffers(&self, pool: &VulkanCommandPool, count: u32) -> Result<Vec<VulkanCommandBuffer>> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        let buffers = unsafe {
            self.ctx
                .device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| vk_error("Failed to allocate command buffers", e))?
        };
        Ok(buffers.into_iter().map(|cmd| VulkanCommandBuffer { cmd }).collect())
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<VulkanBuffer> {
        if desc.size == 0 {
            return Err(Error::InvalidResource(format!("buffer '{}' has zero size", desc.label)));
        }
        let buffer_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(buffer_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let readback_only = desc.usage == BufferUsage::TRANSFER_DST;
        let location = match desc.location {
            MemoryLocation::HostVisible if readback_only => GpuMemoryLocation::GpuToCpu,
            MemoryLocation::HostVisible => GpuMemoryLocation::CpuToGpu,
            MemoryLocation::DeviceLocal => GpuMemoryLocation::GpuOnly,
        };

        unsafe {
            let buffer = self
                .ctx
                .device
                .create_buffer(&buffer_info, None)
                .map_err(|e| vk_error("Failed to create buffer", e))?;
            let requirements = self.ctx.device.get_buffer_memory_requirements(buffer);

            let allocation = match self.allocate_memory(&desc.label, requirements, location, true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.ctx.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };
            let memory = allocation.memory();
            let offset = allocation.offset();
            let buffer = VulkanBuffer::new(self.ctx.clone(), buffer, allocation, desc.size);
            self.ctx
                .device
                .bind_buffer_memory(buffer.buffer, memory, offset)
                .map_err(|e| vk_error("Failed to bind buffer memory", e))?;
            Ok(buffer)
        }
    }

    fn write_buffer(&self, buffer: &VulkanBuffer, offset: u64, data: &[u8]) -> Result<()> {
        let dst = buffer.mapped_range(offset, data.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    fn read_buffer(&self, buffer: &VulkanBuffer, offset: u64, out: &mut [u8]) -> Result<()> {
        let src = buffer.mapped_range(offset, out.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    // ===== COMMAND RECORDING =====

    fn cmd_begin(&self, cmd: &VulkanCommandBuffer, usage: CommandBufferUsage) -> Result<()> {
        let mut flags = vk::CommandBufferUsageFlags::empty();
        if usage.contains(CommandBufferUsage::ONE_TIME_SUBMIT) {
            flags |= vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;
        }
        if usage.contains(CommandBufferUsage::SIMULTANEOUS_USE) {
            flags |= vk::CommandBufferUsageFlags::SIMULTANEOUS_USE;
        }
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe {
            self.ctx
                .device
                .begin_command_buffer(cmd.cmd, &begin_info)
                .map_err(|e| vk_error("Failed to begin command buffer", e))
        }
    }

    fn cmd_end(&self, cmd: &VulkanCommandBuffer) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .end_command_buffer(cmd.cmd)
                .map_err(|e| vk_error("Failed to end command buffer", e))
        }
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: &VulkanCommandBuffer,
        render_pass: &VulkanRenderPass,
        framebuffer: &VulkanFramebuffer,
        extent: Extent2D,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        let vk_clear_values: Vec<vk::ClearValue> = clear_values
            .iter()
            .map(|value| match *value {
                ClearValue::Color(color) => vk::ClearValue {
                    color: vk::ClearColorValue { float32: color },
                },
                ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
                },
            })
            .collect();
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass.render_pass)
            .framebuffer(framebuffer.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: extent.width,
                    height: extent.height,
                },
            })
            .clear_values(&vk_clear_values);
        unsafe {
            self.ctx
                .device
                .cmd_begin_render_pass(cmd.cmd, &begin_info, vk::SubpassContents::INLINE);
        }
        Ok(())
    }

    fn cmd_end_render_pass(&self, cmd: &VulkanCommandBuffer) -> Result<()> {
        unsafe {
            self.ctx.device.cmd_end_render_pass(cmd.cmd);
        }
        Ok(())
    }

    fn cmd_bind_pipeline(&self, cmd: &VulkanCommandBuffer, pipeline: &VulkanPipeline) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .cmd_bind_pipeline(cmd.cmd, pipeline.bind_point, pipeline.pipeline);
        }
        Ok(())
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: &VulkanCommandBuffer,
        pipeline: &VulkanPipeline,
        set: &VulkanDescriptorSet,
    ) -> Result<()> {
        unsafe {
            self.ctx.device.cmd_bind_descriptor_sets(
                cmd.cmd,
                pipeline.bind_point,
                pipeline.layout,
                0,
                &[set.set],
                &[],
            );
        }
        Ok(())
    }

    fn cmd_bind_vertex_buffer(&self, cmd: &VulkanCommandBuffer, buffer: &VulkanBuffer) -> Result<()> {
        unsafe {
            self.ctx.device.cmd_bind_vertex_buffers(cmd.cmd, 0, &[buffer.buffer], &[0]);
        }
        Ok(())
    }

    fn cmd_draw(&self, cmd: &VulkanCommandBuffer, vertex_count: u32, first_vertex: u32) -> Result<()> {
        unsafe {
            self.ctx.device.cmd_draw(cmd.cmd, vertex_count, 1, first_vertex, 0);
        }
        Ok(())
    }

    fn cmd_dispatch(&self, cmd: &VulkanCommandBuffer, x: u32, y: u32, z: u32) -> Result<()> {
        unsafe {
            self.ctx.device.cmd_dispatch(cmd.cmd, x, y, z);
        }
        Ok(())
    }

    fn cmd_pipeline_barrier(&self, cmd: &VulkanCommandBuffer, barrier: &MemoryBarrier) -> Result<()> {
        let memory_barrier = vk::MemoryBarrier::default()
            .src_access_mask(access_to_vk(barrier.src_access))
            .dst_access_mask(access_to_vk(barrier.dst_access));
        unsafe {
            self.ctx.device.cmd_pipeline_barrier(
                cmd.cmd,
                pipeline_stage_to_vk(barrier.src_stage),
                pipeline_stage_to_vk(barrier.dst_stage),
                vk::DependencyFlags::empty(),
                &[memory_barrier],
                &[],
                &[],
            );
        }
        Ok(())
    }

    fn cmd_copy_buffer(&self, cmd: &VulkanCommandBuffer, src: &VulkanBuffer, dst: &VulkanBuffer, size: u64) -> Result<()> {
        if size > src.size || size > dst.size {
            return Err(Error::InvalidResource(format!(
                "copy of {} bytes exceeds buffer sizes ({} -> {})",
                size, src.size, dst.size
            )));
        }
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe {
            self.ctx.device.cmd_copy_buffer(cmd.cmd, src.buffer, dst.buffer, &[region]);
        }
        Ok(())
    }

    fn cmd_image_barrier(&self, cmd: &VulkanCommandBuffer, image: &VulkanImage, barrier: &ImageBarrier) -> Result<()> {
        let image_barrier = vk::ImageMemoryBarrier::default()
            .src_access_mask(access_to_vk(barrier.src_access))
            .dst_access_mask(access_to_vk(barrier.dst_access))
            .old_layout(image_layout_to_vk(barrier.old_layout))
            .new_layout(image_layout_to_vk(barrier.new_layout))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: image.aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe {
            self.ctx.device.cmd_pipeline_barrier(
                cmd.cmd,
                pipeline_stage_to_vk(barrier.src_stage),
                pipeline_stage_to_vk(barrier.dst_stage),
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[image_barrier],
            );
        }
        Ok(())
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: &VulkanCommandBuffer,
        src: &VulkanBuffer,
        dst: &VulkanImage,
        extent: Extent2D,
    ) -> Result<()> {
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            // tightly packed rows
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: dst.aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        };
        unsafe {
            self.ctx.device.cmd_copy_buffer_to_image(
                cmd.cmd,
                src.buffer,
                dst.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        Ok(())
    }

    // ===== SUBMISSION / SYNCHRONIZATION =====

    fn submit(
        &self,
        queue: QueueKind,
        cmd: &VulkanCommandBuffer,
        waits: &[SemaphoreWait<'_, Self>],
        signals: &[&VulkanSemaphore],
    ) -> Result<()> {
        let queue = self.queue(queue)?.queue;
        let wait_semaphores: Vec<vk::Semaphore> = waits.iter().map(|w| w.semaphore.semaphore).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = waits.iter().map(|w| pipeline_stage_to_vk(w.stage)).collect();
        let signal_semaphores: Vec<vk::Semaphore> = signals.iter().map(|s| s.semaphore).collect();
        let command_buffers = [cmd.cmd];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.ctx
                .device
                .queue_submit(queue, &[submit_info], vk::Fence::null())
                .map_err(|e| vk_error("Failed to submit command buffer", e))
        }
    }

    fn queue_wait_idle(&self, queue: QueueKind) -> Result<()> {
        let queue = self.queue(queue)?.queue;
        unsafe {
            self.ctx
                .device
                .queue_wait_idle(queue)
                .map_err(|e| vk_error("Failed to wait for queue", e))
        }
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .device_wait_idle()
                .map_err(|e| vk_error("Failed to wait for device idle", e))
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        if Arc::strong_count(&self.ctx) > 1 {
            engine_info!(
                "kludge::vulkan",
                "VulkanDevice dropped with {} live object(s); context released with the last one",
                Arc::strong_count(&self.ctx) - 1
            );
        }
    }
}
