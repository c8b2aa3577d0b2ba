/// Owning wrappers around raw Vulkan handles
///
/// Each wrapper keeps the `GpuContext` alive and destroys its handle on drop.
/// Release order between wrappers is decided by the `ResourceScope` that
/// owns them.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use kludge_engine::kludge::{Error, Result};
use kludge_engine::engine_error;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

pub struct VulkanSemaphore {
    ctx: Arc<GpuContext>,
    pub(crate) semaphore: vk::Semaphore,
}

impl VulkanSemaphore {
    pub(crate) fn new(ctx: Arc<GpuContext>, semaphore: vk::Semaphore) -> Self {
        Self { ctx, semaphore }
    }
}

impl Drop for VulkanSemaphore {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Device image backed by its own allocation (depth buffers, textures)
pub struct VulkanImage {
    ctx: Arc<GpuContext>,
    pub(crate) image: vk::Image,
    allocation: Option<Allocation>,
    pub(crate) format: vk::Format,
    pub(crate) aspect: vk::ImageAspectFlags,
}

impl VulkanImage {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        image: vk::Image,
        allocation: Allocation,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> Self {
        Self {
            ctx,
            image,
            allocation: Some(allocation),
            format,
            aspect,
        }
    }
}

impl Drop for VulkanImage {
    fn drop(&mut self) {
        unsafe {
            if let Some(allocation) = self.allocation.take() {
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
            self.ctx.device.destroy_image(self.image, None);
        }
    }
}

pub struct VulkanImageView {
    ctx: Arc<GpuContext>,
    pub(crate) view: vk::ImageView,
}

impl VulkanImageView {
    pub(crate) fn new(ctx: Arc<GpuContext>, view: vk::ImageView) -> Self {
        Self { ctx, view }
    }
}

impl Drop for VulkanImageView {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_image_view(self.view, None);
        }
    }
}

pub struct VulkanSampler {
    ctx: Arc<GpuContext>,
    pub(crate) sampler: vk::Sampler,
}

impl VulkanSampler {
    pub(crate) fn new(ctx: Arc<GpuContext>, sampler: vk::Sampler) -> Self {
        Self { ctx, sampler }
    }
}

impl Drop for VulkanSampler {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_sampler(self.sampler, None);
        }
    }
}

pub struct VulkanRenderPass {
    ctx: Arc<GpuContext>,
    pub(crate) render_pass: vk::RenderPass,
    pub(crate) has_depth: bool,
}

impl VulkanRenderPass {
    pub(crate) fn new(ctx: Arc<GpuContext>, render_pass: vk::RenderPass, has_depth: bool) -> Self {
        Self {
            ctx,
            render_pass,
            has_depth,
        }
    }
}

impl Drop for VulkanRenderPass {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

pub struct VulkanFramebuffer {
    ctx: Arc<GpuContext>,
    pub(crate) framebuffer: vk::Framebuffer,
}

impl VulkanFramebuffer {
    pub(crate) fn new(ctx: Arc<GpuContext>, framebuffer: vk::Framebuffer) -> Self {
        Self { ctx, framebuffer }
    }
}

impl Drop for VulkanFramebuffer {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

pub struct VulkanShaderModule {
    ctx: Arc<GpuContext>,
    pub(crate) module: vk::ShaderModule,
    pub(crate) stage: vk::ShaderStageFlags,
}

impl VulkanShaderModule {
    pub(crate) fn new(ctx: Arc<GpuContext>, module: vk::ShaderModule, stage: vk::ShaderStageFlags) -> Self {
        Self { ctx, module, stage }
    }
}

impl Drop for VulkanShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_shader_module(self.module, None);
        }
    }
}

pub struct VulkanDescriptorSetLayout {
    ctx: Arc<GpuContext>,
    pub(crate) layout: vk::DescriptorSetLayout,
}

impl VulkanDescriptorSetLayout {
    pub(crate) fn new(ctx: Arc<GpuContext>, layout: vk::DescriptorSetLayout) -> Self {
        Self { ctx, layout }
    }
}

impl Drop for VulkanDescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

pub struct VulkanDescriptorPool {
    ctx: Arc<GpuContext>,
    pub(crate) pool: vk::DescriptorPool,
}

impl VulkanDescriptorPool {
    pub(crate) fn new(ctx: Arc<GpuContext>, pool: vk::DescriptorPool) -> Self {
        Self { ctx, pool }
    }
}

impl Drop for VulkanDescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Freed implicitly with its pool
pub struct VulkanDescriptorSet {
    pub(crate) set: vk::DescriptorSet,
}

pub struct VulkanPipeline {
    ctx: Arc<GpuContext>,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    pub(crate) bind_point: vk::PipelineBindPoint,
}

impl VulkanPipeline {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        bind_point: vk::PipelineBindPoint,
    ) -> Self {
        Self {
            ctx,
            pipeline,
            layout,
            bind_point,
        }
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_pipeline(self.pipeline, None);
            self.ctx.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

pub struct VulkanCommandPool {
    ctx: Arc<GpuContext>,
    pub(crate) pool: vk::CommandPool,
}

impl VulkanCommandPool {
    pub(crate) fn new(ctx: Arc<GpuContext>, pool: vk::CommandPool) -> Self {
        Self { ctx, pool }
    }
}

impl Drop for VulkanCommandPool {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_command_pool(self.pool, None);
        }
    }
}

/// Freed implicitly with its pool
pub struct VulkanCommandBuffer {
    pub(crate) cmd: vk::CommandBuffer,
}

pub struct VulkanBuffer {
    ctx: Arc<GpuContext>,
    pub(crate) buffer: vk::Buffer,
    allocation: Option<Allocation>,
    pub(crate) size: u64,
}

impl VulkanBuffer {
    pub(crate) fn new(ctx: Arc<GpuContext>, buffer: vk::Buffer, allocation: Allocation, size: u64) -> Self {
        Self {
            ctx,
            buffer,
            allocation: Some(allocation),
            size,
        }
    }

    /// Host pointer of a mappable buffer, checked against `offset + len`
    pub(crate) fn mapped_range(&self, offset: u64, len: usize) -> Result<*mut u8> {
        let end = offset.checked_add(len as u64).filter(|&end| end <= self.size);
        if end.is_none() {
            engine_error!(
                "kludge::vulkan",
                "Buffer access out of range: offset {} + {} bytes > size {}",
                offset,
                len,
                self.size
            );
            return Err(Error::InvalidResource(format!(
                "buffer range {}..{} exceeds size {}",
                offset,
                offset.saturating_add(len as u64),
                self.size
            )));
        }
        let base = self
            .allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .ok_or_else(|| Error::InvalidResource("buffer is not CPU-accessible".to_string()))?;
        unsafe { Ok((base.as_ptr() as *mut u8).add(offset as usize)) }
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            if let Some(allocation) = self.allocation.take() {
                // still destroy the buffer if the lock is poisoned
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
