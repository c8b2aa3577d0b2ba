/// GraphicsDevice trait - the device/queue provider consumed by the frame protocol
///
/// Every associated type is an owning wrapper: dropping it releases the
/// underlying handle. Resources are handed to a `ResourceScope`, which decides
/// when that drop happens.

use crate::device::types::*;
use crate::error::Result;
use crate::shader::ShaderCode;

/// Semaphore wait of a queue submission
pub struct SemaphoreWait<'a, D: GraphicsDevice> {
    pub semaphore: &'a D::Semaphore,
    pub stage: PipelineStage,
}

/// Everything needed to build a graphics pipeline against one render pass
pub struct GraphicsPipelineDesc<'a, D: GraphicsDevice> {
    pub vertex_shader: &'a D::ShaderModule,
    pub fragment_shader: &'a D::ShaderModule,
    pub render_pass: &'a D::RenderPass,
    /// Fixed viewport and scissor; pipelines are rebuilt with the swapchain
    pub extent: Extent2D,
    pub vertex_layout: Option<VertexLayout>,
    pub topology: PrimitiveTopology,
    pub descriptor_layout: Option<&'a D::DescriptorSetLayout>,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_test: bool,
    pub alpha_blend: bool,
}

/// Device/queue provider
///
/// All methods take `&self`; a device is shared through `Arc` by every
/// object that must release handles against it.
pub trait GraphicsDevice: Sized + 'static {
    type Semaphore: 'static;
    type Swapchain: 'static;
    type Image: 'static;
    type ImageView: 'static;
    type RenderPass: 'static;
    type Framebuffer: 'static;
    type ShaderModule: 'static;
    type DescriptorSetLayout: 'static;
    type DescriptorPool: 'static;
    type DescriptorSet: 'static;
    type Pipeline: 'static;
    type CommandPool: 'static;
    type CommandBuffer: 'static;
    type Buffer: 'static;
    type Sampler: 'static;

    // ===== SURFACE / SWAPCHAIN =====

    /// Query formats, present modes and limits of the presentation surface
    fn surface_support(&self) -> Result<SurfaceSupport>;

    /// Create a swapchain; `old` is the outgoing chain passed as a hand-off hint
    fn create_swapchain(&self, desc: &SwapchainDesc, old: Option<&Self::Swapchain>) -> Result<Self::Swapchain>;

    /// Number of presentable images actually created
    fn swapchain_image_count(&self, swapchain: &Self::Swapchain) -> u32;

    /// One color view per presentable image, in image-index order
    fn create_swapchain_views(&self, swapchain: &Self::Swapchain) -> Result<Vec<Self::ImageView>>;

    /// Acquire the next presentable image; `signal` fires once it is ready
    ///
    /// Returns `Error::SwapchainOutOfDate` when the chain no longer matches the surface.
    fn acquire_next_image(&self, swapchain: &Self::Swapchain, signal: &Self::Semaphore) -> Result<u32>;

    /// Queue `image_index` for presentation once `wait` is signalled
    fn present(&self, swapchain: &Self::Swapchain, image_index: u32, wait: &Self::Semaphore) -> Result<()>;

    // ===== OBJECT CREATION =====

    fn create_semaphore(&self) -> Result<Self::Semaphore>;

    fn create_image(&self, desc: &ImageDesc) -> Result<Self::Image>;

    fn create_image_view(&self, image: &Self::Image) -> Result<Self::ImageView>;

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Self::Sampler>;

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Self::RenderPass>;

    fn create_framebuffer(
        &self,
        render_pass: &Self::RenderPass,
        attachments: &[&Self::ImageView],
        extent: Extent2D,
    ) -> Result<Self::Framebuffer>;

    fn create_shader_module(&self, code: &ShaderCode) -> Result<Self::ShaderModule>;

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorBinding]) -> Result<Self::DescriptorSetLayout>;

    fn create_descriptor_pool(&self, bindings: &[DescriptorBinding], max_sets: u32) -> Result<Self::DescriptorPool>;

    /// Sets are freed together with their pool
    fn allocate_descriptor_set(
        &self,
        pool: &Self::DescriptorPool,
        layout: &Self::DescriptorSetLayout,
    ) -> Result<Self::DescriptorSet>;

    fn write_descriptor_buffer(
        &self,
        set: &Self::DescriptorSet,
        binding: u32,
        kind: DescriptorKind,
        buffer: &Self::Buffer,
    ) -> Result<()>;

    /// Bind `view` through `sampler`; the image is read in `ShaderReadOnly` layout
    fn write_descriptor_image(
        &self,
        set: &Self::DescriptorSet,
        binding: u32,
        view: &Self::ImageView,
        sampler: &Self::Sampler,
    ) -> Result<()>;

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_, Self>) -> Result<Self::Pipeline>;

    fn create_compute_pipeline(
        &self,
        shader: &Self::ShaderModule,
        layout: &Self::DescriptorSetLayout,
    ) -> Result<Self::Pipeline>;

    fn create_command_pool(&self, queue: QueueKind, flags: CommandPoolFlags) -> Result<Self::CommandPool>;

    /// Command buffers are freed together with their pool
    fn allocate_command_buffers(&self, pool: &Self::CommandPool, count: u32) -> Result<Vec<Self::CommandBuffer>>;

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Self::Buffer>;

    /// Copy `data` into a host-visible buffer
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> Result<()>;

    /// Copy the content of a host-visible buffer into `out`
    fn read_buffer(&self, buffer: &Self::Buffer, offset: u64, out: &mut [u8]) -> Result<()>;

    // ===== COMMAND RECORDING =====

    fn cmd_begin(&self, cmd: &Self::CommandBuffer, usage: CommandBufferUsage) -> Result<()>;

    fn cmd_end(&self, cmd: &Self::CommandBuffer) -> Result<()>;

    fn cmd_begin_render_pass(
        &self,
        cmd: &Self::CommandBuffer,
        render_pass: &Self::RenderPass,
        framebuffer: &Self::Framebuffer,
        extent: Extent2D,
        clear_values: &[ClearValue],
    ) -> Result<()>;

    fn cmd_end_render_pass(&self, cmd: &Self::CommandBuffer) -> Result<()>;

    fn cmd_bind_pipeline(&self, cmd: &Self::CommandBuffer, pipeline: &Self::Pipeline) -> Result<()>;

    fn cmd_bind_descriptor_set(
        &self,
        cmd: &Self::CommandBuffer,
        pipeline: &Self::Pipeline,
        set: &Self::DescriptorSet,
    ) -> Result<()>;

    fn cmd_bind_vertex_buffer(&self, cmd: &Self::CommandBuffer, buffer: &Self::Buffer) -> Result<()>;

    fn cmd_draw(&self, cmd: &Self::CommandBuffer, vertex_count: u32, first_vertex: u32) -> Result<()>;

    fn cmd_dispatch(&self, cmd: &Self::CommandBuffer, x: u32, y: u32, z: u32) -> Result<()>;

    fn cmd_pipeline_barrier(&self, cmd: &Self::CommandBuffer, barrier: &MemoryBarrier) -> Result<()>;

    fn cmd_copy_buffer(&self, cmd: &Self::CommandBuffer, src: &Self::Buffer, dst: &Self::Buffer, size: u64) -> Result<()>;

    fn cmd_image_barrier(&self, cmd: &Self::CommandBuffer, image: &Self::Image, barrier: &ImageBarrier) -> Result<()>;

    /// Copy tightly packed texels covering `extent`; `dst` must be in `TransferDst` layout
    fn cmd_copy_buffer_to_image(
        &self,
        cmd: &Self::CommandBuffer,
        src: &Self::Buffer,
        dst: &Self::Image,
        extent: Extent2D,
    ) -> Result<()>;

    // ===== SUBMISSION / SYNCHRONIZATION =====

    fn submit(
        &self,
        queue: QueueKind,
        cmd: &Self::CommandBuffer,
        waits: &[SemaphoreWait<'_, Self>],
        signals: &[&Self::Semaphore],
    ) -> Result<()>;

    /// Block until every submission on `queue` has completed
    fn queue_wait_idle(&self, queue: QueueKind) -> Result<()>;

    /// Block until the whole device is idle
    fn wait_idle(&self) -> Result<()>;
}
