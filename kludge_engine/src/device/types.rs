/// Plain descriptor types shared by every `GraphicsDevice` backend

use bitflags::bitflags;

// ============================================================================
// Geometry / formats
// ============================================================================

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimised window reports a zero-area drawable
    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Pixel formats used by swapchains, depth buffers and vertex attributes
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    A2B10G10R10_UNORM,
    R16G16B16A16_SFLOAT,
    D32_SFLOAT,
    D24_UNORM_S8_UINT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
}

impl Format {
    pub fn is_depth(&self) -> bool {
        matches!(self, Format::D32_SFLOAT | Format::D24_UNORM_S8_UINT)
    }

    /// Size of one texel or attribute in bytes
    pub fn size_in_bytes(&self) -> u32 {
        match self {
            Format::B8G8R8A8_UNORM
            | Format::B8G8R8A8_SRGB
            | Format::R8G8B8A8_UNORM
            | Format::R8G8B8A8_SRGB
            | Format::A2B10G10R10_UNORM
            | Format::D32_SFLOAT
            | Format::D24_UNORM_S8_UINT => 4,
            Format::R16G16B16A16_SFLOAT | Format::R32G32_SFLOAT => 8,
            Format::R32G32B32_SFLOAT => 12,
            Format::R32G32B32A32_SFLOAT => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    SrgbNonlinear,
    ExtendedSrgbLinear,
    Hdr10St2084,
}

/// One format/color-space pair a surface can present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceFormat {
    pub format: Format,
    pub color_space: ColorSpace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

/// Surface limits as reported by the presentation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// 0 means "no upper bound"
    pub max_image_count: u32,
    /// `u32::MAX` in both dimensions means "decided by the swapchain"
    pub current_extent: Extent2D,
    pub min_image_extent: Extent2D,
    pub max_image_extent: Extent2D,
}

/// Everything needed to pick swapchain parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSupport {
    pub capabilities: SurfaceCapabilities,
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
}

/// Creation parameters for one swapchain generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub surface_format: SurfaceFormat,
    pub present_mode: PresentMode,
    pub extent: Extent2D,
    pub min_image_count: u32,
}

// ============================================================================
// Images / render passes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageUsage {
    ColorAttachment,
    DepthStencilAttachment,
    /// Filled by a transfer, then read by shaders through a sampler
    Sampled,
}

/// Layouts an image goes through on its way to being sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    TransferDst,
    ShaderReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub extent: Extent2D,
    pub format: Format,
    pub usage: ImageUsage,
}

/// Single-subpass render pass: one presentable color attachment, optional depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub color_format: Format,
    pub depth_format: Option<Format>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Repeat,
    ClampToEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address_mode: AddressMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: Filter::Linear,
            address_mode: AddressMode::Repeat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

// ============================================================================
// Shaders / pipelines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// File-name fragment of the compiled binary (`shader.<stage>.spv`)
    pub fn file_stem(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
            ShaderStage::Compute => "comp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleFan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: Format,
    pub offset: u32,
}

/// Interleaved per-vertex layout of binding 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
}

bitflags! {
    /// Shader stages a descriptor is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub stages: ShaderStageFlags,
}

// ============================================================================
// Buffers / commands / queues
// ============================================================================

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const UNIFORM = 1 << 1;
        const STORAGE = 1 << 2;
        const TRANSFER_SRC = 1 << 3;
        const TRANSFER_DST = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// Mappable, coherent; readable and writable from the CPU
    HostVisible,
    /// Fastest for the GPU, not mappable
    DeviceLocal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsage,
    pub location: MemoryLocation,
}

bitflags! {
    /// Pipeline stages used in semaphore waits and barriers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStage: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const VERTEX_SHADER = 1 << 1;
        const FRAGMENT_SHADER = 1 << 2;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 3;
        const COMPUTE_SHADER = 1 << 4;
        const TRANSFER = 1 << 5;
        const HOST = 1 << 6;
        const BOTTOM_OF_PIPE = 1 << 7;
        const VERTEX_INPUT = 1 << 8;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const SHADER_READ = 1 << 0;
        const SHADER_WRITE = 1 << 1;
        const TRANSFER_READ = 1 << 2;
        const TRANSFER_WRITE = 1 << 3;
        const HOST_READ = 1 << 4;
        const HOST_WRITE = 1 << 5;
        const VERTEX_ATTRIBUTE_READ = 1 << 6;
    }
}

/// Global memory dependency recorded with `cmd_pipeline_barrier`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBarrier {
    pub src_stage: PipelineStage,
    pub src_access: AccessFlags,
    pub dst_stage: PipelineStage,
    pub dst_access: AccessFlags,
}

/// Layout transition of one image, recorded with `cmd_image_barrier`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_stage: PipelineStage,
    pub src_access: AccessFlags,
    pub dst_stage: PipelineStage,
    pub dst_access: AccessFlags,
}

impl ImageBarrier {
    /// Undefined -> TransferDst, before the texel upload
    pub const fn to_transfer_dst() -> Self {
        Self {
            old_layout: ImageLayout::Undefined,
            new_layout: ImageLayout::TransferDst,
            src_stage: PipelineStage::TOP_OF_PIPE,
            src_access: AccessFlags::empty(),
            dst_stage: PipelineStage::TRANSFER,
            dst_access: AccessFlags::TRANSFER_WRITE,
        }
    }

    /// TransferDst -> ShaderReadOnly, after the texel upload
    pub const fn to_shader_read() -> Self {
        Self {
            old_layout: ImageLayout::TransferDst,
            new_layout: ImageLayout::ShaderReadOnly,
            src_stage: PipelineStage::TRANSFER,
            src_access: AccessFlags::TRANSFER_WRITE,
            dst_stage: PipelineStage::FRAGMENT_SHADER,
            dst_access: AccessFlags::SHADER_READ,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandPoolFlags: u32 {
        /// Command buffers are short-lived
        const TRANSIENT = 1 << 0;
        /// Command buffers may be re-recorded individually
        const RESET_COMMAND_BUFFER = 1 << 1;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandBufferUsage: u32 {
        const ONE_TIME_SUBMIT = 1 << 0;
        const SIMULTANEOUS_USE = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Graphics,
    Present,
    Compute,
}
