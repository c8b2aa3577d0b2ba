//! Renderer session
//!
//! A [`RendererSession`] is everything that depends on one swapchain
//! generation: the swapchain itself, its views, the optional depth buffer,
//! render pass, framebuffers, pipelines, descriptor objects, command buffers
//! and the frame semaphores. All of it lives in a single [`ResourceScope`],
//! so a session is torn down in reverse construction order and a failed
//! build releases whatever it had already created.
//!
//! Sessions are never patched in place: when the swapchain goes out of date
//! the presenter builds a replacement, handing it the old swapchain as a
//! creation hint, and only then drops the old session.
//!
//! Static data (vertex buffer, texture, glyph atlas) does not depend on the
//! swapchain. It is uploaded once into [`SessionAssets`] and shared by every
//! session generation.

use std::sync::Arc;

use crate::config::Config;
use crate::device::types::*;
use crate::device::{CommandRecorder, GraphicsDevice, GraphicsPipelineDesc};
use crate::error::{Error, Result};
use crate::frame_scheduler::{FrameScheduler, FrameSyncPair};
use crate::gui::{DrawList, GlyphAtlas, GuiVertex};
use crate::resource_scope::{Handle, ResourceScope};
use crate::shader::{ShaderCode, ShaderLibrary};
use crate::swapchain::SwapchainLifecycle;
use crate::upload::{StaticVertexBuffer, Texture, TextureData, VertexData};
use crate::{engine_info, engine_violation, engine_warn};

/// Shader name of the GUI overlay pipeline
pub const GUI_SHADER: &str = "gui";

/// Binding of the session texture in set 0, next to the uniform block
pub const TEXTURE_BINDING: u32 = 1;

/// Smallest GUI vertex buffer that holds one triangle
const MIN_GUI_VERTICES: u32 = 3;

/// What a session draws
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDesc {
    /// Logical shader name (`<shader_root>/<shader>/shader.{vert,frag}.spv`)
    pub shader: String,
    /// Vertices drawn per frame, generated by the vertex shader unless `vertices` is set
    pub vertex_count: u32,
    pub topology: PrimitiveTopology,
    /// Static vertex buffer bound at binding 0
    pub vertices: Option<VertexData>,
    /// Texture sampled at set 0, binding [`TEXTURE_BINDING`]
    pub texture: Option<TextureData>,
    pub depth_format: Option<Format>,
    /// Size of the per-frame uniform block bound at set 0, binding 0
    pub uniform_size: Option<u64>,
    /// Draw a GUI overlay; switches to per-frame recording
    pub gui: bool,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
}

impl SessionDesc {
    pub fn new(shader: impl Into<String>, vertex_count: u32) -> Self {
        Self {
            shader: shader.into(),
            vertex_count,
            topology: PrimitiveTopology::TriangleList,
            vertices: None,
            texture: None,
            depth_format: None,
            uniform_size: None,
            gui: false,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
        }
    }

    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Draw every vertex of `data` from a static buffer
    pub fn with_vertices(mut self, data: VertexData) -> Self {
        self.vertex_count = data.vertex_count();
        self.vertices = Some(data);
        self
    }

    pub fn with_texture(mut self, data: TextureData) -> Self {
        self.texture = Some(data);
        self
    }

    pub fn with_depth(mut self, format: Format) -> Self {
        self.depth_format = Some(format);
        self
    }

    pub fn with_uniforms(mut self, size: u64) -> Self {
        self.uniform_size = Some(size);
        self
    }

    pub fn with_gui(mut self) -> Self {
        self.gui = true;
        self
    }
}

/// Compiled modules a session needs, loaded once and reused by every rebuild
#[derive(Debug, Clone)]
pub struct SessionShaders {
    pub vertex: ShaderCode,
    pub fragment: ShaderCode,
    pub gui: Option<(ShaderCode, ShaderCode)>,
}

impl SessionShaders {
    pub fn load(library: &mut ShaderLibrary, desc: &SessionDesc) -> Result<Self> {
        let gui = if desc.gui {
            Some((
                library.load(GUI_SHADER, ShaderStage::Vertex)?,
                library.load(GUI_SHADER, ShaderStage::Fragment)?,
            ))
        } else {
            None
        };
        Ok(Self {
            vertex: library.load(&desc.shader, ShaderStage::Vertex)?,
            fragment: library.load(&desc.shader, ShaderStage::Fragment)?,
            gui,
        })
    }
}

/// Swapchain-independent GPU data of a session, uploaded once
pub struct SessionAssets<D: GraphicsDevice> {
    vertices: Option<StaticVertexBuffer<D>>,
    texture: Option<Texture<D>>,
    glyphs: Option<(GlyphAtlas, Texture<D>)>,
}

impl<D: GraphicsDevice> SessionAssets<D> {
    pub fn upload(device: &Arc<D>, desc: &SessionDesc) -> Result<Self> {
        let vertices = match &desc.vertices {
            Some(data) => {
                if desc.vertex_count > data.vertex_count() {
                    return Err(Error::InvalidResource(format!(
                        "drawing {} vertices from a buffer of {}",
                        desc.vertex_count,
                        data.vertex_count()
                    )));
                }
                Some(StaticVertexBuffer::upload(device, &desc.shader, data)?)
            }
            None => None,
        };
        let texture = match &desc.texture {
            Some(data) => Some(Texture::upload(device, &desc.shader, data, &SamplerDesc::default())?),
            None => None,
        };
        let glyphs = if desc.gui {
            let atlas = GlyphAtlas::builtin()?;
            let sampler = SamplerDesc {
                filter: Filter::Nearest,
                address_mode: AddressMode::ClampToEdge,
            };
            let texture = Texture::upload(device, "glyph atlas", atlas.texture(), &sampler)?;
            Some((atlas, texture))
        } else {
            None
        };
        Ok(Self {
            vertices,
            texture,
            glyphs,
        })
    }

    pub fn vertices(&self) -> Option<&StaticVertexBuffer<D>> {
        self.vertices.as_ref()
    }

    pub fn texture(&self) -> Option<&Texture<D>> {
        self.texture.as_ref()
    }

    pub fn glyphs(&self) -> Option<(&GlyphAtlas, &Texture<D>)> {
        self.glyphs.as_ref().map(|(atlas, texture)| (atlas, texture))
    }
}

/// Inputs of one session build
pub struct SessionContext<'a, D: GraphicsDevice> {
    pub config: &'a Config,
    pub desc: &'a SessionDesc,
    pub shaders: &'a SessionShaders,
    pub assets: &'a Arc<SessionAssets<D>>,
    pub drawable: Extent2D,
}

/// Per-frame data supplied by the driver
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameInput<'a> {
    pub drawable_extent: Extent2D,
    pub uniforms: Option<&'a [u8]>,
    pub gui: Option<&'a DrawList>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingMode {
    /// Recorded once at build time, resubmitted every frame
    Static,
    /// Re-recorded for every frame
    PerFrame,
}

/// Set 0 of the scene pipeline: uniform block and/or texture
struct SceneBinding<D: GraphicsDevice> {
    layout: Handle<D::DescriptorSetLayout>,
    set: Handle<D::DescriptorSet>,
    uniforms: Option<(Handle<D::Buffer>, u64)>,
}

struct GuiBinding<D: GraphicsDevice> {
    pipeline: Handle<D::Pipeline>,
    set: Handle<D::DescriptorSet>,
    vertices: Handle<D::Buffer>,
    capacity: u32,
}

pub struct RendererSession<D: GraphicsDevice> {
    scope: ResourceScope,
    device: Arc<D>,
    swapchain: Handle<SwapchainLifecycle<D>>,
    render_pass: Handle<D::RenderPass>,
    framebuffers: Vec<Handle<D::Framebuffer>>,
    pipeline: Handle<D::Pipeline>,
    scene: Option<SceneBinding<D>>,
    gui: Option<GuiBinding<D>>,
    command_buffers: Vec<Handle<D::CommandBuffer>>,
    sync: Handle<FrameSyncPair<D>>,
    scheduler: FrameScheduler,
    recording: RecordingMode,
    extent: Extent2D,
    vertex_count: u32,
    clear_values: Vec<ClearValue>,
    // outlives `scope`, whose descriptor sets point into it
    assets: Arc<SessionAssets<D>>,
}

impl<D: GraphicsDevice> RendererSession<D> {
    /// Build a session; `previous` lends its swapchain as the hand-off hint
    pub fn build(device: Arc<D>, ctx: &SessionContext<'_, D>, previous: Option<&Self>) -> Result<Self> {
        let hint = match previous {
            Some(previous) => Some(previous.swapchain()?),
            None => None,
        };
        let swapchain = SwapchainLifecycle::build(device.clone(), ctx.config, ctx.drawable, hint)?;
        let extent = swapchain.extent();
        let color_format = swapchain.state().surface_format.format;
        let generation = swapchain.generation();
        let swapchain_views = device.create_swapchain_views(swapchain.raw()?)?;

        let mut scope = ResourceScope::new(format!("session#{}", generation));
        let swapchain = scope.register("swapchain", swapchain)?;
        let views = scope.register_all("swapchain view", swapchain_views)?;

        // ===== ATTACHMENTS =====
        let depth_view = match ctx.desc.depth_format {
            Some(format) => {
                let image = device.create_image(&ImageDesc {
                    extent,
                    format,
                    usage: ImageUsage::DepthStencilAttachment,
                })?;
                let image = scope.register("depth image", image)?;
                let view = device.create_image_view(scope.get(image)?)?;
                Some(scope.register("depth view", view)?)
            }
            None => None,
        };

        let render_pass = device.create_render_pass(&RenderPassDesc {
            color_format,
            depth_format: ctx.desc.depth_format,
        })?;
        let render_pass = scope.register("render pass", render_pass)?;

        let mut framebuffers = Vec::with_capacity(views.len());
        for (i, view) in views.iter().enumerate() {
            let mut attachments = vec![scope.get(*view)?];
            if let Some(depth_view) = depth_view {
                attachments.push(scope.get(depth_view)?);
            }
            let framebuffer = device.create_framebuffer(scope.get(render_pass)?, &attachments, extent)?;
            framebuffers.push(scope.register(format!("framebuffer[{}]", i), framebuffer)?);
        }

        // ===== PIPELINES =====
        let vertex_shader = device.create_shader_module(&ctx.shaders.vertex)?;
        let vertex_shader = scope.register("vertex shader", vertex_shader)?;
        let fragment_shader = device.create_shader_module(&ctx.shaders.fragment)?;
        let fragment_shader = scope.register("fragment shader", fragment_shader)?;

        let texture = ctx.assets.texture();
        let scene = if ctx.desc.uniform_size.is_some() || texture.is_some() {
            Some(SceneBinding::build(device.as_ref(), &mut scope, ctx.desc.uniform_size, texture)?)
        } else {
            None
        };

        let descriptor_layout = match &scene {
            Some(scene) => Some(scope.get(scene.layout)?),
            None => None,
        };
        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineDesc {
            vertex_shader: scope.get(vertex_shader)?,
            fragment_shader: scope.get(fragment_shader)?,
            render_pass: scope.get(render_pass)?,
            extent,
            vertex_layout: ctx.assets.vertices().map(|v| v.layout().clone()),
            topology: ctx.desc.topology,
            descriptor_layout,
            cull_mode: ctx.desc.cull_mode,
            front_face: ctx.desc.front_face,
            depth_test: ctx.desc.depth_format.is_some(),
            alpha_blend: false,
        })?;
        let pipeline = scope.register("pipeline", pipeline)?;

        let gui = match (&ctx.shaders.gui, ctx.assets.glyphs()) {
            (Some((vertex, fragment)), Some((_, atlas))) => Some(GuiBinding::build(
                device.as_ref(),
                &mut scope,
                (vertex, fragment),
                atlas,
                render_pass,
                extent,
                ctx.config.gui_max_vertices,
            )?),
            (Some(_), None) => {
                return Err(Error::InvalidResource("GUI shaders without a glyph atlas".to_string()));
            }
            (None, _) => None,
        };

        // ===== COMMANDS / SYNC =====
        let recording = if gui.is_some() {
            RecordingMode::PerFrame
        } else {
            RecordingMode::Static
        };
        let pool_flags = match recording {
            RecordingMode::Static => CommandPoolFlags::empty(),
            RecordingMode::PerFrame => CommandPoolFlags::RESET_COMMAND_BUFFER,
        };
        let pool = device.create_command_pool(QueueKind::Graphics, pool_flags)?;
        let pool = scope.register("command pool", pool)?;
        let buffers = device.allocate_command_buffers(scope.get(pool)?, framebuffers.len() as u32)?;
        let command_buffers = scope.register_all("command buffer", buffers)?;

        let sync = FrameSyncPair::new(device.as_ref())?;
        let sync = scope.register("frame sync", sync)?;

        let mut clear_values = vec![ClearValue::Color(ctx.config.clear_color.to_array())];
        if ctx.desc.depth_format.is_some() {
            clear_values.push(ClearValue::DepthStencil {
                depth: ctx.config.clear_depth,
                stencil: 0,
            });
        }

        let session = Self {
            scope,
            device,
            swapchain,
            render_pass,
            framebuffers,
            pipeline,
            scene,
            gui,
            command_buffers,
            sync,
            scheduler: FrameScheduler::new(),
            recording,
            extent,
            vertex_count: ctx.desc.vertex_count,
            clear_values,
            assets: ctx.assets.clone(),
        };

        if recording == RecordingMode::Static {
            for image_index in 0..session.command_buffers.len() {
                session.record(image_index, 0)?;
            }
        }

        engine_info!(
            "kludge::session",
            "Session built: generation {}, {}x{}, {} framebuffers, {:?} recording, {} resources",
            generation,
            extent.width,
            extent.height,
            session.framebuffers.len(),
            recording,
            session.scope.len()
        );
        Ok(session)
    }

    /// Upload per-frame data and run one acquire/submit/present cycle
    ///
    /// Returns the presented image index.
    pub fn render_frame(&mut self, input: &FrameInput<'_>) -> Result<u32> {
        let gui_vertices = self.upload_frame_data(input)?;
        let mut scheduler = std::mem::take(&mut self.scheduler);
        let result = self.present_frame(&mut scheduler, gui_vertices);
        self.scheduler = scheduler;
        result
    }

    // ===== ACCESSORS =====

    pub fn swapchain(&self) -> Result<&SwapchainLifecycle<D>> {
        self.scope.get(self.swapchain)
    }

    pub fn sync(&self) -> Result<&FrameSyncPair<D>> {
        self.scope.get(self.sync)
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn recording_mode(&self) -> RecordingMode {
        self.recording
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn generation(&self) -> Result<u64> {
        Ok(self.swapchain()?.generation())
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn render_pass(&self) -> Result<&D::RenderPass> {
        self.scope.get(self.render_pass)
    }

    pub fn framebuffer(&self, image_index: usize) -> Result<&D::Framebuffer> {
        let handle = self.framebuffers.get(image_index).ok_or_else(|| {
            engine_violation!("kludge::session", "no framebuffer for image {}", image_index)
        })?;
        self.scope.get(*handle)
    }

    pub fn command_buffer(&self, image_index: usize) -> Result<&D::CommandBuffer> {
        let handle = self.command_buffers.get(image_index).ok_or_else(|| {
            engine_violation!("kludge::session", "no command buffer for image {}", image_index)
        })?;
        self.scope.get(*handle)
    }

    pub fn uniform_buffer(&self) -> Option<Result<&D::Buffer>> {
        let (buffer, _) = self.scene.as_ref()?.uniforms?;
        Some(self.scope.get(buffer))
    }

    /// Descriptor set bound at set 0 of the scene pipeline
    pub fn scene_set(&self) -> Option<Result<&D::DescriptorSet>> {
        self.scene.as_ref().map(|s| self.scope.get(s.set))
    }

    pub fn gui_set(&self) -> Option<Result<&D::DescriptorSet>> {
        self.gui.as_ref().map(|g| self.scope.get(g.set))
    }

    pub fn gui_vertex_buffer(&self) -> Option<Result<&D::Buffer>> {
        self.gui.as_ref().map(|g| self.scope.get(g.vertices))
    }

    /// Resource labels in construction order
    pub fn resource_labels(&self) -> Vec<&str> {
        self.scope.labels()
    }

    // ===== INTERNALS =====

    fn present_frame(&self, scheduler: &mut FrameScheduler, gui_vertices: u32) -> Result<u32> {
        let swapchain = self.swapchain()?;
        let sync = self.sync()?;
        scheduler.run_frame(self.device.as_ref(), swapchain, sync, |image_index| {
            let image_index = image_index as usize;
            if self.recording == RecordingMode::PerFrame {
                self.record(image_index, gui_vertices)?;
            }
            self.command_buffer(image_index)
        })
    }

    /// Write uniforms and GUI vertices; returns the GUI vertex count
    fn upload_frame_data(&self, input: &FrameInput<'_>) -> Result<u32> {
        let uniforms = self.scene.as_ref().and_then(|s| s.uniforms);
        if let (Some((buffer, size)), Some(data)) = (uniforms, input.uniforms) {
            if data.len() as u64 > size {
                return Err(Error::InvalidResource(format!(
                    "uniform data of {} bytes exceeds block of {} bytes",
                    data.len(),
                    size
                )));
            }
            self.device.write_buffer(self.scope.get(buffer)?, 0, data)?;
        }

        let (Some(gui), Some(list), Some((atlas, _))) = (&self.gui, input.gui, self.assets.glyphs()) else {
            return Ok(0);
        };
        let mut vertices = list.tessellate(self.extent, atlas);
        if vertices.len() > gui.capacity as usize {
            engine_warn!(
                "kludge::session",
                "GUI needs {} vertices, buffer holds {}; truncating",
                vertices.len(),
                gui.capacity
            );
            let keep = gui.capacity as usize - gui.capacity as usize % 3;
            vertices.truncate(keep);
        }
        if !vertices.is_empty() {
            self.device
                .write_buffer(self.scope.get(gui.vertices)?, 0, bytemuck::cast_slice(&vertices))?;
        }
        Ok(vertices.len() as u32)
    }

    fn record(&self, image_index: usize, gui_vertices: u32) -> Result<()> {
        let usage = match self.recording {
            RecordingMode::Static => CommandBufferUsage::SIMULTANEOUS_USE,
            RecordingMode::PerFrame => CommandBufferUsage::ONE_TIME_SUBMIT,
        };
        let pipeline = self.scope.get(self.pipeline)?;

        let mut recorder = CommandRecorder::begin(self.device.as_ref(), self.command_buffer(image_index)?, usage)?;
        recorder.begin_render_pass(
            self.render_pass()?,
            self.framebuffer(image_index)?,
            self.extent,
            &self.clear_values,
        )?;
        recorder.bind_pipeline(pipeline)?;
        if let Some(scene) = &self.scene {
            recorder.bind_descriptor_set(pipeline, self.scope.get(scene.set)?)?;
        }
        if let Some(vertices) = self.assets.vertices() {
            recorder.bind_vertex_buffer(vertices.buffer()?)?;
        }
        recorder.draw(self.vertex_count, 0)?;

        if let Some(gui) = &self.gui {
            if gui_vertices > 0 {
                let gui_pipeline = self.scope.get(gui.pipeline)?;
                recorder.bind_pipeline(gui_pipeline)?;
                recorder.bind_descriptor_set(gui_pipeline, self.scope.get(gui.set)?)?;
                recorder.bind_vertex_buffer(self.scope.get(gui.vertices)?)?;
                recorder.draw(gui_vertices, 0)?;
            }
        }

        recorder.end_render_pass()?;
        recorder.finish()
    }
}

impl<D: GraphicsDevice> SceneBinding<D> {
    fn build(device: &D, scope: &mut ResourceScope, uniform_size: Option<u64>, texture: Option<&Texture<D>>) -> Result<Self> {
        let mut bindings = Vec::new();
        if uniform_size.is_some() {
            bindings.push(DescriptorBinding {
                binding: 0,
                kind: DescriptorKind::UniformBuffer,
                stages: ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
            });
        }
        if texture.is_some() {
            bindings.push(DescriptorBinding {
                binding: TEXTURE_BINDING,
                kind: DescriptorKind::CombinedImageSampler,
                stages: ShaderStageFlags::FRAGMENT,
            });
        }
        let layout = device.create_descriptor_set_layout(&bindings)?;
        let layout = scope.register("scene layout", layout)?;
        let pool = device.create_descriptor_pool(&bindings, 1)?;
        let pool = scope.register("scene pool", pool)?;
        let set = device.allocate_descriptor_set(scope.get(pool)?, scope.get(layout)?)?;
        let set = scope.register("scene set", set)?;

        let uniforms = match uniform_size {
            Some(size) => {
                let buffer = device.create_buffer(&BufferDesc {
                    label: "uniforms".to_string(),
                    size,
                    usage: BufferUsage::UNIFORM,
                    location: MemoryLocation::HostVisible,
                })?;
                let buffer = scope.register("uniform buffer", buffer)?;
                device.write_descriptor_buffer(scope.get(set)?, 0, DescriptorKind::UniformBuffer, scope.get(buffer)?)?;
                Some((buffer, size))
            }
            None => None,
        };
        if let Some(texture) = texture {
            device.write_descriptor_image(scope.get(set)?, TEXTURE_BINDING, texture.view()?, texture.sampler()?)?;
        }
        Ok(Self { layout, set, uniforms })
    }
}

impl<D: GraphicsDevice> GuiBinding<D> {
    fn build(
        device: &D,
        scope: &mut ResourceScope,
        shaders: (&ShaderCode, &ShaderCode),
        atlas: &Texture<D>,
        render_pass: Handle<D::RenderPass>,
        extent: Extent2D,
        capacity: u32,
    ) -> Result<Self> {
        if capacity < MIN_GUI_VERTICES {
            return Err(Error::InvalidResource(format!(
                "GUI vertex capacity {} holds no triangle",
                capacity
            )));
        }
        let bindings = [DescriptorBinding {
            binding: 0,
            kind: DescriptorKind::CombinedImageSampler,
            stages: ShaderStageFlags::FRAGMENT,
        }];
        let layout = device.create_descriptor_set_layout(&bindings)?;
        let layout = scope.register("gui layout", layout)?;
        let pool = device.create_descriptor_pool(&bindings, 1)?;
        let pool = scope.register("gui pool", pool)?;
        let set = device.allocate_descriptor_set(scope.get(pool)?, scope.get(layout)?)?;
        let set = scope.register("gui set", set)?;
        device.write_descriptor_image(scope.get(set)?, 0, atlas.view()?, atlas.sampler()?)?;

        let vertex_shader = device.create_shader_module(shaders.0)?;
        let vertex_shader = scope.register("gui vertex shader", vertex_shader)?;
        let fragment_shader = device.create_shader_module(shaders.1)?;
        let fragment_shader = scope.register("gui fragment shader", fragment_shader)?;
        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineDesc {
            vertex_shader: scope.get(vertex_shader)?,
            fragment_shader: scope.get(fragment_shader)?,
            render_pass: scope.get(render_pass)?,
            extent,
            vertex_layout: Some(GuiVertex::layout()),
            topology: PrimitiveTopology::TriangleList,
            descriptor_layout: Some(scope.get(layout)?),
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            depth_test: false,
            alpha_blend: true,
        })?;
        let pipeline = scope.register("gui pipeline", pipeline)?;
        let vertices = device.create_buffer(&BufferDesc {
            label: "gui vertices".to_string(),
            size: capacity as u64 * std::mem::size_of::<GuiVertex>() as u64,
            usage: BufferUsage::VERTEX,
            location: MemoryLocation::HostVisible,
        })?;
        let vertices = scope.register("gui vertex buffer", vertices)?;
        Ok(Self {
            pipeline,
            set,
            vertices,
            capacity,
        })
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
