/// Mock graphics device for unit tests (no GPU required)
///
/// Every handle is a `MockHandle` that reports its release to a shared
/// ledger. The ledger also records acquire/submit/present traffic, tracks
/// semaphore signal/wait counts and collects protocol violations, so tests
/// can assert ordering and leak properties without a real device.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::device::graphics_device::{GraphicsDevice, GraphicsPipelineDesc, SemaphoreWait};
use crate::device::types::*;
use crate::error::{Error, Result};
use crate::shader::ShaderCode;

// ============================================================================
// Handles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockKind {
    Semaphore,
    Swapchain,
    Image,
    ImageView,
    RenderPass,
    Framebuffer,
    ShaderModule,
    DescriptorSetLayout,
    DescriptorPool,
    DescriptorSet,
    Pipeline,
    CommandPool,
    CommandBuffer,
    Buffer,
    Sampler,
}

/// Owning mock handle; dropping it records a release in the ledger
#[derive(Debug)]
pub struct MockHandle {
    pub id: u64,
    pub kind: MockKind,
    ledger: Arc<Mutex<Ledger>>,
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.release(self.id, self.kind);
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    BeginRenderPass { render_pass: u64, framebuffer: u64, extent: Extent2D },
    EndRenderPass,
    BindPipeline(u64),
    BindDescriptorSet(u64),
    BindVertexBuffer(u64),
    Draw { vertex_count: u32, first_vertex: u32 },
    Dispatch { x: u32, y: u32, z: u32 },
    Barrier(MemoryBarrier),
    CopyBuffer { src: u64, dst: u64, size: u64 },
    ImageBarrier { image: u64, barrier: ImageBarrier },
    CopyBufferToImage { src: u64, dst: u64, extent: Extent2D },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Created { id: u64, kind: MockKind },
    Released { id: u64, kind: MockKind },
    SwapchainCreated { id: u64, old: Option<u64>, extent: Extent2D },
    Acquire { swapchain: u64, image_index: u32, signal: u64 },
    AcquireFailed { swapchain: u64, error: Error },
    Submit { queue: QueueKind, cmd: u64, waits: Vec<(u64, PipelineStage)>, signals: Vec<u64> },
    Present { swapchain: u64, image_index: u32, wait: u64 },
    PresentFailed { swapchain: u64, error: Error },
    QueueWaitIdle(QueueKind),
    WaitIdle,
}

/// Signal/wait bookkeeping of one binary semaphore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SemaphoreCounters {
    pub signals: u64,
    pub waits: u64,
    pub pending: bool,
}

#[derive(Debug, Clone)]
struct MockSwapchain {
    extent: Extent2D,
    image_count: u32,
    next_index: u32,
    acquired: Option<u32>,
}

#[derive(Debug, Clone)]
struct MockBuffer {
    data: Vec<u8>,
    location: MemoryLocation,
}

#[derive(Debug, Clone)]
struct MockImage {
    extent: Extent2D,
    format: Format,
    layout: ImageLayout,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Initial,
    Recording,
    Executable,
}

#[derive(Debug, Clone)]
struct MockRecording {
    pool_flags: CommandPoolFlags,
    state: RecordState,
    usage: CommandBufferUsage,
    commands: Vec<MockCommand>,
    submissions_since_begin: u32,
}

#[derive(Debug)]
pub struct Ledger {
    next_id: u64,
    live: FxHashMap<u64, MockKind>,
    events: Vec<MockEvent>,
    violations: Vec<String>,
    semaphores: FxHashMap<u64, SemaphoreCounters>,
    swapchains: FxHashMap<u64, MockSwapchain>,
    retired_swapchains: FxHashSet<u64>,
    buffers: FxHashMap<u64, MockBuffer>,
    pools: FxHashMap<u64, CommandPoolFlags>,
    recordings: FxHashMap<u64, MockRecording>,
    descriptor_writes: FxHashMap<(u64, u32), u64>,
    image_writes: FxHashMap<(u64, u32), (u64, u64)>,
    images: FxHashMap<u64, MockImage>,
    views: FxHashMap<u64, u64>,
    topologies: FxHashMap<u64, PrimitiveTopology>,
    surface: SurfaceSupport,
    surface_extent: Extent2D,
    gpu_busy: bool,
    fail_acquire: VecDeque<Error>,
    fail_present: VecDeque<Error>,
    fail_submit: VecDeque<Error>,
    fail_create: FxHashMap<MockKind, u32>,
    fail_wait_idle: VecDeque<Error>,
}

impl Ledger {
    fn new(extent: Extent2D) -> Self {
        Self {
            next_id: 1,
            live: FxHashMap::default(),
            events: Vec::new(),
            violations: Vec::new(),
            semaphores: FxHashMap::default(),
            swapchains: FxHashMap::default(),
            retired_swapchains: FxHashSet::default(),
            buffers: FxHashMap::default(),
            pools: FxHashMap::default(),
            recordings: FxHashMap::default(),
            descriptor_writes: FxHashMap::default(),
            image_writes: FxHashMap::default(),
            images: FxHashMap::default(),
            views: FxHashMap::default(),
            topologies: FxHashMap::default(),
            surface: SurfaceSupport {
                capabilities: SurfaceCapabilities {
                    min_image_count: 2,
                    max_image_count: 3,
                    current_extent: extent,
                    min_image_extent: Extent2D::new(1, 1),
                    max_image_extent: Extent2D::new(4096, 4096),
                },
                formats: vec![
                    SurfaceFormat { format: Format::B8G8R8A8_SRGB, color_space: ColorSpace::SrgbNonlinear },
                    SurfaceFormat { format: Format::B8G8R8A8_UNORM, color_space: ColorSpace::SrgbNonlinear },
                ],
                present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox],
            },
            surface_extent: extent,
            gpu_busy: false,
            fail_acquire: VecDeque::new(),
            fail_present: VecDeque::new(),
            fail_submit: VecDeque::new(),
            fail_create: FxHashMap::default(),
            fail_wait_idle: VecDeque::new(),
        }
    }

    fn violation(&mut self, message: String) {
        self.violations.push(message);
    }

    fn release(&mut self, id: u64, kind: MockKind) {
        if self.live.remove(&id).is_none() {
            self.violation(format!("{:?} #{} released twice", kind, id));
        }
        self.events.push(MockEvent::Released { id, kind });
    }

    fn signal(&mut self, semaphore: u64) {
        let counters = self.semaphores.entry(semaphore).or_default();
        let was_pending = counters.pending;
        counters.pending = true;
        counters.signals += 1;
        if was_pending {
            self.violation(format!("semaphore #{} re-armed before its previous signal was waited", semaphore));
        }
    }

    fn wait(&mut self, semaphore: u64) {
        let counters = self.semaphores.entry(semaphore).or_default();
        let was_pending = counters.pending;
        counters.pending = false;
        counters.waits += 1;
        if !was_pending {
            self.violation(format!("semaphore #{} waited without a pending signal", semaphore));
        }
    }

    fn record(&mut self, cmd: u64, command: MockCommand) -> Result<()> {
        let recording = self
            .recordings
            .get_mut(&cmd)
            .ok_or_else(|| Error::InvalidResource(format!("unknown command buffer #{}", cmd)))?;
        if recording.state != RecordState::Recording {
            let message = format!("command {:?} recorded into #{} outside begin/end", command, cmd);
            self.violation(message);
            return Ok(());
        }
        recording.commands.push(command);
        Ok(())
    }

    /// Emulate the observable effects of a submitted command buffer
    fn execute(&mut self, commands: &[MockCommand]) {
        let mut bound_set = None;
        for command in commands {
            match command {
                MockCommand::BindDescriptorSet(set) => bound_set = Some(*set),
                // identity kernel: binding 1 receives the content of binding 0
                MockCommand::Dispatch { .. } => {
                    let Some(set) = bound_set else { continue };
                    let src = self.descriptor_writes.get(&(set, 0)).copied();
                    let dst = self.descriptor_writes.get(&(set, 1)).copied();
                    if let (Some(src), Some(dst)) = (src, dst) {
                        self.copy(src, dst, u64::MAX);
                    }
                }
                MockCommand::CopyBuffer { src, dst, size } => self.copy(*src, *dst, *size),
                MockCommand::ImageBarrier { image, barrier } => self.transition(*image, barrier),
                MockCommand::CopyBufferToImage { src, dst, extent } => self.upload(*src, *dst, *extent),
                MockCommand::Draw { .. } => {
                    if let Some(set) = bound_set {
                        self.check_sampled_layouts(set);
                    }
                }
                _ => {}
            }
        }
    }

    fn transition(&mut self, image: u64, barrier: &ImageBarrier) {
        let Some(target) = self.images.get_mut(&image) else { return };
        let current = target.layout;
        target.layout = barrier.new_layout;
        if barrier.old_layout != ImageLayout::Undefined && barrier.old_layout != current {
            self.violation(format!(
                "image #{} transitioned from {:?} but is in {:?}",
                image, barrier.old_layout, current
            ));
        }
    }

    fn upload(&mut self, src: u64, dst: u64, extent: Extent2D) {
        let Some(data) = self.buffers.get(&src).map(|b| b.data.clone()) else { return };
        let Some(target) = self.images.get_mut(&dst) else { return };
        let problem = if target.layout != ImageLayout::TransferDst {
            Some(format!("copy into image #{} in {:?} layout", dst, target.layout))
        } else if extent != target.extent {
            Some(format!("copy of {:?} into image #{} of {:?}", extent, dst, target.extent))
        } else {
            let len = target.data.len();
            if data.len() < len {
                Some(format!("copy into image #{} reads past its {}-byte source", dst, data.len()))
            } else {
                target.data.copy_from_slice(&data[..len]);
                None
            }
        };
        if let Some(problem) = problem {
            self.violation(problem);
        }
    }

    fn check_sampled_layouts(&mut self, set: u64) {
        let sampled: Vec<u64> = self
            .image_writes
            .iter()
            .filter(|((s, _), _)| *s == set)
            .filter_map(|(_, (view, _))| self.views.get(view).copied())
            .collect();
        for image in sampled {
            let layout = self.images.get(&image).map(|i| i.layout);
            if layout != Some(ImageLayout::ShaderReadOnly) {
                self.violation(format!("draw samples image #{} in {:?} layout", image, layout));
            }
        }
    }

    fn copy(&mut self, src: u64, dst: u64, size: u64) {
        let Some(data) = self.buffers.get(&src).map(|b| b.data.clone()) else { return };
        if let Some(target) = self.buffers.get_mut(&dst) {
            let len = data.len().min(target.data.len()).min(size.min(usize::MAX as u64) as usize);
            target.data[..len].copy_from_slice(&data[..len]);
        }
    }
}

// ============================================================================
// MockDevice
// ============================================================================

/// Instrumented in-memory `GraphicsDevice`
#[derive(Clone)]
pub struct MockDevice {
    ledger: Arc<Mutex<Ledger>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::with_extent(Extent2D::new(800, 600))
    }

    pub fn with_extent(extent: Extent2D) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger::new(extent))),
        }
    }

    pub fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap()
    }

    // ===== SCRIPTING =====

    /// Resize the surface; existing swapchains report out-of-date from now on
    pub fn set_surface_extent(&self, extent: Extent2D) {
        let mut ledger = self.ledger();
        ledger.surface_extent = extent;
        ledger.surface.capabilities.current_extent = extent;
    }

    pub fn set_surface_support(&self, support: SurfaceSupport) {
        let mut ledger = self.ledger();
        ledger.surface_extent = support.capabilities.current_extent;
        ledger.surface = support;
    }

    pub fn fail_next_acquire(&self, error: Error) {
        self.ledger().fail_acquire.push_back(error);
    }

    pub fn fail_next_present(&self, error: Error) {
        self.ledger().fail_present.push_back(error);
    }

    pub fn fail_next_submit(&self, error: Error) {
        self.ledger().fail_submit.push_back(error);
    }

    pub fn fail_next_wait_idle(&self, error: Error) {
        self.ledger().fail_wait_idle.push_back(error);
    }

    /// Fail the `nth` (1-based) next creation of `kind` with `Error::OutOfMemory`
    pub fn fail_create(&self, kind: MockKind, nth: u32) {
        self.ledger().fail_create.insert(kind, nth);
    }

    // ===== QUERIES =====

    pub fn live_count(&self) -> usize {
        self.ledger().live.len()
    }

    pub fn live_of(&self, kind: MockKind) -> usize {
        self.ledger().live.values().filter(|k| **k == kind).count()
    }

    pub fn is_live(&self, id: u64) -> bool {
        self.ledger().live.contains_key(&id)
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.ledger().events.clone()
    }

    pub fn violations(&self) -> Vec<String> {
        self.ledger().violations.clone()
    }

    pub fn semaphore(&self, id: u64) -> SemaphoreCounters {
        self.ledger().semaphores.get(&id).copied().unwrap_or_default()
    }

    /// Ids released, in release order
    pub fn released(&self) -> Vec<u64> {
        self.ledger()
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Released { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Position of an event in the global event log
    pub fn position(&self, pred: impl Fn(&MockEvent) -> bool) -> Option<usize> {
        self.ledger().events.iter().position(pred)
    }

    pub fn commands(&self, cmd: u64) -> Vec<MockCommand> {
        self.ledger().recordings.get(&cmd).map(|r| r.commands.clone()).unwrap_or_default()
    }

    pub fn buffer_data(&self, id: u64) -> Vec<u8> {
        self.ledger().buffers.get(&id).map(|b| b.data.clone()).unwrap_or_default()
    }

    pub fn image_layout(&self, id: u64) -> Option<ImageLayout> {
        self.ledger().images.get(&id).map(|i| i.layout)
    }

    pub fn image_data(&self, id: u64) -> Vec<u8> {
        self.ledger().images.get(&id).map(|i| i.data.clone()).unwrap_or_default()
    }

    pub fn image_format(&self, id: u64) -> Option<Format> {
        self.ledger().images.get(&id).map(|i| i.format)
    }

    /// Image a view was created from
    pub fn view_image(&self, view: u64) -> Option<u64> {
        self.ledger().views.get(&view).copied()
    }

    /// `(view, sampler)` written at `binding` of `set`
    pub fn descriptor_image(&self, set: u64, binding: u32) -> Option<(u64, u64)> {
        self.ledger().image_writes.get(&(set, binding)).copied()
    }

    /// Buffer written at `binding` of `set`
    pub fn descriptor_buffer(&self, set: u64, binding: u32) -> Option<u64> {
        self.ledger().descriptor_writes.get(&(set, binding)).copied()
    }

    pub fn pipeline_topology(&self, pipeline: u64) -> Option<PrimitiveTopology> {
        self.ledger().topologies.get(&pipeline).copied()
    }

    pub fn count(&self, pred: impl Fn(&MockEvent) -> bool) -> usize {
        self.ledger().events.iter().filter(|e| pred(e)).count()
    }

    // ===== INTERNALS =====

    fn make(&self, kind: MockKind) -> Result<MockHandle> {
        let mut ledger = self.ledger();
        if let Some(remaining) = ledger.fail_create.get_mut(&kind) {
            *remaining -= 1;
            if *remaining == 0 {
                ledger.fail_create.remove(&kind);
                return Err(Error::OutOfMemory);
            }
        }
        let id = ledger.next_id;
        ledger.next_id += 1;
        ledger.live.insert(id, kind);
        ledger.events.push(MockEvent::Created { id, kind });
        Ok(MockHandle {
            id,
            kind,
            ledger: self.ledger.clone(),
        })
    }

    fn check_live(ledger: &mut Ledger, handle: &MockHandle, what: &str) {
        if !ledger.live.contains_key(&handle.id) {
            ledger.violation(format!("{} uses released {:?} #{}", what, handle.kind, handle.id));
        }
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for MockDevice {
    type Semaphore = MockHandle;
    type Swapchain = MockHandle;
    type Image = MockHandle;
    type ImageView = MockHandle;
    type RenderPass = MockHandle;
    type Framebuffer = MockHandle;
    type ShaderModule = MockHandle;
    type DescriptorSetLayout = MockHandle;
    type DescriptorPool = MockHandle;
    type DescriptorSet = MockHandle;
    type Pipeline = MockHandle;
    type CommandPool = MockHandle;
    type CommandBuffer = MockHandle;
    type Buffer = MockHandle;
    type Sampler = MockHandle;

    fn surface_support(&self) -> Result<SurfaceSupport> {
        Ok(self.ledger().surface.clone())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc, old: Option<&MockHandle>) -> Result<MockHandle> {
        // the hint is retired whether or not the creation succeeds
        if let Some(old) = old {
            let mut ledger = self.ledger();
            Self::check_live(&mut ledger, old, "create_swapchain hint");
            if !ledger.retired_swapchains.insert(old.id) {
                ledger.violation(format!("swapchain #{} handed off as old_swapchain twice", old.id));
            }
        }
        let handle = self.make(MockKind::Swapchain)?;
        let mut ledger = self.ledger();
        ledger.swapchains.insert(
            handle.id,
            MockSwapchain {
                extent: desc.extent,
                image_count: desc.min_image_count,
                next_index: 0,
                acquired: None,
            },
        );
        ledger.events.push(MockEvent::SwapchainCreated {
            id: handle.id,
            old: old.map(|o| o.id),
            extent: desc.extent,
        });
        Ok(handle)
    }

    fn swapchain_image_count(&self, swapchain: &MockHandle) -> u32 {
        self.ledger().swapchains.get(&swapchain.id).map(|s| s.image_count).unwrap_or(0)
    }

    fn create_swapchain_views(&self, swapchain: &MockHandle) -> Result<Vec<MockHandle>> {
        let count = self.swapchain_image_count(swapchain);
        (0..count).map(|_| self.make(MockKind::ImageView)).collect()
    }

    fn acquire_next_image(&self, swapchain: &MockHandle, signal: &MockHandle) -> Result<u32> {
        let mut ledger = self.ledger();
        Self::check_live(&mut ledger, swapchain, "acquire");
        if ledger.gpu_busy {
            ledger.violation("acquire while the previous frame is still in flight".to_string());
        }
        if let Some(error) = ledger.fail_acquire.pop_front() {
            ledger.events.push(MockEvent::AcquireFailed { swapchain: swapchain.id, error: error.clone() });
            return Err(error);
        }
        let surface_extent = ledger.surface_extent;
        let retired = ledger.retired_swapchains.contains(&swapchain.id);
        let Some(chain) = ledger.swapchains.get_mut(&swapchain.id) else {
            return Err(Error::InvalidResource(format!("unknown swapchain #{}", swapchain.id)));
        };
        if retired || chain.extent != surface_extent {
            ledger.events.push(MockEvent::AcquireFailed {
                swapchain: swapchain.id,
                error: Error::SwapchainOutOfDate,
            });
            return Err(Error::SwapchainOutOfDate);
        }
        let index = chain.next_index;
        chain.next_index = (index + 1) % chain.image_count.max(1);
        let previous = chain.acquired.replace(index);
        if previous.is_some() {
            ledger.violation(format!("image acquired while index {:?} was never presented", previous));
        }
        ledger.signal(signal.id);
        ledger.events.push(MockEvent::Acquire {
            swapchain: swapchain.id,
            image_index: index,
            signal: signal.id,
        });
        Ok(index)
    }

    fn present(&self, swapchain: &MockHandle, image_index: u32, wait: &MockHandle) -> Result<()> {
        let mut ledger = self.ledger();
        Self::check_live(&mut ledger, swapchain, "present");
        let acquired = ledger.swapchains.get_mut(&swapchain.id).and_then(|c| c.acquired.take());
        if acquired != Some(image_index) {
            ledger.violation(format!("presented index {} but acquired {:?}", image_index, acquired));
        }
        ledger.wait(wait.id);
        if let Some(error) = ledger.fail_present.pop_front() {
            ledger.events.push(MockEvent::PresentFailed { swapchain: swapchain.id, error: error.clone() });
            return Err(error);
        }
        let surface_extent = ledger.surface_extent;
        let stale = ledger.swapchains.get(&swapchain.id).map(|c| c.extent != surface_extent).unwrap_or(true);
        if stale {
            ledger.events.push(MockEvent::PresentFailed {
                swapchain: swapchain.id,
                error: Error::SwapchainOutOfDate,
            });
            return Err(Error::SwapchainOutOfDate);
        }
        ledger.events.push(MockEvent::Present {
            swapchain: swapchain.id,
            image_index,
            wait: wait.id,
        });
        Ok(())
    }

    fn create_semaphore(&self) -> Result<MockHandle> {
        self.make(MockKind::Semaphore)
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<MockHandle> {
        if desc.extent.is_zero_area() {
            return Err(Error::InvalidResource("zero-area image".to_string()));
        }
        let image = self.make(MockKind::Image)?;
        // only sampled images keep their texels
        let texels = match desc.usage {
            ImageUsage::Sampled => desc.extent.width as usize * desc.extent.height as usize,
            _ => 0,
        };
        self.ledger().images.insert(
            image.id,
            MockImage {
                extent: desc.extent,
                format: desc.format,
                layout: ImageLayout::Undefined,
                data: vec![0; texels * desc.format.size_in_bytes() as usize],
            },
        );
        Ok(image)
    }

    fn create_image_view(&self, image: &MockHandle) -> Result<MockHandle> {
        Self::check_live(&mut self.ledger(), image, "create_image_view");
        let view = self.make(MockKind::ImageView)?;
        self.ledger().views.insert(view.id, image.id);
        Ok(view)
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> Result<MockHandle> {
        self.make(MockKind::Sampler)
    }

    fn create_render_pass(&self, _desc: &RenderPassDesc) -> Result<MockHandle> {
        self.make(MockKind::RenderPass)
    }

    fn create_framebuffer(&self, render_pass: &MockHandle, attachments: &[&MockHandle], _extent: Extent2D) -> Result<MockHandle> {
        {
            let mut ledger = self.ledger();
            Self::check_live(&mut ledger, render_pass, "create_framebuffer");
            for attachment in attachments {
                Self::check_live(&mut ledger, attachment, "create_framebuffer");
            }
        }
        self.make(MockKind::Framebuffer)
    }

    fn create_shader_module(&self, code: &ShaderCode) -> Result<MockHandle> {
        if code.words().is_empty() {
            return Err(Error::InvalidResource(format!("empty shader '{}'", code.name())));
        }
        self.make(MockKind::ShaderModule)
    }

    fn create_descriptor_set_layout(&self, _bindings: &[DescriptorBinding]) -> Result<MockHandle> {
        self.make(MockKind::DescriptorSetLayout)
    }

    fn create_descriptor_pool(&self, _bindings: &[DescriptorBinding], _max_sets: u32) -> Result<MockHandle> {
        self.make(MockKind::DescriptorPool)
    }

    fn allocate_descriptor_set(&self, pool: &MockHandle, layout: &MockHandle) -> Result<MockHandle> {
        {
            let mut ledger = self.ledger();
            Self::check_live(&mut ledger, pool, "allocate_descriptor_set");
            Self::check_live(&mut ledger, layout, "allocate_descriptor_set");
        }
        self.make(MockKind::DescriptorSet)
    }

    fn write_descriptor_buffer(&self, set: &MockHandle, binding: u32, _kind: DescriptorKind, buffer: &MockHandle) -> Result<()> {
        let mut ledger = self.ledger();
        Self::check_live(&mut ledger, buffer, "write_descriptor_buffer");
        ledger.descriptor_writes.insert((set.id, binding), buffer.id);
        Ok(())
    }

    fn write_descriptor_image(&self, set: &MockHandle, binding: u32, view: &MockHandle, sampler: &MockHandle) -> Result<()> {
        let mut ledger = self.ledger();
        Self::check_live(&mut ledger, view, "write_descriptor_image");
        Self::check_live(&mut ledger, sampler, "write_descriptor_image");
        ledger.image_writes.insert((set.id, binding), (view.id, sampler.id));
        Ok(())
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_, Self>) -> Result<MockHandle> {
        {
            let mut ledger = self.ledger();
            Self::check_live(&mut ledger, desc.vertex_shader, "create_graphics_pipeline");
            Self::check_live(&mut ledger, desc.fragment_shader, "create_graphics_pipeline");
            Self::check_live(&mut ledger, desc.render_pass, "create_graphics_pipeline");
        }
        let pipeline = self.make(MockKind::Pipeline)?;
        self.ledger().topologies.insert(pipeline.id, desc.topology);
        Ok(pipeline)
    }

    fn create_compute_pipeline(&self, shader: &MockHandle, layout: &MockHandle) -> Result<MockHandle> {
        {
            let mut ledger = self.ledger();
            Self::check_live(&mut ledger, shader, "create_compute_pipeline");
            Self::check_live(&mut ledger, layout, "create_compute_pipeline");
        }
        self.make(MockKind::Pipeline)
    }

    fn create_command_pool(&self, _queue: QueueKind, flags: CommandPoolFlags) -> Result<MockHandle> {
        let pool = self.make(MockKind::CommandPool)?;
        self.ledger().pools.insert(pool.id, flags);
        Ok(pool)
    }

    fn allocate_command_buffers(&self, pool: &MockHandle, count: u32) -> Result<Vec<MockHandle>> {
        let pool_flags = self.ledger().pools.get(&pool.id).copied().unwrap_or(CommandPoolFlags::empty());
        let mut buffers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let cmd = self.make(MockKind::CommandBuffer)?;
            self.ledger().recordings.insert(
                cmd.id,
                MockRecording {
                    pool_flags,
                    state: RecordState::Initial,
                    usage: CommandBufferUsage::empty(),
                    commands: Vec::new(),
                    submissions_since_begin: 0,
                },
            );
            buffers.push(cmd);
        }
        Ok(buffers)
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<MockHandle> {
        let buffer = self.make(MockKind::Buffer)?;
        self.ledger().buffers.insert(
            buffer.id,
            MockBuffer {
                data: vec![0; desc.size as usize],
                location: desc.location,
            },
        );
        Ok(buffer)
    }

    fn write_buffer(&self, buffer: &MockHandle, offset: u64, data: &[u8]) -> Result<()> {
        let mut ledger = self.ledger();
        let target = ledger
            .buffers
            .get_mut(&buffer.id)
            .ok_or_else(|| Error::InvalidResource(format!("unknown buffer #{}", buffer.id)))?;
        if target.location != MemoryLocation::HostVisible {
            return Err(Error::InvalidResource("buffer is not host visible".to_string()));
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > target.data.len() {
            return Err(Error::InvalidResource(format!(
                "write of {} bytes at {} overflows buffer of {} bytes",
                data.len(),
                offset,
                target.data.len()
            )));
        }
        target.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: &MockHandle, offset: u64, out: &mut [u8]) -> Result<()> {
        let ledger = self.ledger();
        let source = ledger
            .buffers
            .get(&buffer.id)
            .ok_or_else(|| Error::InvalidResource(format!("unknown buffer #{}", buffer.id)))?;
        if source.location != MemoryLocation::HostVisible {
            return Err(Error::InvalidResource("buffer is not host visible".to_string()));
        }
        let start = offset as usize;
        let end = start + out.len();
        if end > source.data.len() {
            return Err(Error::InvalidResource("read past the end of the buffer".to_string()));
        }
        out.copy_from_slice(&source.data[start..end]);
        Ok(())
    }

    fn cmd_begin(&self, cmd: &MockHandle, usage: CommandBufferUsage) -> Result<()> {
        let mut ledger = self.ledger();
        let recording = ledger
            .recordings
            .get_mut(&cmd.id)
            .ok_or_else(|| Error::InvalidResource(format!("unknown command buffer #{}", cmd.id)))?;
        let problem = match recording.state {
            RecordState::Recording => Some("begin on a command buffer already recording"),
            RecordState::Executable if !recording.pool_flags.contains(CommandPoolFlags::RESET_COMMAND_BUFFER) => {
                Some("re-recorded a command buffer whose pool lacks RESET_COMMAND_BUFFER")
            }
            _ => None,
        };
        recording.state = RecordState::Recording;
        recording.usage = usage;
        recording.commands.clear();
        recording.submissions_since_begin = 0;
        if let Some(problem) = problem {
            ledger.violation(format!("{} (#{})", problem, cmd.id));
        }
        Ok(())
    }

    fn cmd_end(&self, cmd: &MockHandle) -> Result<()> {
        let mut ledger = self.ledger();
        let recording = ledger
            .recordings
            .get_mut(&cmd.id)
            .ok_or_else(|| Error::InvalidResource(format!("unknown command buffer #{}", cmd.id)))?;
        let was_recording = recording.state == RecordState::Recording;
        recording.state = RecordState::Executable;
        if !was_recording {
            ledger.violation(format!("end on command buffer #{} that is not recording", cmd.id));
        }
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: &MockHandle,
        render_pass: &MockHandle,
        framebuffer: &MockHandle,
        extent: Extent2D,
        _clear_values: &[ClearValue],
    ) -> Result<()> {
        self.ledger().record(
            cmd.id,
            MockCommand::BeginRenderPass {
                render_pass: render_pass.id,
                framebuffer: framebuffer.id,
                extent,
            },
        )
    }

    fn cmd_end_render_pass(&self, cmd: &MockHandle) -> Result<()> {
        self.ledger().record(cmd.id, MockCommand::EndRenderPass)
    }

    fn cmd_bind_pipeline(&self, cmd: &MockHandle, pipeline: &MockHandle) -> Result<()> {
        self.ledger().record(cmd.id, MockCommand::BindPipeline(pipeline.id))
    }

    fn cmd_bind_descriptor_set(&self, cmd: &MockHandle, _pipeline: &MockHandle, set: &MockHandle) -> Result<()> {
        self.ledger().record(cmd.id, MockCommand::BindDescriptorSet(set.id))
    }

    fn cmd_bind_vertex_buffer(&self, cmd: &MockHandle, buffer: &MockHandle) -> Result<()> {
        self.ledger().record(cmd.id, MockCommand::BindVertexBuffer(buffer.id))
    }

    fn cmd_draw(&self, cmd: &MockHandle, vertex_count: u32, first_vertex: u32) -> Result<()> {
        self.ledger().record(cmd.id, MockCommand::Draw { vertex_count, first_vertex })
    }

    fn cmd_dispatch(&self, cmd: &MockHandle, x: u32, y: u32, z: u32) -> Result<()> {
        self.ledger().record(cmd.id, MockCommand::Dispatch { x, y, z })
    }

    fn cmd_pipeline_barrier(&self, cmd: &MockHandle, barrier: &MemoryBarrier) -> Result<()> {
        self.ledger().record(cmd.id, MockCommand::Barrier(*barrier))
    }

    fn cmd_copy_buffer(&self, cmd: &MockHandle, src: &MockHandle, dst: &MockHandle, size: u64) -> Result<()> {
        self.ledger().record(cmd.id, MockCommand::CopyBuffer { src: src.id, dst: dst.id, size })
    }

    fn cmd_image_barrier(&self, cmd: &MockHandle, image: &MockHandle, barrier: &ImageBarrier) -> Result<()> {
        self.ledger().record(cmd.id, MockCommand::ImageBarrier { image: image.id, barrier: *barrier })
    }

    fn cmd_copy_buffer_to_image(&self, cmd: &MockHandle, src: &MockHandle, dst: &MockHandle, extent: Extent2D) -> Result<()> {
        self.ledger().record(cmd.id, MockCommand::CopyBufferToImage { src: src.id, dst: dst.id, extent })
    }

    fn submit(
        &self,
        queue: QueueKind,
        cmd: &MockHandle,
        waits: &[SemaphoreWait<'_, Self>],
        signals: &[&MockHandle],
    ) -> Result<()> {
        let mut ledger = self.ledger();
        Self::check_live(&mut ledger, cmd, "submit");
        if let Some(error) = ledger.fail_submit.pop_front() {
            return Err(error);
        }
        if ledger.gpu_busy {
            ledger.violation("submission while the previous one is still in flight".to_string());
        }
        let Some(recording) = ledger.recordings.get_mut(&cmd.id) else {
            return Err(Error::InvalidResource(format!("unknown command buffer #{}", cmd.id)));
        };
        let problem = if recording.state != RecordState::Executable {
            Some(format!("submitted command buffer #{} that is not executable", cmd.id))
        } else if recording.usage.contains(CommandBufferUsage::ONE_TIME_SUBMIT) && recording.submissions_since_begin > 0 {
            Some(format!("one-time command buffer #{} submitted twice", cmd.id))
        } else {
            None
        };
        recording.submissions_since_begin += 1;
        let commands = recording.commands.clone();
        if let Some(problem) = problem {
            ledger.violation(problem);
        }
        for wait in waits {
            ledger.wait(wait.semaphore.id);
        }
        for signal in signals {
            ledger.signal(signal.id);
        }
        ledger.execute(&commands);
        ledger.gpu_busy = true;
        ledger.events.push(MockEvent::Submit {
            queue,
            cmd: cmd.id,
            waits: waits.iter().map(|w| (w.semaphore.id, w.stage)).collect(),
            signals: signals.iter().map(|s| s.id).collect(),
        });
        Ok(())
    }

    fn queue_wait_idle(&self, queue: QueueKind) -> Result<()> {
        let mut ledger = self.ledger();
        ledger.gpu_busy = false;
        ledger.events.push(MockEvent::QueueWaitIdle(queue));
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        let mut ledger = self.ledger();
        ledger.events.push(MockEvent::WaitIdle);
        if let Some(error) = ledger.fail_wait_idle.pop_front() {
            return Err(error);
        }
        ledger.gpu_busy = false;
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_device_tests.rs"]
mod tests;
