//! Windowed demos on top of winit's `ApplicationHandler`

use std::sync::Arc;
use std::time::Instant;

use glam::Vec2;
use kludge_engine::kludge::device::Extent2D;
use kludge_engine::kludge::gui::GuiInput;
use kludge_engine::kludge::window::{SurfaceProvider, WinitSurface};
use kludge_engine::kludge::{Config, Error, FrameInput, FrameStatus, Presenter, Result, SessionShaders, ShaderLibrary};
use kludge_engine::{engine_error, engine_info};
use kludge_engine_renderer_vulkan::kludge::VulkanDevice;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId};

use crate::gui_demo::GuiDemo;
use crate::Demo;

/// Everything that lives while the window exists
struct Running {
    // must drop before `surface`, which keeps the window alive
    presenter: Presenter<VulkanDevice>,
    surface: WinitSurface,
    gui: Option<GuiDemo>,
    cursor: Vec2,
    clicked: bool,
    last_frame: Instant,
}

pub struct App {
    demo: Demo,
    config: Config,
    running: Option<Running>,
    result: Result<()>,
}

impl App {
    pub fn new(demo: Demo, config: Config) -> Self {
        Self {
            demo,
            config,
            running: None,
            result: Ok(()),
        }
    }

    pub fn into_result(self) -> Result<()> {
        self.result
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let desc = self.demo.session_desc()?;
        // textured demos open a window matching their image
        let size = desc
            .texture
            .as_ref()
            .map(|texture| texture.extent())
            .unwrap_or(Extent2D::new(640, 480));
        let attributes = Window::default_attributes()
            .with_title("Kludge Demo")
            .with_inner_size(LogicalSize::new(size.width, size.height));
        let window = event_loop
            .create_window(attributes)
            .map_err(|e| Error::InitializationFailed(format!("window: {}", e)))?;
        let window = Arc::new(window);

        let device = Arc::new(VulkanDevice::new(window.as_ref(), &self.config)?);
        engine_info!("kludge_demo", "Rendering {:?} on {}", self.demo, device.device_name());

        let mut library = ShaderLibrary::new(&self.config.shader_root);
        let shaders = SessionShaders::load(&mut library, &desc)?;

        let surface = WinitSurface::new(window);
        let presenter = Presenter::new(device, self.config.clone(), desc, shaders, surface.drawable_extent())?;

        Ok(Running {
            presenter,
            surface,
            gui: (self.demo == Demo::Gui).then(GuiDemo::new),
            cursor: Vec2::splat(-1.0),
            clicked: false,
            last_frame: Instant::now(),
        })
    }

    /// Stop the loop, keeping the first error seen
    fn stop(&mut self, event_loop: &ActiveEventLoop, error: Option<Error>) {
        if let Some(mut running) = self.running.take() {
            if let Err(e) = running.presenter.shutdown() {
                engine_error!("kludge_demo", "Shutdown failed: {}", e);
                if self.result.is_ok() {
                    self.result = Err(e);
                }
            }
            let stats = running.presenter.stats();
            engine_info!(
                "kludge_demo",
                "{} frames, {} recreations, {} suspended",
                stats.frames_rendered,
                stats.recreations,
                stats.suspended_frames
            );
        }
        if let Some(error) = error {
            engine_error!("kludge_demo", "Stopping: {}", error);
            self.result = Err(error);
        }
        event_loop.exit();
    }
}

impl Running {
    fn redraw(&mut self) -> Result<FrameStatus> {
        if self.surface.take_resized() {
            self.presenter.invalidate();
        }

        let now = Instant::now();
        let delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        let drawable_extent = self.surface.drawable_extent();
        let draw_list = self.gui.as_mut().map(|gui| {
            gui.build(GuiInput {
                cursor: self.cursor,
                clicked: std::mem::take(&mut self.clicked),
                display_size: Vec2::new(drawable_extent.width as f32, drawable_extent.height as f32),
                delta_time,
            })
        });

        self.presenter.pump_frame(&FrameInput {
            drawable_extent,
            uniforms: None,
            gui: draw_list.as_ref(),
        })
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                running.surface.window().request_redraw();
                self.running = Some(running);
            }
            Err(e) => self.stop(event_loop, Some(e)),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(running) = self.running.as_mut() else { return };
        running.surface.handle_event(&event);

        match event {
            WindowEvent::CursorMoved { position, .. } => {
                running.cursor = Vec2::new(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => running.clicked = true,
            WindowEvent::RedrawRequested => {
                if let Err(e) = running.redraw() {
                    self.stop(event_loop, Some(e));
                }
            }
            _ => {}
        }

        if self.running.as_ref().is_some_and(|r| r.surface.should_close()) {
            self.stop(event_loop, None);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = self.running.as_ref() {
            running.surface.window().request_redraw();
        }
    }
}
