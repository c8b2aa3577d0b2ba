/// Surface/window provider consumed by the presenter
///
/// The core only needs the drawable size and whether the user asked to
/// close; window creation and event polling stay with the driver.

use std::cell::Cell;
use std::sync::Arc;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::device::types::Extent2D;

pub trait SurfaceProvider {
    /// Current drawable size in pixels (zero while minimised)
    fn drawable_extent(&self) -> Extent2D;

    fn should_close(&self) -> bool;
}

/// `SurfaceProvider` over a winit window
pub struct WinitSurface {
    window: Arc<Window>,
    close_requested: Cell<bool>,
    resized: Cell<bool>,
}

impl WinitSurface {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            close_requested: Cell::new(false),
            resized: Cell::new(false),
        }
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Track close and resize requests
    pub fn handle_event(&self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => self.close_requested.set(true),
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => self.resized.set(true),
            _ => {}
        }
    }

    /// True once per resize since the last call
    pub fn take_resized(&self) -> bool {
        self.resized.replace(false)
    }
}

impl SurfaceProvider for WinitSurface {
    fn drawable_extent(&self) -> Extent2D {
        let size = self.window.inner_size();
        Extent2D::new(size.width, size.height)
    }

    fn should_close(&self) -> bool {
        self.close_requested.get()
    }
}

/// Fixed-size surface for headless runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSurface {
    pub extent: Extent2D,
}

impl SurfaceProvider for FixedSurface {
    fn drawable_extent(&self) -> Extent2D {
        self.extent
    }

    fn should_close(&self) -> bool {
        false
    }
}
