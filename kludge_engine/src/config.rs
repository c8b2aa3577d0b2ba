/// Engine configuration shared by the backend and the presenter

use std::path::PathBuf;
use glam::Vec4;

use crate::device::types::{ColorSpace, Format, PresentMode, SurfaceFormat};

/// Configuration for device creation and swapchain selection
#[derive(Debug, Clone)]
pub struct Config {
    /// Enable validation/debug layers
    pub enable_validation: bool,
    /// Application name
    pub app_name: String,
    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),
    /// Surface format used when the surface offers it
    pub preferred_surface_format: SurfaceFormat,
    /// Present modes in order of preference; the first supported one wins
    pub present_mode_preference: Vec<PresentMode>,
    /// Color attachment clear value (RGBA)
    pub clear_color: Vec4,
    /// Depth attachment clear value
    pub clear_depth: f32,
    /// Root of the compiled shader tree
    pub shader_root: PathBuf,
    /// Capacity of the per-session GUI vertex buffer
    pub gui_max_vertices: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            app_name: "Kludge Application".to_string(),
            app_version: (1, 0, 0),
            preferred_surface_format: SurfaceFormat {
                format: Format::B8G8R8A8_UNORM,
                color_space: ColorSpace::SrgbNonlinear,
            },
            present_mode_preference: vec![PresentMode::Mailbox, PresentMode::FifoRelaxed, PresentMode::Fifo],
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            clear_depth: 1.0,
            shader_root: PathBuf::from("build/shaders"),
            gui_max_vertices: 16 * 1024,
        }
    }
}
