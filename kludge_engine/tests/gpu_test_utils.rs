#![allow(dead_code)]
//! GPU test utilities - one shared Vulkan device for all integration tests
//!
//! ash-window refuses to create a second surface for the same window, and
//! winit allows a single event loop per process, so every windowed GPU test
//! shares the device created here.

use kludge_engine::kludge::{Config, ShaderLibrary};
use kludge_engine_renderer_vulkan::kludge::VulkanDevice;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use winit::event_loop::{EventLoop, EventLoopBuilder};
use winit::window::Window;

#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;
#[cfg(target_os = "linux")]
use winit::platform::x11::EventLoopBuilderExtX11;

/// Shared windowed device (initialized once)
static GPU_DEVICE: OnceLock<Arc<VulkanDevice>> = OnceLock::new();

/// Window backing the shared device's surface
/// Note: the EventLoop is leaked with mem::forget to keep the window valid
static GPU_WINDOW: OnceLock<Window> = OnceLock::new();

/// Directory of compiled demo shaders, taken from `KLUDGE_SHADER_ROOT`
pub const SHADER_ROOT_VAR: &str = "KLUDGE_SHADER_ROOT";

/// Shared windowed VulkanDevice, created on first use
pub fn get_test_device() -> Arc<VulkanDevice> {
    GPU_DEVICE
        .get_or_init(|| {
            let (window, event_loop) = create_test_window();
            let device = VulkanDevice::new(&window, &test_config())
                .expect("Failed to create VulkanDevice for tests");

            // EventLoop is not Sync and cannot live in a static
            std::mem::forget(event_loop);
            GPU_WINDOW.set(window).ok();

            Arc::new(device)
        })
        .clone()
}

/// Size of the hidden test window in physical pixels
pub fn test_window_extent() -> (u32, u32) {
    let size = GPU_WINDOW.get().map(|w| w.inner_size()).unwrap_or_default();
    (size.width, size.height)
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.app_name = "Kludge GPU Tests".to_string();
    if let Some(root) = shader_root() {
        config.shader_root = root;
    }
    config
}

/// Shader library over `KLUDGE_SHADER_ROOT`, or `None` when it is not set
pub fn shader_library() -> Option<ShaderLibrary> {
    match shader_root() {
        Some(root) => Some(ShaderLibrary::new(root)),
        None => {
            eprintln!("{} not set, skipping shader-dependent checks", SHADER_ROOT_VAR);
            None
        }
    }
}

fn shader_root() -> Option<PathBuf> {
    std::env::var_os(SHADER_ROOT_VAR).map(PathBuf::from)
}

/// Create a hidden window whose event loop may live outside the main thread
#[allow(deprecated)]
pub fn create_test_window() -> (Window, EventLoop<()>) {
    let event_loop = {
        #[cfg(any(target_os = "windows", target_os = "linux"))]
        {
            EventLoopBuilder::new().with_any_thread(true).build().unwrap()
        }
        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            EventLoopBuilder::new().build().unwrap()
        }
    };

    let window_attrs = Window::default_attributes()
        .with_title("Kludge GPU Test Window")
        .with_inner_size(winit::dpi::PhysicalSize::new(800, 600))
        .with_visible(false);

    let window = event_loop.create_window(window_attrs).unwrap();
    (window, event_loop)
}
