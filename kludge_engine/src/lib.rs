/*!
# Kludge Engine

Frame-presentation core for a thin Vulkan-style graphics API.

The crate is backend-agnostic: everything is written against the
[`GraphicsDevice`](kludge::device::GraphicsDevice) trait, and the Vulkan
backend lives in `kludge_engine_renderer_vulkan`.

## Architecture

- **ResourceScope**: ordered ownership, reverse-order teardown, in-place replacement
- **SwapchainLifecycle**: one swapchain generation (Valid → Invalidated → Retired)
- **FrameScheduler**: acquire → record → submit → present → wait, one frame in flight
- **RendererSession**: every per-swapchain resource, rebuilt as a unit
- **Presenter**: the driver API (`pump_frame` / `shutdown`)
- **ComputeJob**: headless compute dispatch with readback
- **Texture / StaticVertexBuffer**: static data uploaded once through staging
*/

// Internal modules
mod error;
mod engine;
pub mod log;
mod config;
pub mod device;
mod resource_scope;
mod swapchain;
mod frame_scheduler;
mod session;
mod presenter;
mod compute;
mod upload;
mod shader;
pub mod gui;
pub mod window;

// Main kludge namespace module
pub mod kludge {
    // Error types
    pub use crate::error::{KludgeError, KludgeResult};
    pub use crate::error::{KludgeError as Error, KludgeResult as Result};

    // Engine singleton (logger slot)
    pub use crate::engine::Engine;

    pub use crate::config::Config;

    // Frame-presentation core
    pub use crate::resource_scope::{Handle, ResourceKey, ResourceScope};
    pub use crate::swapchain::{
        select_extent, select_image_count, select_present_mode, select_surface_format,
        SwapchainLifecycle, SwapchainState, SwapchainStatus,
    };
    pub use crate::frame_scheduler::{FramePhase, FrameScheduler, FrameSyncPair};
    pub use crate::session::{
        FrameInput, RecordingMode, RendererSession, SessionAssets, SessionContext, SessionDesc, SessionShaders,
        GUI_SHADER, TEXTURE_BINDING,
    };
    pub use crate::presenter::{FrameStatus, Presenter, PresenterStats};
    pub use crate::compute::ComputeJob;
    pub use crate::upload::{submit_one_shot, StaticVertexBuffer, Texture, TextureData, VertexData};
    pub use crate::shader::{ShaderCode, ShaderLibrary, SPIRV_MAGIC};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
    }

    // Device abstraction and descriptor types
    pub mod device {
        pub use crate::device::*;
    }

    // GUI overlay
    pub mod gui {
        pub use crate::gui::*;
    }

    // Window integration
    pub mod window {
        pub use crate::window::*;
    }
}

// Re-export math library at crate root
pub use glam;
