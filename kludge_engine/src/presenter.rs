//! Presenter - the driver-facing frame loop
//!
//! The presenter owns the uploaded [`SessionAssets`] and the current
//! [`RendererSession`] inside its own [`ResourceScope`]. `pump_frame` renders one frame and transparently
//! rebuilds the session when the swapchain goes out of date; `shutdown`
//! waits for the device to go idle and then releases everything. Any other
//! frame failure poisons the presenter: only `shutdown` remains valid.

use std::sync::Arc;

use crate::config::Config;
use crate::device::GraphicsDevice;
use crate::device::types::Extent2D;
use crate::error::Result;
use crate::resource_scope::{Handle, ResourceScope};
use crate::session::{FrameInput, RendererSession, SessionAssets, SessionContext, SessionDesc, SessionShaders};
use crate::{engine_debug, engine_error, engine_info, engine_trace, engine_violation};

/// Outcome of one `pump_frame` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A frame was presented
    Rendered,
    /// The swapchain was out of date; the session was rebuilt and nothing was presented
    Recreated,
    /// The drawable area is empty (minimized window); nothing was done
    Suspended,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenterStats {
    pub frames_rendered: u64,
    pub recreations: u64,
    pub suspended_frames: u64,
}

pub struct Presenter<D: GraphicsDevice> {
    scope: ResourceScope,
    assets: Handle<Arc<SessionAssets<D>>>,
    session: Handle<RendererSession<D>>,
    device: Arc<D>,
    config: Config,
    desc: SessionDesc,
    shaders: SessionShaders,
    stats: PresenterStats,
    needs_rebuild: bool,
    failed: bool,
    shut_down: bool,
}

impl<D: GraphicsDevice> Presenter<D> {
    pub fn new(
        device: Arc<D>,
        config: Config,
        desc: SessionDesc,
        shaders: SessionShaders,
        drawable: Extent2D,
    ) -> Result<Self> {
        let mut scope = ResourceScope::new("presenter");
        let assets = Arc::new(SessionAssets::upload(&device, &desc)?);
        let assets = scope.register("assets", assets)?;
        let ctx = SessionContext {
            config: &config,
            desc: &desc,
            shaders: &shaders,
            assets: scope.get(assets)?,
            drawable,
        };
        let session = RendererSession::build(device.clone(), &ctx, None)?;
        let session = scope.register("session", session)?;
        engine_info!("kludge::presenter", "Presenter ready ({})", desc.shader);

        Ok(Self {
            scope,
            assets,
            session,
            device,
            config,
            desc,
            shaders,
            stats: PresenterStats::default(),
            needs_rebuild: false,
            failed: false,
            shut_down: false,
        })
    }

    /// Render one frame, rebuilding the session if the swapchain is out of date
    pub fn pump_frame(&mut self, input: &FrameInput<'_>) -> Result<FrameStatus> {
        if self.shut_down {
            return Err(engine_violation!("kludge::presenter", "pump_frame after shutdown"));
        }
        if self.failed {
            return Err(engine_violation!("kludge::presenter", "pump_frame after a fatal frame error"));
        }
        if input.drawable_extent.is_zero_area() {
            self.stats.suspended_frames += 1;
            return Ok(FrameStatus::Suspended);
        }
        if self.needs_rebuild {
            self.rebuild(input.drawable_extent)?;
        }

        let session = self.scope.get_mut(self.session)?;
        match session.render_frame(input) {
            Ok(image_index) => {
                self.stats.frames_rendered += 1;
                engine_trace!("kludge::presenter", "Presented image {}", image_index);
                Ok(FrameStatus::Rendered)
            }
            Err(e) if e.is_out_of_date() => {
                engine_debug!("kludge::presenter", "Swapchain out of date, rebuilding session");
                self.rebuild(input.drawable_extent)?;
                Ok(FrameStatus::Recreated)
            }
            Err(e) => {
                engine_error!("kludge::presenter", "Frame failed, presenter unusable until shutdown: {}", e);
                self.failed = true;
                Err(e)
            }
        }
    }

    /// Force a rebuild before the next frame (e.g. after a window resize)
    pub fn invalidate(&mut self) {
        self.needs_rebuild = true;
    }

    /// Wait for the device, then release every session resource
    ///
    /// Teardown runs even when the wait fails; the wait error is returned afterwards.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        let idle = self.device.wait_idle();
        if let Err(e) = &idle {
            engine_error!("kludge::presenter", "wait_idle failed during shutdown: {}", e);
        }
        self.scope.unwind();
        engine_info!(
            "kludge::presenter",
            "Presenter shut down after {} frames, {} recreations",
            self.stats.frames_rendered,
            self.stats.recreations
        );
        idle
    }

    pub fn session(&self) -> Result<&RendererSession<D>> {
        self.scope.get(self.session)
    }

    pub fn stats(&self) -> PresenterStats {
        self.stats
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// True after a frame error other than out-of-date
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn rebuild(&mut self, drawable: Extent2D) -> Result<()> {
        self.device.wait_idle()?;
        let assets = self.scope.get(self.assets)?.clone();
        let ctx = SessionContext {
            config: &self.config,
            desc: &self.desc,
            shaders: &self.shaders,
            assets: &assets,
            drawable,
        };
        let device = self.device.clone();
        self.session = self
            .scope
            .replace(self.session, |old| RendererSession::build(device, &ctx, Some(old)))?;
        self.needs_rebuild = false;
        self.stats.recreations += 1;
        engine_info!(
            "kludge::presenter",
            "Session rebuilt ({} so far)",
            self.stats.recreations
        );
        Ok(())
    }
}

impl<D: GraphicsDevice> Drop for Presenter<D> {
    fn drop(&mut self) {
        self.shutdown().ok();
    }
}

#[cfg(test)]
#[path = "presenter_tests.rs"]
mod tests;
