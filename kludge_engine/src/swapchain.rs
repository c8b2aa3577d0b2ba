//! Swapchain lifecycle
//!
//! One [`SwapchainLifecycle`] owns one generation of presentable images.
//! It is `Valid` until the presentation engine reports the chain out of
//! date (`Invalidated`), and `Retired` once its images are released. A
//! rebuild constructs the next generation with the old chain as hand-off
//! hint; the old chain is retired only after that construction succeeded.
//! A chain is handed off at most once: the device retires it even when the
//! construction fails, so a retried rebuild starts from scratch.

use std::cell::Cell;
use std::sync::Arc;

use crate::config::Config;
use crate::device::types::*;
use crate::device::GraphicsDevice;
use crate::error::{Error, Result};
use crate::{engine_debug, engine_error, engine_info, engine_violation, engine_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    Valid,
    Invalidated,
    Retired,
}

/// Immutable parameters of one generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainState {
    pub surface_format: SurfaceFormat,
    pub present_mode: PresentMode,
    pub extent: Extent2D,
    pub image_count: u32,
    pub generation: u64,
}

pub struct SwapchainLifecycle<D: GraphicsDevice> {
    device: Arc<D>,
    chain: Option<D::Swapchain>,
    state: SwapchainState,
    status: Cell<SwapchainStatus>,
    handed_off: Cell<bool>,
}

impl<D: GraphicsDevice> SwapchainLifecycle<D> {
    /// Build a new generation sized for `drawable`
    ///
    /// `previous` (if any) is passed to the device as the hand-off hint and
    /// stays alive; the caller retires it afterwards.
    pub fn build(device: Arc<D>, config: &Config, drawable: Extent2D, previous: Option<&Self>) -> Result<Self> {
        let support = device.surface_support()?;
        let surface_format = select_surface_format(&support.formats, config.preferred_surface_format)?;
        let present_mode = select_present_mode(&support.present_modes, &config.present_mode_preference)?;
        let extent = select_extent(&support.capabilities, drawable);
        let min_image_count = select_image_count(&support.capabilities);

        let desc = SwapchainDesc {
            surface_format,
            present_mode,
            extent,
            min_image_count,
        };
        let hint = match previous {
            Some(previous) => previous.hand_off()?,
            None => None,
        };
        let chain = device.create_swapchain(&desc, hint)?;
        let image_count = device.swapchain_image_count(&chain);
        let generation = previous.map_or(1, |p| p.state.generation + 1);

        engine_info!(
            "kludge::swapchain",
            "Swapchain generation {} created: {}x{} {:?} {:?}, {} images",
            generation,
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            image_count
        );

        Ok(Self {
            device,
            chain: Some(chain),
            state: SwapchainState {
                surface_format,
                present_mode,
                extent,
                image_count,
                generation,
            },
            status: Cell::new(SwapchainStatus::Valid),
            handed_off: Cell::new(false),
        })
    }

    pub fn state(&self) -> &SwapchainState {
        &self.state
    }

    pub fn status(&self) -> SwapchainStatus {
        self.status.get()
    }

    pub fn extent(&self) -> Extent2D {
        self.state.extent
    }

    pub fn image_count(&self) -> u32 {
        self.state.image_count
    }

    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    /// Underlying chain; a retired lifecycle has none
    pub fn raw(&self) -> Result<&D::Swapchain> {
        self.chain.as_ref().ok_or_else(|| {
            engine_violation!(
                "kludge::swapchain",
                "generation {} used after retirement",
                self.state.generation
            )
        })
    }

    /// True once the chain was passed as `old_swapchain`
    pub fn is_handed_off(&self) -> bool {
        self.handed_off.get()
    }

    /// Chain to pass as hand-off hint, `None` if it was already handed off
    ///
    /// A handed-off chain can no longer acquire and reports out-of-date.
    fn hand_off(&self) -> Result<Option<&D::Swapchain>> {
        let chain = self.raw()?;
        if self.handed_off.replace(true) {
            engine_debug!(
                "kludge::swapchain",
                "Generation {} already handed off, building without hint",
                self.state.generation
            );
            return Ok(None);
        }
        self.status.set(SwapchainStatus::Invalidated);
        Ok(Some(chain))
    }

    /// Acquire the next presentable image, arming `signal`
    pub fn acquire_next_image(&self, signal: &D::Semaphore) -> Result<u32> {
        let chain = self.raw()?;
        if self.status.get() == SwapchainStatus::Invalidated {
            return Err(Error::SwapchainOutOfDate);
        }
        let index = self
            .device
            .acquire_next_image(chain, signal)
            .map_err(|e| self.note_failure("acquire", e))?;
        if index >= self.state.image_count {
            engine_error!(
                "kludge::swapchain",
                "Acquired image {} out of range (count {})",
                index,
                self.state.image_count
            );
            return Err(Error::BackendError(format!(
                "acquired image index {} >= image count {}",
                index, self.state.image_count
            )));
        }
        Ok(index)
    }

    /// Present `image_index` once `wait` is signalled
    pub fn present(&self, image_index: u32, wait: &D::Semaphore) -> Result<()> {
        let chain = self.raw()?;
        if self.status.get() == SwapchainStatus::Invalidated {
            return Err(Error::SwapchainOutOfDate);
        }
        self.device
            .present(chain, image_index, wait)
            .map_err(|e| self.note_failure("present", e))
    }

    /// Mark the chain as stale (e.g. the window was resized)
    pub fn invalidate(&self) {
        if self.status.get() == SwapchainStatus::Valid {
            engine_debug!("kludge::swapchain", "Generation {} invalidated", self.state.generation);
            self.status.set(SwapchainStatus::Invalidated);
        }
    }

    /// Release the presentable images; terminal
    pub fn retire(&mut self) {
        if let Some(chain) = self.chain.take() {
            drop(chain);
            self.status.set(SwapchainStatus::Retired);
            engine_debug!("kludge::swapchain", "Generation {} retired", self.state.generation);
        }
    }

    fn note_failure(&self, what: &str, error: Error) -> Error {
        if error.is_out_of_date() {
            engine_debug!(
                "kludge::swapchain",
                "Generation {} out of date at {}",
                self.state.generation,
                what
            );
            self.status.set(SwapchainStatus::Invalidated);
        }
        error
    }
}

impl<D: GraphicsDevice> Drop for SwapchainLifecycle<D> {
    fn drop(&mut self) {
        self.retire();
    }
}

// ============================================================================
// Selection policy
// ============================================================================

/// Preferred format when offered, otherwise the first one
pub fn select_surface_format(available: &[SurfaceFormat], preferred: SurfaceFormat) -> Result<SurfaceFormat> {
    if available.contains(&preferred) {
        return Ok(preferred);
    }
    match available.first() {
        Some(first) => {
            engine_warn!(
                "kludge::swapchain",
                "Using fallback surface format {:?}/{:?}",
                first.format,
                first.color_space
            );
            Ok(*first)
        }
        None => Err(Error::InitializationFailed("surface reports no formats".to_string())),
    }
}

/// First preferred mode the surface supports, otherwise the first one offered
pub fn select_present_mode(available: &[PresentMode], preference: &[PresentMode]) -> Result<PresentMode> {
    if let Some(mode) = preference.iter().find(|mode| available.contains(mode)) {
        return Ok(*mode);
    }
    match available.first() {
        Some(first) => {
            engine_warn!("kludge::swapchain", "Using fallback present mode {:?}", first);
            Ok(*first)
        }
        None => Err(Error::InitializationFailed("surface reports no present modes".to_string())),
    }
}

/// Current surface extent, or `drawable` clamped to the limits when undefined
pub fn select_extent(capabilities: &SurfaceCapabilities, drawable: Extent2D) -> Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    Extent2D {
        width: drawable
            .width
            .max(capabilities.min_image_extent.width)
            .min(capabilities.max_image_extent.width),
        height: drawable
            .height
            .max(capabilities.min_image_extent.height)
            .min(capabilities.max_image_extent.height),
    }
}

/// One more than the minimum, bounded by the maximum (0 = unbounded)
pub fn select_image_count(capabilities: &SurfaceCapabilities) -> u32 {
    let wanted = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        wanted.min(capabilities.max_image_count)
    } else {
        wanted
    }
}

#[cfg(test)]
#[path = "swapchain_tests.rs"]
mod tests;
