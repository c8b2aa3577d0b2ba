//! Per-frame state machine
//!
//! `Idle -> Acquiring -> Recording -> Submitted -> Presenting -> Idle`
//!
//! Exactly one frame is in flight. The scheduler blocks on the present
//! queue after every present, which is what makes reusing a single
//! [`FrameSyncPair`] legal: image-available is never re-armed by the next
//! acquire before the previous submit waited on it, and render-finished is
//! never re-signalled before the previous present waited on it.
//!
//! Any error aborts the frame and returns the scheduler to `Idle`; only
//! `Error::SwapchainOutOfDate` is meant to be recovered from, by the caller.

use crate::device::types::{PipelineStage, QueueKind};
use crate::device::{GraphicsDevice, SemaphoreWait};
use crate::error::Result;
use crate::swapchain::SwapchainLifecycle;
use crate::{engine_trace, engine_violation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// The two binary semaphores reused by every frame
pub struct FrameSyncPair<D: GraphicsDevice> {
    pub image_available: D::Semaphore,
    pub render_finished: D::Semaphore,
}

impl<D: GraphicsDevice> FrameSyncPair<D> {
    pub fn new(device: &D) -> Result<Self> {
        Ok(Self {
            image_available: device.create_semaphore()?,
            render_finished: device.create_semaphore()?,
        })
    }
}

#[derive(Debug)]
pub struct FrameScheduler {
    phase: FramePhase,
    acquired: Option<u32>,
    frames_presented: u64,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            phase: FramePhase::Idle,
            acquired: None,
            frames_presented: 0,
        }
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Image index acquired in the current cycle
    pub fn acquired_image(&self) -> Option<u32> {
        self.acquired
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Acquire the next image, arming image-available
    pub fn acquire<D: GraphicsDevice>(
        &mut self,
        swapchain: &SwapchainLifecycle<D>,
        sync: &FrameSyncPair<D>,
    ) -> Result<u32> {
        self.expect(FramePhase::Idle, "acquire")?;
        self.phase = FramePhase::Acquiring;
        match swapchain.acquire_next_image(&sync.image_available) {
            Ok(index) => {
                self.acquired = Some(index);
                self.phase = FramePhase::Recording;
                Ok(index)
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    /// Submit `cmd`: wait image-available at color output, signal render-finished
    pub fn submit<D: GraphicsDevice>(&mut self, device: &D, cmd: &D::CommandBuffer, sync: &FrameSyncPair<D>) -> Result<()> {
        self.expect(FramePhase::Recording, "submit")?;
        let waits = [SemaphoreWait {
            semaphore: &sync.image_available,
            stage: PipelineStage::COLOR_ATTACHMENT_OUTPUT,
        }];
        match device.submit(QueueKind::Graphics, cmd, &waits, &[&sync.render_finished]) {
            Ok(()) => {
                self.phase = FramePhase::Submitted;
                Ok(())
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    /// Present the image acquired in this cycle, waiting on render-finished
    pub fn present<D: GraphicsDevice>(&mut self, swapchain: &SwapchainLifecycle<D>, sync: &FrameSyncPair<D>) -> Result<()> {
        self.expect(FramePhase::Submitted, "present")?;
        let Some(index) = self.acquired.take() else {
            self.abort();
            return Err(engine_violation!("kludge::frame", "present without an acquired image"));
        };
        match swapchain.present(index, &sync.render_finished) {
            Ok(()) => {
                self.phase = FramePhase::Presenting;
                Ok(())
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    /// Block until the present queue drained, then return to `Idle`
    pub fn finish<D: GraphicsDevice>(&mut self, device: &D) -> Result<()> {
        self.expect(FramePhase::Presenting, "finish")?;
        let result = device.queue_wait_idle(QueueKind::Present);
        self.phase = FramePhase::Idle;
        if result.is_ok() {
            self.frames_presented += 1;
            engine_trace!("kludge::frame", "Frame {} presented", self.frames_presented);
        }
        result
    }

    /// Drop the current frame and return to `Idle`
    pub fn abort(&mut self) {
        if self.phase != FramePhase::Idle {
            engine_trace!("kludge::frame", "Frame aborted in {:?}", self.phase);
        }
        self.phase = FramePhase::Idle;
        self.acquired = None;
    }

    /// Run one complete cycle; `record` maps the acquired index to the command buffer to submit
    pub fn run_frame<'c, D, F>(
        &mut self,
        device: &D,
        swapchain: &SwapchainLifecycle<D>,
        sync: &FrameSyncPair<D>,
        record: F,
    ) -> Result<u32>
    where
        D: GraphicsDevice,
        F: FnOnce(u32) -> Result<&'c D::CommandBuffer>,
    {
        let index = self.acquire(swapchain, sync)?;
        let cmd = match record(index) {
            Ok(cmd) => cmd,
            Err(e) => {
                self.abort();
                return Err(e);
            }
        };
        self.submit(device, cmd, sync)?;
        self.present(swapchain, sync)?;
        self.finish(device)?;
        Ok(index)
    }

    fn expect(&mut self, phase: FramePhase, operation: &str) -> Result<()> {
        if self.phase == phase {
            return Ok(());
        }
        let found = self.phase;
        self.abort();
        Err(engine_violation!(
            "kludge::frame",
            "{} called in phase {:?} (expected {:?})",
            operation,
            found,
            phase
        ))
    }
}

#[cfg(test)]
#[path = "frame_scheduler_tests.rs"]
mod tests;
