//! Error types for the kludge engine
//!
//! One error enum covers the whole frame protocol. Only
//! [`KludgeError::SwapchainOutOfDate`] is recoverable (the presenter rebuilds the
//! session); every other variant is fatal and propagates unchanged.

use std::fmt;

/// Result type for kludge engine operations
pub type KludgeResult<T> = std::result::Result<T, KludgeError>;

/// Short names used throughout the crate
pub use self::{KludgeError as Error, KludgeResult as Result};

/// Kludge engine errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KludgeError {
    /// Backend-specific error (Vulkan, mock device, ...)
    BackendError(String),

    /// Out of host or device memory
    OutOfMemory,

    /// Invalid resource (shader binary, buffer, handle, ...)
    InvalidResource(String),

    /// Initialization failed (instance, device, surface, session)
    InitializationFailed(String),

    /// The swapchain no longer matches the surface and must be rebuilt
    SwapchainOutOfDate,

    /// The presentation surface is gone
    SurfaceLost,

    /// The logical device is gone
    DeviceLost,

    /// An API was called out of order or on a released object
    ContractViolation(String),
}

impl KludgeError {
    /// True for the single recoverable condition of the frame protocol
    pub fn is_out_of_date(&self) -> bool {
        matches!(self, KludgeError::SwapchainOutOfDate)
    }

    /// True when the error must abort the driver loop
    pub fn is_fatal(&self) -> bool {
        !self.is_out_of_date()
    }
}

impl fmt::Display for KludgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KludgeError::BackendError(msg) => write!(f, "Backend error: {}", msg),
            KludgeError::OutOfMemory => write!(f, "Out of memory"),
            KludgeError::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            KludgeError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            KludgeError::SwapchainOutOfDate => write!(f, "Swapchain out of date"),
            KludgeError::SurfaceLost => write!(f, "Surface lost"),
            KludgeError::DeviceLost => write!(f, "Device lost"),
            KludgeError::ContractViolation(msg) => write!(f, "Contract violation: {}", msg),
        }
    }
}

impl std::error::Error for KludgeError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
