//! Error types for slabforest
//!
//! Uses thiserror for clean, idiomatic Rust error definitions. The error
//! surface is deliberately small: the allocator itself never panics on user
//! error, it reports one of the variants below and leaves every pool
//! invariant intact.

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::warn;

/// Pool management errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum PoolError {
    /// The underlying system allocator refused a node request.
    #[error("system allocation of {size} bytes failed")]
    AllocationFailed { size: usize },

    /// A handle referred to a pool that has been destroyed (or was never
    /// created). Detected through the generation-tag check, so no operation
    /// was performed.
    #[error("stale pool handle (tag {tag})")]
    StaleHandle { tag: i32 },

    /// A caller-supplied argument was rejected before any state changed.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The module has not been initialized (or has been finalized).
    #[error("pool module is not initialized")]
    NotInitialized,
}

impl PoolError {
    /// Check if the error may succeed on retry
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AllocationFailed { .. })
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AllocationFailed { .. } => "MPL:ALLOC:FAILED",
            Self::StaleHandle { .. } => "MPL:HANDLE:STALE",
            Self::InvalidArgument { .. } => "MPL:ARG:INVALID",
            Self::NotInitialized => "MPL:MODULE:UNINIT",
        }
    }

    /// Create allocation failed error
    pub fn allocation_failed(size: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(size, "system allocation failed");

        Self::AllocationFailed { size }
    }

    /// Create stale handle error
    #[must_use]
    pub fn stale_handle(tag: i32) -> Self {
        Self::StaleHandle { tag }
    }

    /// Create invalid argument error
    pub fn invalid_argument(reason: &str) -> Self {
        Self::InvalidArgument {
            reason: reason.to_string(),
        }
    }

    /// Create not initialized error
    #[must_use]
    pub fn not_initialized() -> Self {
        Self::NotInitialized
    }
}

/// Result type for pool operations
pub type PoolResult<T> = core::result::Result<T, PoolError>;
