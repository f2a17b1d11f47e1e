// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Public error model for the communication runtime.
//!
//! Two error channels coexist by design:
//!
//! 1. [`ComError`] values for conditions a caller can reasonably recover
//!    from (service not offered, unknown instance, allocation failure,
//!    full task queue). These are returned, checked, and branched on.
//! 2. Fatal paths for violated preconditions and invariants (duplicate
//!    runtime construction, mixed allocation strategies, allocator misuse
//!    at teardown). Those log a fatal diagnostic and panic: the process
//!    must not continue in an inconsistent state, so they never surface
//!    as a [`ComError`].
//!
//! Internal helpers propagate `Result` errors upward untouched; only the
//! public API boundary decides between returning the error and escalating.

/// Errors returned by socal runtime operations.
#[derive(Debug)]
pub enum ComError {
    // ========================================================================
    // Service state
    // ========================================================================
    /// Operation requires the service instance to be offered.
    ServiceNotOffered,
    /// The instance specifier is not known to the lookup table.
    UnknownInstanceSpecifier,
    /// The instance identifier was never mapped to a specifier.
    UnknownInstanceIdentifier,
    /// Instance identifier string is malformed (expected `"<binding>:<id>"`).
    InvalidInstanceIdentifier(String),

    // ========================================================================
    // Resources
    // ========================================================================
    /// Sample allocation failed (pool empty, or allocation is not defined
    /// for the current backend topology).
    SampleAllocationFailure,
    /// Worker-pool task queue is at its configured capacity.
    QueueSizeExceeded,

    // ========================================================================
    // Fields
    // ========================================================================
    /// Field value requested before any update and without a get handler.
    FieldValueNotSet,
    /// Set requested but no set handler is registered.
    SetHandlerNotAvailable,
    /// A registered user handler reported a failure.
    HandlerFailed(String),

    // ========================================================================
    // Configuration / environment
    // ========================================================================
    /// Configuration rejected at build time.
    InvalidConfiguration(String),
    /// I/O error with underlying cause.
    IoError(std::io::Error),
}

impl std::fmt::Display for ComError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComError::ServiceNotOffered => write!(f, "Service instance is not offered"),
            ComError::UnknownInstanceSpecifier => write!(f, "Unknown instance specifier"),
            ComError::UnknownInstanceIdentifier => write!(f, "Unknown instance identifier"),
            ComError::InvalidInstanceIdentifier(s) => {
                write!(f, "Invalid instance identifier '{}' (expected <binding>:<id>)", s)
            }
            ComError::SampleAllocationFailure => write!(f, "Sample allocation failed"),
            ComError::QueueSizeExceeded => write!(f, "Worker-pool task queue is full"),
            ComError::FieldValueNotSet => write!(f, "Field value has not been set"),
            ComError::SetHandlerNotAvailable => write!(f, "No set handler registered"),
            ComError::HandlerFailed(msg) => write!(f, "Handler failed: {}", msg),
            ComError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            ComError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ComError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ComError {
    fn from(e: std::io::Error) -> Self {
        ComError::IoError(e)
    }
}

/// Result alias used across the public API.
pub type Result<T> = std::result::Result<T, ComError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ComError::ServiceNotOffered.to_string(),
            "Service instance is not offered"
        );
        assert_eq!(
            ComError::HandlerFailed("boom".to_string()).to_string(),
            "Handler failed: boom"
        );
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error;
        let e = ComError::from(std::io::Error::new(std::io::ErrorKind::Other, "closed"));
        assert!(e.source().is_some());
        assert!(ComError::ServiceNotOffered.source().is_none());
    }
}
