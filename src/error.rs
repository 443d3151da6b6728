//! Custom error types for the application.
//!
//! This module defines the primary error type, `ScopeError`, for the whole controller.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of errors that can occur, from configuration and file I/O issues
//! to hardware faults raised by the camera, stage, or LED controller.
//!
//! ## Error Hierarchy
//!
//! - **`DeviceNotFound`**: No hardware matched the identifier at connect time. Fatal to that
//!   operation only; the operator retries explicitly.
//! - **`StreamNotActive`**: A capture was attempted while the camera is not in continuous
//!   acquisition. Surfaced immediately, never retried.
//! - **`IncompleteFrame`**: A captured buffer did not match the sensor geometry. Recoverable and
//!   swallowed by the acquisition engine; it never reaches the operator.
//! - **`MotionTimeout`**: The stage controller did not acknowledge a move in time. The running
//!   sequence is aborted and the stage is left at its last acknowledged position.
//! - **`InvalidInput`**: An empty or non-numeric value was submitted from the control surface.
//!   The binding layer ignores these without changing state.
//! - **`CaptureInProgress`** / **`InvalidRequest`**: Capture-run admission failures.
//! - **`Io`**, **`Tiff`**, **`Image`**, **`Config`**: Wrapped library errors.
//!
//! By using `#[from]`, `ScopeError` can be created from the underlying error types,
//! simplifying error handling throughout the application with the `?` operator.

use crate::core::Axis;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, ScopeError>;

#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("No device found matching '{0}'")]
    DeviceNotFound(String),

    #[error("Stream has not been started yet! Please start it first.")]
    StreamNotActive,

    #[error("Incomplete frame: expected {expected} pixels, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },

    #[error("Motion timeout on {axis} axis after {timeout:?}")]
    MotionTimeout { axis: Axis, timeout: Duration },

    #[error("Invalid input for '{field}': {value:?}")]
    InvalidInput { field: String, value: String },

    #[error("A capture run is already in progress")]
    CaptureInProgress,

    #[error("Invalid capture request: {0}")]
    InvalidRequest(String),

    #[error("{0} is not connected")]
    NotConnected(&'static str),

    #[error("Work queue is closed")]
    QueueClosed,

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl ScopeError {
    /// True for faults the acquisition engine absorbs without surfacing them.
    pub fn is_incomplete_frame(&self) -> bool {
        matches!(self, ScopeError::IncompleteFrame { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScopeError::DeviceNotFound("18255191".to_string());
        assert_eq!(err.to_string(), "No device found matching '18255191'");
    }

    #[test]
    fn test_motion_timeout_names_axis() {
        let err = ScopeError::MotionTimeout {
            axis: Axis::Z,
            timeout: Duration::from_secs(2),
        };
        assert!(err.to_string().contains("z axis"));
    }

    #[test]
    fn test_incomplete_frame_classification() {
        let err = ScopeError::IncompleteFrame {
            expected: 16,
            actual: 4,
        };
        assert!(err.is_incomplete_frame());
        assert!(!ScopeError::StreamNotActive.is_incomplete_frame());
    }
}
