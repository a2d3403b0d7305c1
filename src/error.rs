//! Error taxonomy shared by the capture, backend, coordinator and renderer.

use std::time::Duration;

use thiserror::Error;

use crate::buffer::Dims;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EraseError>;

/// Everything that can go wrong between painting a mask and exporting a result.
///
/// All variants are recovered at the coordinator boundary; none of them is
/// allowed to take down the interactive context or the worker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EraseError {
    /// The isolated context failed to initialize the processing backend.
    #[error("backend failed to load: {0}")]
    BackendLoad(String),

    /// A job was submitted before the backend reported ready.
    #[error("backend is not loaded; load the backend first")]
    BackendNotReady,

    /// A second job was submitted while one is still queued or running.
    #[error("a processing job is already in flight")]
    JobInFlight,

    /// Image and mask disagree in size.
    #[error("mask is {mask} but image is {image}")]
    DimensionMismatch { image: Dims, mask: Dims },

    /// The reconstruction itself failed inside the isolated context.
    #[error("processing failed: {0}")]
    Execution(String),

    /// A pixel buffer violated the RGBA8 length/dimension invariant.
    #[error("invalid pixel buffer: {0}")]
    InvalidBuffer(String),

    #[error("processing timed out after {0:?}")]
    JobTimedOut(Duration),

    #[error("processing was cancelled")]
    Cancelled,

    /// The isolated context went away while work was pending.
    #[error("processing context terminated unexpectedly")]
    WorkerTerminated,

    // io / codec errors are stringified so the enum stays `Clone`
    #[error("i/o error: {0}")]
    Io(String),

    #[error("image codec error: {0}")]
    Image(String),

    #[error("settings error: {0}")]
    Settings(String),
}

impl EraseError {
    /// Whether re-triggering the same action can succeed without other steps.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EraseError::BackendLoad(_)
                | EraseError::Execution(_)
                | EraseError::JobTimedOut(_)
                | EraseError::Cancelled
                | EraseError::WorkerTerminated
        )
    }
}

impl From<std::io::Error> for EraseError {
    fn from(e: std::io::Error) -> Self {
        EraseError::Io(e.to_string())
    }
}

impl From<image::ImageError> for EraseError {
    fn from(e: image::ImageError) -> Self {
        EraseError::Image(e.to_string())
    }
}

impl From<serde_json::Error> for EraseError {
    fn from(e: serde_json::Error) -> Self {
        EraseError::Settings(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_names_both_sizes() {
        let err = EraseError::DimensionMismatch {
            image: Dims::new(100, 80),
            mask: Dims::new(50, 40),
        };
        assert_eq!(err.to_string(), "mask is 50x40 but image is 100x80");
    }

    #[test]
    fn not_ready_is_not_retryable_without_loading() {
        assert!(!EraseError::BackendNotReady.is_retryable());
        assert!(!EraseError::JobInFlight.is_retryable());
        assert!(EraseError::BackendLoad("network".into()).is_retryable());
    }
}
