//! Domain error taxonomy for the scanning pipeline.
//!
//! Per-region failures (`InvalidGeometry`, `RegionOutOfBounds`,
//! `ExtractionFailed`) never abort a capture step; the affected region
//! degrades to an error sentinel instead. Recognition failures are not
//! part of this taxonomy at all - the OCR adapter swallows them and
//! returns empty text.

use thiserror::Error;

/// Errors surfaced by the capture pipeline and scan workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// Camera access was denied or the device failed. Fatal to the
    /// current session; the user must retry acquisition explicitly.
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    /// Frame or display dimensions make the display-to-frame mapping
    /// undefined. No mapping is attempted.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A bounding box maps outside the captured frame. Only that box is
    /// affected; sibling boxes still process.
    #[error("region '{box_id}' maps outside the captured frame")]
    RegionOutOfBounds { box_id: String },

    /// Cropping a mapped region out of the frame buffer failed.
    #[error("failed to extract region '{box_id}'")]
    ExtractionFailed { box_id: String },

    /// The backend rejected a scan submission or the request never got
    /// through. The record stays editable and can be resubmitted.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// A required field is missing before submit. Blocks locally; no
    /// network call is made.
    #[error("validation failed: {0}")]
    ValidationFailed(String),
}
