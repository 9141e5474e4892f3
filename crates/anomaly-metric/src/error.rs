use anomaly_util::{CurveError, LabelError};
use thiserror::Error;

/// The error type for region-level metric computation.
///
/// Every variant is fatal to the `compute` call that raised it; no partial
/// result is produced.
#[derive(Error, Debug)]
pub enum MetricError {
    /// The ground-truth mask holds values outside `[0, 1]`.
    #[error("ground-truth mask must lie in [0, 1], but found interval [{min}, {max}]")]
    InvalidMaskRange {
        /// Smallest observed mask value.
        min: f32,
        /// Largest observed mask value.
        max: f32,
    },

    /// No foreground region exists in the accumulated ground truth.
    #[error("no ground-truth regions: every mask in the accumulated batches is empty")]
    EmptyGroundTruth,

    /// `compute` was called before any batch was added.
    #[error("no batches have been accumulated")]
    NoBatches,

    /// Predictions and targets disagree in shape.
    #[error("prediction shape {preds:?} does not match target shape {target:?}")]
    ShapeMismatch {
        preds: Vec<usize>,
        target: Vec<usize>,
    },

    /// A configuration parameter is out of range.
    #[error("Invalid metric configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// Tensor data could not be read back to host memory.
    #[error("failed to read tensor data: {reason}")]
    TensorData { reason: String },

    #[error(transparent)]
    Curve(#[from] CurveError),

    #[error(transparent)]
    Label(#[from] LabelError),
}

/// A specialized `Result` type for metric computation.
pub type MetricResult<T> = Result<T, MetricError>;
