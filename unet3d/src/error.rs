use thiserror::Error;

/// The error type for `unet3d-burn` operations.
///
/// Every variant is raised while validating a configuration or an input tensor, before
/// any tensor work is handed to the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnetError {
    /// Error for when an invalid model configuration is provided.
    /// This can happen if configuration parameters are logically inconsistent.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// Error for when an output activation name is not recognised.
    #[error("Unsupported activation: {name} (expected \"sigmoid\" or \"softmax\")")]
    UnsupportedActivation {
        /// The rejected activation name.
        name: String,
    },

    /// Error for when an input tensor has an invalid shape.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },

    /// Error for when the decoder is handed an incomplete set of encoder levels.
    #[error("Encoder level {level} is missing ({available} levels available)")]
    MissingLevel {
        /// The level that was requested.
        level: usize,
        /// The number of levels that were provided.
        available: usize,
    },

    /// Error for when deep supervision receives a different number of segmentation
    /// logits than the network has supervised levels.
    #[error("Expected {expected} segmentation logits, got {actual}")]
    SegmentationLevelMismatch {
        /// Number of supervised decoder levels.
        expected: usize,
        /// Number of logits provided.
        actual: usize,
    },
}

/// A specialized `Result` type for `unet3d-burn` operations.
pub type UnetResult<T> = Result<T, UnetError>;
