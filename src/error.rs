use thiserror::Error;

/// Errors raised while evaluating the validation set at the end of an epoch.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Normalized edit distance is undefined for an empty reference string.
    #[error("reference text of example {index} is empty, normalized edit distance is undefined")]
    EmptyReference { index: usize },

    #[error("validation source yielded a batch with no examples")]
    EmptyBatch,

    #[error("validation source is exhausted; it must cycle indefinitely")]
    SourceExhausted,

    #[error("validation source failed: {0:#}")]
    Source(anyhow::Error),

    #[error("could not read tensor data: {0}")]
    TensorData(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("checkpoint save failed: {0:#}")]
    Checkpoint(anyhow::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ValidationError>;
