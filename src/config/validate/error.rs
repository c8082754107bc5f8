//! Validation error types

/// Validation error type
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Training data path does not exist: {0}")]
    TrainDataNotFound(String),

    #[error("Validation data path does not exist: {0}")]
    ValDataNotFound(String),

    #[error("Initial weights path does not exist: {0}")]
    InitWeightsNotFound(String),

    #[error("Invalid learning rate: {0} (must be > 0.0 and <= 1.0)")]
    InvalidLearningRate(f32),

    #[error("Invalid batch size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    #[error("Invalid epochs: {0} (must be > 0)")]
    InvalidEpochs(usize),

    #[error("Invalid optimizer: {0} (must be one of: adam, adamw, sgd)")]
    InvalidOptimizer(String),

    #[error("Invalid gradient clip value: {0} (must be > 0.0)")]
    InvalidGradClip(f32),

    #[error("Invalid min_delta: {0} (must be >= 0.0)")]
    InvalidMinDelta(f32),

    #[error("Invalid {field}: 0 (must be > 0 when set)")]
    ZeroBudget { field: &'static str },

    #[error("Invalid hidden size: {0} (must be > 0)")]
    InvalidHiddenSize(usize),

    #[error("Invalid vocab size {vocab} (tokenizer needs at least {required})")]
    VocabTooSmall { vocab: usize, required: usize },

    #[error("Invalid max sequence length: {0} (must be >= 2)")]
    InvalidSeqLen(usize),

    #[error("Invalid coordination timeout: {0}s (must be > 0)")]
    InvalidTimeout(u64),

    #[error("Invalid master address '{0}' (expected host:port)")]
    InvalidMasterAddr(String),

    #[error("Invalid pruning config: {0}")]
    InvalidPruning(String),
}
