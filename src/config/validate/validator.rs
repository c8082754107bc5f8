//! Configuration validation logic

use super::error::ValidationError;
use crate::config::schema::{RunSpec, TokenizerSpec};
use crate::tokenizer::BYTE_VOCAB_SIZE;

/// Optimizer names accepted by the builder
pub const VALID_OPTIMIZERS: [&str; 3] = ["adam", "adamw", "sgd"];

/// Validate a run specification
///
/// Checks numeric ranges and enum values only; see [`check_paths`] for the
/// filesystem side.
pub fn validate_config(spec: &RunSpec) -> Result<(), ValidationError> {
    if spec.data.batch_size == 0 {
        return Err(ValidationError::InvalidBatchSize(spec.data.batch_size));
    }

    if !(spec.optimizer.lr > 0.0 && spec.optimizer.lr <= 1.0) {
        return Err(ValidationError::InvalidLearningRate(spec.optimizer.lr));
    }

    if !VALID_OPTIMIZERS.contains(&spec.optimizer.name.to_lowercase().as_str()) {
        return Err(ValidationError::InvalidOptimizer(spec.optimizer.name.clone()));
    }

    let training = &spec.training;
    if training.epochs == 0 {
        return Err(ValidationError::InvalidEpochs(training.epochs));
    }

    if let Some(grad_clip) = training.grad_clip {
        if !(grad_clip > 0.0) {
            return Err(ValidationError::InvalidGradClip(grad_clip));
        }
    }

    if training.min_delta.is_nan() || training.min_delta < 0.0 {
        return Err(ValidationError::InvalidMinDelta(training.min_delta));
    }

    for (field, value) in [
        ("patience", training.patience),
        ("total_steps", training.total_steps),
        ("steps_per_epoch", training.steps_per_epoch),
    ] {
        if value == Some(0) {
            return Err(ValidationError::ZeroBudget { field });
        }
    }

    if spec.model.hidden_size == 0 {
        return Err(ValidationError::InvalidHiddenSize(spec.model.hidden_size));
    }

    match spec.tokenizer {
        TokenizerSpec::Byte { max_seq_len } => {
            if let Some(vocab) = spec.model.vocab_size {
                if vocab < BYTE_VOCAB_SIZE {
                    return Err(ValidationError::VocabTooSmall {
                        vocab,
                        required: BYTE_VOCAB_SIZE,
                    });
                }
            }
            if let Some(len) = max_seq_len {
                if len < 2 {
                    return Err(ValidationError::InvalidSeqLen(len));
                }
            }
        }
    }

    if spec.distributed.timeout_secs == 0 {
        return Err(ValidationError::InvalidTimeout(spec.distributed.timeout_secs));
    }

    let addr = &spec.distributed.master_addr;
    let port_ok = addr.rsplit_once(':').is_some_and(|(host, port)| {
        !host.is_empty() && port.parse::<u16>().is_ok()
    });
    if !port_ok {
        return Err(ValidationError::InvalidMasterAddr(addr.clone()));
    }

    if let Some(pruning) = &spec.pruning {
        pruning.validate().map_err(|e| ValidationError::InvalidPruning(e.to_string()))?;
    }

    Ok(())
}

/// Check that every input file named by the run config exists
pub fn check_paths(spec: &RunSpec) -> Result<(), ValidationError> {
    if !spec.data.train.exists() {
        return Err(ValidationError::TrainDataNotFound(spec.data.train.display().to_string()));
    }

    if let Some(val_path) = &spec.data.val {
        if !val_path.exists() {
            return Err(ValidationError::ValDataNotFound(val_path.display().to_string()));
        }
    }

    if let Some(init) = &spec.model.init {
        if !init.exists() {
            return Err(ValidationError::InitWeightsNotFound(init.display().to_string()));
        }
    }

    Ok(())
}
