//! Build training components from configuration

use std::sync::Arc;

use tracing::info;

use super::schema::{OptimSpec, RunSpec, TokenizerSpec};
use crate::dist::BoundDevice;
use crate::error::{Error, Result};
use crate::model::{load_weights_into, BigramConfig, BigramLm};
use crate::optim::{Adam, Optimizer, Sgd};
use crate::tokenizer::{ByteTokenizer, Tokenizer};

// Optimizer parameter field names
const PARAM_MOMENTUM: &str = "momentum";
const PARAM_BETA1: &str = "beta1";
const PARAM_BETA2: &str = "beta2";
const PARAM_EPS: &str = "eps";
const PARAM_WEIGHT_DECAY: &str = "weight_decay";

fn param_f32(spec: &OptimSpec, key: &str, default: f64) -> f32 {
    spec.params.get(key).and_then(serde_json::Value::as_f64).unwrap_or(default) as f32
}

/// Build the base optimizer for one worker of a `world_size` group.
///
/// The configured learning rate is adjusted by the run's
/// [`LrScaling`](crate::optim::LrScaling) policy before construction.
pub fn build_optimizer(spec: &OptimSpec, world_size: usize) -> Result<Box<dyn Optimizer>> {
    let lr = spec.lr_scaling.effective_lr(spec.lr, world_size);
    let optimizer: Box<dyn Optimizer> = match spec.name.to_lowercase().as_str() {
        "sgd" => Box::new(Sgd::new(lr, param_f32(spec, PARAM_MOMENTUM, 0.0))),
        "adam" => Box::new(Adam::new(
            lr,
            param_f32(spec, PARAM_BETA1, 0.9),
            param_f32(spec, PARAM_BETA2, 0.999),
            param_f32(spec, PARAM_EPS, 1e-8),
        )),
        "adamw" => Box::new(
            Adam::new(
                lr,
                param_f32(spec, PARAM_BETA1, 0.9),
                param_f32(spec, PARAM_BETA2, 0.999),
                param_f32(spec, PARAM_EPS, 1e-8),
            )
            .with_weight_decay(param_f32(spec, PARAM_WEIGHT_DECAY, 0.01)),
        ),
        name => {
            return Err(Error::Configuration(format!(
                "Unknown optimizer: {name}. Supported: sgd, adam, adamw"
            )))
        }
    };
    if lr != spec.lr {
        info!(base_lr = spec.lr, effective_lr = lr, world_size, "scaled learning rate");
    }
    Ok(optimizer)
}

/// Build the tokenizer shared by the training and validation shards
pub fn build_tokenizer(spec: &TokenizerSpec) -> Arc<dyn Tokenizer> {
    match spec {
        TokenizerSpec::Byte { max_seq_len } => {
            let tokenizer = ByteTokenizer::new();
            Arc::new(match max_seq_len {
                Some(len) => tokenizer.with_max_len(*len),
                None => tokenizer,
            })
        }
    }
}

/// Build the reference model on `device`, loading `model.init` if set.
pub fn build_model(spec: &RunSpec, vocab_size: usize, device: &BoundDevice) -> Result<BigramLm> {
    let config = BigramConfig {
        vocab_size: spec.model.vocab_size.unwrap_or(vocab_size),
        hidden_size: spec.model.hidden_size,
        init_scale: spec.model.init_scale,
    };
    let mut model = BigramLm::new(config, device, spec.model.seed)?;
    if let Some(path) = &spec.model.init {
        load_weights_into(&mut model, path)?;
        info!(path = %path.display(), "loaded initial weights");
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{save_safetensors, LanguageModel};
    use crate::optim::LrScaling;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    fn optim(name: &str, lr: f32) -> OptimSpec {
        OptimSpec {
            name: name.to_string(),
            lr,
            lr_scaling: LrScaling::None,
            params: HashMap::new(),
        }
    }

    fn spec() -> RunSpec {
        serde_yaml::from_str(
            "model:\n  hidden_size: 4\n  seed: 3\ndata:\n  train: t.jsonl\noptimizer:\n  name: sgd\n  lr: 0.1\ntraining:\n  epochs: 1\n",
        )
        .unwrap()
    }

    #[test]
    fn test_build_each_optimizer() {
        for (name, expected) in [("sgd", "sgd"), ("Adam", "adam"), ("adamw", "adamw")] {
            let optimizer = build_optimizer(&optim(name, 0.01), 1).unwrap();
            assert_eq!(optimizer.name(), expected);
            assert_relative_eq!(optimizer.lr(), 0.01);
        }
    }

    #[test]
    fn test_unknown_optimizer() {
        let Err(err) = build_optimizer(&optim("lamb", 0.01), 1) else {
            panic!("lamb should be rejected");
        };
        assert!(err.to_string().contains("Unknown optimizer: lamb"));
    }

    #[test]
    fn test_linear_scaling_multiplies_lr() {
        let mut spec = optim("sgd", 0.01);
        spec.lr_scaling = LrScaling::Linear;
        let optimizer = build_optimizer(&spec, 4).unwrap();
        assert_relative_eq!(optimizer.lr(), 0.04);
    }

    #[test]
    fn test_tokenizer_truncates() {
        let tokenizer = build_tokenizer(&TokenizerSpec::Byte { max_seq_len: Some(3) });
        assert_eq!(tokenizer.encode("hello").unwrap().len(), 3);
        assert_eq!(tokenizer.vocab_size(), 256);
    }

    #[test]
    fn test_build_model_is_seeded() {
        let spec = spec();
        let a = build_model(&spec, 256, &BoundDevice::cpu()).unwrap();
        let b = build_model(&spec, 256, &BoundDevice::cpu()).unwrap();
        assert_eq!(a.weights(), b.weights());
        assert_eq!(a.vocab_size(), 256);
        assert_eq!(a.config().hidden_size, 4);
    }

    #[test]
    fn test_build_model_loads_init_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("init.safetensors");

        let mut other = spec();
        other.model.seed = 99;
        let source = build_model(&other, 256, &BoundDevice::cpu()).unwrap();
        save_safetensors(source.parameters(), &path, None).unwrap();

        let mut spec = spec();
        spec.model.init = Some(path);
        let loaded = build_model(&spec, 256, &BoundDevice::cpu()).unwrap();
        assert_eq!(loaded.weights(), source.weights());
    }
}
