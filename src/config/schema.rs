//! YAML schema definitions for declarative run configuration
//!
//! ```yaml
//! model:
//!   hidden_size: 32
//!   seed: 42
//! data:
//!   train: data/train.jsonl
//!   batch_size: 8
//! optimizer:
//!   name: adam
//!   lr: 0.001
//! training:
//!   epochs: 3
//! pruning:
//!   schedule:
//!     type: polynomial_decay
//!     final_sparsity: 0.5
//!     end_step: 999
//!   block_size: [1, 16]
//!   block_pooling: avg
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::data::ShardPolicy;
use crate::optim::LrScaling;
use crate::precision::Precision;
use crate::prune::{PruningConfig, SparsitySchedule};
use crate::runtime::{
    GradientCompression, MemoryPolicy, RuntimeConfiguration, DEFAULT_COORDINATION_TIMEOUT,
};
use crate::train::DriverConfig;

/// Deserialize a bool from either a YAML boolean (`true`) or a quoted string (`"true"`).
fn deserialize_bool_lenient<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }

    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::Str(s) => match s.to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected 'true' or 'false', got '{other}'"
            ))),
        },
    }
}

/// Complete run specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSpec {
    /// Model configuration
    #[serde(default)]
    pub model: ModelSpec,

    /// Tokenizer configuration
    #[serde(default)]
    pub tokenizer: TokenizerSpec,

    /// Data configuration
    pub data: DataSpec,

    /// Optimizer configuration
    pub optimizer: OptimSpec,

    /// Training budgets and early stopping
    pub training: TrainingParams,

    /// Optional pruning configuration; no pruning when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pruning: Option<PruningConfig>,

    /// Worker group settings
    #[serde(default)]
    pub distributed: DistributedSpec,

    /// Precision and device policy
    #[serde(default)]
    pub runtime: RuntimeSpec,

    /// Where logs and the final model go
    #[serde(default)]
    pub output: OutputSpec,
}

impl RunSpec {
    /// Pruning configuration, or a schedule that never prunes.
    pub fn pruning_config(&self) -> crate::error::Result<PruningConfig> {
        match &self.pruning {
            Some(config) => Ok(config.clone()),
            None => Ok(PruningConfig::new(SparsitySchedule::constant(0.0, 0)?)),
        }
    }

    /// Immutable runtime settings for every component of a worker.
    pub fn runtime_configuration(&self) -> RuntimeConfiguration {
        RuntimeConfiguration::new()
            .with_precision(self.runtime.precision)
            .with_memory(self.runtime.memory)
            .with_require_accelerator(self.runtime.require_accelerator)
            .with_coordination_timeout(self.distributed.timeout())
            .with_compression(self.distributed.compression)
    }

    /// Stopping criteria of the Training Driver.
    pub fn driver_config(&self) -> DriverConfig {
        let t = &self.training;
        DriverConfig {
            epochs: t.epochs,
            patience: t.patience,
            min_delta: t.min_delta,
            total_steps: t.total_steps,
            steps_per_epoch: t.steps_per_epoch,
        }
    }
}

/// Reference model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Vocabulary size; defaults to the tokenizer's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocab_size: Option<usize>,

    /// Width of the factorised bigram
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,

    /// Half-width of the uniform initialisation
    #[serde(default = "default_init_scale")]
    pub init_scale: f32,

    /// Pretrained weights (SafeTensors) loaded after initialisation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<PathBuf>,

    /// Initialisation seed
    #[serde(default)]
    pub seed: u64,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            vocab_size: None,
            hidden_size: default_hidden_size(),
            init_scale: default_init_scale(),
            init: None,
            seed: 0,
        }
    }
}

fn default_hidden_size() -> usize {
    32
}

fn default_init_scale() -> f32 {
    0.1
}

/// Tokenizer selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenizerSpec {
    /// One token per UTF-8 byte
    Byte {
        /// Truncate sequences to this many tokens
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_seq_len: Option<usize>,
    },
}

impl Default for TokenizerSpec {
    fn default() -> Self {
        Self::Byte { max_seq_len: None }
    }
}

/// Data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSpec {
    /// Training data (JSON lines)
    pub train: PathBuf,

    /// Optional validation data (JSON lines)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<PathBuf>,

    /// Field holding the text of each record
    #[serde(default = "default_text_field")]
    pub text_field: String,

    /// Per-worker batch size; the global batch is `batch_size × world_size`
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Record-to-rank assignment
    #[serde(default)]
    pub shard_policy: ShardPolicy,

    /// Reshuffle each shard every epoch
    #[serde(default, deserialize_with = "deserialize_bool_lenient")]
    pub shuffle: bool,

    /// Shuffle seed
    #[serde(default)]
    pub seed: u64,
}

fn default_text_field() -> String {
    "text".to_string()
}

fn default_batch_size() -> usize {
    8
}

/// Optimizer specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimSpec {
    /// Optimizer name: "adam" | "adamw" | "sgd"
    pub name: String,

    /// Base learning rate
    pub lr: f32,

    /// Learning-rate reaction to the worker-group size
    #[serde(default)]
    pub lr_scaling: LrScaling,

    /// Optimizer-specific parameters (beta1, beta2, momentum, etc.)
    #[serde(flatten)]
    pub params: HashMap<String, serde_json::Value>,
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingParams {
    /// Number of epochs (required)
    pub epochs: usize,

    /// Stop after this many epochs without improvement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patience: Option<usize>,

    /// Minimum improvement of the monitored loss
    #[serde(default)]
    pub min_delta: f32,

    /// Global step budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<usize>,

    /// Cap on steps per epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps_per_epoch: Option<usize>,

    /// Gradient clipping threshold (global norm)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grad_clip: Option<f32>,

    /// Log progress every N steps
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
}

fn default_log_interval() -> usize {
    10
}

/// Worker group settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedSpec {
    /// Rendezvous address of rank 0 (`host:port`)
    #[serde(default = "default_master_addr")]
    pub master_addr: String,

    /// Maximum wait at a collective, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Gradient encoding on the wire
    #[serde(default)]
    pub compression: GradientCompression,
}

impl DistributedSpec {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DistributedSpec {
    fn default() -> Self {
        Self {
            master_addr: default_master_addr(),
            timeout_secs: default_timeout_secs(),
            compression: GradientCompression::None,
        }
    }
}

fn default_master_addr() -> String {
    "127.0.0.1:29500".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_COORDINATION_TIMEOUT.as_secs()
}

/// Precision and device policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeSpec {
    #[serde(default)]
    pub precision: Precision,

    #[serde(default)]
    pub memory: MemoryPolicy,

    /// Fail instead of falling back to the CPU
    #[serde(default, deserialize_with = "deserialize_bool_lenient")]
    pub require_accelerator: bool,
}

/// Output locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Directory for metrics and pruning summaries (rank 0 only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Final dense model (SafeTensors), written by rank 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
}
