//! Worker assembly: from a validated [`RunSpec`] to a finished run
//!
//! [`run_worker`] is what `podar train` executes in every process of the
//! group. [`run_worker_with`] takes an already joined collective, which lets
//! in-process groups ([`LocalGroup`](crate::dist::LocalGroup)) run the exact
//! same pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{build_model, build_optimizer, build_tokenizer, RunSpec, WorkerEnv};
use crate::data::{load_jsonl, ShardedDataset};
use crate::dist::{
    Collective, ComputeDevice, DeviceBinding, DistributedOptimizer, SingleProcess, TcpCollective,
    WorkerContext,
};
use crate::error::Result;
use crate::prune::{PrunableModel, SparseExportResult};
use crate::train::{
    DriverPhase, MetricsLog, ModelFinalizer, ObserverList, ProgressObserver, PruningSummaries,
    TrainingDriver, TrainingRunState,
};

/// What one worker reports after a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub rank: usize,
    pub world_size: usize,
    /// `Converged` or `Exhausted`
    pub phase: DriverPhase,
    pub state: TrainingRunState,
    /// Monitored loss of every completed epoch
    pub epoch_losses: Vec<f32>,
    /// Training next-token accuracy of every completed epoch
    pub epoch_accuracies: Vec<f32>,
    /// Steps skipped because of non-finite gradients
    pub skipped_steps: usize,
    /// Global sparsity of the replica when training stopped
    pub sparsity: f32,
    /// Files written by rank 0, if a model path was configured
    pub model_path: Option<PathBuf>,
    pub metadata_path: Option<PathBuf>,
}

/// Run one worker of the group described by `spec` and `env`.
///
/// A group of one trains without any network setup; larger groups meet at
/// the rendezvous address (`env` first, then `distributed.master_addr`).
///
/// # Errors
///
/// Any setup error, or the error that terminated the run. A failed worker
/// aborts the collective so its peers fail promptly too.
pub fn run_worker(spec: &RunSpec, env: &WorkerEnv) -> Result<WorkerReport> {
    let ctx = env.context()?;
    if !ctx.is_distributed() {
        return run_worker_with(spec, ctx, SingleProcess::new());
    }

    let addr = env.master_addr.as_deref().unwrap_or(&spec.distributed.master_addr);
    let timeout = spec.distributed.timeout();
    info!(%ctx, addr, timeout_secs = timeout.as_secs(), "joining worker group");
    let collective = TcpCollective::connect(&ctx, addr, rendezvous_timeout(timeout), timeout)?;
    run_worker_with(spec, ctx, collective)
}

// Joining may wait for slow process start-up on top of the per-round budget.
fn rendezvous_timeout(timeout: Duration) -> Duration {
    timeout.max(Duration::from_secs(30))
}

/// Run one worker over an already joined `collective`.
///
/// # Errors
///
/// [`Error::Configuration`](crate::Error::Configuration) if the collective
/// does not match `ctx`, plus everything [`run_worker`] can fail with.
pub fn run_worker_with<C: Collective>(
    spec: &RunSpec,
    ctx: WorkerContext,
    collective: C,
) -> Result<WorkerReport> {
    run_worker_on(spec, ctx, collective, &ComputeDevice::discover())
}

/// [`run_worker_with`] against an explicit device list instead of the
/// devices discovered on this host.
pub fn run_worker_on<C: Collective>(
    spec: &RunSpec,
    ctx: WorkerContext,
    collective: C,
    available: &[ComputeDevice],
) -> Result<WorkerReport> {
    let runtime = spec.runtime_configuration();
    let device = DeviceBinding::bind(&ctx, &runtime, available)?;

    let tokenizer = build_tokenizer(&spec.tokenizer);
    let records = load_jsonl(&spec.data.train, &spec.data.text_field)?;
    info!(rank = ctx.rank(), records = records.len(), path = %spec.data.train.display(), "loaded training data");
    let mut train = ShardedDataset::new(
        records,
        tokenizer.clone(),
        ctx,
        spec.data.batch_size,
        spec.data.shard_policy,
    )?;
    if spec.data.shuffle {
        train = train.with_shuffle(spec.data.seed);
    }

    let model = build_model(spec, tokenizer.vocab_size(), &device)?;
    let model = PrunableModel::wrap(model, spec.pruning_config()?)?;

    let base = build_optimizer(&spec.optimizer, ctx.group_size())?;
    let optimizer = DistributedOptimizer::wrap(base, collective, &runtime)
        .with_clip_norm(spec.training.grad_clip);

    let mut driver =
        TrainingDriver::new(ctx, &runtime, model, optimizer, train, spec.driver_config())?
            .with_observers(observers(spec, &ctx)?);

    if let Some(val_path) = &spec.data.val {
        let records = load_jsonl(val_path, &spec.data.text_field)?;
        let validation = ShardedDataset::new(
            records,
            tokenizer,
            ctx,
            spec.data.batch_size,
            spec.data.shard_policy,
        )?
        .keep_remainder();
        driver = driver.with_validation(validation)?;
    }

    let outcome = match driver.run() {
        Ok(outcome) => outcome,
        Err(failure) => {
            error!(
                rank = ctx.rank(),
                epoch = failure.state.current_epoch,
                step = failure.state.current_step,
                category = ?failure.error.category(),
                "run failed: {}",
                failure.error
            );
            return Err(failure.into_error());
        }
    };

    let model = driver.into_model();
    let sparsity = model.sparsity();
    let finalizer = match &spec.output.model_path {
        Some(path) => ModelFinalizer::new(path),
        None => ModelFinalizer::in_memory(),
    };
    let export: Option<SparseExportResult> =
        finalizer.finalize(model, &ctx)?.and_then(|finalized| finalized.export);

    info!(
        rank = ctx.rank(),
        phase = %outcome.phase,
        steps = outcome.state.current_step,
        epochs = outcome.epoch_losses.len(),
        sparsity = %format!("{sparsity:.3}"),
        "worker finished"
    );

    Ok(WorkerReport {
        rank: ctx.rank(),
        world_size: ctx.group_size(),
        phase: outcome.phase,
        state: outcome.state,
        epoch_losses: outcome.epoch_losses,
        epoch_accuracies: outcome.epoch_accuracies,
        skipped_steps: outcome.skipped_steps,
        sparsity,
        model_path: export.as_ref().map(|e| e.weights_path.clone()),
        metadata_path: export.as_ref().map(|e| e.metadata_path.clone()),
    })
}

/// Observers of one worker; only the primary logs and writes files.
fn observers(spec: &RunSpec, ctx: &WorkerContext) -> Result<ObserverList> {
    let mut observers = ObserverList::new();
    if !ctx.is_primary() {
        return Ok(observers);
    }
    observers.add(ProgressObserver::new(spec.training.log_interval));
    match &spec.output.log_dir {
        Some(dir) => {
            observers.add(MetricsLog::create(dir)?);
            if spec.pruning.is_some() {
                observers.add(PruningSummaries::create(dir)?);
            }
        }
        None if spec.pruning.is_some() => {
            warn!("pruning is enabled but no log_dir is set; pruning summaries are not recorded");
        }
        None => {}
    }
    Ok(observers)
}

impl WorkerReport {
    /// Whether training ended in one of the two success states.
    pub fn succeeded(&self) -> bool {
        self.phase.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::error::Error;
    use crate::dist::LocalGroup;
    use crate::model::load_safetensors;
    use crate::prune::{SparsityMetadata, SPARSITY_METADATA_FILE};
    use std::fs;
    use std::path::Path;
    use std::thread;
    use tempfile::TempDir;

    fn write_data(dir: &Path, name: &str, rows: usize) -> PathBuf {
        let path = dir.join(name);
        let body: String = (0..rows)
            .map(|i| format!("{{\"text\": \"sample {i}: pack my box with five dozen jugs\"}}\n"))
            .collect();
        fs::write(&path, body).unwrap();
        path
    }

    fn spec(dir: &TempDir, extra: &str) -> RunSpec {
        let train = write_data(dir.path(), "train.jsonl", 24);
        let yaml = format!(
            "model:\n  hidden_size: 8\n  seed: 1\ndata:\n  train: {}\n  batch_size: 4\noptimizer:\n  name: adam\n  lr: 0.01\ntraining:\n  epochs: 2\n  log_interval: 2\n{extra}",
            train.display()
        );
        parse_config(&yaml).unwrap()
    }

    #[test]
    fn test_single_worker_run_writes_artifacts() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut spec = spec(
            &dir,
            "pruning:\n  schedule:\n    type: linear\n    final_sparsity: 0.5\n    end_step: 6\n    frequency: 2\n  block_size: [1, 4]\n",
        );
        spec.output.log_dir = Some(out.clone());
        spec.output.model_path = Some(out.join("model.safetensors"));

        let report = run_worker(&spec, &WorkerEnv::default()).unwrap();
        assert!(report.succeeded());
        assert_eq!(report.phase, DriverPhase::Exhausted);
        assert_eq!(report.state.current_step, 12);
        assert_eq!(report.epoch_losses.len(), 2);

        let weights = load_safetensors(report.model_path.as_ref().unwrap()).unwrap();
        assert!(weights.contains_key("embedding.weight"));
        let metadata: SparsityMetadata = serde_json::from_str(
            &fs::read_to_string(out.join(SPARSITY_METADATA_FILE)).unwrap(),
        )
        .unwrap();
        assert!((metadata.global_sparsity - 0.5).abs() < 0.05);

        assert!(out.join("metrics.jsonl").exists());
        assert!(out.join("pruning.jsonl").exists());
    }

    #[test]
    fn test_missing_training_data_fails_before_training() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec(&dir, "");
        spec.data.train = dir.path().join("missing.jsonl");
        let err = run_worker(&spec, &WorkerEnv::default()).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_local_group_ranks_agree() {
        let dir = TempDir::new().unwrap();
        let spec = spec(&dir, "");
        let members = LocalGroup::new(3, Duration::from_secs(10)).unwrap();

        let handles: Vec<_> = members
            .into_iter()
            .enumerate()
            .map(|(rank, member)| {
                let spec = spec.clone();
                thread::spawn(move || {
                    let ctx = WorkerContext::new(rank, 3).unwrap();
                    run_worker_on(&spec, ctx, member, &[])
                })
            })
            .collect();
        let reports: Vec<WorkerReport> =
            handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();

        for report in &reports {
            assert_eq!(report.state.current_step, reports[0].state.current_step);
            assert_eq!(report.epoch_losses, reports[0].epoch_losses);
            assert_eq!(report.epoch_accuracies, reports[0].epoch_accuracies);
            assert_eq!(report.phase, DriverPhase::Exhausted);
        }
        // 24 records over 3 ranks, batch 4: 2 steps per epoch
        assert_eq!(reports[0].state.current_step, 4);
    }

    #[test]
    fn test_mismatched_collective_rejected() {
        let dir = TempDir::new().unwrap();
        let spec = spec(&dir, "");
        let ctx = WorkerContext::new(1, 2).unwrap();
        let err = run_worker_on(&spec, ctx, SingleProcess::new(), &[]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
