//! Tests for the Training Driver

use super::*;
use crate::data::{ShardPolicy, ShardedDataset, TextRecord};
use crate::dist::{BoundDevice, Collective, DistributedOptimizer, LocalGroup, SingleProcess, WorkerContext};
use crate::error::{Error, ErrorCategory, Result};
use crate::model::{BigramConfig, BigramLm, LanguageModel};
use crate::optim::{Adam, Sgd};
use crate::prune::{PrunableModel, PruningConfig, SparsitySchedule};
use crate::runtime::RuntimeConfiguration;
use crate::tokenizer::{ByteTokenizer, BYTE_VOCAB_SIZE};
use crate::train::observer::{Observer, ObserverAction, ObserverContext};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn records(n: usize) -> Vec<TextRecord> {
    (0..n).map(|i| TextRecord::new(format!("row {i}: the cat sat on the mat"))).collect()
}

fn no_pruning() -> PruningConfig {
    PruningConfig::new(SparsitySchedule::constant(0.0, 0).unwrap())
}

struct Setup {
    records: usize,
    batch_size: usize,
    config: DriverConfig,
    pruning: PruningConfig,
    lr: f32,
}

impl Setup {
    fn new(records: usize, batch_size: usize, config: DriverConfig) -> Self {
        Self { records, batch_size, config, pruning: no_pruning(), lr: 0.05 }
    }

    fn build<C: Collective>(&self, ctx: WorkerContext, collective: C) -> TrainingDriver<BigramLm, C> {
        let runtime = RuntimeConfiguration::new();
        let model =
            BigramLm::new(BigramConfig::new(BYTE_VOCAB_SIZE, 8), &BoundDevice::cpu(), 100 + ctx.rank() as u64)
                .unwrap();
        let prunable = PrunableModel::wrap(model, self.pruning.clone()).unwrap();
        let optimizer = if self.lr == 0.0 {
            DistributedOptimizer::wrap(Box::new(Sgd::new(0.0, 0.0)), collective, &runtime)
        } else {
            DistributedOptimizer::wrap(Box::new(Adam::default_params(self.lr)), collective, &runtime)
        };
        let data = ShardedDataset::new(
            records(self.records),
            Arc::new(ByteTokenizer::new()),
            ctx,
            self.batch_size,
            ShardPolicy::Interleave,
        )
        .unwrap();
        TrainingDriver::new(ctx, &runtime, prunable, optimizer, data, self.config.clone()).unwrap()
    }

    fn single(&self) -> TrainingDriver<BigramLm, SingleProcess> {
        self.build(WorkerContext::single(), SingleProcess::new())
    }
}

/// Observer that keeps a copy of every step context.
#[derive(Clone, Default)]
struct Recorder {
    steps: Arc<Mutex<Vec<ObserverContext>>>,
    epochs: Arc<Mutex<Vec<ObserverContext>>>,
    stop_at: Option<usize>,
    fail_at: Option<usize>,
}

impl Observer for Recorder {
    fn on_step_end(&mut self, ctx: &ObserverContext) -> Result<ObserverAction> {
        self.steps.lock().unwrap().push(ctx.clone());
        if self.fail_at == Some(ctx.step) {
            return Err(Error::Data("observer failed".into()));
        }
        if self.stop_at == Some(ctx.step) {
            return Ok(ObserverAction::Stop);
        }
        Ok(ObserverAction::Continue)
    }

    fn on_epoch_end(&mut self, ctx: &ObserverContext) -> Result<ObserverAction> {
        self.epochs.lock().unwrap().push(ctx.clone());
        Ok(ObserverAction::Continue)
    }
}

#[test]
fn test_single_worker_runs_all_epochs() {
    // 20 records, batch 4 -> 5 steps per epoch
    let mut driver = Setup::new(20, 4, DriverConfig::new(3)).single();
    assert_eq!(driver.phase(), DriverPhase::Idle);

    let outcome = driver.run().unwrap();
    assert_eq!(outcome.phase, DriverPhase::Exhausted);
    assert_eq!(outcome.state.current_step, 15);
    assert_eq!(outcome.state.current_epoch, 2);
    assert_eq!(outcome.epoch_losses.len(), 3);
    assert!(outcome.epoch_losses[2] < outcome.epoch_losses[0], "{:?}", outcome.epoch_losses);
    assert_eq!(outcome.epoch_accuracies.len(), 3);
    assert!(outcome.epoch_accuracies.iter().all(|a| (0.0..=1.0).contains(a)));
    assert_eq!(driver.phase(), DriverPhase::Exhausted);
}

#[test]
fn test_total_steps_budget() {
    let mut driver = Setup::new(20, 4, DriverConfig::new(10).with_total_steps(7)).single();
    let outcome = driver.run().unwrap();
    assert_eq!(outcome.phase, DriverPhase::Exhausted);
    assert_eq!(outcome.state.current_step, 7);
    assert_eq!(outcome.epoch_losses.len(), 2);
}

#[test]
fn test_steps_per_epoch_cap() {
    let mut driver = Setup::new(20, 4, DriverConfig::new(2).with_steps_per_epoch(2)).single();
    let outcome = driver.run().unwrap();
    assert_eq!(outcome.state.current_step, 4);
}

#[test]
fn test_patience_converges() {
    let mut setup = Setup::new(12, 4, DriverConfig::new(10).with_patience(2, 0.0));
    setup.lr = 0.0;
    let mut driver = setup.single();

    let outcome = driver.run().unwrap();
    assert_eq!(outcome.phase, DriverPhase::Converged);
    assert_eq!(outcome.epoch_losses.len(), 3);
    assert_eq!(outcome.state.epochs_since_improvement, 2);
    assert_eq!(outcome.state.best_validation_loss, Some(outcome.epoch_losses[0]));
}

#[test]
fn test_validation_loss_is_monitored() {
    let setup = Setup::new(16, 4, DriverConfig::new(2));
    let ctx = WorkerContext::single();
    let validation = ShardedDataset::new(
        vec![TextRecord::new("zzzz yyyy xxxx")],
        Arc::new(ByteTokenizer::new()),
        ctx,
        4,
        ShardPolicy::Interleave,
    )
    .unwrap()
    .keep_remainder();
    let recorder = Recorder::default();
    let mut driver = setup.build(ctx, SingleProcess::new()).with_validation(validation).unwrap();
    driver.add_observer(recorder.clone());

    let outcome = driver.run().unwrap();
    let epochs = recorder.epochs.lock().unwrap();
    assert_eq!(epochs.len(), 2);
    let monitored = epochs[1].monitored_loss.unwrap();
    assert_ne!(monitored, outcome.epoch_losses[1]);
    assert_eq!(outcome.state.last_loss, Some(monitored));
    assert_eq!(epochs[1].accuracy, Some(outcome.epoch_accuracies[1]));
    assert!(epochs[1].val_accuracy.is_some_and(|a| (0.0..=1.0).contains(&a)));
}

#[test]
fn test_zero_step_epoch_is_configuration_error() {
    let mut driver = Setup::new(3, 4, DriverConfig::new(1)).single();
    let failure = driver.run().unwrap_err();
    assert!(matches!(failure.error, Error::Configuration(_)));
    assert_eq!(failure.state.current_step, 0);
    assert_eq!(driver.phase(), DriverPhase::Failed);
}

#[test]
fn test_run_only_once() {
    let mut driver = Setup::new(8, 4, DriverConfig::new(1)).single();
    driver.run().unwrap();
    let failure = driver.run().unwrap_err();
    assert!(matches!(failure.error, Error::Configuration(_)));
    assert_eq!(driver.phase(), DriverPhase::Exhausted);
}

#[test]
fn test_observer_stop_converges() {
    let recorder = Recorder { stop_at: Some(3), ..Default::default() };
    let mut driver = Setup::new(40, 4, DriverConfig::new(5)).single();
    driver.add_observer(recorder.clone());

    let outcome = driver.run().unwrap();
    assert_eq!(outcome.phase, DriverPhase::Converged);
    assert_eq!(outcome.state.current_step, 3);
    assert_eq!(recorder.steps.lock().unwrap().len(), 3);
}

#[test]
fn test_masks_follow_schedule_during_training() {
    let mut setup = Setup::new(40, 4, DriverConfig::new(1));
    setup.pruning = PruningConfig::new(
        SparsitySchedule::polynomial_decay(0.0, 0.5, 0, 8).unwrap().with_frequency(2).unwrap(),
    );
    let recorder = Recorder::default();
    let mut driver = setup.single();
    driver.add_observer(recorder.clone());

    driver.run().unwrap();
    let steps = recorder.steps.lock().unwrap();
    let updates: Vec<usize> = steps.iter().filter_map(|c| c.mask_update.map(|u| u.step)).collect();
    assert_eq!(updates, vec![2, 4, 6, 8]);
    let mut last = 0.0;
    for ctx in steps.iter() {
        assert!(ctx.sparsity >= last);
        last = ctx.sparsity;
    }
    assert!((driver.model().sparsity() - 0.5).abs() < 0.01);
}

#[test]
fn test_mismatched_collective_rejected() {
    let setup = Setup::new(8, 4, DriverConfig::new(1));
    let runtime = RuntimeConfiguration::new();
    let ctx = WorkerContext::new(1, 2).unwrap();
    let model = BigramLm::new(BigramConfig::new(BYTE_VOCAB_SIZE, 4), &BoundDevice::cpu(), 0).unwrap();
    let optimizer =
        DistributedOptimizer::wrap(Box::new(Sgd::new(0.1, 0.0)), SingleProcess::new(), &runtime);
    let data = ShardedDataset::new(records(8), Arc::new(ByteTokenizer::new()), ctx, 4, ShardPolicy::Interleave)
        .unwrap();
    let err = TrainingDriver::new(
        ctx,
        &runtime,
        PrunableModel::wrap(model, setup.pruning.clone()).unwrap(),
        optimizer,
        data,
        setup.config.clone(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_zero_epochs_rejected() {
    assert!(DriverConfig::new(0).validate().is_err());
    assert!(DriverConfig::new(1).with_patience(0, 0.0).validate().is_err());
    assert!(DriverConfig::new(1).with_patience(1, -1.0).validate().is_err());
}

#[test]
fn test_two_workers_stay_identical_with_uneven_shards() {
    // 17 records, batch 3: rank 0 has 9 records (3 batches), rank 1 has 8 (2)
    let setup = Arc::new(Setup::new(17, 3, DriverConfig::new(2)));
    let members = LocalGroup::new(2, Duration::from_secs(30)).unwrap();

    let handles: Vec<_> = members
        .into_iter()
        .enumerate()
        .map(|(rank, member)| {
            let setup = Arc::clone(&setup);
            thread::spawn(move || {
                let mut driver = setup.build(WorkerContext::new(rank, 2).unwrap(), member);
                let outcome = driver.run().unwrap();
                (outcome, driver.into_model().finalize())
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let (first, model0) = &results[0];
    let (second, model1) = &results[1];
    assert_eq!(first.state.current_step, 4, "epochs end when the shorter shard runs out");
    assert_eq!(first.state, second.state);
    assert_eq!(first.epoch_losses, second.epoch_losses);
    assert_eq!(first.epoch_accuracies, second.epoch_accuracies);
    assert_eq!(model0.parameters(), model1.parameters(), "replicas diverged");
}

#[test]
fn test_failure_on_one_worker_fails_the_group() {
    let setup = Arc::new(Setup::new(40, 4, DriverConfig::new(3)));
    let members = LocalGroup::new(2, Duration::from_secs(60)).unwrap();
    let started = Instant::now();

    let handles: Vec<_> = members
        .into_iter()
        .enumerate()
        .map(|(rank, member)| {
            let setup = Arc::clone(&setup);
            thread::spawn(move || {
                let mut driver = setup.build(WorkerContext::new(rank, 2).unwrap(), member);
                if rank == 1 {
                    driver.add_observer(Recorder { fail_at: Some(2), ..Default::default() });
                }
                let failure = driver.run().unwrap_err();
                (failure, driver.phase())
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(started.elapsed() < Duration::from_secs(30), "peer waited out the timeout");
    let (failed, phase1) = &results[1];
    assert!(matches!(failed.error, Error::Data(_)));
    assert_eq!(*phase1, DriverPhase::Failed);
    let (peer, phase0) = &results[0];
    assert_eq!(peer.error.category(), ErrorCategory::CoordinationTimeout);
    assert_eq!(*phase0, DriverPhase::Failed);
    assert_eq!(peer.state.current_step, 2);
}
