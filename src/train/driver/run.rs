//! The per-epoch and per-step training loop

use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::core::TrainingDriver;
use super::state::{DriverPhase, RunFailure, RunOutcome};
use crate::data::Batch;
use crate::dist::{Collective, ReduceOp};
use crate::error::{Error, Result};
use crate::model::LanguageModel;
use crate::train::observer::ObserverAction;

/// Local sums of one epoch, before the group average.
#[derive(Debug, Default)]
struct EpochTally {
    steps: usize,
    loss_sum: f64,
    targets: usize,
    correct: usize,
    stopped: bool,
}

impl<M: LanguageModel, C: Collective> TrainingDriver<M, C> {
    /// Run to a terminal phase.
    ///
    /// `EndOfShard` is absorbed as an epoch boundary. Any other error
    /// aborts the collective, so peers fail fast, and is returned with the
    /// last recorded run state. Partial progress is kept.
    pub fn run(&mut self) -> std::result::Result<RunOutcome, RunFailure> {
        if self.phase != DriverPhase::Idle {
            return Err(RunFailure {
                error: Error::Configuration(format!("driver already {}", self.phase)),
                state: self.state.clone(),
            });
        }
        self.phase = DriverPhase::Running;
        self.start_time = Some(Instant::now());

        match self.run_epochs() {
            Ok(phase) => {
                self.phase = phase;
                Ok(RunOutcome {
                    phase,
                    state: self.state.clone(),
                    epoch_losses: self.epoch_losses.clone(),
                    epoch_accuracies: self.epoch_accuracies.clone(),
                    skipped_steps: self.skipped_steps,
                })
            }
            Err(err) => {
                self.phase = DriverPhase::Failed;
                error!(
                    rank = self.ctx.rank(),
                    step = self.state.current_step,
                    category = ?err.category(),
                    "training failed: {err}"
                );
                self.optimizer.collective_mut().abort(&err.to_string());
                Err(RunFailure { error: err, state: self.state.clone() })
            }
        }
    }

    fn run_epochs(&mut self) -> Result<DriverPhase> {
        info!(
            rank = self.ctx.rank(),
            world_size = self.ctx.group_size(),
            batch_size = self.train.batch_size(),
            global_batch_size = self.train.global_batch_size(),
            epochs = self.config.epochs,
            precision = %self.runtime.precision(),
            "training started"
        );

        // Replicas start identical; masks for step 0 follow from the weights.
        self.optimizer.broadcast_parameters(self.model.parameters_mut(), 0)?;
        let update = self.model.update_masks(self.state.current_step);
        let ctx = self.observer_context(update);
        if self.observers.on_train_begin(&ctx)? == ObserverAction::Stop {
            self.stop_requested = true;
        }

        let mut phase = DriverPhase::Exhausted;
        for epoch in 0..self.config.epochs {
            if self.step_budget_spent() {
                break;
            }
            self.state.current_epoch = epoch;
            let tally = self.run_epoch(epoch)?;
            if tally.stopped {
                info!(rank = self.ctx.rank(), epoch, "stop requested by an observer");
                phase = DriverPhase::Converged;
                break;
            }
            if tally.steps == 0 {
                return Err(Error::Configuration(format!(
                    "epoch {epoch} produced no training steps: {} records cannot fill a global batch of {}",
                    self.train.dataset_len(),
                    self.train.global_batch_size()
                )));
            }

            if self.end_epoch(epoch, &tally)? {
                phase = DriverPhase::Converged;
                break;
            }
        }

        let ctx = self.observer_context(None);
        self.observers.on_train_end(&ctx)?;
        info!(
            rank = self.ctx.rank(),
            %phase,
            steps = self.state.current_step,
            sparsity = self.model.sparsity(),
            "training finished"
        );
        Ok(phase)
    }

    fn run_epoch(&mut self, epoch: usize) -> Result<EpochTally> {
        let mut shard = self.train.epoch(epoch);
        let mut tally = EpochTally::default();

        loop {
            if self.config.steps_per_epoch.is_some_and(|cap| tally.steps >= cap)
                || self.step_budget_spent()
            {
                break;
            }

            let batch = match shard.next_batch() {
                Ok(batch) => Some(batch),
                Err(err) if err.is_recoverable() => {
                    debug!(rank = self.ctx.rank(), epoch, "{err}");
                    None
                }
                Err(err) => return Err(err),
            };

            // Every worker agrees on whether to run this step.
            let mut vote = [flag(batch.is_some()), flag(!self.stop_requested)];
            self.optimizer.collective_mut().all_reduce(&mut vote, ReduceOp::Min)?;
            if vote[1] == 0.0 {
                tally.stopped = true;
                break;
            }
            let Some(batch) = batch.filter(|_| vote[0] > 0.0) else {
                debug!(rank = self.ctx.rank(), epoch, steps = tally.steps, "a shard is exhausted, ending epoch");
                break;
            };

            self.step(&batch, &mut tally)?;
        }
        Ok(tally)
    }

    fn step(&mut self, batch: &Batch, tally: &mut EpochTally) -> Result<()> {
        let precision = self.runtime.precision();
        let out = self.model.loss_and_grads(batch, precision, self.optimizer.loss_scale())?;
        let accuracy = out.accuracy();
        let report = self.optimizer.apply_gradients(self.model.parameters_mut(), out.grads)?;

        self.state.current_step += 1;
        let update = self.model.update_masks(self.state.current_step);

        tally.steps += 1;
        tally.loss_sum += f64::from(out.loss) * out.targets as f64;
        tally.targets += out.targets;
        tally.correct += out.correct;
        if !report.applied {
            self.skipped_steps += 1;
        }

        let mut ctx = self.observer_context(update);
        ctx.epoch_step = tally.steps;
        ctx.loss = out.loss;
        ctx.accuracy = Some(accuracy);
        ctx.applied = report.applied;
        ctx.loss_scale = report.loss_scale;
        ctx.grad_norm = report.grad_norm;
        if self.observers.on_step_end(&ctx)? == ObserverAction::Stop {
            self.stop_requested = true;
        }
        Ok(())
    }

    /// Average the epoch's losses and accuracies over the group and apply
    /// early stopping.
    ///
    /// Returns whether the run has converged.
    fn end_epoch(&mut self, epoch: usize, tally: &EpochTally) -> Result<bool> {
        let val = match &self.validation {
            Some(validation) => self.evaluate(validation.epoch(0))?,
            None => EpochTally::default(),
        };

        let mut sums = [
            tally.loss_sum as f32,
            tally.targets as f32,
            tally.correct as f32,
            val.loss_sum as f32,
            val.targets as f32,
            val.correct as f32,
        ];
        self.optimizer.collective_mut().all_reduce(&mut sums, ReduceOp::Sum)?;
        let train_loss = mean(sums[0], sums[1]);
        let train_accuracy = mean(sums[2], sums[1]);
        let val_accuracy = (sums[4] > 0.0).then(|| mean(sums[5], sums[4]));
        let monitored = if sums[4] > 0.0 {
            mean(sums[3], sums[4])
        } else {
            if self.validation.is_some() {
                warn!(rank = self.ctx.rank(), epoch, "validation set produced no batches, monitoring training loss");
            }
            train_loss
        };

        self.epoch_losses.push(train_loss);
        self.epoch_accuracies.push(train_accuracy);
        self.state.record_epoch_loss(monitored, self.config.min_delta);

        let mut ctx = self.observer_context(None);
        ctx.epoch_step = tally.steps;
        ctx.loss = train_loss;
        ctx.monitored_loss = Some(monitored);
        ctx.accuracy = Some(train_accuracy);
        ctx.val_accuracy = val_accuracy;
        if self.observers.on_epoch_end(&ctx)? == ObserverAction::Stop {
            self.stop_requested = true;
        }

        let converged = self
            .config
            .patience
            .is_some_and(|patience| self.state.epochs_since_improvement >= patience);
        if converged {
            info!(
                rank = self.ctx.rank(),
                epoch,
                best = ?self.state.best_validation_loss,
                "early stopping: no improvement for {} epochs",
                self.state.epochs_since_improvement
            );
        }
        Ok(converged)
    }

    /// Local loss sum, target and hit counts over a validation shard.
    fn evaluate(&self, shard: crate::data::Shard) -> Result<EpochTally> {
        let precision = self.runtime.precision();
        let mut tally = EpochTally::default();
        for batch in shard {
            let batch = batch?;
            if batch.num_targets() == 0 {
                continue;
            }
            let eval = self.model.evaluate(&batch, precision)?;
            tally.loss_sum += f64::from(eval.loss) * eval.targets as f64;
            tally.targets += eval.targets;
            tally.correct += eval.correct;
            tally.steps += 1;
        }
        Ok(tally)
    }
}

fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn mean(sum: f32, count: f32) -> f32 {
    if count > 0.0 {
        sum / count
    } else {
        f32::NAN
    }
}
