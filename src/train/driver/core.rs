//! Core TrainingDriver struct and construction

use std::time::Instant;

use super::config::DriverConfig;
use super::state::{DriverPhase, TrainingRunState};
use crate::data::ShardedDataset;
use crate::dist::{Collective, DistributedOptimizer, WorkerContext};
use crate::error::{Error, Result};
use crate::model::LanguageModel;
use crate::prune::{MaskUpdate, PrunableModel};
use crate::runtime::RuntimeConfiguration;
use crate::train::observer::{Observer, ObserverContext, ObserverList};

/// Orchestration loop of one worker.
///
/// Pulls batches from the worker's shard, runs the masked forward/backward
/// pass, hands gradients to the [`DistributedOptimizer`] and advances the
/// pruning masks, until the epoch or step budget is used up or the
/// monitored loss stops improving.
pub struct TrainingDriver<M: LanguageModel, C: Collective> {
    pub(super) ctx: WorkerContext,
    pub(super) runtime: RuntimeConfiguration,
    pub(super) model: PrunableModel<M>,
    pub(super) optimizer: DistributedOptimizer<C>,
    pub(super) train: ShardedDataset,
    pub(super) validation: Option<ShardedDataset>,
    pub(super) config: DriverConfig,
    pub(super) observers: ObserverList,
    pub(super) phase: DriverPhase,
    pub(super) state: TrainingRunState,
    pub(super) stop_requested: bool,
    pub(super) skipped_steps: usize,
    pub(super) epoch_losses: Vec<f32>,
    pub(super) epoch_accuracies: Vec<f32>,
    pub(super) start_time: Option<Instant>,
}

impl<M: LanguageModel, C: Collective> TrainingDriver<M, C> {
    /// Assemble a driver from initialized components.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the optimizer's collective or the
    /// dataset belong to a different worker than `ctx`, or `config` is
    /// invalid.
    pub fn new(
        ctx: WorkerContext,
        runtime: &RuntimeConfiguration,
        model: PrunableModel<M>,
        optimizer: DistributedOptimizer<C>,
        train: ShardedDataset,
        config: DriverConfig,
    ) -> Result<Self> {
        config.validate()?;
        let collective = optimizer.collective();
        if collective.rank() != ctx.rank() || collective.world_size() != ctx.group_size() {
            return Err(Error::Configuration(format!(
                "collective is rank {} of {}, worker is {ctx}",
                collective.rank(),
                collective.world_size()
            )));
        }
        check_dataset(&ctx, &train)?;

        Ok(Self {
            ctx,
            runtime: runtime.clone(),
            model,
            optimizer,
            train,
            validation: None,
            config,
            observers: ObserverList::new(),
            phase: DriverPhase::Idle,
            state: TrainingRunState::default(),
            stop_requested: false,
            skipped_steps: 0,
            epoch_losses: Vec::new(),
            epoch_accuracies: Vec::new(),
            start_time: None,
        })
    }

    /// Evaluate early stopping on this dataset instead of the training loss.
    pub fn with_validation(mut self, validation: ShardedDataset) -> Result<Self> {
        check_dataset(&self.ctx, &validation)?;
        self.validation = Some(validation);
        Ok(self)
    }

    /// Replace the observer list.
    pub fn with_observers(mut self, observers: ObserverList) -> Self {
        self.observers = observers;
        self
    }

    /// Append an observer.
    pub fn add_observer<O: Observer + 'static>(&mut self, observer: O) {
        self.observers.add(observer);
    }

    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    pub fn state(&self) -> &TrainingRunState {
        &self.state
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    pub fn model(&self) -> &PrunableModel<M> {
        &self.model
    }

    pub fn optimizer(&self) -> &DistributedOptimizer<C> {
        &self.optimizer
    }

    /// Hand the trained model to the finalizer.
    pub fn into_model(self) -> PrunableModel<M> {
        self.model
    }

    pub(super) fn elapsed_secs(&self) -> f64 {
        self.start_time.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0)
    }

    pub(super) fn step_budget_spent(&self) -> bool {
        self.config.total_steps.is_some_and(|total| self.state.current_step >= total)
    }

    /// Observer context for the current state.
    pub(super) fn observer_context(&self, mask_update: Option<MaskUpdate>) -> ObserverContext {
        let layers = if mask_update.is_some() { self.model.layer_sparsity() } else { Vec::new() };
        ObserverContext {
            rank: self.ctx.rank(),
            epoch: self.state.current_epoch,
            max_epochs: self.config.epochs,
            step: self.state.current_step,
            lr: self.optimizer.lr(),
            loss_scale: self.optimizer.loss_scale(),
            applied: true,
            target_sparsity: self.model.target_sparsity(self.state.current_step),
            sparsity: self.model.sparsity(),
            mask_update,
            layers,
            best_loss: self.state.best_validation_loss,
            elapsed_secs: self.elapsed_secs(),
            ..Default::default()
        }
    }
}

fn check_dataset(ctx: &WorkerContext, data: &ShardedDataset) -> Result<()> {
    if data.context() != ctx {
        return Err(Error::Configuration(format!(
            "dataset is sharded for {}, worker is {ctx}",
            data.context()
        )));
    }
    Ok(())
}

impl<M: LanguageModel, C: Collective> std::fmt::Debug for TrainingDriver<M, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingDriver")
            .field("ctx", &self.ctx)
            .field("phase", &self.phase)
            .field("state", &self.state)
            .field("config", &self.config)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}
