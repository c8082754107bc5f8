//! Driver phases, run state and run results

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// State machine of the Training Driver.
///
/// `Idle → Running → {Converged, Exhausted, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverPhase {
    /// Constructed, not started
    Idle,
    /// Inside `run`
    Running,
    /// Stopped early: no improvement for `patience` epochs, or a group-wide stop vote
    Converged,
    /// Epoch or step budget used up
    Exhausted,
    /// An unrecoverable error ended the run
    Failed,
}

impl DriverPhase {
    /// Whether the run ended successfully.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Converged | Self::Exhausted)
    }

    /// Whether no further transition can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::Exhausted | Self::Failed)
    }
}

impl fmt::Display for DriverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Converged => "converged",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Progress of a run, owned by the driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingRunState {
    /// Completed optimizer steps (applied or skipped)
    pub current_step: usize,
    /// Epoch in progress or last finished (0-indexed)
    pub current_epoch: usize,
    /// Best group-averaged monitored loss
    pub best_validation_loss: Option<f32>,
    /// Consecutive epochs without an improvement of at least `min_delta`
    pub epochs_since_improvement: usize,
    /// Monitored loss of the last finished epoch
    pub last_loss: Option<f32>,
}

impl TrainingRunState {
    /// Record an epoch's monitored loss; returns whether it improved.
    pub fn record_epoch_loss(&mut self, loss: f32, min_delta: f32) -> bool {
        self.last_loss = Some(loss);
        let improved = match self.best_validation_loss {
            None => loss.is_finite(),
            Some(best) => loss < best - min_delta,
        };
        if improved {
            self.best_validation_loss = Some(loss);
            self.epochs_since_improvement = 0;
        } else {
            self.epochs_since_improvement += 1;
        }
        improved
    }
}

/// Successful end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    /// `Converged` or `Exhausted`
    pub phase: DriverPhase,
    /// Final run state
    pub state: TrainingRunState,
    /// Group-averaged training loss per finished epoch
    pub epoch_losses: Vec<f32>,
    /// Group-wide next-token accuracy on the training data per finished epoch
    pub epoch_accuracies: Vec<f32>,
    /// Steps whose update was skipped because of overflow
    pub skipped_steps: usize,
}

/// Failed run: the error plus the last recorded state for diagnostics.
#[derive(Debug, thiserror::Error)]
#[error("run failed at epoch {}, step {}: {error}", .state.current_epoch, .state.current_step)]
pub struct RunFailure {
    #[source]
    pub error: Error,
    pub state: TrainingRunState,
}

impl RunFailure {
    pub fn into_error(self) -> Error {
        self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_classification() {
        assert!(DriverPhase::Converged.is_success());
        assert!(DriverPhase::Exhausted.is_success());
        assert!(!DriverPhase::Failed.is_success());
        assert!(DriverPhase::Failed.is_terminal());
        assert!(!DriverPhase::Running.is_terminal());
        assert_eq!(DriverPhase::Exhausted.to_string(), "exhausted");
    }

    #[test]
    fn test_patience_counting() {
        let mut state = TrainingRunState::default();
        assert!(state.record_epoch_loss(1.0, 0.01));
        assert!(state.record_epoch_loss(0.9, 0.01));
        assert!(!state.record_epoch_loss(0.895, 0.01), "below min_delta");
        assert!(!state.record_epoch_loss(1.2, 0.01));
        assert_eq!(state.epochs_since_improvement, 2);
        assert_eq!(state.best_validation_loss, Some(0.9));
        assert!(state.record_epoch_loss(0.5, 0.01));
        assert_eq!(state.epochs_since_improvement, 0);
    }

    #[test]
    fn test_nan_never_improves() {
        let mut state = TrainingRunState::default();
        assert!(!state.record_epoch_loss(f32::NAN, 0.0));
        assert_eq!(state.best_validation_loss, None);
        assert_eq!(state.epochs_since_improvement, 1);
    }

    #[test]
    fn test_failure_message_has_state() {
        let failure = RunFailure {
            error: Error::Data("bad".into()),
            state: TrainingRunState { current_step: 7, current_epoch: 2, ..Default::default() },
        };
        let msg = failure.to_string();
        assert!(msg.contains("epoch 2"));
        assert!(msg.contains("step 7"));
        assert!(msg.contains("bad"));
    }
}
