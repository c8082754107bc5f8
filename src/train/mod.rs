//! Training orchestration
//!
//! - [`TrainingDriver`]: the per-worker epoch/step loop and its state machine
//! - [`observer`]: ordered hooks for progress, metrics and pruning summaries
//! - [`ModelFinalizer`]: dense artifact written by rank 0 only

mod driver;
mod finalizer;
pub mod observer;

pub use driver::{DriverConfig, DriverPhase, RunFailure, RunOutcome, TrainingDriver, TrainingRunState};
pub use finalizer::{FinalizedModel, ModelFinalizer, WRITER_RANK};
pub use observer::{MetricsLog, Observer, ObserverAction, ObserverContext, ObserverList, ProgressObserver, PruningSummaries};
