//! Observers invoked by the Training Driver
//!
//! Observers replace framework callback registration with an explicit,
//! ordered list of objects receiving `on_step_end` / `on_epoch_end` events.
//!
//! Built-ins:
//! - `ProgressObserver` - `tracing` progress lines
//! - `MetricsLog` - step and epoch metrics as JSON lines
//! - `PruningSummaries` - target and achieved sparsity per mask update

mod jsonl;
mod list;
mod metrics_log;
mod progress;
mod pruning_summaries;
mod traits;

pub use list::ObserverList;
pub use metrics_log::{MetricsEvent, MetricsLog, MetricsRecord, METRICS_FILE};
pub use progress::ProgressObserver;
pub use pruning_summaries::{PruningSummaries, PruningSummary, PRUNING_FILE};
pub use traits::{Observer, ObserverAction, ObserverContext};
