//! Mixed-precision training utilities
//!
//! Reduced precision (fp16/bf16) is used for the forward/backward
//! computation, while master weights and optimizer state stay in f32.
//! fp16 additionally needs dynamic loss scaling to avoid gradient underflow.
//!
//! Overflow checks run on the averaged gradient, so every worker of a group
//! reaches the same skip/apply decision.

mod config;
mod scaler;
mod types;

#[cfg(test)]
mod tests;

pub use config::{MixedPrecisionConfig, DEFAULT_SCALE_GROWTH_INTERVAL};
pub use scaler::GradScaler;
pub use types::Precision;
