//! Base optimizers wrapped by the Distributed Gradient Coordinator

mod adam;
mod clip;
mod optimizer;
mod scaling;
mod sgd;

pub use adam::Adam;
pub use clip::clip_grad_norm;
pub use optimizer::Optimizer;
pub use scaling::LrScaling;
pub use sgd::Sgd;
