//! Configuration validation
//!
//! Validates run specifications for correctness before any worker starts.

mod error;
mod validator;


pub use error::ValidationError;
pub use validator::{check_paths, validate_config};
