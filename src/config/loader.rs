//! Loading run configurations from YAML

use std::fs;
use std::path::Path;

use super::schema::RunSpec;
use super::validate::validate_config;
use crate::error::{Error, Result};

/// Parse and validate a YAML run configuration.
///
/// # Errors
///
/// [`Error::Configuration`] if the YAML does not match the schema, a
/// sparsity schedule would decrease, or a value is out of range.
pub fn parse_config(yaml: &str) -> Result<RunSpec> {
    let spec: RunSpec = serde_yaml::from_str(yaml)
        .map_err(|e| Error::Configuration(format!("Failed to parse YAML config: {e}")))?;
    validate_config(&spec).map_err(|e| Error::Configuration(format!("Invalid config: {e}")))?;
    Ok(spec)
}

/// Read, parse and validate a YAML run configuration file.
///
/// # Example
///
/// ```no_run
/// use podar::config::load_config;
///
/// let spec = load_config("run.yaml")?;
/// println!("{} epochs", spec.training.epochs);
/// # Ok::<(), podar::Error>(())
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<RunSpec> {
    let path = path.as_ref();
    let yaml = fs::read_to_string(path)
        .map_err(|e| Error::io(format!("Failed to read config file {}", path.display()), e))?;
    parse_config(&yaml)
}
