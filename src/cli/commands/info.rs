//! Info command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::cli::{InfoArgs, OutputFormat};
use crate::config::load_config;

pub fn run_info(args: InfoArgs, level: LogLevel) -> Result<(), String> {
    let spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;

    match args.format {
        OutputFormat::Text => {
            log(level, LogLevel::Normal, "Configuration Info:");
            println!();
            println!("Training data: {}", spec.data.train.display());
            println!("Optimizer: {} (lr={})", spec.optimizer.name, spec.optimizer.lr);
            println!("Epochs: {}", spec.training.epochs);
            println!("Batch size: {} per worker", spec.data.batch_size);
            println!("Precision: {}", spec.runtime.precision);

            if let Some(pruning) = &spec.pruning {
                println!("Pruning: to {} sparsity", pruning.schedule().final_sparsity());
            }
            if let Some(path) = &spec.output.model_path {
                println!("Model output: {}", path.display());
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&spec)
                .map_err(|e| format!("JSON serialization error: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&spec)
                .map_err(|e| format!("YAML serialization error: {e}"))?;
            println!("{yaml}");
        }
    }

    Ok(())
}
