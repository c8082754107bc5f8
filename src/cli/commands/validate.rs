//! Validate command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::cli::ValidateArgs;
use crate::config::{check_paths, load_config, RunSpec};

/// Format data configuration as a string
pub fn format_data_info(spec: &RunSpec) -> String {
    let mut lines = vec![format!("  Training data: {}", spec.data.train.display())];
    if let Some(val) = &spec.data.val {
        lines.push(format!("  Validation data: {}", val.display()));
    }
    lines.push(format!("  Batch size: {} per worker", spec.data.batch_size));
    lines.push(format!("  Shard policy: {:?}", spec.data.shard_policy));
    lines.join("\n")
}

/// Format optimizer configuration as a string
pub fn format_optimizer_info(spec: &RunSpec) -> String {
    let mut lines = vec![
        format!("  Optimizer: {}", spec.optimizer.name),
        format!("  Learning rate: {} ({:?} scaling)", spec.optimizer.lr, spec.optimizer.lr_scaling),
    ];
    if let Some(wd) = spec.optimizer.params.get("weight_decay") {
        lines.push(format!("  Weight decay: {wd}"));
    }
    lines.join("\n")
}

/// Format training configuration as a string
pub fn format_training_info(spec: &RunSpec) -> String {
    let t = &spec.training;
    let mut lines = vec![format!("  Epochs: {}", t.epochs)];
    if let Some(steps) = t.total_steps {
        lines.push(format!("  Step budget: {steps}"));
    }
    if let Some(patience) = t.patience {
        lines.push(format!("  Early stopping: patience {patience}, min_delta {}", t.min_delta));
    }
    if let Some(clip) = t.grad_clip {
        lines.push(format!("  Gradient clipping: {clip}"));
    }
    lines.push(format!("  Precision: {}", spec.runtime.precision));
    lines.join("\n")
}

/// Format pruning configuration as a string
pub fn format_pruning_info(spec: &RunSpec) -> Option<String> {
    spec.pruning.as_ref().map(|pruning| {
        let schedule = pruning.schedule();
        let block = pruning.block();
        [
            "  Pruning:".to_string(),
            format!(
                "    Sparsity: {} -> {} over steps {}..={}",
                schedule.initial_sparsity(),
                schedule.final_sparsity(),
                schedule.begin_step(),
                schedule.end_step()
            ),
            format!("    Mask updates: every {} steps", schedule.frequency()),
            format!("    Block: {}x{} ({:?} pooling)", block.height, block.width, pruning.pooling()),
        ]
        .join("\n")
    })
}

/// Print detailed configuration summary
pub fn print_detailed_summary(spec: &RunSpec) {
    println!();
    println!("Configuration Summary:");
    println!("{}", format_data_info(spec));
    println!();
    println!("{}", format_optimizer_info(spec));
    println!();
    println!("{}", format_training_info(spec));

    if let Some(pruning_info) = format_pruning_info(spec) {
        println!();
        println!("{pruning_info}");
    }
}

pub fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<(), String> {
    log(level, LogLevel::Normal, &format!("Validating config: {}", args.config.display()));

    let spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    check_paths(&spec).map_err(|e| format!("Validation failed: {e}"))?;

    log(level, LogLevel::Normal, "Configuration is valid");

    if args.detailed && level != LogLevel::Quiet {
        print_detailed_summary(&spec);
    }

    Ok(())
}
