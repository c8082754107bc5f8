//! Train command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::cli::TrainArgs;
use crate::config::{apply_overrides, check_paths, load_config, validate_config, RunSpec, WorkerEnv};
use crate::run::run_worker;

/// Load the config named by `args` with every override applied
pub fn prepare_spec(args: &TrainArgs) -> Result<RunSpec, String> {
    let mut spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    apply_overrides(&mut spec, &args.overrides);
    validate_config(&spec).map_err(|e| format!("Invalid override: {e}"))?;
    check_paths(&spec).map_err(|e| format!("Config error: {e}"))?;
    Ok(spec)
}

pub fn run_train(args: TrainArgs, level: LogLevel) -> Result<(), String> {
    log(level, LogLevel::Normal, &format!("Podar: training from {}", args.config.display()));

    let spec = prepare_spec(&args)?;
    let env = WorkerEnv::from_env()
        .map_err(|e| format!("Environment error: {e}"))?
        .merged(WorkerEnv::from(&args.worker));
    let ctx = env.context().map_err(|e| format!("Worker error: {e}"))?;

    if args.dry_run {
        log(level, LogLevel::Normal, "Dry run - config validated successfully");
        log(level, LogLevel::Verbose, &format!("  Worker: {ctx}"));
        log(
            level,
            LogLevel::Verbose,
            &format!("  Optimizer: {} (lr={})", spec.optimizer.name, spec.optimizer.lr),
        );
        log(level, LogLevel::Verbose, &format!("  Epochs: {}", spec.training.epochs));
        log(
            level,
            LogLevel::Verbose,
            &format!(
                "  Batch size: {} per worker, {} global",
                spec.data.batch_size,
                spec.data.batch_size * ctx.group_size()
            ),
        );
        return Ok(());
    }

    let report = run_worker(&spec, &env).map_err(|e| format!("Training error: {e}"))?;

    if ctx.is_primary() {
        log(
            level,
            LogLevel::Normal,
            &format!(
                "Training {} after {} steps ({} epochs), sparsity {:.3}",
                report.phase,
                report.state.current_step,
                report.epoch_losses.len(),
                report.sparsity
            ),
        );
        if let Some(path) = &report.model_path {
            log(level, LogLevel::Normal, &format!("Model written to {}", path.display()));
        }
    }
    Ok(())
}
