//! Launch command implementation
//!
//! Starts `nproc` copies of `podar train` on this host, one per rank, and
//! hands each its assignment through `PODAR_*` variables. The first worker
//! to fail takes the rest of the group down with it.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::cli::{LaunchArgs, OverrideArgs};
use crate::config::{load_config, WorkerEnv};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Assignment of every worker in a single-host group
pub fn launch_plan(nproc: usize, master_addr: &str) -> Vec<WorkerEnv> {
    (0..nproc)
        .map(|rank| WorkerEnv {
            rank: Some(rank),
            world_size: Some(nproc),
            local_rank: Some(rank),
            local_world_size: Some(nproc),
            master_addr: Some(master_addr.to_string()),
        })
        .collect()
}

/// Arguments of one worker process
pub fn worker_args(config: &Path, overrides: &OverrideArgs, level: LogLevel) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["train".into(), config.as_os_str().to_owned()];
    args.extend(overrides.to_args().into_iter().map(OsString::from));
    if let Some(flag) = level.flag() {
        args.push(flag.into());
    }
    args
}

pub fn run_launch(args: LaunchArgs, level: LogLevel) -> Result<(), String> {
    if args.nproc == 0 {
        return Err("--nproc must be at least 1".to_string());
    }
    let spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    let master_addr = args.master_addr.clone().unwrap_or(spec.distributed.master_addr);
    let exe = std::env::current_exe().map_err(|e| format!("Cannot locate podar binary: {e}"))?;

    log(
        level,
        LogLevel::Normal,
        &format!("Launching {} workers (rendezvous at {master_addr})", args.nproc),
    );

    let worker_args = worker_args(&args.config, &args.overrides, level);
    let mut children = Vec::with_capacity(args.nproc);
    for env in launch_plan(args.nproc, &master_addr) {
        let rank = env.rank.unwrap_or_default();
        let child = Command::new(&exe).args(&worker_args).envs(env.to_vars()).spawn();
        match child {
            Ok(child) => {
                info!(rank, pid = child.id(), "worker started");
                children.push((rank, child));
            }
            Err(e) => {
                kill_all(&mut children);
                return Err(format!("Failed to start worker {rank}: {e}"));
            }
        }
    }

    supervise(children)?;
    log(level, LogLevel::Normal, "All workers finished");
    Ok(())
}

/// Wait for every worker; on the first failure kill the others.
fn supervise(mut children: Vec<(usize, Child)>) -> Result<(), String> {
    while !children.is_empty() {
        let mut index = 0;
        while index < children.len() {
            let (rank, child) = &mut children[index];
            let rank = *rank;
            match child.try_wait() {
                Ok(Some(status)) if status.success() => {
                    info!(rank, "worker exited");
                    children.swap_remove(index);
                }
                Ok(Some(status)) => {
                    children.swap_remove(index);
                    kill_all(&mut children);
                    return Err(describe_failure(rank, status));
                }
                Ok(None) => index += 1,
                Err(e) => {
                    kill_all(&mut children);
                    return Err(format!("Lost track of worker {rank}: {e}"));
                }
            }
        }
        if !children.is_empty() {
            thread::sleep(POLL_INTERVAL);
        }
    }
    Ok(())
}

fn kill_all(children: &mut Vec<(usize, Child)>) {
    for (rank, mut child) in children.drain(..) {
        if let Err(e) = child.kill() {
            error!(rank, "failed to stop worker: {e}");
        }
        let _ = child.wait();
    }
}

fn describe_failure(rank: usize, status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("Worker {rank} failed with exit code {code}"),
        None => format!("Worker {rank} was terminated by a signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::{ENV_MASTER_ADDR, ENV_RANK, ENV_WORLD_SIZE};
    use std::path::PathBuf;

    #[test]
    fn test_launch_plan_assigns_every_rank() {
        let plan = launch_plan(3, "127.0.0.1:29600");
        assert_eq!(plan.len(), 3);
        for (rank, env) in plan.iter().enumerate() {
            let ctx = env.context().unwrap();
            assert_eq!(ctx.rank(), rank);
            assert_eq!(ctx.group_size(), 3);
            assert_eq!(ctx.local_device_index(), rank);
        }
        let vars = plan[2].to_vars();
        assert!(vars.contains(&(ENV_RANK, "2".to_string())));
        assert!(vars.contains(&(ENV_WORLD_SIZE, "3".to_string())));
        assert!(vars.contains(&(ENV_MASTER_ADDR, "127.0.0.1:29600".to_string())));
    }

    #[test]
    fn test_worker_args() {
        let overrides = OverrideArgs { epochs: Some(2), ..Default::default() };
        let args = worker_args(&PathBuf::from("run.yaml"), &overrides, LogLevel::Verbose);
        let args: Vec<String> = args.into_iter().map(|a| a.into_string().unwrap()).collect();
        assert_eq!(args, vec!["train", "run.yaml", "--epochs", "2", "--verbose"]);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let args = LaunchArgs {
            config: PathBuf::from("run.yaml"),
            nproc: 0,
            master_addr: None,
            overrides: OverrideArgs::default(),
        };
        assert!(run_launch(args, LogLevel::Quiet).unwrap_err().contains("nproc"));
    }

    #[cfg(unix)]
    #[test]
    fn test_supervise_reports_first_failure() {
        let ok = Command::new("true").spawn().unwrap();
        let failing = Command::new("false").spawn().unwrap();
        let sleeper = Command::new("sleep").arg("30").spawn().unwrap();
        let err = supervise(vec![(0, ok), (1, failing), (2, sleeper)]).unwrap_err();
        assert!(err.contains("Worker 1"));
    }

    #[cfg(unix)]
    #[test]
    fn test_supervise_all_succeed() {
        let children =
            (0..2).map(|rank| (rank, Command::new("true").spawn().unwrap())).collect();
        assert!(supervise(children).is_ok());
    }
}
