//! Tests for CLI argument parsing

use super::*;
use crate::config::env::WorkerEnv;
use crate::config::RunSpec;
use std::path::PathBuf;

fn spec() -> RunSpec {
    serde_yaml::from_str(
        "data:\n  train: t.jsonl\noptimizer:\n  name: adam\n  lr: 0.001\ntraining:\n  epochs: 3\n",
    )
    .unwrap()
}

#[test]
fn test_parse_train_command() {
    let cli = parse_args(["podar", "train", "config.yaml"]).unwrap();
    match cli.command {
        Command::Train(args) => {
            assert_eq!(args.config, PathBuf::from("config.yaml"));
            assert!(!args.dry_run);
            assert_eq!(args.worker, WorkerArgs::default());
        }
        _ => panic!("Expected Train command"),
    }
}

#[test]
fn test_parse_train_with_overrides() {
    let cli = parse_args([
        "podar",
        "train",
        "config.yaml",
        "--epochs",
        "10",
        "--batch-size",
        "32",
        "--lr",
        "0.001",
        "--output-dir",
        "./output",
        "--timeout",
        "30",
    ])
    .unwrap();

    match cli.command {
        Command::Train(args) => {
            assert_eq!(args.overrides.epochs, Some(10));
            assert_eq!(args.overrides.batch_size, Some(32));
            assert!((args.overrides.lr.unwrap() - 0.001).abs() < 1e-6);
            assert_eq!(args.overrides.output_dir, Some(PathBuf::from("./output")));
            assert_eq!(args.overrides.timeout, Some(30));
        }
        _ => panic!("Expected Train command"),
    }
}

#[test]
fn test_parse_worker_assignment() {
    let cli = parse_args([
        "podar",
        "train",
        "config.yaml",
        "--rank",
        "2",
        "--world-size",
        "4",
        "--master-addr",
        "10.0.0.1:29500",
    ])
    .unwrap();

    let Command::Train(args) = cli.command else {
        panic!("Expected Train command");
    };
    let env = WorkerEnv::from(&args.worker);
    let ctx = env.context().unwrap();
    assert_eq!(ctx.rank(), 2);
    assert_eq!(ctx.group_size(), 4);
    assert_eq!(env.master_addr.as_deref(), Some("10.0.0.1:29500"));
}

#[test]
fn test_parse_launch_command() {
    let cli = parse_args(["podar", "launch", "config.yaml", "--nproc", "4", "-e", "2"]).unwrap();
    match cli.command {
        Command::Launch(args) => {
            assert_eq!(args.nproc, 4);
            assert_eq!(args.overrides.epochs, Some(2));
            assert_eq!(args.overrides.to_args(), vec!["--epochs", "2"]);
        }
        _ => panic!("Expected Launch command"),
    }
}

#[test]
fn test_override_args_round_trip() {
    let overrides = OverrideArgs {
        output_dir: Some(PathBuf::from("out")),
        epochs: Some(5),
        batch_size: Some(16),
        lr: Some(0.5),
        seed: Some(9),
        timeout: Some(12),
    };
    let mut argv = vec!["podar".to_string(), "train".to_string(), "c.yaml".to_string()];
    argv.extend(overrides.to_args());
    let Command::Train(args) = parse_args(argv).unwrap().command else {
        panic!("Expected Train command");
    };
    assert_eq!(args.overrides, overrides);
}

#[test]
fn test_parse_validate_command() {
    let cli = parse_args(["podar", "validate", "config.yaml", "--detailed"]).unwrap();
    match cli.command {
        Command::Validate(args) => {
            assert_eq!(args.config, PathBuf::from("config.yaml"));
            assert!(args.detailed);
        }
        _ => panic!("Expected Validate command"),
    }
}

#[test]
fn test_parse_info_formats() {
    let cli = parse_args(["podar", "info", "config.yaml", "--format", "json"]).unwrap();
    match cli.command {
        Command::Info(args) => assert_eq!(args.format, OutputFormat::Json),
        _ => panic!("Expected Info command"),
    }
    assert!(parse_args(["podar", "info", "config.yaml", "--format", "xml"]).is_err());
}

#[test]
fn test_global_flags() {
    let cli = parse_args(["podar", "validate", "config.yaml", "-v"]).unwrap();
    assert!(cli.verbose);
    assert!(!cli.quiet);

    let cli = parse_args(["podar", "-q", "info", "config.yaml"]).unwrap();
    assert!(cli.quiet);
}

#[test]
fn test_missing_config_is_error() {
    assert!(parse_args(["podar", "train"]).is_err());
}

#[test]
fn test_apply_overrides() {
    let mut spec = spec();
    let overrides = OverrideArgs {
        output_dir: Some(PathBuf::from("out")),
        epochs: Some(7),
        batch_size: Some(2),
        lr: Some(0.1),
        seed: Some(11),
        timeout: Some(5),
    };
    apply_overrides(&mut spec, &overrides);

    assert_eq!(spec.training.epochs, 7);
    assert_eq!(spec.data.batch_size, 2);
    assert!((spec.optimizer.lr - 0.1).abs() < 1e-6);
    assert_eq!(spec.model.seed, 11);
    assert_eq!(spec.data.seed, 11);
    assert_eq!(spec.distributed.timeout_secs, 5);
    assert_eq!(spec.output.log_dir, Some(PathBuf::from("out")));
    assert_eq!(spec.output.model_path, Some(PathBuf::from("out/model.safetensors")));
}

#[test]
fn test_apply_no_overrides_keeps_spec() {
    let mut spec = spec();
    apply_overrides(&mut spec, &OverrideArgs::default());
    assert_eq!(spec.training.epochs, 3);
    assert!(spec.output.log_dir.is_none());
}
