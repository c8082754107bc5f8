//! Tests for mixed-precision utilities.

use super::*;
use ndarray::arr2;

#[test]
fn test_precision_names_and_sizes() {
    assert_eq!(Precision::Fp32.name(), "fp32");
    assert_eq!(Precision::MixedFp16.to_string(), "mixed_fp16");
    assert_eq!(Precision::MixedBf16.size_bytes(), 2);
    assert!(!Precision::default().is_reduced());
}

#[test]
fn test_precision_yaml_names() {
    let p: Precision = serde_yaml::from_str("mixed_fp16").unwrap();
    assert_eq!(p, Precision::MixedFp16);
}

#[test]
fn test_fp16_round_overflows_to_infinity() {
    assert!(Precision::MixedFp16.round(1.0e6).is_infinite());
    assert!(Precision::MixedBf16.round(1.0e6).is_finite());
    assert_eq!(Precision::Fp32.round(0.1), 0.1);
}

#[test]
fn test_round_loses_mantissa() {
    let x = 1.000_123_4f32;
    assert_ne!(Precision::MixedBf16.round(x), x);
    assert_eq!(Precision::MixedBf16.round(1.0), 1.0);
}

#[test]
fn test_fp16_config_is_dynamic() {
    let config = MixedPrecisionConfig::for_precision(Precision::MixedFp16);
    assert!(config.dynamic_scaling);
    assert_eq!(config.initial_scale, 65536.0);
    assert!(config.is_mixed());

    let bf16 = MixedPrecisionConfig::for_precision(Precision::MixedBf16);
    assert!(!bf16.dynamic_scaling);
    assert_eq!(bf16.initial_scale, 1.0);
}

#[test]
fn test_scaler_unscale_valid() {
    let scaler = GradScaler::from_config(&MixedPrecisionConfig::default().with_initial_scale(4.0));
    let mut grads = vec![arr2(&[[4.0, 8.0]])];
    assert!(scaler.unscale_and_check(&mut grads));
    assert_eq!(grads[0], arr2(&[[1.0, 2.0]]));
}

#[test]
fn test_scaler_detects_overflow() {
    let scaler = GradScaler::disabled();
    let mut grads = vec![arr2(&[[1.0, f32::INFINITY]])];
    assert!(!scaler.unscale_and_check(&mut grads));
}

#[test]
fn test_scaler_backoff_and_growth() {
    let mut scaler =
        GradScaler::from_config(&MixedPrecisionConfig::for_precision(Precision::MixedFp16));
    scaler.growth_interval = 2;

    scaler.update(false);
    assert_eq!(scaler.scale(), 32768.0);
    assert_eq!(scaler.overflow_count(), 1);

    scaler.update(true);
    scaler.update(true);
    assert_eq!(scaler.scale(), 65536.0);
    assert_eq!(scaler.successful_steps(), 2);
}

#[test]
fn test_scaler_floor_is_one() {
    let mut scaler = GradScaler::from_config(
        &MixedPrecisionConfig::for_precision(Precision::MixedFp16).with_initial_scale(1.5),
    );
    scaler.update(false);
    scaler.update(false);
    assert_eq!(scaler.scale(), 1.0);
}

#[test]
fn test_static_scaler_never_changes() {
    let mut scaler = GradScaler::disabled();
    scaler.update(false);
    scaler.update(true);
    assert_eq!(scaler.scale(), 1.0);
    assert!(!scaler.is_dynamic());
    assert_eq!(scaler.overflow_count(), 1);
}
