//! Unit tests for the polynomial-decay schedule.

use crate::error::Error;
use crate::prune::schedule::{ScheduleShape, SparsitySchedule};
use approx::assert_relative_eq;

#[test]
fn test_polynomial_reference_points() {
    let schedule = SparsitySchedule::polynomial_decay(0.0, 0.5, 0, 999).unwrap();

    assert_eq!(schedule.target_at(0), 0.0, "starts at initial sparsity");
    let mid = schedule.target_at(500);
    assert!(mid > 0.0 && mid < 0.5, "mid-ramp target {mid} must be strictly inside (0, 0.5)");
    assert_eq!(schedule.target_at(999), 0.5);
    assert_eq!(schedule.target_at(1000), 0.5);
    assert_eq!(schedule.target_at(50_000), 0.5);
}

#[test]
fn test_polynomial_cubic_formula() {
    let schedule = SparsitySchedule::polynomial_decay(0.1, 0.9, 100, 200).unwrap();
    // p = 0.5 → 0.9 + (0.1 - 0.9) * 0.125
    assert_relative_eq!(schedule.target_at(150), 0.8, epsilon = 1e-6);
}

#[test]
fn test_linear_midpoint() {
    let schedule = SparsitySchedule::linear(0.0, 0.5, 0, 1000).unwrap();
    assert_relative_eq!(schedule.target_at(500), 0.25, epsilon = 1e-6);
    assert_eq!(schedule.shape(), ScheduleShape::Polynomial { power: 1.0 });
}

#[test]
fn test_before_begin_is_initial() {
    let schedule = SparsitySchedule::linear(0.2, 0.5, 100, 1000).unwrap();
    assert_eq!(schedule.target_at(0), 0.2);
    assert_eq!(schedule.target_at(99), 0.2);
}

#[test]
fn test_empty_ramp_rejected() {
    let err = SparsitySchedule::polynomial_decay(0.0, 0.5, 100, 100).unwrap_err();
    assert!(matches!(err, Error::ScheduleInvariant(_)));
}

#[test]
fn test_non_positive_power_rejected() {
    for power in [0.0, -1.0, f32::NAN] {
        let err = SparsitySchedule::new(ScheduleShape::Polynomial { power }, 0.0, 0.5, 0, 10, 1)
            .unwrap_err();
        assert!(matches!(err, Error::ScheduleInvariant(_)), "power {power} accepted");
    }
}
