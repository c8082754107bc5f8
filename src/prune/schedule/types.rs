//! Type definitions for sparsity schedules.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default exponent of the polynomial-decay schedule.
pub const DEFAULT_POWER: f32 = 3.0;

/// Default number of steps between mask recomputations.
pub const DEFAULT_FREQUENCY: usize = 100;

/// Shape of the sparsity ramp between `begin_step` and `end_step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleShape {
    /// Jump from initial to final sparsity at `begin_step`.
    Constant,
    /// `s(t) = final + (initial - final) * (1 - p)^power`, `p` the ramp progress.
    ///
    /// `power = 1` is a linear ramp; `power = 3` is the schedule of
    /// Zhu & Gupta (2017).
    Polynomial {
        /// Decay exponent, strictly positive.
        power: f32,
    },
}

/// Monotonically non-decreasing map from training step to target sparsity.
///
/// Immutable once constructed; every constructor validates the schedule and
/// fails with [`Error::ScheduleInvariant`] if it could ever decrease.
///
/// # Example
///
/// ```
/// use podar::prune::SparsitySchedule;
///
/// let schedule = SparsitySchedule::polynomial_decay(0.0, 0.5, 0, 999).unwrap();
/// assert_eq!(schedule.target_at(0), 0.0);
/// assert!(schedule.target_at(500) > 0.0 && schedule.target_at(500) < 0.5);
/// assert_eq!(schedule.target_at(1000), 0.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleSpec", into = "ScheduleSpec")]
pub struct SparsitySchedule {
    pub(super) shape: ScheduleShape,
    pub(super) initial_sparsity: f32,
    pub(super) final_sparsity: f32,
    pub(super) begin_step: usize,
    pub(super) end_step: usize,
    pub(super) frequency: usize,
}

impl SparsitySchedule {
    /// Create a validated schedule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScheduleInvariant`] if the schedule is not monotone
    /// or its parameters are out of range.
    pub fn new(
        shape: ScheduleShape,
        initial_sparsity: f32,
        final_sparsity: f32,
        begin_step: usize,
        end_step: usize,
        frequency: usize,
    ) -> Result<Self> {
        let schedule = Self {
            shape,
            initial_sparsity,
            final_sparsity,
            begin_step,
            end_step,
            frequency,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Polynomial decay with the default power (3) and frequency (100).
    pub fn polynomial_decay(
        initial_sparsity: f32,
        final_sparsity: f32,
        begin_step: usize,
        end_step: usize,
    ) -> Result<Self> {
        Self::new(
            ScheduleShape::Polynomial { power: DEFAULT_POWER },
            initial_sparsity,
            final_sparsity,
            begin_step,
            end_step,
            DEFAULT_FREQUENCY,
        )
    }

    /// Linear ramp (polynomial decay with power 1).
    pub fn linear(
        initial_sparsity: f32,
        final_sparsity: f32,
        begin_step: usize,
        end_step: usize,
    ) -> Result<Self> {
        Self::new(
            ScheduleShape::Polynomial { power: 1.0 },
            initial_sparsity,
            final_sparsity,
            begin_step,
            end_step,
            DEFAULT_FREQUENCY,
        )
    }

    /// Constant target sparsity from `begin_step` on, zero before.
    pub fn constant(sparsity: f32, begin_step: usize) -> Result<Self> {
        Self::new(ScheduleShape::Constant, 0.0, sparsity, begin_step, begin_step, DEFAULT_FREQUENCY)
    }

    /// Same schedule with a different mask update frequency.
    pub fn with_frequency(self, frequency: usize) -> Result<Self> {
        Self::new(
            self.shape,
            self.initial_sparsity,
            self.final_sparsity,
            self.begin_step,
            self.end_step,
            frequency,
        )
    }

    /// Ramp shape.
    pub fn shape(&self) -> ScheduleShape {
        self.shape
    }

    /// Sparsity before `begin_step`.
    pub fn initial_sparsity(&self) -> f32 {
        self.initial_sparsity
    }

    /// Sparsity from `end_step` on.
    pub fn final_sparsity(&self) -> f32 {
        self.final_sparsity
    }

    /// First step of the ramp.
    pub fn begin_step(&self) -> usize {
        self.begin_step
    }

    /// Step at which the final sparsity is reached.
    pub fn end_step(&self) -> usize {
        self.end_step
    }

    /// Steps between mask recomputations.
    pub fn frequency(&self) -> usize {
        self.frequency
    }
}

/// Serialized form of a [`SparsitySchedule`] as it appears in run configs.
///
/// ```yaml
/// schedule:
///   type: polynomial_decay
///   initial_sparsity: 0.0
///   final_sparsity: 0.5
///   begin_step: 0
///   end_step: 9999
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleSpec {
    /// Constant sparsity from `begin_step`.
    Constant {
        sparsity: f32,
        #[serde(default)]
        begin_step: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_step: Option<usize>,
        #[serde(default = "default_frequency")]
        frequency: usize,
    },
    /// Linear ramp.
    Linear {
        #[serde(default)]
        initial_sparsity: f32,
        final_sparsity: f32,
        #[serde(default)]
        begin_step: usize,
        end_step: usize,
        #[serde(default = "default_frequency")]
        frequency: usize,
    },
    /// Polynomial decay ramp.
    PolynomialDecay {
        #[serde(default)]
        initial_sparsity: f32,
        final_sparsity: f32,
        #[serde(default)]
        begin_step: usize,
        end_step: usize,
        #[serde(default = "default_power")]
        power: f32,
        #[serde(default = "default_frequency")]
        frequency: usize,
    },
}

fn default_frequency() -> usize {
    DEFAULT_FREQUENCY
}

fn default_power() -> f32 {
    DEFAULT_POWER
}

impl TryFrom<ScheduleSpec> for SparsitySchedule {
    type Error = Error;

    fn try_from(spec: ScheduleSpec) -> Result<Self> {
        match spec {
            ScheduleSpec::Constant { sparsity, begin_step, end_step, frequency } => Self::new(
                ScheduleShape::Constant,
                0.0,
                sparsity,
                begin_step,
                end_step.unwrap_or(begin_step),
                frequency,
            ),
            ScheduleSpec::Linear {
                initial_sparsity,
                final_sparsity,
                begin_step,
                end_step,
                frequency,
            } => Self::new(
                ScheduleShape::Polynomial { power: 1.0 },
                initial_sparsity,
                final_sparsity,
                begin_step,
                end_step,
                frequency,
            ),
            ScheduleSpec::PolynomialDecay {
                initial_sparsity,
                final_sparsity,
                begin_step,
                end_step,
                power,
                frequency,
            } => Self::new(
                ScheduleShape::Polynomial { power },
                initial_sparsity,
                final_sparsity,
                begin_step,
                end_step,
                frequency,
            ),
        }
    }
}

impl From<SparsitySchedule> for ScheduleSpec {
    fn from(s: SparsitySchedule) -> Self {
        match s.shape {
            ScheduleShape::Constant => ScheduleSpec::Constant {
                sparsity: s.final_sparsity,
                begin_step: s.begin_step,
                end_step: (s.end_step != s.begin_step).then_some(s.end_step),
                frequency: s.frequency,
            },
            ScheduleShape::Polynomial { power } => ScheduleSpec::PolynomialDecay {
                initial_sparsity: s.initial_sparsity,
                final_sparsity: s.final_sparsity,
                begin_step: s.begin_step,
                end_step: s.end_step,
                power,
                frequency: s.frequency,
            },
        }
    }
}
