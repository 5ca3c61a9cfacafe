use super::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Temperature as a pure function of the iteration number.
///
/// Every schedule is non-increasing. A temperature of zero makes the chain greedy: only
/// proposals that do not raise the energy are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "kebab-case"
)]
pub enum AnnealingSchedule {
    Greedy,
    Constant {
        temperature: f64,
    },
    /// `max(initial · ratio^i, minimum)`
    Geometric {
        initial: f64,
        ratio: f64,
        #[serde(default)]
        minimum: f64,
    },
    /// Linear interpolation from `initial` to `final_temperature` over `iterations`, then flat.
    Linear {
        initial: f64,
        final_temperature: f64,
        iterations: u64,
    },
    /// `scale / ln(i + e)`
    Logarithmic {
        scale: f64,
    },
}

impl Default for AnnealingSchedule {
    fn default() -> Self {
        AnnealingSchedule::Geometric {
            initial: 1.0,
            ratio: 0.999,
            minimum: 0.0,
        }
    }
}

impl AnnealingSchedule {
    pub fn temperature(&self, iteration: u64) -> f64 {
        match *self {
            AnnealingSchedule::Greedy => 0.0,
            AnnealingSchedule::Constant { temperature } => temperature,
            AnnealingSchedule::Geometric {
                initial,
                ratio,
                minimum,
            } => {
                let exponent = iteration.min(i32::MAX as u64) as i32;
                (initial * ratio.powi(exponent)).max(minimum)
            }
            AnnealingSchedule::Linear {
                initial,
                final_temperature,
                iterations,
            } => {
                if iterations == 0 {
                    return final_temperature;
                }
                let progress = (iteration as f64 / iterations as f64).min(1.0);
                initial + (final_temperature - initial) * progress
            }
            AnnealingSchedule::Logarithmic { scale } => {
                scale / (iteration as f64 + std::f64::consts::E).ln()
            }
        }
    }

    pub fn is_greedy(&self) -> bool {
        matches!(self, AnnealingSchedule::Greedy)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negative = |name: &str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidSchedule(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )))
            }
        };
        match *self {
            AnnealingSchedule::Greedy => Ok(()),
            AnnealingSchedule::Constant { temperature } => non_negative("temperature", temperature),
            AnnealingSchedule::Geometric {
                initial,
                ratio,
                minimum,
            } => {
                non_negative("initial", initial)?;
                non_negative("minimum", minimum)?;
                if !(ratio > 0.0 && ratio <= 1.0) {
                    return Err(ConfigError::InvalidSchedule(format!(
                        "ratio must lie in (0, 1], got {}",
                        ratio
                    )));
                }
                Ok(())
            }
            AnnealingSchedule::Linear {
                initial,
                final_temperature,
                ..
            } => {
                non_negative("initial", initial)?;
                non_negative("final-temperature", final_temperature)?;
                if final_temperature > initial {
                    return Err(ConfigError::InvalidSchedule(format!(
                        "final-temperature {} exceeds initial {}",
                        final_temperature, initial
                    )));
                }
                Ok(())
            }
            AnnealingSchedule::Logarithmic { scale } => non_negative("scale", scale),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_non_increasing(schedule: &AnnealingSchedule) {
        let mut previous = schedule.temperature(0);
        for i in 1..5_000 {
            let t = schedule.temperature(i);
            assert!(t <= previous, "{:?} increased at {}", schedule, i);
            assert!(t >= 0.0);
            previous = t;
        }
    }

    #[test]
    fn all_schedules_are_non_increasing() {
        for schedule in [
            AnnealingSchedule::Greedy,
            AnnealingSchedule::Constant { temperature: 2.0 },
            AnnealingSchedule::Geometric {
                initial: 10.0,
                ratio: 0.99,
                minimum: 0.1,
            },
            AnnealingSchedule::Linear {
                initial: 5.0,
                final_temperature: 0.5,
                iterations: 1_000,
            },
            AnnealingSchedule::Logarithmic { scale: 3.0 },
        ] {
            schedule.validate().unwrap();
            assert_non_increasing(&schedule);
        }
    }

    #[test]
    fn geometric_schedule_is_floored_at_minimum() {
        let schedule = AnnealingSchedule::Geometric {
            initial: 1.0,
            ratio: 0.5,
            minimum: 0.2,
        };
        assert_eq!(schedule.temperature(0), 1.0);
        assert_eq!(schedule.temperature(1), 0.5);
        assert_eq!(schedule.temperature(10), 0.2);
    }

    #[test]
    fn linear_schedule_reaches_final_temperature() {
        let schedule = AnnealingSchedule::Linear {
            initial: 4.0,
            final_temperature: 1.0,
            iterations: 3,
        };
        assert_eq!(schedule.temperature(1), 3.0);
        assert_eq!(schedule.temperature(3), 1.0);
        assert_eq!(schedule.temperature(100), 1.0);
    }

    #[test]
    fn logarithmic_schedule_starts_at_scale() {
        let schedule = AnnealingSchedule::Logarithmic { scale: 2.0 };
        assert!((schedule.temperature(0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn validate_rejects_increasing_or_negative_schedules() {
        assert!(AnnealingSchedule::Constant { temperature: -1.0 }.validate().is_err());
        assert!(
            AnnealingSchedule::Geometric {
                initial: 1.0,
                ratio: 1.5,
                minimum: 0.0
            }
            .validate()
            .is_err()
        );
        assert!(
            AnnealingSchedule::Linear {
                initial: 1.0,
                final_temperature: 2.0,
                iterations: 10
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn deserializes_tagged_schedule() {
        let schedule: AnnealingSchedule =
            toml::from_str("type = \"geometric\"\ninitial = 3.0\nratio = 0.9").unwrap();
        assert_eq!(
            schedule,
            AnnealingSchedule::Geometric {
                initial: 3.0,
                ratio: 0.9,
                minimum: 0.0
            }
        );
    }
}
