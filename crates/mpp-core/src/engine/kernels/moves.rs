use super::prior::BirthDistribution;
use super::proposal::Proposal;
use super::proposer::KernelWeights;
use super::KernelKind;
use crate::core::models::configuration::MarksConfiguration;
use crate::core::models::geometry::{angle_difference, wrap_angle};
use crate::core::models::mark::{Mark, MarkShape};
use crate::engine::config::ConfigError;
use nalgebra::Vector3;
use rand::Rng;
use std::f64::consts::FRAC_PI_2;

const JITTER_TOLERANCE: f64 = 1e-9;

/// Half-widths of the uniform jitter applied by the move kernel. Zero disables a component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveConfig {
    pub max_translation: f64,
    pub max_resize: f64,
    pub max_rotation: f64,
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            max_translation: 2.0,
            max_resize: 0.5,
            max_rotation: 0.2,
        }
    }
}

impl MoveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("moves.max-translation", self.max_translation, f64::INFINITY),
            ("moves.max-resize", self.max_resize, f64::INFINITY),
            ("moves.max-rotation", self.max_rotation, FRAC_PI_2),
        ];
        for (parameter, value, limit) in checks {
            if !(value.is_finite() && value >= 0.0 && value <= limit) {
                return Err(ConfigError::InvalidParameter {
                    parameter,
                    reason: format!("must be finite, non-negative and at most {}, got {}", limit, value),
                });
            }
        }
        if self.max_translation == 0.0 && self.max_resize == 0.0 && self.max_rotation == 0.0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "moves",
                reason: "at least one jitter component must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Jitters one mark chosen uniformly, keeping its id.
///
/// forward = p_move / n · j(new | old), backward = p_move / n · j(old | new). `None`
/// when the configuration is empty or the jittered mark leaves the birth support.
pub fn propose_move(
    configuration: &MarksConfiguration,
    birth: &BirthDistribution<'_>,
    config: &MoveConfig,
    weights: &KernelWeights,
    rng: &mut impl Rng,
) -> Option<Proposal> {
    let n = configuration.len();
    if n == 0 {
        return None;
    }
    let (id, old) = configuration.nth(rng.gen_range(0..n))?;
    let planar = birth.position().planar_z().is_some();
    let new = jitter(old, config, planar, rng);
    if new.is_degenerate() || !birth.supports(&new) {
        return None;
    }
    let selection = weights.get(KernelKind::Move) / n as f64;
    Some(Proposal {
        kernel: KernelKind::Move,
        removed: vec![id],
        added: vec![(id, new)],
        forward_density: selection * jitter_density(old, &new, config, planar),
        backward_density: selection * jitter_density(&new, old, config, planar),
    })
}

fn symmetric(rng: &mut impl Rng, half_width: f64) -> f64 {
    if half_width > 0.0 {
        rng.gen_range(-half_width..=half_width)
    } else {
        0.0
    }
}

pub fn jitter(mark: &Mark, config: &MoveConfig, planar: bool, rng: &mut impl Rng) -> Mark {
    let t = config.max_translation;
    let offset = Vector3::new(
        symmetric(rng, t),
        symmetric(rng, t),
        if planar { 0.0 } else { symmetric(rng, t) },
    );
    let kind = mark.kind();
    let mut dims = mark.shape.dimensions();
    for dim in dims.iter_mut().take(kind.size_parameter_count()) {
        *dim += symmetric(rng, config.max_resize);
    }
    let angle = match mark.shape.angle() {
        Some(angle) => wrap_angle(angle + symmetric(rng, config.max_rotation)),
        None => 0.0,
    };
    Mark::new(mark.center + offset, MarkShape::from_parts(kind, dims, angle))
}

/// Density of jittering `from` into `to`: uniform over the jitter box, zero outside it.
pub fn jitter_density(from: &Mark, to: &Mark, config: &MoveConfig, planar: bool) -> f64 {
    if from.kind() != to.kind() {
        return 0.0;
    }
    let mut density = 1.0;
    let mut component = |difference: f64, half_width: f64| {
        if half_width > 0.0 {
            if difference.abs() > half_width + JITTER_TOLERANCE {
                density = 0.0;
            } else {
                density /= 2.0 * half_width;
            }
        } else if difference.abs() > JITTER_TOLERANCE {
            density = 0.0;
        }
    };

    let offset = to.center - from.center;
    component(offset.x, config.max_translation);
    component(offset.y, config.max_translation);
    if planar {
        component(offset.z, 0.0);
    } else {
        component(offset.z, config.max_translation);
    }

    let (a, b) = (from.shape.dimensions(), to.shape.dimensions());
    for axis in 0..from.kind().size_parameter_count() {
        component(b[axis] - a[axis], config.max_resize);
    }
    if let (Some(a), Some(b)) = (from.shape.angle(), to.shape.angle()) {
        component(angle_difference(b, a), config.max_rotation);
    }
    density
}
