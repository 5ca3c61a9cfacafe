use crate::core::image::probability::ProbabilityMap;
use crate::core::image::stack::BackgroundStack;
use crate::core::models::geometry::BoundingBox;
use crate::core::models::mark::{Mark, MarkKind, MarkShape};
use crate::engine::config::ConfigError;
use nalgebra::Point3;
use rand::Rng;
use std::f64::consts::PI;

const PLANAR_TOLERANCE: f64 = 1e-9;

/// Uniform prior over the shape parameters of newly born marks.
///
/// Each active size parameter is uniform on `[min_size[i], max_size[i]]`; a range with
/// `min == max` fixes the parameter. Oriented kinds draw their angle uniformly on `[0, π)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkPrior {
    pub kind: MarkKind,
    pub min_size: [f64; 3],
    pub max_size: [f64; 3],
}

impl MarkPrior {
    pub fn sphere(min_radius: f64, max_radius: f64) -> Self {
        Self {
            kind: MarkKind::Sphere,
            min_size: [min_radius; 3],
            max_size: [max_radius; 3],
        }
    }

    pub fn ellipsoid(min_radii: [f64; 3], max_radii: [f64; 3]) -> Self {
        Self {
            kind: MarkKind::Ellipsoid,
            min_size: min_radii,
            max_size: max_radii,
        }
    }

    pub fn rotatable_box(min_half_extents: [f64; 3], max_half_extents: [f64; 3]) -> Self {
        Self {
            kind: MarkKind::RotatableBox,
            min_size: min_half_extents,
            max_size: max_half_extents,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for axis in 0..self.kind.size_parameter_count() {
            let (min, max) = (self.min_size[axis], self.max_size[axis]);
            if !(min.is_finite() && max.is_finite() && min > 0.0 && max >= min) {
                return Err(ConfigError::InvalidParameter {
                    parameter: "prior.size",
                    reason: format!(
                        "size range {} must satisfy 0 < min <= max, got [{}, {}]",
                        axis, min, max
                    ),
                });
            }
        }
        Ok(())
    }

    /// The largest extent a mark drawn from this prior can reach from its center.
    pub fn max_reach(&self) -> f64 {
        let count = self.kind.size_parameter_count();
        let dims = &self.max_size[..count];
        match self.kind {
            MarkKind::Sphere | MarkKind::Ellipsoid => dims.iter().copied().fold(0.0, f64::max),
            MarkKind::RotatableBox => dims.iter().map(|d| d * d).sum::<f64>().sqrt(),
        }
    }

    /// The shape halfway through every parameter range, unrotated.
    pub fn midpoint_shape(&self) -> MarkShape {
        let mut dims = [0.0; 3];
        for (axis, dim) in dims.iter_mut().enumerate() {
            *dim = 0.5 * (self.min_size[axis] + self.max_size[axis]);
        }
        MarkShape::from_parts(self.kind, dims, 0.0)
    }

    pub fn sample_shape(&self, rng: &mut impl Rng) -> MarkShape {
        let mut dims = self.min_size;
        for axis in 0..self.kind.size_parameter_count() {
            if self.max_size[axis] > self.min_size[axis] {
                dims[axis] = rng.gen_range(self.min_size[axis]..self.max_size[axis]);
            }
        }
        let angle = if self.kind.is_oriented() {
            rng.gen_range(0.0..PI)
        } else {
            0.0
        };
        MarkShape::from_parts(self.kind, dims, angle)
    }

    /// Density of `shape` under [`sample_shape`](Self::sample_shape); zero outside the support.
    pub fn shape_density(&self, shape: &MarkShape) -> f64 {
        if shape.kind() != self.kind {
            return 0.0;
        }
        let dims = shape.dimensions();
        let mut density = 1.0;
        for axis in 0..self.kind.size_parameter_count() {
            let (min, max) = (self.min_size[axis], self.max_size[axis]);
            if dims[axis] < min || dims[axis] > max {
                return 0.0;
            }
            if max > min {
                density /= max - min;
            }
        }
        if self.kind.is_oriented() {
            density /= PI;
        }
        density
    }

    pub fn supports(&self, shape: &MarkShape) -> bool {
        self.shape_density(shape) > 0.0
    }
}

/// Where new mark centers are drawn.
#[derive(Debug, Clone)]
pub enum PositionSampler<'a> {
    /// Uniform over the stack extent.
    Uniform {
        extent: BoundingBox,
        planar_z: Option<f64>,
    },
    /// Weighted by a probability map, uniform inside the chosen voxel.
    Guided {
        map: &'a ProbabilityMap,
        extent: BoundingBox,
        planar_z: Option<f64>,
    },
}

impl<'a> PositionSampler<'a> {
    pub fn uniform(stack: &BackgroundStack) -> Self {
        let extent = stack.extent();
        PositionSampler::Uniform {
            planar_z: stack.is_planar().then(|| extent.center().z),
            extent,
        }
    }

    pub fn guided(stack: &BackgroundStack, map: &'a ProbabilityMap) -> Self {
        let extent = stack.extent();
        PositionSampler::Guided {
            map,
            planar_z: stack.is_planar().then(|| extent.center().z),
            extent,
        }
    }

    pub fn extent(&self) -> &BoundingBox {
        match self {
            PositionSampler::Uniform { extent, .. } | PositionSampler::Guided { extent, .. } => {
                extent
            }
        }
    }

    /// The fixed z coordinate of every center when the stack is planar.
    pub fn planar_z(&self) -> Option<f64> {
        match self {
            PositionSampler::Uniform { planar_z, .. } | PositionSampler::Guided { planar_z, .. } => {
                *planar_z
            }
        }
    }

    /// Whether `point` is a center this sampler could have produced.
    pub fn admits(&self, point: &Point3<f64>) -> bool {
        if !self.extent().contains(point) {
            return false;
        }
        match self.planar_z() {
            Some(z) => (point.z - z).abs() <= PLANAR_TOLERANCE,
            None => true,
        }
    }

    pub fn sample(&self, rng: &mut impl Rng) -> Point3<f64> {
        match self {
            PositionSampler::Uniform { extent, planar_z } => {
                let x = rng.gen_range(extent.min.x..extent.max.x);
                let y = rng.gen_range(extent.min.y..extent.max.y);
                let z = match planar_z {
                    Some(z) => *z,
                    None => rng.gen_range(extent.min.z..extent.max.z),
                };
                Point3::new(x, y, z)
            }
            PositionSampler::Guided { map, .. } => map.sample_point(rng),
        }
    }

    pub fn density(&self, point: &Point3<f64>) -> f64 {
        if !self.admits(point) {
            return 0.0;
        }
        match self {
            PositionSampler::Uniform { extent, planar_z } => {
                let size = extent.size();
                match planar_z {
                    Some(_) => 1.0 / (size.x * size.y),
                    None => 1.0 / (size.x * size.y * size.z),
                }
            }
            PositionSampler::Guided { map, .. } => map.density_at(point),
        }
    }
}

/// The birth distribution `q`: a center from the position sampler and a shape from the prior.
#[derive(Debug, Clone)]
pub struct BirthDistribution<'a> {
    prior: MarkPrior,
    position: PositionSampler<'a>,
}

impl<'a> BirthDistribution<'a> {
    pub fn new(prior: MarkPrior, position: PositionSampler<'a>) -> Self {
        Self { prior, position }
    }

    pub fn prior(&self) -> &MarkPrior {
        &self.prior
    }

    pub fn position(&self) -> &PositionSampler<'a> {
        &self.position
    }

    /// Draws a mark and returns it with its density.
    pub fn sample(&self, rng: &mut impl Rng) -> (Mark, f64) {
        let center = self.position.sample(rng);
        let shape = self.prior.sample_shape(rng);
        let mark = Mark::new(center, shape);
        (mark, self.density(&mark))
    }

    pub fn density(&self, mark: &Mark) -> f64 {
        self.position.density(&mark.center) * self.prior.shape_density(&mark.shape)
    }

    /// Whether `mark` lies in the support of the distribution.
    pub fn supports(&self, mark: &Mark) -> bool {
        self.position.admits(&mark.center) && self.prior.supports(&mark.shape)
    }
}
