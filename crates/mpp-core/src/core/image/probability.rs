use super::stack::{BackgroundStack, ImageError, Resolution};
use nalgebra::Point3;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

/// Auxiliary per-voxel weights guiding where births are proposed.
///
/// Sampling picks a voxel proportionally to its weight and then a uniform point
/// inside that voxel, so the density of a point is `weight / total / voxel_volume`.
#[derive(Debug, Clone)]
pub struct ProbabilityMap {
    width: usize,
    height: usize,
    depth: usize,
    resolution: Resolution,
    weights: Vec<f64>,
    total: f64,
    distribution: WeightedIndex<f64>,
}

impl ProbabilityMap {
    pub fn new(
        width: usize,
        height: usize,
        depth: usize,
        resolution: Resolution,
        weights: Vec<f64>,
    ) -> Result<Self, ImageError> {
        let expected = width * height * depth;
        if expected == 0 {
            return Err(ImageError::EmptyDimensions {
                width,
                height,
                depth,
            });
        }
        if weights.len() != expected {
            return Err(ImageError::VoxelCountMismatch {
                expected,
                actual: weights.len(),
            });
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ImageError::InvalidWeights);
        }
        let total: f64 = weights.iter().sum();
        let distribution =
            WeightedIndex::new(&weights).map_err(|_| ImageError::InvalidWeights)?;
        Ok(Self {
            width,
            height,
            depth,
            resolution,
            weights,
            total,
            distribution,
        })
    }

    /// Builds a map whose weights are the stack's intensities shifted to be non-negative.
    pub fn from_intensities(stack: &BackgroundStack) -> Result<Self, ImageError> {
        let min = stack
            .voxels()
            .iter()
            .copied()
            .fold(f32::INFINITY, f32::min) as f64;
        let weights = stack.voxels().iter().map(|&v| v as f64 - min).collect();
        Self::new(
            stack.width(),
            stack.height(),
            stack.depth(),
            stack.resolution(),
            weights,
        )
    }

    /// Samples a point: a voxel by weight, then uniformly within the voxel.
    ///
    /// For planar maps the z coordinate is fixed at the slice center.
    pub fn sample_point(&self, rng: &mut impl Rng) -> Point3<f64> {
        let index = self.distribution.sample(rng);
        let x = index % self.width;
        let y = (index / self.width) % self.height;
        let z = index / (self.width * self.height);
        let jitter_z = if self.depth == 1 {
            0.5
        } else {
            rng.gen_range(0.0..1.0)
        };
        Point3::new(
            (x as f64 + rng.gen_range(0.0..1.0)) * self.resolution.x,
            (y as f64 + rng.gen_range(0.0..1.0)) * self.resolution.y,
            (z as f64 + jitter_z) * self.resolution.z,
        )
    }

    /// Density of `point` under [`sample_point`](Self::sample_point). Zero outside the map.
    pub fn density_at(&self, point: &Point3<f64>) -> f64 {
        let fx = point.x / self.resolution.x;
        let fy = point.y / self.resolution.y;
        let fz = point.z / self.resolution.z;
        if fx < 0.0 || fy < 0.0 || fz < 0.0 {
            return 0.0;
        }
        let (x, y, z) = (fx as usize, fy as usize, fz as usize);
        if x >= self.width || y >= self.height || z >= self.depth {
            return 0.0;
        }
        let weight = self.weights[(z * self.height + y) * self.width + x];
        let cell = if self.depth == 1 {
            self.resolution.x * self.resolution.y
        } else {
            self.resolution.voxel_volume()
        };
        weight / self.total / cell
    }
}
