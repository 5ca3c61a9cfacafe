use nalgebra::{Point3, Vector3};

/// Axis-aligned bounding box in physical (resolution-scaled) coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl BoundingBox {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    pub fn from_center_extent(center: &Point3<f64>, half_extent: &Vector3<f64>) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn volume(&self) -> f64 {
        let size = self.size();
        size.x.max(0.0) * size.y.max(0.0) * size.z.max(0.0)
    }

    /// Half of the box diagonal: the radius of the sphere enclosing the box.
    pub fn half_diagonal(&self) -> f64 {
        self.size().norm() * 0.5
    }

    pub fn contains(&self, point: &Point3<f64>) -> bool {
        (0..3).all(|axis| point[axis] >= self.min[axis] && point[axis] <= self.max[axis])
    }

    pub fn grown(&self, margin: f64) -> Self {
        let margin = Vector3::repeat(margin);
        Self {
            min: self.min - margin,
            max: self.max + margin,
        }
    }

    /// The largest per-axis gap between the two boxes; zero or negative when they overlap.
    pub fn gap(&self, other: &BoundingBox) -> f64 {
        (0..3)
            .map(|axis| {
                (self.min[axis] - other.max[axis]).max(other.min[axis] - self.max[axis])
            })
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// True when the boxes overlap or are separated by at most `threshold` along every axis.
    pub fn within_distance(&self, other: &BoundingBox, threshold: f64) -> bool {
        self.gap(other) <= threshold
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let min = Point3::new(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.min.z.max(other.min.z),
        );
        let max = Point3::new(
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
            self.max.z.min(other.max.z),
        );
        if (0..3).all(|axis| min[axis] <= max[axis]) {
            Some(BoundingBox { min, max })
        } else {
            None
        }
    }
}

/// Rotates `v` by `angle` radians about the z axis.
#[inline]
pub fn rotate_z(v: &Vector3<f64>, angle: f64) -> Vector3<f64> {
    let (sin, cos) = angle.sin_cos();
    Vector3::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos, v.z)
}

/// Wraps an orientation into `[0, π)`. Marks are symmetric under a half turn.
#[inline]
pub fn wrap_angle(angle: f64) -> f64 {
    angle.rem_euclid(std::f64::consts::PI)
}

/// Signed smallest difference between two orientations modulo π, in `[-π/2, π/2)`.
#[inline]
pub fn angle_difference(to: f64, from: f64) -> f64 {
    let half_pi = std::f64::consts::FRAC_PI_2;
    (to - from + half_pi).rem_euclid(std::f64::consts::PI) - half_pi
}
