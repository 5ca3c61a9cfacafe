use super::geometry::{BoundingBox, rotate_z, wrap_angle};
use super::ids::MarkId;
use nalgebra::{Point3, Vector3};
use phf::phf_map;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed family of geometric primitives a mark can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkKind {
    Sphere,
    Ellipsoid,
    RotatableBox,
}

static MARK_KIND_NAMES: phf::Map<&'static str, MarkKind> = phf_map! {
    "sphere" => MarkKind::Sphere,
    "circle" => MarkKind::Sphere,
    "ellipsoid" => MarkKind::Ellipsoid,
    "ellipse" => MarkKind::Ellipsoid,
    "rotatable-box" => MarkKind::RotatableBox,
    "box" => MarkKind::RotatableBox,
    "rectangle" => MarkKind::RotatableBox,
};

impl MarkKind {
    pub const ALL: [MarkKind; 3] = [
        MarkKind::Sphere,
        MarkKind::Ellipsoid,
        MarkKind::RotatableBox,
    ];

    /// Resolves a kind from its name or one of its aliases (`"ellipse"`, `"box"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        MARK_KIND_NAMES
            .get(name.trim().to_ascii_lowercase().as_str())
            .copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            MarkKind::Sphere => "sphere",
            MarkKind::Ellipsoid => "ellipsoid",
            MarkKind::RotatableBox => "rotatable-box",
        }
    }

    /// Whether marks of this kind carry an orientation angle.
    pub fn is_oriented(&self) -> bool {
        !matches!(self, MarkKind::Sphere)
    }

    /// Number of independent size parameters.
    pub fn size_parameter_count(&self) -> usize {
        match self {
            MarkKind::Sphere => 1,
            MarkKind::Ellipsoid | MarkKind::RotatableBox => 3,
        }
    }
}

impl fmt::Display for MarkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MarkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown mark kind '{}'", s))
    }
}

/// Kind-specific shape parameters. Orientation is a rotation about the z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkShape {
    Sphere { radius: f64 },
    Ellipsoid { radii: [f64; 3], angle: f64 },
    RotatableBox { half_extents: [f64; 3], angle: f64 },
}

impl MarkShape {
    pub fn kind(&self) -> MarkKind {
        match self {
            MarkShape::Sphere { .. } => MarkKind::Sphere,
            MarkShape::Ellipsoid { .. } => MarkKind::Ellipsoid,
            MarkShape::RotatableBox { .. } => MarkKind::RotatableBox,
        }
    }

    /// Size along each local axis (radius or half extent).
    pub fn dimensions(&self) -> [f64; 3] {
        match *self {
            MarkShape::Sphere { radius } => [radius; 3],
            MarkShape::Ellipsoid { radii, .. } => radii,
            MarkShape::RotatableBox { half_extents, .. } => half_extents,
        }
    }

    pub fn angle(&self) -> Option<f64> {
        match *self {
            MarkShape::Sphere { .. } => None,
            MarkShape::Ellipsoid { angle, .. } | MarkShape::RotatableBox { angle, .. } => {
                Some(angle)
            }
        }
    }

    /// Builds a shape of the given kind. Spheres use the first dimension and ignore the angle.
    pub fn from_parts(kind: MarkKind, dimensions: [f64; 3], angle: f64) -> Self {
        match kind {
            MarkKind::Sphere => MarkShape::Sphere {
                radius: dimensions[0],
            },
            MarkKind::Ellipsoid => MarkShape::Ellipsoid {
                radii: dimensions,
                angle: wrap_angle(angle),
            },
            MarkKind::RotatableBox => MarkShape::RotatableBox {
                half_extents: dimensions,
                angle: wrap_angle(angle),
            },
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        let dims = self.dimensions().map(|d| d * factor);
        Self::from_parts(self.kind(), dims, self.angle().unwrap_or(0.0))
    }
}

/// A single candidate object: a center point plus a shape.
///
/// Marks are immutable values; the optimizer never edits a published mark but
/// replaces it with a new value under the same [`MarkId`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mark {
    pub center: Point3<f64>,
    pub shape: MarkShape,
}

impl Mark {
    pub fn new(center: Point3<f64>, shape: MarkShape) -> Self {
        Self { center, shape }
    }

    pub fn sphere(center: Point3<f64>, radius: f64) -> Self {
        Self::new(center, MarkShape::Sphere { radius })
    }

    pub fn ellipsoid(center: Point3<f64>, radii: [f64; 3], angle: f64) -> Self {
        Self::new(
            center,
            MarkShape::Ellipsoid {
                radii,
                angle: wrap_angle(angle),
            },
        )
    }

    pub fn rotatable_box(center: Point3<f64>, half_extents: [f64; 3], angle: f64) -> Self {
        Self::new(
            center,
            MarkShape::RotatableBox {
                half_extents,
                angle: wrap_angle(angle),
            },
        )
    }

    pub fn kind(&self) -> MarkKind {
        self.shape.kind()
    }

    pub fn with_center(&self, center: Point3<f64>) -> Self {
        Self {
            center,
            shape: self.shape,
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            center: self.center,
            shape: self.shape.scaled(factor),
        }
    }

    /// A mark is degenerate when any size parameter is non-positive or any value is not finite.
    pub fn is_degenerate(&self) -> bool {
        let dims = self.shape.dimensions();
        dims.iter().any(|d| !d.is_finite() || *d <= 0.0)
            || self.center.iter().any(|c| !c.is_finite())
            || self.shape.angle().is_some_and(|a| !a.is_finite())
    }

    pub fn volume(&self) -> f64 {
        match self.shape {
            MarkShape::Sphere { radius } => 4.0 / 3.0 * std::f64::consts::PI * radius.powi(3),
            MarkShape::Ellipsoid { radii, .. } => {
                4.0 / 3.0 * std::f64::consts::PI * radii[0] * radii[1] * radii[2]
            }
            MarkShape::RotatableBox { half_extents, .. } => {
                8.0 * half_extents[0] * half_extents[1] * half_extents[2]
            }
        }
    }

    /// Unit vector of the mark's local x axis in world coordinates.
    pub fn principal_axis(&self) -> Vector3<f64> {
        rotate_z(&Vector3::x(), self.shape.angle().unwrap_or(0.0))
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let half_extent = match self.shape {
            MarkShape::Sphere { radius } => Vector3::repeat(radius),
            MarkShape::Ellipsoid { radii, angle } => {
                let (sin, cos) = angle.sin_cos();
                Vector3::new(
                    ((radii[0] * cos).powi(2) + (radii[1] * sin).powi(2)).sqrt(),
                    ((radii[0] * sin).powi(2) + (radii[1] * cos).powi(2)).sqrt(),
                    radii[2],
                )
            }
            MarkShape::RotatableBox {
                half_extents,
                angle,
            } => {
                let (sin, cos) = angle.sin_cos();
                Vector3::new(
                    (half_extents[0] * cos).abs() + (half_extents[1] * sin).abs(),
                    (half_extents[0] * sin).abs() + (half_extents[1] * cos).abs(),
                    half_extents[2],
                )
            }
        };
        BoundingBox::from_center_extent(&self.center, &half_extent)
    }

    pub fn contains(&self, point: &Point3<f64>) -> bool {
        let offset = point - self.center;
        match self.shape {
            MarkShape::Sphere { radius } => offset.norm_squared() <= radius * radius,
            MarkShape::Ellipsoid { radii, angle } => {
                let local = rotate_z(&offset, -angle);
                (local.x / radii[0]).powi(2)
                    + (local.y / radii[1]).powi(2)
                    + (local.z / radii[2]).powi(2)
                    <= 1.0
            }
            MarkShape::RotatableBox {
                half_extents,
                angle,
            } => {
                let local = rotate_z(&offset, -angle);
                local.x.abs() <= half_extents[0]
                    && local.y.abs() <= half_extents[1]
                    && local.z.abs() <= half_extents[2]
            }
        }
    }

    /// True when both marks have the same kind and the same shape parameters within `tolerance`.
    pub fn same_shape(&self, other: &Mark, tolerance: f64) -> bool {
        if self.kind() != other.kind() {
            return false;
        }
        let dims_match = self
            .shape
            .dimensions()
            .iter()
            .zip(other.shape.dimensions().iter())
            .all(|(a, b)| (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0));
        let angles_match = match (self.shape.angle(), other.shape.angle()) {
            (Some(a), Some(b)) => super::geometry::angle_difference(a, b).abs() <= tolerance,
            _ => true,
        };
        dims_match && angles_match
    }
}

/// Flat, serializable view of a mark, used by traces and CSV export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkRecord {
    pub id: MarkId,
    pub kind: MarkKind,
    pub center_x: f64,
    pub center_y: f64,
    pub center_z: f64,
    pub size_x: f64,
    pub size_y: f64,
    pub size_z: f64,
    pub angle: Option<f64>,
}

impl MarkRecord {
    pub fn new(id: MarkId, mark: &Mark) -> Self {
        let dims = mark.shape.dimensions();
        Self {
            id,
            kind: mark.kind(),
            center_x: mark.center.x,
            center_y: mark.center.y,
            center_z: mark.center.z,
            size_x: dims[0],
            size_y: dims[1],
            size_z: dims[2],
            angle: mark.shape.angle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn from_name_resolves_aliases() {
        assert_eq!(MarkKind::from_name("ellipse"), Some(MarkKind::Ellipsoid));
        assert_eq!(MarkKind::from_name(" Box "), Some(MarkKind::RotatableBox));
        assert_eq!(MarkKind::from_name("circle"), Some(MarkKind::Sphere));
        assert_eq!(MarkKind::from_name("polygon"), None);
    }

    #[test]
    fn sphere_bounding_box_is_symmetric_cube() {
        let mark = Mark::sphere(Point3::new(5.0, 5.0, 0.0), 2.0);
        let bbox = mark.bounding_box();
        assert_eq!(bbox.min, Point3::new(3.0, 3.0, -2.0));
        assert_eq!(bbox.max, Point3::new(7.0, 7.0, 2.0));
    }

    #[test]
    fn rotated_ellipsoid_bounding_box_swaps_axes() {
        let mark = Mark::ellipsoid(Point3::origin(), [4.0, 1.0, 1.0], FRAC_PI_2);
        let size = mark.bounding_box().size();
        assert!((size.x - 2.0).abs() < 1e-9);
        assert!((size.y - 8.0).abs() < 1e-9);
    }

    #[test]
    fn ellipsoid_contains_respects_orientation() {
        let mark = Mark::ellipsoid(Point3::origin(), [4.0, 1.0, 1.0], FRAC_PI_2);
        assert!(mark.contains(&Point3::new(0.0, 3.5, 0.0)));
        assert!(!mark.contains(&Point3::new(3.5, 0.0, 0.0)));
    }

    #[test]
    fn rotatable_box_contains_corner_region() {
        let mark = Mark::rotatable_box(Point3::origin(), [2.0, 1.0, 1.0], 0.0);
        assert!(mark.contains(&Point3::new(1.9, 0.9, 0.0)));
        assert!(!mark.contains(&Point3::new(2.1, 0.0, 0.0)));
    }

    #[test]
    fn degenerate_detects_non_positive_size() {
        assert!(Mark::sphere(Point3::origin(), 0.0).is_degenerate());
        assert!(Mark::ellipsoid(Point3::origin(), [1.0, -1.0, 1.0], 0.0).is_degenerate());
        assert!(!Mark::sphere(Point3::origin(), 1.0).is_degenerate());
    }

    #[test]
    fn scaled_then_inverse_scaled_restores_shape() {
        let mark = Mark::ellipsoid(Point3::new(1.0, 2.0, 0.0), [3.0, 2.0, 1.0], 0.3);
        let restored = mark.scaled(0.7).scaled(1.0 / 0.7);
        assert!(restored.same_shape(&mark, 1e-9));
    }

    #[test]
    fn same_shape_rejects_different_kinds() {
        let sphere = Mark::sphere(Point3::origin(), 1.0);
        let ellipsoid = Mark::ellipsoid(Point3::origin(), [1.0, 1.0, 1.0], 0.0);
        assert!(!sphere.same_shape(&ellipsoid, 1e-9));
    }

    #[test]
    fn box_volume_is_eight_times_half_extent_product() {
        let mark = Mark::rotatable_box(Point3::origin(), [1.0, 2.0, 3.0], 0.0);
        assert_eq!(mark.volume(), 48.0);
    }
}
