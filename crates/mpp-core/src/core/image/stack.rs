use crate::core::models::geometry::BoundingBox;
use crate::core::models::mark::Mark;
use nalgebra::Point3;
use std::ops::RangeInclusive;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ImageError {
    #[error("Stack dimensions must be non-zero, got {width}x{height}x{depth}")]
    EmptyDimensions {
        width: usize,
        height: usize,
        depth: usize,
    },
    #[error("Expected {expected} voxels for the given dimensions, got {actual}")]
    VoxelCountMismatch { expected: usize, actual: usize },
    #[error("Resolution must be positive and finite along every axis: {0:?}")]
    InvalidResolution([f64; 3]),
    #[error("Probability map weights must be finite, non-negative and not all zero")]
    InvalidWeights,
}

/// Physical size of one voxel along each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            x: 1.0,
            y: 1.0,
            z: 1.0,
        }
    }
}

impl Resolution {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn voxel_volume(&self) -> f64 {
        self.x * self.y * self.z
    }

    fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Intensity statistics of the voxels whose centers fall inside a region.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoxelStats {
    pub count: u64,
    pub sum: f64,
    pub sum_squares: f64,
}

impl VoxelStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_squares += value * value;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn variance(&self) -> Option<f64> {
        self.mean()
            .map(|mean| (self.sum_squares / self.count as f64 - mean * mean).max(0.0))
    }
}

/// Inclusive voxel index ranges along x, y and z.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoxelRange {
    pub x: RangeInclusive<usize>,
    pub y: RangeInclusive<usize>,
    pub z: RangeInclusive<usize>,
}

/// Read-only voxel data plus resolution: the background the marks are fitted against.
///
/// Voxel `(x, y, z)` has its center at `((x + 0.5) * rx, (y + 0.5) * ry, (z + 0.5) * rz)`
/// in physical coordinates. A planar image is a stack with `depth == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundStack {
    width: usize,
    height: usize,
    depth: usize,
    resolution: Resolution,
    voxels: Vec<f32>,
}

impl BackgroundStack {
    pub fn new(
        width: usize,
        height: usize,
        depth: usize,
        resolution: Resolution,
        voxels: Vec<f32>,
    ) -> Result<Self, ImageError> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(ImageError::EmptyDimensions {
                width,
                height,
                depth,
            });
        }
        let res = resolution.as_array();
        if res.iter().any(|r| !r.is_finite() || *r <= 0.0) {
            return Err(ImageError::InvalidResolution(res));
        }
        let expected = width * height * depth;
        if voxels.len() != expected {
            return Err(ImageError::VoxelCountMismatch {
                expected,
                actual: voxels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            depth,
            resolution,
            voxels,
        })
    }

    pub fn from_fn(
        width: usize,
        height: usize,
        depth: usize,
        resolution: Resolution,
        f: impl Fn(usize, usize, usize) -> f32,
    ) -> Result<Self, ImageError> {
        let mut voxels = Vec::with_capacity(width * height * depth);
        for z in 0..depth {
            for y in 0..height {
                for x in 0..width {
                    voxels.push(f(x, y, z));
                }
            }
        }
        Self::new(width, height, depth, resolution, voxels)
    }

    pub fn uniform(width: usize, height: usize, depth: usize, value: f32) -> Result<Self, ImageError> {
        Self::from_fn(width, height, depth, Resolution::default(), |_, _, _| value)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_planar(&self) -> bool {
        self.depth == 1
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn voxel_count(&self) -> usize {
        self.voxels.len()
    }

    pub(crate) fn linear_index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.height + y) * self.width + x
    }

    pub fn value(&self, x: usize, y: usize, z: usize) -> Option<f32> {
        if x < self.width && y < self.height && z < self.depth {
            Some(self.voxels[self.linear_index(x, y, z)])
        } else {
            None
        }
    }

    pub fn voxels(&self) -> &[f32] {
        &self.voxels
    }

    /// The physical region covered by the stack.
    pub fn extent(&self) -> BoundingBox {
        BoundingBox::new(
            Point3::origin(),
            Point3::new(
                self.width as f64 * self.resolution.x,
                self.height as f64 * self.resolution.y,
                self.depth as f64 * self.resolution.z,
            ),
        )
    }

    pub fn voxel_center(&self, x: usize, y: usize, z: usize) -> Point3<f64> {
        Point3::new(
            (x as f64 + 0.5) * self.resolution.x,
            (y as f64 + 0.5) * self.resolution.y,
            (z as f64 + 0.5) * self.resolution.z,
        )
    }

    /// The voxels whose centers lie inside `bbox`, clipped to the stack.
    pub fn voxel_range(&self, bbox: &BoundingBox) -> Option<VoxelRange> {
        let res = self.resolution.as_array();
        let dims = [self.width, self.height, self.depth];
        let mut ranges = [0..=0, 0..=0, 0..=0];
        for axis in 0..3 {
            let lo = (bbox.min[axis] / res[axis] - 0.5).ceil().max(0.0);
            let hi = (bbox.max[axis] / res[axis] - 0.5).floor();
            let upper = (dims[axis] - 1) as f64;
            if !lo.is_finite() || !hi.is_finite() || hi < lo || lo > upper || hi < 0.0 {
                return None;
            }
            ranges[axis] = (lo as usize)..=(hi.min(upper) as usize);
        }
        let [x, y, z] = ranges;
        Some(VoxelRange { x, y, z })
    }

    /// Intensity statistics over the voxels whose centers lie inside `mark`.
    pub fn stats_within(&self, mark: &Mark) -> VoxelStats {
        let mut stats = VoxelStats::default();
        self.for_each_voxel_in(&mark.bounding_box(), |center, value| {
            if mark.contains(&center) {
                stats.push(value as f64);
            }
        });
        stats
    }

    /// Number of voxels whose centers lie inside both marks.
    pub fn count_within_both(&self, a: &Mark, b: &Mark) -> u64 {
        let Some(overlap) = a.bounding_box().intersection(&b.bounding_box()) else {
            return 0;
        };
        let mut count = 0;
        self.for_each_voxel_in(&overlap, |center, _| {
            if a.contains(&center) && b.contains(&center) {
                count += 1;
            }
        });
        count
    }

    fn for_each_voxel_in(&self, bbox: &BoundingBox, mut visit: impl FnMut(Point3<f64>, f32)) {
        let Some(range) = self.voxel_range(bbox) else {
            return;
        };
        for z in range.z.clone() {
            for y in range.y.clone() {
                for x in range.x.clone() {
                    let value = self.voxels[self.linear_index(x, y, z)];
                    visit(self.voxel_center(x, y, z), value);
                }
            }
        }
    }
}
