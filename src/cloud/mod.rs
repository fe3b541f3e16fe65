//! In-memory point clouds.
//!
//! A [`PointCloud`] is a list of positions with optional per-point normals.
//! This module also holds the whole-cloud measurements used to pick
//! consolidation parameters: bounding box, centroid, normalization into a
//! unit box and the radius heuristic.

pub mod sample;

use nalgebra::{Point3, Vector3};

use crate::algo::Executor;
use crate::spatial::SpatialGrid;

/// A 3D point cloud.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    /// Point positions.
    pub positions: Vec<Point3<f64>>,
    /// Optional unit normals, one per position.
    pub normals: Option<Vec<Vector3<f64>>>,
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner.
    pub min: Point3<f64>,
    /// Maximum corner.
    pub max: Point3<f64>,
}

impl BoundingBox {
    /// Length of the box diagonal.
    pub fn diagonal(&self) -> f64 {
        (self.max - self.min).norm()
    }

    /// Center of the box.
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }
}

/// A uniform scale and translation mapping a cloud into the unit box.
///
/// `apply` maps original coordinates to normalized ones, `invert` maps back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    /// Center of the original bounding box.
    pub center: Point3<f64>,
    /// Factor applied after centering.
    pub scale: f64,
}

impl Normalization {
    /// The identity mapping.
    pub fn identity() -> Self {
        Self {
            center: Point3::origin(),
            scale: 1.0,
        }
    }

    /// Map a point into normalized coordinates.
    #[inline]
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from((p - self.center) * self.scale)
    }

    /// Map a normalized point back to original coordinates.
    #[inline]
    pub fn invert(&self, p: &Point3<f64>) -> Point3<f64> {
        self.center + p.coords / self.scale
    }
}

impl PointCloud {
    /// Create a cloud without normals.
    pub fn new(positions: Vec<Point3<f64>>) -> Self {
        Self {
            positions,
            normals: None,
        }
    }

    /// Create a cloud with normals. Lengths must match.
    pub fn with_normals(positions: Vec<Point3<f64>>, normals: Vec<Vector3<f64>>) -> Self {
        debug_assert_eq!(positions.len(), normals.len());
        Self {
            positions,
            normals: Some(normals),
        }
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Check if the cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Whether per-point normals are present.
    #[inline]
    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Bounding box, or `None` for an empty cloud.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        bounding_box(&self.positions)
    }

    /// Mean position, or `None` for an empty cloud.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.is_empty() {
            return None;
        }
        let sum = self
            .positions
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords);
        Some(Point3::from(sum / self.len() as f64))
    }

    /// Center the cloud on its bounding box and scale its longest side to 1.
    ///
    /// Returns the mapping so results can be brought back with
    /// [`Normalization::invert`]. Normals are unchanged by a uniform scale.
    pub fn normalize(&mut self) -> Normalization {
        let Some(bbox) = self.bounding_box() else {
            return Normalization::identity();
        };
        let extent = (bbox.max - bbox.min).max();
        let scale = if extent > 0.0 { 1.0 / extent } else { 1.0 };
        let mapping = Normalization {
            center: bbox.center(),
            scale,
        };
        for p in &mut self.positions {
            *p = mapping.apply(p);
        }
        mapping
    }
}

/// Bounding box of a point slice.
pub fn bounding_box(points: &[Point3<f64>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (min, max) = points.iter().fold((*first, *first), |(lo, hi), p| {
        (lo.inf(p), hi.sup(p))
    });
    Some(BoundingBox { min, max })
}

/// Initial neighborhood radius for a cloud: `2 · diagonal / √n`.
///
/// Roughly a few average point spacings for a surface sample, so a
/// neighborhood holds enough points without spanning distinct features.
/// Returns 0 for empty or single-point clouds.
pub fn suggested_radius(points: &[Point3<f64>]) -> f64 {
    match bounding_box(points) {
        Some(bbox) => 2.0 * bbox.diagonal() / (points.len() as f64).sqrt(),
        None => 0.0,
    }
}

/// Mean distance from each point to its nearest other point.
///
/// Coincident duplicates count as distance 0. Returns 0 for fewer than two
/// points.
pub fn mean_nearest_neighbor_distance(points: &[Point3<f64>], executor: Executor) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let grid = SpatialGrid::build(points, suggested_radius(points));
    let distances = executor.map(points.len(), |i| {
        grid.k_nearest(&points[i], 2)
            .into_iter()
            .find(|n| n.index != i)
            .map_or(0.0, |n| n.distance)
    });
    distances.iter().sum::<f64>() / points.len() as f64
}
