//! Local frame estimation by weighted principal component analysis.
//!
//! For a point and its neighborhood, the weighted covariance of the neighbor
//! positions (about their weighted centroid) is decomposed into eigenpairs
//! `λ0 ≤ λ1 ≤ λ2`. The eigenvector of `λ0` estimates the surface normal, and
//!
//! ```text
//! anisotropy = 1 - λ1 / λ2
//! ```
//!
//! is close to 0 on flat or isotropic noise and close to 1 where the
//! neighborhood is stretched along a single direction, as happens along
//! sharp edges and creases.

use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};

use crate::spatial::SpatialGrid;

use super::kernel::Kernel;
use super::Executor;

/// Minimum number of non-degenerate neighbors for a defined frame.
pub const MIN_FRAME_NEIGHBORS: usize = 3;

/// Estimated normal and anisotropy at a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    /// Unit normal (sign is arbitrary).
    pub normal: Vector3<f64>,
    /// `1 - λ1/λ2`, in `[0, 1]`.
    pub anisotropy: f64,
}

/// PCA over weighted samples.
///
/// Samples with non-positive or non-finite weight are skipped. Returns
/// `None` when fewer than [`MIN_FRAME_NEIGHBORS`] samples remain or the
/// covariance is degenerate.
pub fn weighted_pca<I>(samples: I) -> Option<LocalFrame>
where
    I: IntoIterator<Item = (Point3<f64>, f64)>,
{
    let samples: Vec<(Point3<f64>, f64)> = samples
        .into_iter()
        .filter(|(_, w)| *w > 0.0 && w.is_finite())
        .collect();
    if samples.len() < MIN_FRAME_NEIGHBORS {
        return None;
    }

    let total: f64 = samples.iter().map(|(_, w)| w).sum();
    let centroid = samples
        .iter()
        .fold(Vector3::zeros(), |acc, (p, w)| acc + p.coords * *w)
        / total;

    let mut cov = Matrix3::zeros();
    for (p, w) in &samples {
        let d = p.coords - centroid;
        cov += d * d.transpose() * *w;
    }
    cov /= total;

    let eigen = SymmetricEigen::new(cov);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

    let lambda_mid = eigen.eigenvalues[order[1]].max(0.0);
    let lambda_max = eigen.eigenvalues[order[2]].max(0.0);
    if lambda_max.is_nan() || lambda_max <= f64::EPSILON * cov.norm() || !lambda_max.is_finite() {
        return None;
    }

    let normal = eigen.eigenvectors.column(order[0]).into_owned();
    let len = normal.norm();
    if len.is_nan() || len <= 0.0 || !len.is_finite() {
        return None;
    }

    Some(LocalFrame {
        normal: normal / len,
        anisotropy: (1.0 - lambda_mid / lambda_max).clamp(0.0, 1.0),
    })
}

/// Estimate the frame at `center` from the points of `grid` within the
/// kernel radius, weighted by the isotropic kernel.
///
/// `exclude` removes one index (the center itself when it belongs to the
/// indexed set). Neighbors closer than the kernel's minimum distance are
/// degenerate and ignored.
pub fn estimate_frame(
    grid: &SpatialGrid,
    center: &Point3<f64>,
    exclude: Option<usize>,
    kernel: &Kernel,
) -> Option<LocalFrame> {
    let mut samples = Vec::new();
    grid.for_each_within(center, kernel.radius(), |k, d| {
        if Some(k) != exclude && d >= kernel.min_distance() {
            samples.push((*grid.point(k), kernel.weight(d)));
        }
    });
    weighted_pca(samples)
}

/// Estimate frames at every point of `centers`, using neighborhoods from
/// `grid`.
///
/// When `centers` is the indexed set itself, pass `same_set = true` so each
/// point is excluded from its own neighborhood.
pub fn estimate_frames(
    grid: &SpatialGrid,
    centers: &[Point3<f64>],
    same_set: bool,
    kernel: &Kernel,
    executor: Executor,
) -> Vec<Option<LocalFrame>> {
    executor.map(centers.len(), |i| {
        let exclude = same_set.then_some(i);
        estimate_frame(grid, &centers[i], exclude, kernel)
    })
}
