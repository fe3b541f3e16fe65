//! Normal estimation for unstructured point clouds.
//!
//! Normals are the smallest principal direction of each point's k nearest
//! neighbors. PCA leaves the sign undefined, so [`orient_outward`] flips
//! normals to point away from the cloud's centroid, which is correct for
//! closed, roughly star-shaped objects. [`smooth_normals`] denoises an
//! estimate with a bilateral filter that keeps creases.
//!
//! # Example
//!
//! ```
//! use wlop::algo::normals::{estimate_normals, orient_outward};
//! use wlop::algo::Executor;
//! use nalgebra::Point3;
//!
//! let points: Vec<Point3<f64>> = (0..25)
//!     .map(|i| Point3::new((i % 5) as f64, (i / 5) as f64, 0.0))
//!     .collect();
//! let mut normals = estimate_normals(&points, 8, Executor::Parallel);
//! orient_outward(&points, &mut normals);
//! assert!(normals.iter().all(|n| n.z.abs() > 0.99));
//! ```

use nalgebra::{Point3, Vector3};

use crate::cloud::suggested_radius;
use crate::error::{Result, WlopError};
use crate::spatial::SpatialGrid;

use super::frame::{weighted_pca, MIN_FRAME_NEIGHBORS};
use super::kernel::Kernel;
use super::Executor;

/// Estimate a unit normal per point from its `k` nearest neighbors
/// (the point itself included).
///
/// Points whose neighborhood is degenerate get the zero vector.
pub fn estimate_normals(points: &[Point3<f64>], k: usize, executor: Executor) -> Vec<Vector3<f64>> {
    if points.is_empty() {
        return Vec::new();
    }
    let k = k.max(MIN_FRAME_NEIGHBORS);
    let grid = SpatialGrid::build(points, suggested_radius(points));

    executor.map(points.len(), |i| {
        let neighbors = grid.k_nearest(&points[i], k);
        weighted_pca(neighbors.iter().map(|n| (*grid.point(n.index), 1.0)))
            .map(|frame| frame.normal)
            .unwrap_or_else(Vector3::zeros)
    })
}

/// Flip normals so they point away from the centroid of `points`.
pub fn orient_outward(points: &[Point3<f64>], normals: &mut [Vector3<f64>]) {
    if points.is_empty() {
        return;
    }
    let centroid = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / points.len() as f64;

    for (p, n) in points.iter().zip(normals.iter_mut()) {
        if n.dot(&(p.coords - centroid)) < 0.0 {
            *n = -*n;
        }
    }
}

/// Bilateral normal smoothing.
///
/// Each iteration replaces every normal with the normalized average of the
/// normals within `radius`, weighted by
///
/// ```text
/// w_ij = θ(|p_i - p_j|, radius) * exp(-|n_i - n_j|^2 / (2 σ^2))
/// ```
///
/// so neighbors across a crease, whose normals differ strongly, barely
/// contribute. Neighbor normals are flipped into the hemisphere of `n_i`
/// first, so unoriented PCA normals can be smoothed before orientation.
/// Zero normals are left as they are and ignored as neighbors.
///
/// # Errors
///
/// Returns [`WlopError::InvalidParameter`] when `normals` and `points`
/// differ in length, or when `radius` or `sigma` is not positive and finite.
pub fn smooth_normals(
    points: &[Point3<f64>],
    normals: &[Vector3<f64>],
    radius: f64,
    sigma: f64,
    iterations: usize,
    executor: Executor,
) -> Result<Vec<Vector3<f64>>> {
    if normals.len() != points.len() {
        return Err(WlopError::invalid_param(
            "normals",
            normals.len(),
            "must have one normal per point",
        ));
    }
    if !(radius.is_finite() && radius > 0.0) {
        return Err(WlopError::invalid_param("radius", radius, "must be positive and finite"));
    }
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(WlopError::invalid_param("sigma", sigma, "must be positive and finite"));
    }

    let mut current = normals.to_vec();
    if points.is_empty() || iterations == 0 {
        return Ok(current);
    }

    let grid = SpatialGrid::build(points, radius);
    let kernel = Kernel::new(radius);
    let two_sigma_sq = 2.0 * sigma * sigma;

    for _ in 0..iterations {
        let previous = current;
        current = executor.map(points.len(), |i| {
            let n = previous[i];
            if n.norm_squared() == 0.0 {
                return n;
            }

            let mut sum = Vector3::zeros();
            grid.for_each_within(&points[i], radius, |j, d| {
                let m = previous[j];
                let m = if m.dot(&n) < 0.0 { -m } else { m };
                let similarity = (-(m - n).norm_squared() / two_sigma_sq).exp();
                sum += m * (kernel.weight(d) * similarity);
            });

            let len = sum.norm();
            if len > 0.0 && len.is_finite() {
                sum / len
            } else {
                n
            }
        });
    }

    Ok(current)
}
