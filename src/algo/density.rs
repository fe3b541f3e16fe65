//! Sampling-density estimation.
//!
//! Scanned point clouds are rarely sampled uniformly. Without correction a
//! densely sampled patch contributes proportionally more attraction than a
//! sparse one and drags nearby working points toward it. The density weight
//! of a reference point is
//!
//! ```text
//! v_j = 1 / (1 + Σ_{k ≠ j, |p_j - p_k| ≤ h} θ(|p_j - p_k|, h))
//! ```
//!
//! so crowded points receive a smaller corrective weight. An isolated point
//! gets exactly 1, and every weight lies in `(0, 1]`.

use crate::spatial::SpatialGrid;

use super::kernel::Kernel;
use super::Executor;

/// Sum of kernel weights from each indexed point to its neighbors, excluding
/// itself (coincident duplicates still count).
pub fn kernel_sums(grid: &SpatialGrid, kernel: &Kernel, executor: Executor) -> Vec<f64> {
    executor.map(grid.len(), |j| {
        let mut sum = 0.0;
        grid.for_each_within(grid.point(j), kernel.radius(), |k, d| {
            if k != j {
                sum += kernel.weight(d);
            }
        });
        sum
    })
}

/// Density-correction weights for a reference set.
///
/// Every returned weight is strictly positive.
pub fn reference_density_weights(grid: &SpatialGrid, kernel: &Kernel, executor: Executor) -> Vec<f64> {
    kernel_sums(grid, kernel, executor)
        .into_iter()
        .map(|s| 1.0 / (1.0 + s))
        .collect()
}

/// Local crowding of the working set, `1 + Σ θ`, used to make working points
/// in denser clusters repel harder.
pub fn working_density_weights(grid: &SpatialGrid, kernel: &Kernel, executor: Executor) -> Vec<f64> {
    kernel_sums(grid, kernel, executor)
        .into_iter()
        .map(|s| 1.0 + s)
        .collect()
}

/// Weights used when density correction is disabled.
#[inline]
pub fn uniform_weights(len: usize) -> Vec<f64> {
    vec![1.0; len]
}
