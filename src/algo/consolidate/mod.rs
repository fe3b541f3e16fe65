//! Point-cloud consolidation by weighted locally optimal projection.
//!
//! Given a noisy, unevenly sampled reference cloud and a (usually much
//! sparser) seed sample, consolidation iteratively moves the seed points
//! toward the underlying surface while spreading them evenly over it:
//!
//! - each working point is **attracted** to a density-corrected weighted
//!   average of the reference points near it,
//! - and **repelled** from the other working points near it, scaled by the
//!   repulsion weight μ.
//!
//! The working set keeps its length and order; only positions change. Every
//! iteration reads the complete previous snapshot, so points are updated
//! independently and the per-point pass runs in parallel when
//! [`RunParameters::parallel`] is set.
//!
//! # Example
//!
//! ```
//! use wlop::algo::consolidate::{consolidate, RunParameters};
//! use nalgebra::Point3;
//!
//! // A noisy strip of the z = 0 plane.
//! let reference: Vec<Point3<f64>> = (0..400)
//!     .map(|i| {
//!         let (x, y) = ((i % 20) as f64 * 0.05, (i / 20) as f64 * 0.05);
//!         Point3::new(x, y, if i % 2 == 0 { 0.01 } else { -0.01 })
//!     })
//!     .collect();
//! let seed: Vec<Point3<f64>> = reference.iter().step_by(8).cloned().collect();
//!
//! let params = RunParameters::new(0.2).with_repulsion(0.3).with_iterations(10);
//! let result = consolidate(&reference, &seed, &params).unwrap();
//!
//! assert_eq!(result.points.len(), seed.len());
//! assert_eq!(result.stats.fault_count, 0);
//! ```

mod iterate;
mod params;
mod strategy;

pub use params::{FrameSource, Mode, RunParameters, DEFAULT_EDGE_SIGMA};

use nalgebra::Point3;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::algo::density::{reference_density_weights, uniform_weights, working_density_weights};
use crate::algo::kernel::Kernel;
use crate::algo::{Executor, Progress};
use crate::error::{Result, WlopError};
use crate::spatial::SpatialGrid;

use iterate::{update_point, PointUpdate, StepInputs};

/// Accepted range of the reference grid's cell size relative to the radius
/// before the grid is rebuilt.
const CELL_RATIO_RANGE: std::ops::RangeInclusive<f64> = 0.5..=2.0;

/// Statistics of a consolidation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatistics {
    /// Number of iterations executed.
    pub iterations: usize,
    /// Points frozen because no reference point was found near them.
    pub frozen_count: usize,
    /// Numeric faults (discarded updates), summed over all iterations.
    pub fault_count: usize,
    /// Largest per-point displacement of the last executed iteration.
    pub max_displacement: f64,
    /// Whether the run stopped early on the convergence threshold.
    pub converged: bool,
    /// Whether the run stopped early because it was cancelled.
    pub cancelled: bool,
}

/// Result of a consolidation run.
#[derive(Debug, Clone)]
pub struct Consolidation {
    /// Final working positions, in seed order.
    pub points: Vec<Point3<f64>>,
    /// Run statistics.
    pub stats: RunStatistics,
}

/// Consolidate `seed` against `reference`.
///
/// Returns [`WlopError::ConvergenceFailed`] when too many points fault in a
/// single iteration, and a configuration error for empty or non-finite
/// inputs and invalid parameters.
pub fn consolidate(
    reference: &[Point3<f64>],
    seed: &[Point3<f64>],
    params: &RunParameters,
) -> Result<Consolidation> {
    consolidate_with_progress(reference, seed, params, &Progress::none())
}

/// Consolidate with progress reporting and cooperative cancellation.
///
/// A cancelled run is not an error: it returns the last completed snapshot
/// with [`RunStatistics::cancelled`] set.
pub fn consolidate_with_progress(
    reference: &[Point3<f64>],
    seed: &[Point3<f64>],
    params: &RunParameters,
    progress: &Progress,
) -> Result<Consolidation> {
    params.validate()?;
    check_points(seed, "seed")?;
    Consolidator::new(reference, params.radius)?.run_with_progress(seed, params, progress)
}

/// Density weights cached for one radius/correction setting.
#[derive(Debug, Clone)]
struct DensityCache {
    radius: f64,
    corrected: bool,
    weights: Vec<f64>,
}

/// Reusable consolidation context over a fixed reference set.
///
/// Keeps the reference index and density weights between runs, so repeated
/// runs with the same radius (for example with different seeds or repulsion
/// weights) skip the preprocessing.
#[derive(Debug, Clone)]
pub struct Consolidator {
    reference: SpatialGrid,
    density: DensityCache,
}

impl Consolidator {
    /// Index a reference set for runs at (or near) `radius`.
    ///
    /// Fails if the set is empty or contains non-finite coordinates, or if
    /// `radius` is not positive and finite. Later runs at a very different
    /// radius re-index the set once.
    pub fn new(reference: &[Point3<f64>], radius: f64) -> Result<Self> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(WlopError::invalid_param("radius", radius, "must be positive and finite"));
        }
        check_points(reference, "reference")?;
        Ok(Self {
            reference: SpatialGrid::build(reference, radius),
            density: DensityCache {
                radius: f64::NAN,
                corrected: false,
                weights: Vec::new(),
            },
        })
    }

    /// The reference positions.
    pub fn reference(&self) -> &[Point3<f64>] {
        self.reference.points()
    }

    /// Run a consolidation of `seed`.
    pub fn run(&mut self, seed: &[Point3<f64>], params: &RunParameters) -> Result<Consolidation> {
        self.run_with_progress(seed, params, &Progress::none())
    }

    /// Run a consolidation of `seed` with progress reporting.
    pub fn run_with_progress(
        &mut self,
        seed: &[Point3<f64>],
        params: &RunParameters,
        progress: &Progress,
    ) -> Result<Consolidation> {
        params.validate()?;
        check_points(seed, "seed")?;

        let executor = Executor::from_parallel(params.parallel);
        self.prepare(params, executor);

        let n = seed.len();
        let total = params.iterations;
        let kernel = Kernel::new(params.radius);
        let mut working = SpatialGrid::build(seed, params.radius);
        let mut frozen = vec![false; n];
        let mut frames = None;
        let mut stats = RunStatistics::default();

        info!(
            reference = self.reference.len(),
            working = n,
            radius = params.radius,
            repulsion = params.repulsion,
            iterations = total,
            anisotropic = params.mode.is_anisotropic(),
            "starting consolidation"
        );

        for iteration in 0..total {
            if progress.is_cancelled() {
                info!(iteration, "consolidation cancelled");
                stats.cancelled = true;
                break;
            }
            progress.report(iteration, total, "Consolidating");

            if params.mode.refresh_frames_at(iteration) {
                frames = params
                    .mode
                    .estimate_frames(&self.reference, &working, &kernel, executor);
            }

            let working_density = if params.density_correction {
                working_density_weights(&working, &kernel, executor)
            } else {
                uniform_weights(n)
            };

            let inputs = StepInputs {
                reference: &self.reference,
                reference_density: &self.density.weights,
                working: &working,
                working_density: &working_density,
                frames: frames.as_deref(),
                kernel,
                repulsion: params.repulsion,
                max_widenings: params.max_widenings,
                mode: params.mode,
            };

            let updates = executor.map_with_scratch(n, Vec::new, |scratch, i| {
                if frozen[i] {
                    PointUpdate::Frozen
                } else {
                    update_point(&inputs, i, scratch)
                }
            });

            // Barrier: the whole snapshot is published at once.
            let mut next = working.points().to_vec();
            let mut newly_frozen = 0;
            let mut faults = 0;
            let mut max_displacement: f64 = 0.0;
            for (i, update) in updates.into_iter().enumerate() {
                match update {
                    PointUpdate::Moved(p) => {
                        max_displacement = max_displacement.max((p - next[i]).norm());
                        next[i] = p;
                    }
                    PointUpdate::Frozen => {
                        if !frozen[i] {
                            frozen[i] = true;
                            newly_frozen += 1;
                        }
                    }
                    PointUpdate::Fault => faults += 1,
                }
            }

            stats.iterations = iteration + 1;
            stats.frozen_count += newly_frozen;
            stats.fault_count += faults;
            stats.max_displacement = max_displacement;

            if newly_frozen > 0 {
                warn!(iteration, count = newly_frozen, "froze isolated points");
            }
            if faults > 0 {
                warn!(iteration, count = faults, "discarded non-finite updates");
            }
            debug!(
                iteration,
                max_displacement,
                frozen = stats.frozen_count,
                faults,
                "iteration complete"
            );

            let faulted = stats.frozen_count + faults;
            if faulted as f64 > params.max_fault_ratio * n as f64 {
                warn!(iteration, faulted, total = n, "fault limit exceeded");
                return Err(WlopError::ConvergenceFailed {
                    iteration,
                    faulted,
                    total: n,
                });
            }

            working.rebuild(&next, params.radius);

            if let Some(threshold) = params.convergence_threshold {
                if max_displacement < threshold {
                    stats.converged = true;
                    break;
                }
            }
        }

        progress.report(total, total, "Done");
        info!(
            iterations = stats.iterations,
            frozen = stats.frozen_count,
            faults = stats.fault_count,
            max_displacement = stats.max_displacement,
            converged = stats.converged,
            "consolidation finished"
        );

        Ok(Consolidation {
            points: working.points().to_vec(),
            stats,
        })
    }

    /// Bring the reference index and density weights in line with `params`.
    fn prepare(&mut self, params: &RunParameters, executor: Executor) {
        let ratio = self.reference.cell_size() / params.radius;
        if !CELL_RATIO_RANGE.contains(&ratio) {
            debug!(
                old = self.reference.cell_size(),
                new = params.radius,
                "rebuilding reference index"
            );
            let points = self.reference.points().to_vec();
            self.reference.rebuild(&points, params.radius);
        }

        let cache = &self.density;
        if cache.radius != params.radius || cache.corrected != params.density_correction {
            let weights = if params.density_correction {
                reference_density_weights(&self.reference, &Kernel::new(params.radius), executor)
            } else {
                uniform_weights(self.reference.len())
            };
            self.density = DensityCache {
                radius: params.radius,
                corrected: params.density_correction,
                weights,
            };
        }
    }
}

fn check_points(points: &[Point3<f64>], set: &'static str) -> Result<()> {
    if points.is_empty() {
        return Err(WlopError::EmptyPointSet { set });
    }
    match points
        .iter()
        .position(|p| !p.coords.iter().all(|c| c.is_finite()))
    {
        Some(index) => Err(WlopError::NonFiniteInput { set, index }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn plane(n: usize, spacing: f64) -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        for i in 0..n {
            for j in 0..n {
                points.push(Point3::new(i as f64 * spacing, j as f64 * spacing, 0.0));
            }
        }
        points
    }

    #[test]
    fn test_rejects_empty_inputs() {
        let points = plane(3, 0.1);
        let params = RunParameters::new(0.2);

        let err = consolidate(&[], &points, &params).unwrap_err();
        assert!(matches!(err, WlopError::EmptyPointSet { set: "reference" }));
        let err = consolidate(&points, &[], &params).unwrap_err();
        assert!(matches!(err, WlopError::EmptyPointSet { set: "seed" }));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_rejects_non_finite_inputs() {
        let mut points = plane(3, 0.1);
        points[4].y = f64::NAN;
        let err = consolidate(&plane(3, 0.1), &points, &RunParameters::new(0.2)).unwrap_err();
        assert!(matches!(err, WlopError::NonFiniteInput { set: "seed", index: 4 }));
    }

    #[test]
    fn test_rejects_invalid_parameters_before_work() {
        let points = plane(3, 0.1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let progress = Progress::new(move |_, _, _| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        let err = consolidate_with_progress(&points, &points, &RunParameters::new(-1.0), &progress)
            .unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_points_stay_on_plane() {
        let reference = plane(15, 0.05);
        let seed: Vec<Point3<f64>> = reference
            .iter()
            .step_by(7)
            .map(|p| Point3::new(p.x, p.y, 0.02))
            .collect();
        let params = RunParameters::new(0.15).with_repulsion(0.3).with_iterations(10);

        let result = consolidate(&reference, &seed, &params).unwrap();
        assert_eq!(result.points.len(), seed.len());
        assert_eq!(result.stats.iterations, 10);
        assert_eq!(result.stats.fault_count, 0);
        for p in &result.points {
            assert!(p.z.abs() < 1e-9, "point left the plane: {:?}", p);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let reference = plane(12, 0.05);
        let seed: Vec<Point3<f64>> = reference.iter().step_by(5).cloned().collect();
        let params = RunParameters::new(0.12).with_iterations(5).anisotropic();

        let a = consolidate(&reference, &seed, &params).unwrap();
        let b = consolidate(&reference, &seed, &params.clone().sequential()).unwrap();
        assert_eq!(a.points, b.points);
        assert_eq!(a.stats, b.stats);
    }

    #[test]
    fn test_early_stop_on_threshold() {
        // Seeds far enough from the border see a symmetric neighborhood and
        // barely move.
        let reference = plane(20, 0.05);
        let seed: Vec<Point3<f64>> = reference
            .iter()
            .filter(|p| (0.2..=0.75).contains(&p.x) && (0.2..=0.75).contains(&p.y))
            .cloned()
            .collect();
        let params = RunParameters::new(0.1)
            .with_repulsion(0.0)
            .with_iterations(50)
            .with_convergence_threshold(1e-3);

        let result = consolidate(&reference, &seed, &params).unwrap();
        assert!(result.stats.converged);
        assert_eq!(result.stats.iterations, 1);
        assert!(result.stats.max_displacement < 1e-3);
    }

    #[test]
    fn test_cancel_returns_snapshot() {
        let reference = plane(6, 0.1);
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let progress = Progress::new(move |current, _, _| {
            if current == 2 {
                flag.store(true, Ordering::Relaxed);
            }
        })
        .with_cancel_flag(cancel);

        let params = RunParameters::new(0.2).with_iterations(10);
        let result = consolidate_with_progress(&reference, &reference, &params, &progress).unwrap();
        assert!(result.stats.cancelled);
        assert_eq!(result.stats.iterations, 3);
        assert_eq!(result.points.len(), reference.len());
    }

    #[test]
    fn test_fault_limit() {
        let reference = plane(4, 0.1);
        let mut seed = vec![Point3::new(0.1, 0.1, 0.0)];
        seed.extend((0..3).map(|i| Point3::new(100.0 + i as f64, 0.0, 0.0)));

        let err = consolidate(&reference, &seed, &RunParameters::new(0.2)).unwrap_err();
        assert!(err.is_convergence_failure());

        // Tolerating every fault turns the failure into frozen points.
        let params = RunParameters::new(0.2).with_max_fault_ratio(1.0).with_iterations(3);
        let result = consolidate(&reference, &seed, &params).unwrap();
        assert_eq!(result.stats.frozen_count, 3);
        assert_eq!(&result.points[1..], &seed[1..]);
    }

    #[test]
    fn test_consolidator_reuses_preprocessing() {
        let reference = plane(10, 0.05);
        let seed: Vec<Point3<f64>> = reference.iter().step_by(4).cloned().collect();
        let mut consolidator = Consolidator::new(&reference, 0.15).unwrap();

        let params = RunParameters::new(0.15).with_iterations(3);
        let first = consolidator.run(&seed, &params).unwrap();
        let again = consolidator.run(&seed, &params).unwrap();
        assert_eq!(first.points, again.points);

        // A different radius must give the same result as a fresh context.
        let wider = params.clone().with_radius(0.3);
        let reused = consolidator.run(&seed, &wider).unwrap();
        let fresh = consolidate(&reference, &seed, &wider).unwrap();
        for (a, b) in reused.points.iter().zip(&fresh.points) {
            assert!((a - b).norm() < 1e-9);
        }
        assert_eq!(consolidator.reference(), &reference[..]);
    }

    #[test]
    fn test_reference_is_indexed_at_run_radius() {
        let reference = plane(10, 0.05);
        let seed: Vec<Point3<f64>> = reference.iter().step_by(4).cloned().collect();

        let mut consolidator = Consolidator::new(&reference, 0.05).unwrap();
        assert_eq!(consolidator.reference.cell_size(), 0.05);
        consolidator.run(&seed, &RunParameters::new(0.05).with_iterations(1)).unwrap();
        assert_eq!(consolidator.reference.cell_size(), 0.05);

        // Outside the accepted ratio the index follows the new radius.
        consolidator.run(&seed, &RunParameters::new(0.2).with_iterations(1)).unwrap();
        assert_eq!(consolidator.reference.cell_size(), 0.2);

        let err = Consolidator::new(&reference, 0.0).unwrap_err();
        assert!(err.is_configuration_error());
    }
}
