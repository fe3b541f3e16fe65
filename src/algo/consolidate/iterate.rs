//! The per-point consolidation update.
//!
//! Each working point `x_i` moves to
//!
//! ```text
//! x_i' = A_i + μ R_i
//! A_i  = Σ_j p_j θ_ij v_j s_ij / Σ_j θ_ij v_j s_ij
//! R_i  = h Σ_k û_ik θ_ik w_k s_ik / (1 + Σ_k θ_ik w_k s_ik)
//! ```
//!
//! where `p_j` are reference points with density weights `v_j`, `s` is the
//! mode's edge-suppression factor (1 in isotropic mode), and `k` ranges over
//! the other working points of the previous snapshot with crowding weights
//! `w_k`. `û_ik` is
//! the offset `x_i - x_k` divided by the clamped distance, so every term is
//! finite even for coincident points.
//!
//! The update reads only the previous snapshot and immutable reference
//! data, so all points can be updated independently.

use nalgebra::{Point3, Vector3};

use crate::algo::frame::LocalFrame;
use crate::algo::kernel::Kernel;
use crate::spatial::{Neighbor, SpatialGrid};

use super::params::Mode;

/// Read-only state shared by every point update of one iteration.
pub(crate) struct StepInputs<'a> {
    pub reference: &'a SpatialGrid,
    pub reference_density: &'a [f64],
    /// Previous working snapshot.
    pub working: &'a SpatialGrid,
    pub working_density: &'a [f64],
    pub frames: Option<&'a [Option<LocalFrame>]>,
    pub kernel: Kernel,
    pub repulsion: f64,
    pub max_widenings: usize,
    pub mode: Mode,
}

/// Outcome of one point update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PointUpdate {
    /// New finite position.
    Moved(Point3<f64>),
    /// No reference points even after widening the query.
    Frozen,
    /// A non-finite value appeared; the previous position is kept.
    Fault,
}

/// Compute the next position of working point `i`.
pub(crate) fn update_point(inputs: &StepInputs<'_>, i: usize, scratch: &mut Vec<Neighbor>) -> PointUpdate {
    let x = *inputs.working.point(i);
    let frame = inputs.frames.and_then(|frames| frames[i].as_ref());

    let Some(target) = attraction(inputs, &x, frame, scratch) else {
        return PointUpdate::Frozen;
    };

    let next = if inputs.repulsion > 0.0 {
        target + repulsion(inputs, i, &x, frame, scratch) * inputs.repulsion
    } else {
        target
    };

    if next.coords.iter().all(|c| c.is_finite()) {
        PointUpdate::Moved(next)
    } else {
        PointUpdate::Fault
    }
}

/// Density-corrected weighted average of nearby reference points, widening
/// the query radius when nothing is found.
fn attraction(
    inputs: &StepInputs<'_>,
    x: &Point3<f64>,
    frame: Option<&LocalFrame>,
    scratch: &mut Vec<Neighbor>,
) -> Option<Point3<f64>> {
    let mut kernel = inputs.kernel;

    for _ in 0..=inputs.max_widenings {
        inputs.reference.within_radius_into(x, kernel.radius(), scratch);

        let mut shift = Vector3::zeros();
        let mut total = 0.0;
        for n in scratch.iter() {
            let offset = inputs.reference.point(n.index) - x;
            let w = kernel.weight(n.distance)
                * inputs.reference_density[n.index]
                * inputs.mode.attraction_factor(frame, &offset);
            shift += offset * w;
            total += w;
        }

        // NaN totals fall through so the caller reports a fault.
        if total > 0.0 || total.is_nan() {
            return Some(x + shift / total);
        }
        kernel = kernel.widened(2.0);
    }

    None
}

/// Kernel-weighted push away from the other points of the previous
/// snapshot. Magnitude is below the kernel radius.
///
/// Neighbors lying off the tangent plane of an anisotropic frame are
/// suppressed, so points on a convex crease are not pushed outward.
fn repulsion(
    inputs: &StepInputs<'_>,
    i: usize,
    x: &Point3<f64>,
    frame: Option<&LocalFrame>,
    scratch: &mut Vec<Neighbor>,
) -> Vector3<f64> {
    let kernel = &inputs.kernel;
    inputs.working.within_radius_into(x, kernel.radius(), scratch);

    let mut push = Vector3::zeros();
    let mut total = 1.0;
    for n in scratch.iter() {
        if n.index == i {
            continue;
        }
        let offset = if n.distance < kernel.min_distance() {
            coincident_offset(i, n.index, kernel.min_distance())
        } else {
            x - inputs.working.point(n.index)
        };
        let crowding = inputs.working_density[n.index] * inputs.mode.repulsion_factor(frame, &offset);
        push += offset * (kernel.repulsion_weight(n.distance) * crowding);
        total += kernel.weight(n.distance) * crowding;
    }

    push * (kernel.radius() / total)
}

/// Offset used between two (nearly) coincident working points: a fixed
/// diagonal of length `length`, pointing opposite ways for the two points
/// of the pair.
#[inline]
fn coincident_offset(i: usize, k: usize, length: f64) -> Vector3<f64> {
    let sign = if i < k { 1.0 } else { -1.0 };
    Vector3::repeat(sign * length / 3f64.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        reference: SpatialGrid,
        reference_density: Vec<f64>,
        working: SpatialGrid,
        working_density: Vec<f64>,
    }

    impl Fixture {
        fn new(reference: &[Point3<f64>], working: &[Point3<f64>], radius: f64) -> Self {
            Self {
                reference: SpatialGrid::build(reference, radius),
                reference_density: vec![1.0; reference.len()],
                working: SpatialGrid::build(working, radius),
                working_density: vec![1.0; working.len()],
            }
        }

        fn inputs(&self, radius: f64, repulsion: f64) -> StepInputs<'_> {
            StepInputs {
                reference: &self.reference,
                reference_density: &self.reference_density,
                working: &self.working,
                working_density: &self.working_density,
                frames: None,
                kernel: Kernel::new(radius),
                repulsion,
                max_widenings: 3,
                mode: Mode::Isotropic,
            }
        }
    }

    #[test]
    fn test_pure_projection_is_weighted_average() {
        let reference = vec![Point3::new(-0.1, 0.0, 0.0), Point3::new(0.1, 0.0, 0.0)];
        let working = vec![Point3::new(0.0, 0.05, 0.0)];
        let fx = Fixture::new(&reference, &working, 0.5);

        let mut scratch = Vec::new();
        match update_point(&fx.inputs(0.5, 0.0), 0, &mut scratch) {
            PointUpdate::Moved(p) => assert!((p - Point3::origin()).norm() < 1e-12),
            other => panic!("unexpected update {:?}", other),
        }
    }

    #[test]
    fn test_widening_finds_distant_reference() {
        let reference = vec![Point3::new(1.5, 0.0, 0.0)];
        let working = vec![Point3::origin()];
        let fx = Fixture::new(&reference, &working, 0.5);

        let mut scratch = Vec::new();
        match update_point(&fx.inputs(0.5, 0.0), 0, &mut scratch) {
            PointUpdate::Moved(p) => assert!((p - reference[0]).norm() < 1e-12),
            other => panic!("unexpected update {:?}", other),
        }
    }

    #[test]
    fn test_isolated_point_freezes() {
        let reference = vec![Point3::new(100.0, 0.0, 0.0)];
        let working = vec![Point3::origin()];
        let fx = Fixture::new(&reference, &working, 0.5);

        let mut scratch = Vec::new();
        assert_eq!(
            update_point(&fx.inputs(0.5, 0.3), 0, &mut scratch),
            PointUpdate::Frozen
        );
    }

    #[test]
    fn test_coincident_points_are_pushed_apart() {
        let reference = vec![Point3::origin()];
        let working = vec![Point3::origin(), Point3::origin()];
        let fx = Fixture::new(&reference, &working, 0.5);
        let inputs = fx.inputs(0.5, 0.3);

        let mut scratch = Vec::new();
        let a = update_point(&inputs, 0, &mut scratch);
        let b = update_point(&inputs, 1, &mut scratch);
        match (a, b) {
            (PointUpdate::Moved(a), PointUpdate::Moved(b)) => {
                let d = (a - b).norm();
                assert!(d > 0.1, "duplicates should separate, got {}", d);
                assert!(d < 2.0 * 0.3 * 0.5);
            }
            other => panic!("unexpected updates {:?}", other),
        }
    }

    #[test]
    fn test_repulsion_is_bounded_by_radius() {
        let reference = vec![Point3::origin()];
        let working: Vec<Point3<f64>> = (0..20)
            .map(|i| Point3::new(0.001 * i as f64, 0.0, 0.0))
            .collect();
        let fx = Fixture::new(&reference, &working, 0.2);
        let inputs = fx.inputs(0.2, 1.0);

        let mut scratch = Vec::new();
        let push = repulsion(&inputs, 0, &working[0], None, &mut scratch);
        assert!(push.norm() < 0.2);
        assert!(push.x < 0.0, "end point is pushed away from the cluster");
    }

    #[test]
    fn test_anisotropic_repulsion_stays_tangential() {
        let reference = vec![Point3::origin()];
        let working = vec![
            Point3::origin(),
            Point3::new(0.0, 0.0, -0.05),
            Point3::new(0.05, 0.0, 0.0),
        ];
        let fx = Fixture::new(&reference, &working, 0.2);
        let frames = vec![
            Some(LocalFrame {
                normal: Vector3::z(),
                anisotropy: 1.0,
            }),
            None,
            None,
        ];

        let mut scratch = Vec::new();
        let isotropic = fx.inputs(0.2, 0.3);
        let iso = repulsion(&isotropic, 0, &working[0], frames[0].as_ref(), &mut scratch);

        let anisotropic = StepInputs {
            frames: Some(&frames),
            mode: Mode::anisotropic(),
            ..fx.inputs(0.2, 0.3)
        };
        let aniso = repulsion(&anisotropic, 0, &working[0], frames[0].as_ref(), &mut scratch);

        assert!(iso.z > 0.01, "isotropic push leaves the plane: {:?}", iso);
        assert!(aniso.z.abs() < 1e-6, "push across the edge: {:?}", aniso);
        assert!(aniso.x < 0.0);
    }

    #[test]
    fn test_non_finite_density_is_a_fault() {
        let reference = vec![Point3::origin(), Point3::new(0.1, 0.0, 0.0)];
        let working = vec![Point3::new(0.05, 0.0, 0.0)];
        let mut fx = Fixture::new(&reference, &working, 0.5);
        fx.reference_density[1] = f64::NAN;

        let mut scratch = Vec::new();
        assert_eq!(
            update_point(&fx.inputs(0.5, 0.0), 0, &mut scratch),
            PointUpdate::Fault
        );
    }

    #[test]
    fn test_coincident_offset_is_antisymmetric() {
        let a = coincident_offset(2, 5, 1.0);
        let b = coincident_offset(5, 2, 1.0);
        assert!((a + b).norm() < 1e-15);
        assert!((a.norm() - 1.0).abs() < 1e-12);
    }
}
