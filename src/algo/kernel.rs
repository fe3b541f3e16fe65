//! Distance kernels for attraction and repulsion weights.
//!
//! The isotropic kernel is the Wendland C2 function
//!
//! ```text
//! θ(d, h) = (1 - d/h)^4 (4 d/h + 1)   for d < h
//!         = 0                         otherwise
//! ```
//!
//! which is smooth, equal to 1 at `d = 0`, monotonically non-increasing and
//! compactly supported on `[0, h)`. Reciprocal terms clamp the distance to
//! [`Kernel::min_distance`], a fixed fraction of `h`, so they stay finite
//! for coincident points and scale with the radius.

use nalgebra::Vector3;

use super::frame::LocalFrame;

/// Ratio between the distance clamp and the kernel radius.
pub const MIN_DISTANCE_RATIO: f64 = 1e-6;

/// Compactly supported isotropic kernel of a fixed radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kernel {
    radius: f64,
    inv_radius: f64,
    min_distance: f64,
}

impl Kernel {
    /// Create a kernel with support radius `radius` (must be positive).
    pub fn new(radius: f64) -> Self {
        Self {
            radius,
            inv_radius: 1.0 / radius,
            min_distance: radius * MIN_DISTANCE_RATIO,
        }
    }

    /// Support radius.
    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Smallest distance used in reciprocal terms.
    #[inline]
    pub fn min_distance(&self) -> f64 {
        self.min_distance
    }

    /// The kernel weight θ(d, h).
    #[inline]
    pub fn weight(&self, distance: f64) -> f64 {
        let t = distance.abs() * self.inv_radius;
        if t >= 1.0 || t.is_nan() {
            return 0.0;
        }
        let s = 1.0 - t;
        let s2 = s * s;
        s2 * s2 * (4.0 * t + 1.0)
    }

    /// The repulsion weight θ(d, h) / max(d, ε).
    #[inline]
    pub fn repulsion_weight(&self, distance: f64) -> f64 {
        self.weight(distance) / self.clamp_distance(distance)
    }

    /// `distance` clamped away from zero.
    #[inline]
    pub fn clamp_distance(&self, distance: f64) -> f64 {
        distance.max(self.min_distance)
    }

    /// This kernel with its radius scaled by `factor`.
    #[inline]
    pub fn widened(&self, factor: f64) -> Self {
        Self::new(self.radius * factor)
    }
}

/// Edge-suppression factor of the anisotropic kernel.
///
/// `offset` points from the source point to a candidate neighbor. The factor
/// decays with the squared normal component of the offset direction, scaled
/// by the frame's anisotropy, so strongly anisotropic (edge) neighborhoods
/// ignore candidates lying off the local tangent plane. Returns 1 without a
/// frame or for a zero offset.
#[inline]
pub fn edge_suppression(frame: Option<&LocalFrame>, offset: &Vector3<f64>, edge_sigma: f64) -> f64 {
    let Some(frame) = frame else {
        return 1.0;
    };
    let len = offset.norm();
    if len <= 0.0 || !len.is_finite() {
        return 1.0;
    }
    let cos = offset.dot(&frame.normal) / len;
    let x = frame.anisotropy * cos * cos / (edge_sigma * edge_sigma);
    (-x).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_shape() {
        let k = Kernel::new(2.0);
        assert_eq!(k.weight(0.0), 1.0);
        assert_eq!(k.weight(2.0), 0.0);
        assert_eq!(k.weight(5.0), 0.0);

        let mut prev = k.weight(0.0);
        for i in 1..=100 {
            let w = k.weight(i as f64 * 0.02);
            assert!(w >= 0.0);
            assert!(w <= prev, "kernel must not increase with distance");
            prev = w;
        }
    }

    #[test]
    fn test_kernel_is_scale_invariant() {
        let a = Kernel::new(1.0);
        let b = Kernel::new(10.0);
        for i in 0..10 {
            let d = i as f64 * 0.1;
            assert!((a.weight(d) - b.weight(d * 10.0)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_repulsion_weight_is_finite_at_zero() {
        let k = Kernel::new(0.5);
        let w = k.repulsion_weight(0.0);
        assert!(w.is_finite());
        assert!((w - 1.0 / k.min_distance()).abs() / w < 1e-12);
        assert!(k.repulsion_weight(0.1) < w);
    }

    #[test]
    fn test_nan_distance_has_zero_weight() {
        assert_eq!(Kernel::new(1.0).weight(f64::NAN), 0.0);
    }

    #[test]
    fn test_widened() {
        let k = Kernel::new(0.25).widened(4.0);
        assert_eq!(k.radius(), 1.0);
        assert!(k.weight(0.5) > 0.0);
    }

    #[test]
    fn test_edge_suppression() {
        let offset = Vector3::new(0.0, 0.0, 1.0);
        assert_eq!(edge_suppression(None, &offset, 0.5), 1.0);

        let edge = LocalFrame {
            normal: Vector3::z(),
            anisotropy: 1.0,
        };
        let across = edge_suppression(Some(&edge), &offset, 0.5);
        let along = edge_suppression(Some(&edge), &Vector3::new(1.0, 0.0, 0.0), 0.5);
        assert!(across < 0.05);
        assert!((along - 1.0).abs() < 1e-12);

        let flat = LocalFrame {
            normal: Vector3::z(),
            anisotropy: 0.0,
        };
        assert_eq!(edge_suppression(Some(&flat), &offset, 0.5), 1.0);
        assert_eq!(edge_suppression(Some(&edge), &Vector3::zeros(), 0.5), 1.0);
    }
}
