//! Per-mode policies.
//!
//! The isotropic and edge-aware variants share the same iteration and differ
//! only in how local frames are produced and how attraction and repulsion
//! candidates are weighted, so the policies dispatch on [`Mode`] instead of
//! living behind a trait object.

use nalgebra::Vector3;

use crate::algo::frame::{estimate_frames, LocalFrame};
use crate::algo::kernel::{edge_suppression, Kernel};
use crate::algo::Executor;
use crate::spatial::SpatialGrid;

use super::params::{FrameSource, Mode};

impl Mode {
    /// Whether local frames must be (re)estimated before `iteration`.
    pub(crate) fn refresh_frames_at(&self, iteration: usize) -> bool {
        match *self {
            Mode::Isotropic => false,
            Mode::Anisotropic {
                frame_interval: None,
                ..
            } => iteration == 0,
            Mode::Anisotropic {
                frame_interval: Some(k),
                ..
            } => iteration % k.max(1) == 0,
        }
    }

    /// Frame-estimation policy: one optional frame per working point, or
    /// `None` when the mode does not use frames.
    pub(crate) fn estimate_frames(
        &self,
        reference: &SpatialGrid,
        working: &SpatialGrid,
        kernel: &Kernel,
        executor: Executor,
    ) -> Option<Vec<Option<LocalFrame>>> {
        match *self {
            Mode::Isotropic => None,
            Mode::Anisotropic { frame_source, .. } => Some(match frame_source {
                FrameSource::Working => {
                    estimate_frames(working, working.points(), true, kernel, executor)
                }
                FrameSource::Reference => {
                    estimate_frames(reference, working.points(), false, kernel, executor)
                }
            }),
        }
    }

    /// Attraction policy: extra weight factor for a reference candidate at
    /// `offset` from the working point.
    #[inline]
    pub(crate) fn attraction_factor(&self, frame: Option<&LocalFrame>, offset: &Vector3<f64>) -> f64 {
        match *self {
            Mode::Isotropic => 1.0,
            Mode::Anisotropic { edge_sigma, .. } => edge_suppression(frame, offset, edge_sigma),
        }
    }

    /// Repulsion policy: extra weight factor for a working neighbor at
    /// `offset` from the working point. Uses the same suppression as
    /// attraction, so neighbors across an edge neither pull nor push.
    #[inline]
    pub(crate) fn repulsion_factor(&self, frame: Option<&LocalFrame>, offset: &Vector3<f64>) -> f64 {
        self.attraction_factor(frame, offset)
    }
}
