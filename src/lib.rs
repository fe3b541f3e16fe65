//! # wlop
//!
//! Point-cloud consolidation by weighted locally optimal projection.
//!
//! Raw scans are noisy, unevenly sampled and full of outliers. wlop takes
//! such a reference cloud together with a sparser seed sample and moves the
//! seed points onto the underlying surface while spreading them evenly,
//! optionally preserving sharp features.
//!
//! ## Features
//!
//! - **Consolidation**: isotropic and edge-aware projection with density
//!   correction, early stopping and fault accounting
//! - **Spatial index**: uniform grid with radius and k-nearest queries
//! - **Seeding**: random, stride and farthest-point subsampling
//! - **Normals**: PCA normal estimation with outward orientation
//! - **File formats**: PLY and XYZ(N)
//! - **Parallelism**: every per-point pass runs on rayon or sequentially
//!
//! ## Quick Start
//!
//! ```no_run
//! use wlop::prelude::*;
//!
//! let cloud = wlop::io::load("scan.ply").unwrap();
//! let seed = random_subsample(&cloud.positions, cloud.len() / 10, 42);
//!
//! let params = RunParameters::new(suggested_radius(&cloud.positions))
//!     .with_repulsion(0.45)
//!     .with_iterations(20);
//! let result = consolidate(&cloud.positions, &seed, &params).unwrap();
//!
//! println!("{} iterations, {} frozen", result.stats.iterations, result.stats.frozen_count);
//! wlop::io::save(&PointCloud::new(result.points), "consolidated.ply").unwrap();
//! ```
//!
//! ## Working in Memory
//!
//! ```
//! use wlop::prelude::*;
//! use nalgebra::Point3;
//!
//! // Two noisy layers around z = 0.
//! let reference: Vec<Point3<f64>> = (0..200)
//!     .map(|i| {
//!         let z = if (i / 10) % 2 == 0 { 0.02 } else { -0.02 };
//!         Point3::new((i % 10) as f64 * 0.1, (i / 20) as f64 * 0.1, z)
//!     })
//!     .collect();
//! let seed = stride_subsample(&reference, 20);
//!
//! let params = RunParameters::new(0.3).with_repulsion(0.0).with_iterations(5);
//! let result = consolidate(&reference, &seed, &params).unwrap();
//!
//! // Pure projection pulls every point toward the mid-plane.
//! assert!(result.points.iter().all(|p| p.z.abs() < 0.02));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod cloud;
pub mod error;
pub mod io;
pub mod spatial;

/// Prelude module for convenient imports.
///
/// ```
/// use wlop::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::consolidate::{
        consolidate, consolidate_with_progress, Consolidation, Consolidator, FrameSource, Mode,
        RunParameters, RunStatistics, DEFAULT_EDGE_SIGMA,
    };
    pub use crate::algo::{Executor, Progress};
    pub use crate::cloud::sample::{farthest_point_sample, random_subsample, stride_subsample};
    pub use crate::cloud::{mean_nearest_neighbor_distance, suggested_radius, PointCloud};
    pub use crate::error::{Result, WlopError};
    pub use crate::spatial::SpatialGrid;
}

// Re-export nalgebra types for convenience
pub use nalgebra;
