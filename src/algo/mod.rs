//! Point-cloud processing algorithms.
//!
//! - **Consolidation**: weighted locally optimal projection, isotropic and
//!   edge-aware ([`consolidate`])
//! - **Density**: sampling-density weights ([`density`])
//! - **Local frames**: weighted PCA normals and anisotropy ([`frame`])
//! - **Normals**: k-nearest-neighbor normal estimation ([`normals`])
//!
//! Long-running algorithms take a [`Progress`] and an [`Executor`] choice.

pub mod consolidate;
pub mod density;
pub mod executor;
pub mod frame;
pub mod kernel;
pub mod normals;
pub mod progress;

pub use executor::Executor;
pub use progress::Progress;
