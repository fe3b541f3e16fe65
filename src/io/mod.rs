//! Point-cloud file I/O.
//!
//! # Supported Formats
//!
//! | Format | Extension | Load | Save | Notes |
//! |--------|-----------|------|------|-------|
//! | PLY | `.ply` | ✓ | ✓ | ASCII and binary read, ASCII write; optional normals |
//! | XYZ | `.xyz`, `.xyzn`, `.txt` | ✓ | ✓ | `x y z [nx ny nz]` per line |
//!
//! # Usage
//!
//! ```no_run
//! use wlop::io::{load, save};
//!
//! let cloud = load("scan.ply").unwrap();
//! save(&cloud, "scan.xyz").unwrap();
//! ```

pub mod ply;
pub mod xyz;

use std::path::Path;

use crate::cloud::PointCloud;
use crate::error::{Result, WlopError};

/// Supported point-cloud file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// PLY (Stanford polygon) format.
    Ply,
    /// Plain-text XYZ, optionally with normals.
    Xyz,
}

impl Format {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_lowercase().as_str() {
            "ply" => Some(Format::Ply),
            "xyz" | "xyzn" | "txt" => Some(Format::Xyz),
            _ => None,
        }
    }

    /// Detect format from file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Format> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
    }
}

fn detect(path: &Path) -> Result<Format> {
    Format::from_path(path).ok_or_else(|| WlopError::UnsupportedFormat {
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("(none)")
            .to_string(),
    })
}

/// Reject clouds whose normal count differs from their point count.
fn check_normals(cloud: &PointCloud, path: &Path) -> Result<()> {
    match &cloud.normals {
        Some(normals) if normals.len() != cloud.len() => Err(WlopError::SaveError {
            path: path.to_path_buf(),
            message: format!("{} normals for {} points", normals.len(), cloud.len()),
        }),
        _ => Ok(()),
    }
}

/// Load a point cloud with automatic format detection.
pub fn load<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Ply => ply::load(path),
        Format::Xyz => xyz::load(path),
    }
}

/// Save a point cloud with automatic format detection.
pub fn save<P: AsRef<Path>>(cloud: &PointCloud, path: P) -> Result<()> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Ply => ply::save(cloud, path),
        Format::Xyz => xyz::save(cloud, path),
    }
}
