//! Error types for wlop.
//!
//! This module defines all error types used throughout the library.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`WlopError`].
pub type Result<T> = std::result::Result<T, WlopError>;

/// Errors that can occur during point cloud operations.
#[derive(Error, Debug)]
pub enum WlopError {
    /// An input point set has no points.
    #[error("{set} point set is empty")]
    EmptyPointSet {
        /// Which input was empty.
        set: &'static str,
    },

    /// An input point has a NaN or infinite coordinate.
    #[error("{set} point {index} has a non-finite coordinate")]
    NonFiniteInput {
        /// Which input contained the point.
        set: &'static str,
        /// Index of the offending point.
        index: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },

    /// Too many points faulted during one iteration.
    #[error(
        "consolidation failed to converge: {faulted} of {total} points faulted in iteration {iteration}"
    )]
    ConvergenceFailed {
        /// Zero-based iteration in which the fault limit was exceeded.
        iteration: usize,
        /// Number of points that could not be updated in that iteration.
        faulted: usize,
        /// Number of working points.
        total: usize,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading a point cloud from file.
    #[error("failed to load point cloud from {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Error saving a point cloud to file.
    #[error("failed to save point cloud to {path}: {message}")]
    SaveError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// Malformed configuration file.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl WlopError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        WlopError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Returns `true` for the convergence-failure outcome.
    ///
    /// Callers typically retry with a larger radius when this is set.
    pub fn is_convergence_failure(&self) -> bool {
        matches!(self, WlopError::ConvergenceFailed { .. })
    }

    /// Returns `true` for errors raised before any work began because the
    /// inputs or parameters were rejected.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            WlopError::InvalidParameter { .. }
                | WlopError::EmptyPointSet { .. }
                | WlopError::NonFiniteInput { .. }
        )
    }
}
