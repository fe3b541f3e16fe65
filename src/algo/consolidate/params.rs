//! Run parameters for consolidation.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WlopError};

/// Where anisotropic local frames take their neighborhoods from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSource {
    /// Neighbors in the current working snapshot.
    #[default]
    Working,
    /// Neighbors in the reference set.
    Reference,
}

/// Consolidation mode.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mode {
    /// Plain weighted locally optimal projection.
    #[default]
    Isotropic,

    /// Edge-aware variant: attraction is suppressed across estimated sharp
    /// features using per-point local frames.
    Anisotropic {
        /// `None` estimates frames once before the first iteration;
        /// `Some(k)` re-estimates them every `k` iterations.
        #[serde(default)]
        frame_interval: Option<usize>,

        /// Width of the edge-suppression falloff. Smaller values suppress
        /// off-plane contributions more aggressively.
        #[serde(default = "default_edge_sigma")]
        edge_sigma: f64,

        /// Neighborhood used for frame estimation.
        #[serde(default)]
        frame_source: FrameSource,
    },
}

/// Default edge-suppression width of the anisotropic mode.
pub const DEFAULT_EDGE_SIGMA: f64 = 0.25;

fn default_edge_sigma() -> f64 {
    DEFAULT_EDGE_SIGMA
}

impl Mode {
    /// Anisotropic mode with default frame settings.
    pub fn anisotropic() -> Self {
        Mode::Anisotropic {
            frame_interval: None,
            edge_sigma: default_edge_sigma(),
            frame_source: FrameSource::Working,
        }
    }

    /// Whether this is the edge-aware mode.
    pub fn is_anisotropic(&self) -> bool {
        matches!(self, Mode::Anisotropic { .. })
    }
}

/// Parameters of a consolidation run.
///
/// Values are plain data: nothing is read from global state. Use the
/// builder methods to override defaults, then [`validate`](Self::validate)
/// (which [`consolidate`](super::consolidate) calls for you).
///
/// # Example
///
/// ```
/// use wlop::algo::consolidate::RunParameters;
///
/// let params = RunParameters::new(0.2)
///     .with_repulsion(0.3)
///     .with_iterations(30)
///     .with_convergence_threshold(1e-5);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunParameters {
    /// Neighborhood radius `h` (> 0).
    pub radius: f64,

    /// Repulsion weight μ (≥ 0). Zero gives pure projection.
    #[serde(alias = "mu")]
    pub repulsion: f64,

    /// Iteration budget (≥ 1).
    pub iterations: usize,

    /// Correct for non-uniform sampling density.
    pub density_correction: bool,

    /// Isotropic or edge-aware consolidation.
    pub mode: Mode,

    /// Stop early once the largest per-point displacement of an iteration
    /// falls below this value.
    pub convergence_threshold: Option<f64>,

    /// Fail the run when more than this fraction of points fault in a
    /// single iteration (0..=1).
    pub max_fault_ratio: f64,

    /// How many times an empty attraction query is retried with a doubled
    /// radius before the point is frozen.
    pub max_widenings: usize,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            radius: 0.1,
            repulsion: 0.45,
            iterations: 20,
            density_correction: true,
            mode: Mode::Isotropic,
            convergence_threshold: None,
            max_fault_ratio: 0.5,
            max_widenings: 3,
            parallel: true,
        }
    }
}

impl RunParameters {
    /// Create parameters with the given neighborhood radius.
    pub fn new(radius: f64) -> Self {
        Self {
            radius,
            ..Default::default()
        }
    }

    /// Set the neighborhood radius.
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    /// Set the repulsion weight μ.
    pub fn with_repulsion(mut self, repulsion: f64) -> Self {
        self.repulsion = repulsion;
        self
    }

    /// Set the iteration budget.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Enable or disable density correction.
    pub fn with_density_correction(mut self, enabled: bool) -> Self {
        self.density_correction = enabled;
        self
    }

    /// Set the consolidation mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Switch to edge-aware consolidation with default frame settings.
    pub fn anisotropic(self) -> Self {
        self.with_mode(Mode::anisotropic())
    }

    /// Set the early-stop displacement threshold.
    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = Some(threshold);
        self
    }

    /// Set the per-iteration fault tolerance.
    pub fn with_max_fault_ratio(mut self, ratio: f64) -> Self {
        self.max_fault_ratio = ratio;
        self
    }

    /// Set how many times an empty attraction query is widened.
    pub fn with_max_widenings(mut self, widenings: usize) -> Self {
        self.max_widenings = widenings;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create parameters for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// The same parameters for a cloud scaled uniformly by `factor`.
    ///
    /// The radius and the convergence threshold are lengths and scale with
    /// the cloud; everything else is dimensionless.
    pub fn scaled(mut self, factor: f64) -> Self {
        self.radius *= factor;
        self.convergence_threshold = self.convergence_threshold.map(|t| t * factor);
        self
    }

    /// Check every parameter invariant.
    pub fn validate(&self) -> Result<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(WlopError::invalid_param("radius", self.radius, "must be positive and finite"));
        }
        if !(self.repulsion.is_finite() && self.repulsion >= 0.0) {
            return Err(WlopError::invalid_param(
                "repulsion",
                self.repulsion,
                "must be non-negative and finite",
            ));
        }
        if self.iterations < 1 {
            return Err(WlopError::invalid_param("iterations", self.iterations, "must be at least 1"));
        }
        if let Some(eps) = self.convergence_threshold {
            if eps.is_nan() || eps < 0.0 {
                return Err(WlopError::invalid_param(
                    "convergence_threshold",
                    eps,
                    "must be non-negative",
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.max_fault_ratio) {
            return Err(WlopError::invalid_param(
                "max_fault_ratio",
                self.max_fault_ratio,
                "must lie in [0, 1]",
            ));
        }
        if let Mode::Anisotropic {
            frame_interval,
            edge_sigma,
            ..
        } = self.mode
        {
            if frame_interval == Some(0) {
                return Err(WlopError::invalid_param("frame_interval", 0, "must be at least 1"));
            }
            if !(edge_sigma.is_finite() && edge_sigma > 0.0) {
                return Err(WlopError::invalid_param("edge_sigma", edge_sigma, "must be positive and finite"));
            }
        }
        Ok(())
    }

    /// Parse parameters from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize parameters to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
