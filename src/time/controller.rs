//! Adaptive time-step-size selection.

use serde::{Deserialize, Serialize};

use crate::solver::SolveReport;

/// Step-size policy consulted after every nonlinear solve.
///
/// Gets the attempted step size and the solve report; returns the size
/// to use next. After a rejected step the suggestion is retried
/// immediately from the previous solution.
pub trait TimeStepController: Send + Sync {
    fn suggest(&self, dt: f64, report: &SolveReport) -> f64;

    /// Human-readable controller name for diagnostics and logging.
    fn name(&self) -> &'static str;
}

/// Configuration for [`HeuristicController`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Multiplier after a rejected step (in (0, 1))
    pub shrink_factor: f64,
    /// Multiplier after a fast-converging step (>= 1)
    pub growth_factor: f64,
    /// Newton iteration count below which a step counts as fast
    pub target_iterations: usize,
    /// Lower clamp on the step size
    pub min_dt: f64,
    /// Upper clamp on the step size
    pub max_dt: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            shrink_factor: 0.5,
            growth_factor: 1.25,
            target_iterations: 8,
            min_dt: 1e-9,
            max_dt: f64::INFINITY,
        }
    }
}

/// Iteration-count heuristic: halve on rejection, grow moderately when
/// the nonlinear solver converged quickly, hold otherwise.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicController {
    config: ControllerConfig,
}

impl HeuristicController {
    pub fn new(config: ControllerConfig) -> Self {
        assert!(
            config.shrink_factor > 0.0 && config.shrink_factor < 1.0,
            "shrink factor must lie in (0, 1)"
        );
        assert!(
            config.growth_factor >= 1.0,
            "growth factor must be at least 1"
        );
        Self { config }
    }
}

impl TimeStepController for HeuristicController {
    fn suggest(&self, dt: f64, report: &SolveReport) -> f64 {
        let c = &self.config;
        let next = if !report.converged {
            dt * c.shrink_factor
        } else if report.iterations < c.target_iterations {
            dt * c.growth_factor
        } else {
            dt
        };
        next.clamp(c.min_dt, c.max_dt)
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

// =============================================================================
// Tests
// =============================================================================
