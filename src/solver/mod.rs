//! Nonlinear solver collaborator.
//!
//! The time-step engine hands the solver a mutable state and a residual
//! evaluator and receives a [`SolveReport`] back; the solver never sees
//! the grid or the physics. [`DenseNewton`] is a damped-free
//! Newton-Raphson iteration with a finite-difference Jacobian and a
//! dense LU factorization, adequate for the moderate vertex counts the
//! reference grids produce.

use faer::{linalg::solvers::Solve, Mat};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::assembly::{AssemblyError, SolutionVector};

/// Residual evaluator handed to the solver by the time-step engine.
///
/// An `Err` means the iterate is unphysical (for instance a collapsed
/// viscosity); the solver treats it as non-convergence, never as a
/// panic.
pub type ResidualFn<'a> = dyn FnMut(&SolutionVector) -> Result<SolutionVector, AssemblyError> + 'a;

/// Outcome of one nonlinear solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveReport {
    /// Whether the iteration reached the configured tolerance.
    pub converged: bool,
    /// Number of Newton iterations performed.
    pub iterations: usize,
    /// Final residual two-norm.
    pub residual_norm: f64,
}

impl SolveReport {
    fn failed(iterations: usize) -> Self {
        Self {
            converged: false,
            iterations,
            residual_norm: f64::INFINITY,
        }
    }
}

/// Nonlinear solver contract.
pub trait NonlinearSolver: Send + Sync {
    /// Drive `state` towards a root of the residual.
    ///
    /// On failure `state` may hold a partial iterate; the caller owns
    /// rollback.
    fn solve(&self, state: &mut SolutionVector, residual: &mut ResidualFn<'_>) -> SolveReport;

    /// Human-readable solver name for diagnostics and logging.
    fn name(&self) -> &'static str;
}

// =============================================================================
// Newton configuration
// =============================================================================

/// Configuration for [`DenseNewton`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct NewtonConfig {
    /// Iteration cap before giving up
    pub max_iterations: usize,
    /// Absolute residual tolerance
    pub abs_tol: f64,
    /// Tolerance relative to the initial residual norm
    pub rel_tol: f64,
    /// Base step for the finite-difference Jacobian
    pub fd_epsilon: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            abs_tol: 1e-6,
            rel_tol: 1e-6,
            fd_epsilon: 1e-8,
        }
    }
}

impl NewtonConfig {
    /// Override the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Override the absolute tolerance.
    pub fn with_abs_tol(mut self, abs_tol: f64) -> Self {
        self.abs_tol = abs_tol;
        self
    }

    /// Override the relative tolerance.
    pub fn with_rel_tol(mut self, rel_tol: f64) -> Self {
        self.rel_tol = rel_tol;
        self
    }
}

// =============================================================================
// Dense Newton
// =============================================================================

/// Newton-Raphson with a column-wise finite-difference Jacobian and a
/// full-pivoting dense LU solve.
#[derive(Clone, Debug, Default)]
pub struct DenseNewton {
    config: NewtonConfig,
}

impl DenseNewton {
    pub fn new(config: NewtonConfig) -> Self {
        Self { config }
    }

    /// Assemble the Jacobian by perturbing one unknown at a time.
    ///
    /// Forward differences with a step scaled to the magnitude of the
    /// unknown, so pressure-sized and saturation-sized entries both get
    /// a well-conditioned perturbation.
    fn jacobian(
        &self,
        state: &SolutionVector,
        base: &SolutionVector,
        residual: &mut ResidualFn<'_>,
    ) -> Result<Mat<f64>, AssemblyError> {
        let n = state.len();
        let mut jac = Mat::zeros(n, n);
        let mut perturbed = state.clone();

        for col in 0..n {
            let x = state.as_slice()[col];
            let eps = self.config.fd_epsilon * (1.0 + x.abs());
            perturbed.as_mut_slice()[col] = x + eps;
            let r = residual(&perturbed)?;
            perturbed.as_mut_slice()[col] = x;

            let inv_eps = 1.0 / eps;
            for row in 0..n {
                jac[(row, col)] = (r.as_slice()[row] - base.as_slice()[row]) * inv_eps;
            }
        }
        Ok(jac)
    }
}

impl NonlinearSolver for DenseNewton {
    fn solve(&self, state: &mut SolutionVector, residual: &mut ResidualFn<'_>) -> SolveReport {
        let n = state.len();

        let mut defect = match residual(state) {
            Ok(r) => r,
            Err(err) => {
                debug!(%err, "residual evaluation failed at initial iterate");
                return SolveReport::failed(0);
            }
        };
        let initial_norm = defect.two_norm();
        let mut norm = initial_norm;

        for iteration in 0..self.config.max_iterations {
            if norm <= self.config.abs_tol || norm <= self.config.rel_tol * initial_norm {
                trace!(iteration, norm, "newton converged");
                return SolveReport {
                    converged: true,
                    iterations: iteration,
                    residual_norm: norm,
                };
            }

            let jac = match self.jacobian(state, &defect, residual) {
                Ok(jac) => jac,
                Err(err) => {
                    debug!(%err, iteration, "residual evaluation failed during jacobian");
                    return SolveReport::failed(iteration);
                }
            };

            let mut rhs = Mat::zeros(n, 1);
            for row in 0..n {
                rhs[(row, 0)] = -defect.as_slice()[row];
            }
            let lu = jac.as_ref().full_piv_lu();
            let update = lu.solve(&rhs);

            let mut finite = true;
            for row in 0..n {
                let dx = update[(row, 0)];
                if !dx.is_finite() {
                    finite = false;
                    break;
                }
                state.as_mut_slice()[row] += dx;
            }
            if !finite {
                debug!(iteration, "newton update is not finite, aborting");
                return SolveReport::failed(iteration + 1);
            }

            defect = match residual(state) {
                Ok(r) => r,
                Err(err) => {
                    debug!(%err, iteration, "residual evaluation failed after update");
                    return SolveReport::failed(iteration + 1);
                }
            };
            norm = defect.two_norm();
            trace!(iteration, norm, "newton iteration");
        }

        debug!(
            iterations = self.config.max_iterations,
            norm, "newton did not converge"
        );
        SolveReport {
            converged: norm <= self.config.abs_tol || norm <= self.config.rel_tol * initial_norm,
            iterations: self.config.max_iterations,
            residual_norm: norm,
        }
    }

    fn name(&self) -> &'static str {
        "dense-newton"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-6;

    /// r(x) = x^2 - 4 componentwise, roots at +-2.
    fn quadratic(state: &SolutionVector) -> Result<SolutionVector, AssemblyError> {
        let values = state.as_slice().iter().map(|x| x * x - 4.0).collect();
        Ok(SolutionVector::from_flat(values, state.num_eq()))
    }

    #[test]
    fn test_newton_finds_scalar_root() {
        let solver = DenseNewton::default();
        let mut state = SolutionVector::from_flat(vec![1.0], 1);

        let report = solver.solve(&mut state, &mut quadratic);
        assert!(report.converged);
        assert!((state.as_slice()[0] - 2.0).abs() < TOL);
        assert!(report.residual_norm <= 1e-6);
    }

    #[test]
    fn test_newton_solves_coupled_system() {
        // r0 = x0 + x1 - 3, r1 = x0 * x1 - 2; root (1, 2) from (0.5, 2.5).
        let mut residual = |state: &SolutionVector| -> Result<SolutionVector, AssemblyError> {
            let x = state.as_slice();
            Ok(SolutionVector::from_flat(
                vec![x[0] + x[1] - 3.0, x[0] * x[1] - 2.0],
                1,
            ))
        };
        let solver = DenseNewton::default();
        let mut state = SolutionVector::from_flat(vec![0.5, 2.5], 1);

        let report = solver.solve(&mut state, &mut residual);
        assert!(report.converged);
        assert!((state.as_slice()[0] - 1.0).abs() < 1e-5);
        assert!((state.as_slice()[1] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_linear_residual_converges_in_one_iteration() {
        let mut residual = |state: &SolutionVector| -> Result<SolutionVector, AssemblyError> {
            let values = state.as_slice().iter().map(|x| 2.0 * x - 6.0).collect();
            Ok(SolutionVector::from_flat(values, 1))
        };
        let solver = DenseNewton::default();
        let mut state = SolutionVector::from_flat(vec![0.0, 10.0], 1);

        let report = solver.solve(&mut state, &mut residual);
        assert!(report.converged);
        assert!(report.iterations <= 2);
        assert!((state.as_slice()[0] - 3.0).abs() < 1e-5);
        assert!((state.as_slice()[1] - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_residual_error_reported_as_failure() {
        let mut residual = |_: &SolutionVector| -> Result<SolutionVector, AssemblyError> {
            Err(AssemblyError::ShapeMismatch {
                got: 0,
                expected: 1,
            })
        };
        let solver = DenseNewton::default();
        let mut state = SolutionVector::from_flat(vec![1.0], 1);

        let report = solver.solve(&mut state, &mut residual);
        assert!(!report.converged);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn test_iteration_cap_respected() {
        // No root: r(x) = x^2 + 1.
        let mut residual = |state: &SolutionVector| -> Result<SolutionVector, AssemblyError> {
            let values = state.as_slice().iter().map(|x| x * x + 1.0).collect();
            Ok(SolutionVector::from_flat(values, 1))
        };
        let config = NewtonConfig::default().with_max_iterations(5);
        let solver = DenseNewton::new(config);
        let mut state = SolutionVector::from_flat(vec![1.0], 1);

        let report = solver.solve(&mut state, &mut residual);
        assert!(!report.converged);
        assert_eq!(report.iterations, 5);
    }
}
