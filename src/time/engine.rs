//! Outer time-stepping loop.
//!
//! One [`TimeStepEngine::advance`] call performs one implicit-Euler step:
//! it solves the nonlinear defect equation at the attempted step size
//! and, on rejection, rolls the iterate back to the previous solution,
//! shrinks the step and retries. The previous solution is only replaced
//! once a step has been accepted, so a rejected attempt can never leak
//! into the committed history.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::assembly::{GlobalAssembler, SolutionVector};
use crate::grid::BoxGrid;
use crate::model::LocalResidual;
use crate::problem::Problem;
use crate::solver::{NonlinearSolver, SolveReport};
use crate::time::TimeStepController;

/// Default retry budget per time step.
pub const DEFAULT_MAX_RETRIES: usize = 10;

/// Time-loop configuration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TimeStepConfig {
    /// Step size attempted first
    pub dt_initial: f64,
    /// Rejected attempts allowed per step before the step fails
    pub max_retries: usize,
}

impl Default for TimeStepConfig {
    fn default() -> Self {
        Self {
            dt_initial: 1.0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl TimeStepConfig {
    /// Override the initial step size.
    pub fn with_dt_initial(mut self, dt_initial: f64) -> Self {
        self.dt_initial = dt_initial;
        self
    }

    /// Override the retry budget.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Fatal time-loop failures.
#[derive(Error, Debug)]
pub enum StepError {
    /// Every retry at shrinking step sizes failed to converge.
    #[error(
        "time step at t = {time} failed after {attempts} attempts (last dt = {dt}); \
         the nonlinear solver did not converge"
    )]
    RetryBudgetExhausted { time: f64, dt: f64, attempts: usize },
}

/// One accepted time step.
#[derive(Clone, Copy, Debug)]
pub struct StepOutcome {
    /// Simulation time after the step
    pub time: f64,
    /// Step size that was accepted
    pub dt: f64,
    /// Rejected attempts before acceptance
    pub rejections: usize,
    /// Report of the accepting nonlinear solve
    pub report: SolveReport,
}

/// The two solution states the implicit scheme keeps.
///
/// `previous` is the last accepted solution and only changes on
/// acceptance; `current` is the working iterate the solver mutates.
#[derive(Clone, Debug)]
pub struct GlobalSolutionState {
    pub current: SolutionVector,
    pub previous: SolutionVector,
}

/// Owns the simulation clock, the solution states and the collaborator
/// objects, and drives them through implicit-Euler steps.
pub struct TimeStepEngine<G: BoxGrid, P: Problem> {
    grid: Arc<G>,
    problem: Arc<P>,
    residual: Arc<dyn LocalResidual>,
    solver: Box<dyn NonlinearSolver>,
    controller: Box<dyn TimeStepController>,
    config: TimeStepConfig,
    state: GlobalSolutionState,
    time: f64,
    dt: f64,
}

impl<G: BoxGrid, P: Problem> TimeStepEngine<G, P> {
    /// Set up the engine and apply initial and Dirichlet conditions.
    pub fn new(
        grid: Arc<G>,
        problem: Arc<P>,
        residual: Arc<dyn LocalResidual>,
        solver: Box<dyn NonlinearSolver>,
        controller: Box<dyn TimeStepController>,
        config: TimeStepConfig,
    ) -> Self {
        assert!(config.dt_initial > 0.0, "initial step size must be positive");

        let assembler = GlobalAssembler::new(grid.as_ref(), problem.as_ref(), residual.as_ref());
        let mut current = assembler.apply_initial_conditions();
        assembler.apply_dirichlet(&mut current);
        let previous = current.clone();

        info!(
            vertices = current.n_vertices(),
            num_eq = current.num_eq(),
            solver = solver.name(),
            controller = controller.name(),
            model = residual.name(),
            "time-step engine initialized"
        );

        Self {
            grid,
            problem,
            residual,
            solver,
            controller,
            config,
            state: GlobalSolutionState { current, previous },
            time: 0.0,
            dt: config.dt_initial,
        }
    }

    /// Current simulation time.
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Step size the next attempt will use.
    #[inline]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// The last accepted solution.
    #[inline]
    pub fn solution(&self) -> &SolutionVector {
        &self.state.previous
    }

    /// Both solution states.
    #[inline]
    pub fn state(&self) -> &GlobalSolutionState {
        &self.state
    }

    /// Advance by one accepted step.
    ///
    /// Attempts the current step size and retries at
    /// controller-suggested smaller sizes after each rejection, up to
    /// `max_retries` rejections. Exhausting the budget is fatal: the
    /// committed solution stays at the last accepted state and the
    /// error reports the attempted sizes.
    pub fn advance(&mut self) -> Result<StepOutcome, StepError> {
        let mut dt = self.dt;

        for attempt in 0..=self.config.max_retries {
            let assembler = GlobalAssembler::new(
                self.grid.as_ref(),
                self.problem.as_ref(),
                self.residual.as_ref(),
            );
            let solver = &*self.solver;
            let GlobalSolutionState { current, previous } = &mut self.state;

            assembler.apply_dirichlet(current);
            let mut residual_fn =
                |iterate: &SolutionVector| assembler.assemble_defect(iterate, previous, dt);
            let report = solver.solve(current, &mut residual_fn);

            if report.converged {
                *previous = current.clone();
                self.time += dt;
                self.dt = self.controller.suggest(dt, &report);
                debug!(
                    time = self.time,
                    dt,
                    rejections = attempt,
                    iterations = report.iterations,
                    "time step accepted"
                );
                return Ok(StepOutcome {
                    time: self.time,
                    dt,
                    rejections: attempt,
                    report,
                });
            }

            // Rejected: discard the iterate, shrink, retry.
            *current = previous.clone();
            let next_dt = self.controller.suggest(dt, &report);
            warn!(
                time = self.time,
                dt,
                next_dt,
                attempt,
                residual_norm = report.residual_norm,
                "time step rejected"
            );
            dt = next_dt;
        }

        Err(StepError::RetryBudgetExhausted {
            time: self.time,
            dt,
            attempts: self.config.max_retries + 1,
        })
    }

    /// Step until `end_time`, clamping the final step to land on it.
    pub fn run_until(&mut self, end_time: f64) -> Result<(), StepError> {
        // Tolerate roundoff so the loop terminates on the last step.
        let tiny = 1e-12 * end_time.abs().max(1.0);
        while self.time < end_time - tiny {
            self.dt = self.dt.min(end_time - self.time);
            self.advance()?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::grid::SegmentGrid;
    use crate::model::{
        FeatureFlags, FluidProperties, OnePhaseResidual, Phase, PhysicsIndexRegistry,
        PrimaryVariables,
    };
    use crate::problem::BoundaryCondition;
    use crate::solver::ResidualFn;
    use crate::time::HeuristicController;
    use crate::types::{ElementIndex, VertexIndex};

    struct StillWater;

    impl Problem for StillWater {
        fn initial(
            &self,
            _vertex: VertexIndex,
            _element: ElementIndex,
            _world: [f64; 2],
            _local: [f64; 2],
        ) -> PrimaryVariables {
            PrimaryVariables::from_vec(vec![1.0e5])
        }

        fn boundary_condition(
            &self,
            _vertex: VertexIndex,
            _element: ElementIndex,
            _world: [f64; 2],
        ) -> BoundaryCondition {
            BoundaryCondition::Neumann
        }

        fn dirichlet(
            &self,
            _vertex: VertexIndex,
            _element: ElementIndex,
            _world: [f64; 2],
        ) -> PrimaryVariables {
            unreachable!()
        }

        fn source(&self, _vertex: VertexIndex, _element: ElementIndex) -> PrimaryVariables {
            PrimaryVariables::zeros(1)
        }

        fn permeability(&self, _element: ElementIndex) -> [[f64; 2]; 2] {
            [[1.0e-12, 0.0], [0.0, 1.0e-12]]
        }

        fn porosity(&self, _element: ElementIndex) -> f64 {
            0.2
        }
    }

    /// Fails the first `failures` solves, then converges. Scribbles on
    /// the state on failure so rollback is observable.
    struct FlakySolver {
        failures: usize,
        calls: Arc<AtomicUsize>,
    }

    impl FlakySolver {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl NonlinearSolver for FlakySolver {
        fn solve(&self, state: &mut SolutionVector, _residual: &mut ResidualFn<'_>) -> SolveReport {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                state.as_mut_slice().fill(f64::NAN);
                SolveReport {
                    converged: false,
                    iterations: 50,
                    residual_norm: f64::INFINITY,
                }
            } else {
                SolveReport {
                    converged: true,
                    iterations: 2,
                    residual_norm: 1e-10,
                }
            }
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn engine_with(solver: Box<dyn NonlinearSolver>) -> TimeStepEngine<SegmentGrid, StillWater> {
        let registry = std::sync::Arc::new(PhysicsIndexRegistry::new(
            FeatureFlags::single_phase(Phase::Water),
            0,
        ));
        let model = OnePhaseResidual::new(registry, FluidProperties::water());
        TimeStepEngine::new(
            Arc::new(SegmentGrid::uniform(0.0, 1.0, 2)),
            Arc::new(StillWater),
            Arc::new(model),
            solver,
            Box::new(HeuristicController::default()),
            TimeStepConfig::default().with_dt_initial(8.0),
        )
    }

    #[test]
    fn test_retries_shrink_and_roll_back() {
        let mut engine = engine_with(Box::new(FlakySolver::new(3)));

        let outcome = engine.advance().unwrap();
        assert_eq!(outcome.rejections, 3);
        // Three halvings of dt = 8 before acceptance.
        assert!((outcome.dt - 1.0).abs() < 1e-14);
        assert!((engine.time() - 1.0).abs() < 1e-14);
        // The NaN scribbles from rejected attempts never survive.
        assert!(engine.solution().is_finite());
    }

    #[test]
    fn test_retry_budget_exhaustion_is_fatal() {
        let mut engine = engine_with(Box::new(FlakySolver::new(usize::MAX)));
        let before = engine.solution().clone();

        let err = engine.advance().unwrap_err();
        let StepError::RetryBudgetExhausted { time, attempts, .. } = err;
        assert_eq!(attempts, DEFAULT_MAX_RETRIES + 1);
        assert_eq!(time, 0.0);
        // The committed solution is untouched.
        assert_eq!(engine.solution(), &before);
        assert!((engine.time() - 0.0).abs() < 1e-14);
    }

    #[test]
    fn test_solve_count_matches_budget() {
        let solver = FlakySolver::new(usize::MAX);
        let calls = solver.calls.clone();
        let mut engine = engine_with(Box::new(solver));

        assert!(engine.advance().is_err());
        // One initial attempt plus max_retries retries.
        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_MAX_RETRIES + 1);
    }

    #[test]
    fn test_run_until_lands_on_end_time() {
        let mut engine = engine_with(Box::new(FlakySolver::new(0)));
        engine.run_until(20.0).unwrap();
        assert!((engine.time() - 20.0).abs() < 1e-9);
    }
}
