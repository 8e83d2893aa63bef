//! Time integration layer: the implicit-Euler stepping engine and the
//! adaptive step-size controller.

mod controller;
mod engine;

pub use controller::{ControllerConfig, HeuristicController, TimeStepController};
pub use engine::{
    GlobalSolutionState, StepError, StepOutcome, TimeStepConfig, TimeStepEngine,
    DEFAULT_MAX_RETRIES,
};
