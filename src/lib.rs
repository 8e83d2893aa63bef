//! # boxflow
//!
//! A vertex-centered finite-volume ("box") scheme core for porous-media
//! flow on finite-element meshes.
//!
//! This crate provides the building blocks for fully implicit box-scheme
//! simulations:
//! - Typed entity indices (elements, vertices, SCVs, SCV faces)
//! - A physics index registry mapping feature flags to dense slots
//! - Per-element local residuals (storage, upwind flux, source)
//! - Global defect assembly with scatter-add by vertex
//! - A dense Newton nonlinear solver
//! - An adaptive implicit-Euler time-step engine with step retries
//!
//! The mesh and the simulation setup are collaborators behind the
//! [`grid::BoxGrid`] and [`problem::Problem`] traits; a 1D
//! [`grid::SegmentGrid`] reference mesh is included for testing and
//! small studies.

pub mod assembly;
pub mod grid;
pub mod model;
pub mod problem;
pub mod solver;
pub mod time;
pub mod types;

// Re-export main types for convenience
pub use assembly::{AssemblyError, GlobalAssembler, SolutionVector};
pub use grid::{BoxGrid, GridError, ScvFaceGeometry, SegmentGrid};
pub use model::{
    ElementContext, FeatureFlags, FluidProperties, FluxVariables, LocalResidual, OnePhaseResidual,
    Phase, PhysicsIndexRegistry, PrimaryVariables, ResidualError, Slot, TimeLevel, VolumeVariables,
};
pub use problem::{BoundaryCondition, Problem};
pub use types::{ElementIndex, ScvFaceIndex, ScvIndex, VertexIndex};
pub use solver::{DenseNewton, NewtonConfig, NonlinearSolver, ResidualFn, SolveReport};
pub use time::{
    ControllerConfig, GlobalSolutionState, HeuristicController, StepError, StepOutcome,
    TimeStepConfig, TimeStepController, TimeStepEngine,
};
