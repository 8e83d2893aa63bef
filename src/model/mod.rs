//! Physical model layer: index layout, variable containers and the
//! per-element local residual.

mod registry;
mod residual;
mod variables;

pub use registry::{FeatureFlags, Phase, PhysicsIndexRegistry, Slot, NUM_CANONICAL_PHASES};
pub use residual::{
    ElementContext, LocalResidual, OnePhaseResidual, ResidualError, TimeLevel,
    DEFAULT_UPWIND_WEIGHT,
};
pub use variables::{FluidProperties, FluxVariables, PrimaryVariables, VolumeVariables};
