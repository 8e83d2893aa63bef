//! Local residual: per-element storage, flux and source contributions.
//!
//! The box scheme integrates a conservation law over the sub-control
//! volume of each element vertex. The local residual supplies the three
//! ingredients for one element:
//!
//! - **storage**: the accumulated quantity whose time derivative enters
//!   the backward-Euler difference (current − previous) / Δt,
//! - **flux**: transport across the interior SCV faces, upwind-weighted,
//! - **source**: sink/source terms delegated to the problem collaborator.
//!
//! [`LocalResidual`] is a capability trait implemented once per physical
//! model and selected at construction; the assembler only sees the
//! trait. [`OnePhaseResidual`] implements single-phase, slightly
//! compressible Darcy flow.

use thiserror::Error;

use crate::grid::ScvFaceGeometry;
use crate::model::{FluidProperties, FluxVariables, PhysicsIndexRegistry, PrimaryVariables, VolumeVariables};
use crate::problem::Problem;
use crate::types::{ElementIndex, ScvFaceIndex, ScvIndex, VertexIndex};

// =============================================================================
// Errors
// =============================================================================

/// Local numerical failures during residual evaluation.
///
/// These propagate through the assembler to the nonlinear solver, which
/// treats them as a non-convergent iterate; they never corrupt global
/// state.
#[derive(Error, Debug)]
pub enum ResidualError {
    /// Viscosity reached zero or a non-finite value; mobility is undefined.
    #[error("viscosity collapsed to {value} at {element}/{scv}")]
    ViscosityCollapse {
        element: ElementIndex,
        scv: ScvIndex,
        value: f64,
    },

    /// A computed contribution was NaN or infinite.
    #[error("non-finite {what} at {element}")]
    NonFinite {
        element: ElementIndex,
        what: &'static str,
    },
}

// =============================================================================
// Time level
// =============================================================================

/// Which time level of the volume variables to evaluate.
///
/// Storage must be evaluated through the identical code path for both
/// levels so that the implicit-Euler difference is consistent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeLevel {
    /// The current Newton iterate.
    Current,
    /// The converged previous time step.
    Previous,
}

// =============================================================================
// Element context
// =============================================================================

/// Everything the local residual needs to know about one element.
///
/// Built by the assembler per element and discarded after the element's
/// contributions are scattered; the geometric entities it references are
/// owned by the grid collaborator.
#[derive(Clone, Debug)]
pub struct ElementContext<'a> {
    /// The element under consideration
    pub element: ElementIndex,
    /// Shared slot layout
    pub registry: &'a PhysicsIndexRegistry,
    /// Global vertex ids, one per SCV
    pub vertices: Vec<VertexIndex>,
    /// SCV volumes
    pub scv_volumes: Vec<f64>,
    /// Interior SCV faces
    pub faces: Vec<ScvFaceGeometry>,
    /// P1 shape-function gradients, one per SCV
    pub gradients: Vec<[f64; 2]>,
    /// Intrinsic permeability of the element
    pub permeability: [[f64; 2]; 2],
    /// Volume variables at the current iterate, one per SCV
    pub cur: Vec<VolumeVariables>,
    /// Volume variables at the previous time step, one per SCV
    pub prev: Vec<VolumeVariables>,
}

impl<'a> ElementContext<'a> {
    /// Number of sub-control volumes.
    #[inline]
    pub fn n_scvs(&self) -> usize {
        self.vertices.len()
    }

    /// Volume variables of one SCV at the requested time level.
    #[inline]
    pub fn volume_vars(&self, scv: ScvIndex, level: TimeLevel) -> &VolumeVariables {
        match level {
            TimeLevel::Current => &self.cur[scv],
            TimeLevel::Previous => &self.prev[scv],
        }
    }

    /// Build the flux variables for one interior SCV face.
    ///
    /// The potential gradient is reconstructed from the current
    /// pressures via the P1 shape-function gradients.
    pub fn flux_vars(&self, face: ScvFaceIndex) -> FluxVariables {
        let geometry = self.faces[face];
        let mut grad = [0.0, 0.0];
        for (scv, g) in self.gradients.iter().enumerate() {
            let p = self.cur[scv].pressure;
            grad[0] += p * g[0];
            grad[1] += p * g[1];
        }
        FluxVariables {
            inside: geometry.inside,
            outside: geometry.outside,
            normal: geometry.normal,
            permeability: self.permeability,
            potential_grad: grad,
        }
    }
}

// =============================================================================
// Local residual trait
// =============================================================================

/// Per-element residual contract of one physical model.
///
/// Implementations are stateless apart from configuration and must be
/// thread-safe; the assembler may evaluate elements on a worker pool.
pub trait LocalResidual: Send + Sync {
    /// The shared index registry of this model.
    fn registry(&self) -> &PhysicsIndexRegistry;

    /// Derive volume variables from the primary variables of one vertex.
    fn volume_variables(
        &self,
        primary: &PrimaryVariables,
        porosity: f64,
        temperature: f64,
    ) -> VolumeVariables;

    /// Storage term at an SCV: the conserved quantity per unit volume.
    ///
    /// Pure function of the volume variables at the requested time
    /// level; slots of disabled features are never written.
    fn storage(&self, ctx: &ElementContext<'_>, scv: ScvIndex, level: TimeLevel)
        -> PrimaryVariables;

    /// Transport across one interior SCV face.
    ///
    /// Positive entries mean flow from the face's inside SCV to its
    /// outside SCV.
    fn flux(
        &self,
        ctx: &ElementContext<'_>,
        face: ScvFaceIndex,
    ) -> Result<PrimaryVariables, ResidualError>;

    /// Source/sink term at an SCV, delegated to the problem collaborator.
    fn source(
        &self,
        ctx: &ElementContext<'_>,
        problem: &dyn Problem,
        scv: ScvIndex,
    ) -> PrimaryVariables;

    /// Human-readable model name for diagnostics and logging.
    fn name(&self) -> &'static str;
}

// =============================================================================
// One-phase model
// =============================================================================

/// Default upwind weight: full upwinding.
pub const DEFAULT_UPWIND_WEIGHT: f64 = 1.0;

/// Single-phase, slightly compressible Darcy flow.
///
/// Storage is ϱ·φ per unit volume; the face flux is the upwind-weighted
/// mobility ϱ/μ times the driving force −(K ∇p)·n.
///
/// The upwind weight `w ∈ [0, 1]` blends the upstream and downstream
/// mobilities, `w·up + (1−w)·dn`; `w = 1` (the default) is full
/// upwinding, `w = 0.5` central differencing. Lower values reduce
/// numerical diffusion at the cost of stability.
pub struct OnePhaseResidual {
    registry: std::sync::Arc<PhysicsIndexRegistry>,
    fluid: FluidProperties,
    upwind_weight: f64,
}

impl OnePhaseResidual {
    /// Create the model with the default upwind weight.
    pub fn new(registry: std::sync::Arc<PhysicsIndexRegistry>, fluid: FluidProperties) -> Self {
        Self {
            registry,
            fluid,
            upwind_weight: DEFAULT_UPWIND_WEIGHT,
        }
    }

    /// Override the upwind weight.
    ///
    /// # Panics
    /// Panics if `weight` is outside [0, 1].
    pub fn with_upwind_weight(mut self, weight: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&weight),
            "upwind weight {weight} outside [0, 1]"
        );
        self.upwind_weight = weight;
        self
    }

    /// The configured upwind weight.
    #[inline]
    pub fn upwind_weight(&self) -> f64 {
        self.upwind_weight
    }

    fn mobility(
        &self,
        vars: &VolumeVariables,
        element: ElementIndex,
        scv: ScvIndex,
    ) -> Result<f64, ResidualError> {
        if !(vars.viscosity.is_finite() && vars.viscosity > 0.0) {
            return Err(ResidualError::ViscosityCollapse {
                element,
                scv,
                value: vars.viscosity,
            });
        }
        Ok(vars.density / vars.viscosity)
    }
}

impl LocalResidual for OnePhaseResidual {
    fn registry(&self) -> &PhysicsIndexRegistry {
        &self.registry
    }

    fn volume_variables(
        &self,
        primary: &PrimaryVariables,
        porosity: f64,
        temperature: f64,
    ) -> VolumeVariables {
        let pressure = primary[self.registry.pressure_idx()];
        VolumeVariables {
            pressure,
            density: self.fluid.density(pressure),
            viscosity: self.fluid.viscosity,
            porosity,
            temperature,
        }
    }

    fn storage(
        &self,
        ctx: &ElementContext<'_>,
        scv: ScvIndex,
        level: TimeLevel,
    ) -> PrimaryVariables {
        let vars = ctx.volume_vars(scv, level);
        let mut result = PrimaryVariables::zeros(self.registry.num_eq());
        result[self.registry.conti_eq_idx(0)] = vars.density * vars.porosity;
        result
    }

    fn flux(
        &self,
        ctx: &ElementContext<'_>,
        face: ScvFaceIndex,
    ) -> Result<PrimaryVariables, ResidualError> {
        let flux_vars = ctx.flux_vars(face);
        let driving = flux_vars.driving_force();

        let up = flux_vars.upstream(driving);
        let dn = flux_vars.downstream(driving);
        let mob_up = self.mobility(&ctx.cur[up], ctx.element, up)?;
        let mob_dn = self.mobility(&ctx.cur[dn], ctx.element, dn)?;

        let w = self.upwind_weight;
        let mobility = w * mob_up + (1.0 - w) * mob_dn;

        let mut result = PrimaryVariables::zeros(self.registry.num_eq());
        result[self.registry.conti_eq_idx(0)] = mobility * driving;
        if !result.is_finite() {
            return Err(ResidualError::NonFinite {
                element: ctx.element,
                what: "face flux",
            });
        }
        Ok(result)
    }

    fn source(
        &self,
        ctx: &ElementContext<'_>,
        problem: &dyn Problem,
        scv: ScvIndex,
    ) -> PrimaryVariables {
        problem.source(ctx.vertices[scv], ctx.element)
    }

    fn name(&self) -> &'static str {
        "one-phase"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{FeatureFlags, Phase};
    use crate::types::VertexIndex;

    const TOL: f64 = 1e-12;

    fn registry() -> Arc<PhysicsIndexRegistry> {
        Arc::new(PhysicsIndexRegistry::new(
            FeatureFlags::single_phase(Phase::Water),
            0,
        ))
    }

    fn model(weight: f64) -> OnePhaseResidual {
        OnePhaseResidual::new(registry(), FluidProperties::water()).with_upwind_weight(weight)
    }

    /// Two SCVs, one face, unit element along x.
    fn context<'a>(
        reg: &'a PhysicsIndexRegistry,
        model: &OnePhaseResidual,
        p0: f64,
        p1: f64,
    ) -> ElementContext<'a> {
        let cur = vec![
            model.volume_variables(&PrimaryVariables::from_vec(vec![p0]), 0.3, 293.15),
            model.volume_variables(&PrimaryVariables::from_vec(vec![p1]), 0.3, 293.15),
        ];
        ElementContext {
            element: ElementIndex::new(0),
            registry: reg,
            vertices: vec![VertexIndex::new(0), VertexIndex::new(1)],
            scv_volumes: vec![0.5, 0.5],
            faces: vec![ScvFaceGeometry {
                inside: ScvIndex::new(0),
                outside: ScvIndex::new(1),
                normal: [1.0, 0.0],
            }],
            gradients: vec![[-1.0, 0.0], [1.0, 0.0]],
            permeability: [[1.0e-12, 0.0], [0.0, 1.0e-12]],
            prev: cur.clone(),
            cur,
        }
    }

    /// Same element seen with the opposite face orientation.
    fn swap_face<'a>(ctx: &ElementContext<'a>) -> ElementContext<'a> {
        let mut swapped = ctx.clone();
        let face = swapped.faces[0];
        swapped.faces[0] = ScvFaceGeometry {
            inside: face.outside,
            outside: face.inside,
            normal: [-face.normal[0], -face.normal[1]],
        };
        swapped
    }

    #[test]
    fn test_storage_is_density_times_porosity() {
        let reg = registry();
        let model = model(1.0);
        let ctx = context(&reg, &model, 2.0e5, 1.0e5);

        let storage = model.storage(&ctx, ScvIndex::new(0), TimeLevel::Current);
        assert!((storage[0] - 1000.0 * 0.3).abs() < TOL);

        // Both time levels go through the same evaluation path.
        let prev = model.storage(&ctx, ScvIndex::new(0), TimeLevel::Previous);
        assert_eq!(storage, prev);
    }

    #[test]
    fn test_flux_antisymmetry() {
        let reg = registry();
        for weight in [0.0, 0.3, 0.5, 1.0] {
            let model = model(weight);
            let ctx = context(&reg, &model, 2.0e5, 1.0e5);
            let swapped = swap_face(&ctx);

            let forward = model.flux(&ctx, ScvFaceIndex::new(0)).unwrap();
            let backward = model.flux(&swapped, ScvFaceIndex::new(0)).unwrap();
            assert!(
                (forward[0] + backward[0]).abs() < TOL * forward[0].abs().max(1.0),
                "antisymmetry violated for w = {weight}"
            );
        }
    }

    #[test]
    fn test_upwind_weight_bounds() {
        let reg = registry();
        // Compressible fluid so the two SCVs have different mobilities.
        let fluid = FluidProperties {
            ref_density: 1000.0,
            ref_pressure: 1.0e5,
            compressibility: 1.0e-6,
            viscosity: 1.0e-3,
        };
        let p0 = 2.0e5;
        let p1 = 1.0e5;

        for (weight, expect_pressure) in [(1.0, p0), (0.0, p1)] {
            let model = OnePhaseResidual::new(reg.clone(), fluid).with_upwind_weight(weight);
            let ctx = context(&reg, &model, p0, p1);

            // Flow goes from SCV 0 (high pressure) to SCV 1.
            let flux = model.flux(&ctx, ScvFaceIndex::new(0)).unwrap();
            let driving = ctx.flux_vars(ScvFaceIndex::new(0)).driving_force();
            let coefficient = flux[0] / driving;

            let expected = fluid.density(expect_pressure) / fluid.viscosity;
            assert!(
                (coefficient - expected).abs() < TOL * expected,
                "w = {weight}: coefficient {coefficient} != {expected}"
            );
        }
    }

    #[test]
    fn test_viscosity_collapse_is_an_error() {
        let reg = registry();
        let fluid = FluidProperties {
            viscosity: 0.0,
            ..FluidProperties::water()
        };
        let model = OnePhaseResidual::new(reg.clone(), fluid);
        let ctx = context(&reg, &model, 2.0e5, 1.0e5);

        let result = model.flux(&ctx, ScvFaceIndex::new(0));
        assert!(matches!(
            result,
            Err(ResidualError::ViscosityCollapse { .. })
        ));
    }

    #[test]
    fn test_disabled_slots_never_written() {
        // Energy flagged on: the temperature slot exists but the
        // one-phase mass balance must leave it untouched.
        let reg = Arc::new(PhysicsIndexRegistry::new(
            FeatureFlags::single_phase(Phase::Water).with_energy(),
            0,
        ));
        let model = OnePhaseResidual::new(reg.clone(), FluidProperties::water());
        let ctx = context(&reg, &model, 2.0e5, 1.0e5);

        let energy_slot = reg.energy_eq_idx().expect("energy");
        let storage = model.storage(&ctx, ScvIndex::new(0), TimeLevel::Current);
        assert_eq!(storage.len(), 2);
        assert_eq!(storage[energy_slot], 0.0);

        let flux = model.flux(&ctx, ScvFaceIndex::new(0)).unwrap();
        assert_eq!(flux[energy_slot], 0.0);
    }

    #[test]
    #[should_panic(expected = "outside [0, 1]")]
    fn test_upwind_weight_validated() {
        model(1.5);
    }
}
