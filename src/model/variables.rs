//! Primary and derived (secondary) variable containers.
//!
//! [`PrimaryVariables`] holds the per-vertex unknowns the nonlinear
//! solver works on; its slot meanings come from the
//! [`PhysicsIndexRegistry`](super::PhysicsIndexRegistry).
//! [`VolumeVariables`] and [`FluxVariables`] are derived quantities with
//! no independent lifecycle: they are recomputed from the primary
//! variables on every assembly pass and discarded afterwards.

use crate::model::Slot;
use crate::types::ScvIndex;

// =============================================================================
// Primary variables
// =============================================================================

/// Ordered tuple of scalars, one slot per active equation.
///
/// The vector is dense: its length equals the registry's `num_eq()`.
/// Writes through [`set_slot`](Self::set_slot) /
/// [`add_slot`](Self::add_slot) silently skip disabled slots, so model
/// code can stay oblivious to which optional features are compiled into
/// the current configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrimaryVariables {
    data: Vec<f64>,
}

impl PrimaryVariables {
    /// A zero-initialized vector with `num_eq` slots.
    pub fn zeros(num_eq: usize) -> Self {
        Self {
            data: vec![0.0; num_eq],
        }
    }

    /// Build from raw slot values.
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self { data }
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the vector has no slots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw slot values.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable raw slot values.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Write a slot, skipping the write if the slot is disabled.
    #[inline]
    pub fn set_slot(&mut self, slot: Slot, value: f64) {
        if let Some(idx) = slot.get() {
            self.data[idx] = value;
        }
    }

    /// Add to a slot, skipping the write if the slot is disabled.
    #[inline]
    pub fn add_slot(&mut self, slot: Slot, value: f64) {
        if let Some(idx) = slot.get() {
            self.data[idx] += value;
        }
    }

    /// Set all slots to a constant.
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Scale all slots: self <- c * self.
    pub fn scale(&mut self, c: f64) {
        for v in &mut self.data {
            *v *= c;
        }
    }

    /// Add a scaled vector: self <- self + c * other.
    ///
    /// # Panics
    /// Panics if the slot counts differ.
    pub fn axpy(&mut self, c: f64, other: &Self) {
        assert_eq!(self.len(), other.len(), "slot count mismatch");
        for (v, o) in self.data.iter_mut().zip(&other.data) {
            *v += c * o;
        }
    }

    /// Whether every slot is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

impl std::ops::Index<usize> for PrimaryVariables {
    type Output = f64;
    #[inline]
    fn index(&self, idx: usize) -> &f64 {
        &self.data[idx]
    }
}

impl std::ops::IndexMut<usize> for PrimaryVariables {
    #[inline]
    fn index_mut(&mut self, idx: usize) -> &mut f64 {
        &mut self.data[idx]
    }
}

// =============================================================================
// Volume variables
// =============================================================================

/// Derived physical quantities at one sub-control volume.
///
/// Evaluated from the primary variables of the SCV's vertex; ephemeral,
/// recomputed per assembly pass for both the current and the previous
/// time level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeVariables {
    /// Phase pressure (Pa)
    pub pressure: f64,
    /// Mass density (kg/m³)
    pub density: f64,
    /// Dynamic viscosity (Pa·s)
    pub viscosity: f64,
    /// Porosity of the medium (-)
    pub porosity: f64,
    /// Temperature (K)
    pub temperature: f64,
}

// =============================================================================
// Flux variables
// =============================================================================

/// Derived quantities at one sub-control-volume face.
///
/// Ephemeral; built per face evaluation from the element geometry and
/// the current volume variables.
#[derive(Clone, Copy, Debug)]
pub struct FluxVariables {
    /// SCV on the side the face normal points away from
    pub inside: ScvIndex,
    /// SCV on the side the face normal points towards
    pub outside: ScvIndex,
    /// Area-weighted face normal, oriented inside -> outside
    pub normal: [f64; 2],
    /// Intrinsic permeability tensor (m²)
    pub permeability: [[f64; 2]; 2],
    /// Pressure (potential) gradient at the face integration point (Pa/m)
    pub potential_grad: [f64; 2],
}

impl FluxVariables {
    /// The flow-driving quantity −(K ∇p) · n.
    ///
    /// Positive values drive flow from the inside SCV to the outside SCV.
    #[inline]
    pub fn driving_force(&self) -> f64 {
        let kx = self.permeability[0][0] * self.potential_grad[0]
            + self.permeability[0][1] * self.potential_grad[1];
        let ky = self.permeability[1][0] * self.potential_grad[0]
            + self.permeability[1][1] * self.potential_grad[1];
        -(kx * self.normal[0] + ky * self.normal[1])
    }

    /// Upstream SCV for the given driving force.
    #[inline]
    pub fn upstream(&self, driving_force: f64) -> ScvIndex {
        if driving_force >= 0.0 {
            self.inside
        } else {
            self.outside
        }
    }

    /// Downstream SCV for the given driving force.
    #[inline]
    pub fn downstream(&self, driving_force: f64) -> ScvIndex {
        if driving_force >= 0.0 {
            self.outside
        } else {
            self.inside
        }
    }
}

// =============================================================================
// Fluid properties
// =============================================================================

/// Slightly compressible liquid: ϱ(p) = ϱ_ref · (1 + c_f · (p − p_ref)).
///
/// Consumed as a pure function of state; richer material laws
/// (relative permeability, capillary pressure) live outside this crate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FluidProperties {
    /// Reference density at `ref_pressure` (kg/m³)
    pub ref_density: f64,
    /// Reference pressure (Pa)
    pub ref_pressure: f64,
    /// Isothermal compressibility (1/Pa); zero for an incompressible fluid
    pub compressibility: f64,
    /// Dynamic viscosity (Pa·s)
    pub viscosity: f64,
}

impl FluidProperties {
    /// Density at the given pressure.
    #[inline]
    pub fn density(&self, pressure: f64) -> f64 {
        self.ref_density * (1.0 + self.compressibility * (pressure - self.ref_pressure))
    }

    /// Incompressible water at standard conditions.
    pub fn water() -> Self {
        Self {
            ref_density: 1000.0,
            ref_pressure: 1.0e5,
            compressibility: 0.0,
            viscosity: 1.0e-3,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
