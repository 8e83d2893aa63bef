//! Problem collaborator interface.
//!
//! A [`Problem`] supplies everything that is specific to one simulation
//! setup: initial conditions, boundary condition types and values,
//! source/sink terms and the material parameters of the medium. The
//! core routes every such query through this trait so that assembly
//! code has one uniform interface.

use crate::model::PrimaryVariables;
use crate::types::{ElementIndex, VertexIndex};

/// Boundary condition type at a vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryCondition {
    /// Prescribed primary-variable values; overwritten before each solve.
    Dirichlet,
    /// Prescribed flux; expressed through the residual machinery.
    Neumann,
    /// Free outflow; nothing prescribed, zero-flux closure.
    Outflow,
}

/// User-supplied physics and boundary model.
///
/// Implementations must be thread-safe (`Send + Sync`) so that
/// per-element residual evaluation can run on a worker pool.
pub trait Problem: Send + Sync {
    /// Initial primary variables at a vertex.
    ///
    /// Called once per vertex with the context of the first element that
    /// visits it; `world` and `local` are the vertex position in world
    /// and reference-element coordinates.
    fn initial(
        &self,
        vertex: VertexIndex,
        element: ElementIndex,
        world: [f64; 2],
        local: [f64; 2],
    ) -> PrimaryVariables;

    /// Boundary condition type at a boundary vertex.
    fn boundary_condition(
        &self,
        vertex: VertexIndex,
        element: ElementIndex,
        world: [f64; 2],
    ) -> BoundaryCondition;

    /// Dirichlet values at a boundary vertex.
    ///
    /// Only consulted where [`boundary_condition`](Self::boundary_condition)
    /// returned [`BoundaryCondition::Dirichlet`].
    fn dirichlet(
        &self,
        vertex: VertexIndex,
        element: ElementIndex,
        world: [f64; 2],
    ) -> PrimaryVariables;

    /// Source/sink term at a vertex (per unit volume, positive = source).
    fn source(&self, vertex: VertexIndex, element: ElementIndex) -> PrimaryVariables;

    /// Intrinsic permeability tensor of the element (m²).
    fn permeability(&self, element: ElementIndex) -> [[f64; 2]; 2];

    /// Porosity of the element (-).
    fn porosity(&self, element: ElementIndex) -> f64;

    /// Ambient temperature (K).
    fn temperature(&self) -> f64 {
        293.15
    }
}
