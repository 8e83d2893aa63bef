//! Global assembly: element-wise residual evaluation scattered into a
//! mesh-wide defect vector.
//!
//! The assembler visits every leaf element, builds an
//! [`ElementContext`], asks the [`LocalResidual`] for storage, flux and
//! source contributions, and scatter-adds them into rows addressed by
//! global vertex id. The implicit-Euler defect of one vertex row is
//!
//! ```text
//! (storage_cur − storage_prev) · V / Δt  +  Σ face fluxes  −  source · V
//! ```
//!
//! Interior faces contribute with opposite signs to their two adjacent
//! SCVs, so interior contributions telescope and mass is conserved up to
//! the boundary treatment. A failed element evaluation aborts the pass
//! before any result becomes visible; the defect buffer is fresh per
//! call and dropped on error.

mod solution;

pub use solution::SolutionVector;

use thiserror::Error;
use tracing::debug;

use crate::grid::BoxGrid;
use crate::model::{ElementContext, LocalResidual, ResidualError, TimeLevel, VolumeVariables};
use crate::problem::{BoundaryCondition, Problem};
use crate::types::{ElementIndex, ScvFaceIndex, ScvIndex};

/// Errors during a global assembly pass.
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// A local residual evaluation failed.
    #[error("residual evaluation failed: {0}")]
    Residual(#[from] ResidualError),

    /// Solution vector shape does not match the grid and registry.
    #[error("solution vector has {got} rows, grid has {expected} vertices")]
    ShapeMismatch { got: usize, expected: usize },
}

/// Assembles the global defect for one grid / problem / model triple.
///
/// Borrows its collaborators; cheap to construct per solve.
pub struct GlobalAssembler<'a, G: BoxGrid, P: Problem> {
    grid: &'a G,
    problem: &'a P,
    residual: &'a dyn LocalResidual,
}

impl<'a, G: BoxGrid, P: Problem> GlobalAssembler<'a, G, P> {
    pub fn new(grid: &'a G, problem: &'a P, residual: &'a dyn LocalResidual) -> Self {
        Self {
            grid,
            problem,
            residual,
        }
    }

    /// Number of equations per vertex row.
    #[inline]
    pub fn num_eq(&self) -> usize {
        self.residual.registry().num_eq()
    }

    /// A zero solution vector shaped for this grid and model.
    pub fn zero_vector(&self) -> SolutionVector {
        SolutionVector::zeros(self.grid.n_vertices(), self.num_eq())
    }

    fn check_shape(&self, state: &SolutionVector) -> Result<(), AssemblyError> {
        if state.n_vertices() != self.grid.n_vertices() {
            return Err(AssemblyError::ShapeMismatch {
                got: state.n_vertices(),
                expected: self.grid.n_vertices(),
            });
        }
        Ok(())
    }

    /// Build the evaluation context for one element.
    fn element_context(
        &self,
        element: ElementIndex,
        current: &SolutionVector,
        previous: &SolutionVector,
    ) -> ElementContext<'a> {
        let n_scvs = self.grid.n_element_vertices(element);
        let porosity = self.problem.porosity(element);
        let temperature = self.problem.temperature();

        let mut vertices = Vec::with_capacity(n_scvs);
        let mut scv_volumes = Vec::with_capacity(n_scvs);
        let mut cur: Vec<VolumeVariables> = Vec::with_capacity(n_scvs);
        let mut prev: Vec<VolumeVariables> = Vec::with_capacity(n_scvs);
        for local in 0..n_scvs {
            let vertex = self.grid.vertex_index(element, local);
            vertices.push(vertex);
            scv_volumes.push(self.grid.scv_volume(element, ScvIndex::new(local)));
            cur.push(self.residual.volume_variables(
                &current.vertex_primary(vertex),
                porosity,
                temperature,
            ));
            prev.push(self.residual.volume_variables(
                &previous.vertex_primary(vertex),
                porosity,
                temperature,
            ));
        }

        let faces = (0..self.grid.n_scv_faces(element))
            .map(|f| self.grid.scv_face(element, ScvFaceIndex::new(f)))
            .collect();

        ElementContext {
            element,
            registry: self.residual.registry(),
            vertices,
            scv_volumes,
            faces,
            gradients: self.grid.shape_gradients(element),
            permeability: self.problem.permeability(element),
            cur,
            prev,
        }
    }

    /// Accumulate one element's contributions into the defect rows.
    fn accumulate_element(
        &self,
        ctx: &ElementContext<'_>,
        dt: f64,
        mut add: impl FnMut(usize, usize, f64),
    ) -> Result<(), AssemblyError> {
        let num_eq = self.num_eq();
        let inv_dt = 1.0 / dt;

        for local in 0..ctx.n_scvs() {
            let scv = ScvIndex::new(local);
            let row = ctx.vertices[scv].get();
            let volume = ctx.scv_volumes[scv];

            let storage_cur = self.residual.storage(ctx, scv, TimeLevel::Current);
            let storage_prev = self.residual.storage(ctx, scv, TimeLevel::Previous);
            let source = self.residual.source(ctx, self.problem, scv);
            for eq in 0..num_eq {
                let rate = (storage_cur[eq] - storage_prev[eq]) * volume * inv_dt;
                add(row, eq, rate - source[eq] * volume);
            }
        }

        for f in 0..ctx.faces.len() {
            let face = ScvFaceIndex::new(f);
            let flux = self.residual.flux(ctx, face)?;
            let inside_row = ctx.vertices[ctx.faces[face].inside].get();
            let outside_row = ctx.vertices[ctx.faces[face].outside].get();
            for eq in 0..num_eq {
                add(inside_row, eq, flux[eq]);
                add(outside_row, eq, -flux[eq]);
            }
        }

        Ok(())
    }

    /// Assemble the global implicit-Euler defect.
    ///
    /// Visits every element once, scatter-adding by global vertex id,
    /// then replaces Dirichlet rows with the constraint residual
    /// `current − prescribed`. Returns an error (and no partial result)
    /// if any element evaluation fails.
    pub fn assemble_defect(
        &self,
        current: &SolutionVector,
        previous: &SolutionVector,
        dt: f64,
    ) -> Result<SolutionVector, AssemblyError> {
        self.check_shape(current)?;
        self.check_shape(previous)?;

        let mut defect = self.zero_vector();
        for element in self.grid.elements() {
            let ctx = self.element_context(element, current, previous);
            self.accumulate_element(&ctx, dt, |row, eq, value| {
                *defect.entry_mut(row, eq) += value;
            })?;
        }

        self.constrain_dirichlet(&mut defect, current);
        Ok(defect)
    }

    /// Parallel defect assembly over a worker pool.
    ///
    /// Scatter-adds go through an atomic f64 accumulator since several
    /// elements share each vertex row. Bitwise identical to the serial
    /// result only up to floating-point addition order.
    #[cfg(feature = "parallel")]
    pub fn assemble_defect_parallel(
        &self,
        current: &SolutionVector,
        previous: &SolutionVector,
        dt: f64,
    ) -> Result<SolutionVector, AssemblyError> {
        use rayon::prelude::*;

        self.check_shape(current)?;
        self.check_shape(previous)?;

        let num_eq = self.num_eq();
        let accumulator = AtomicDefectBuffer::zeros(self.grid.n_vertices() * num_eq);
        let elements: Vec<ElementIndex> = self.grid.elements().collect();
        elements.par_iter().try_for_each(|&element| {
            let ctx = self.element_context(element, current, previous);
            self.accumulate_element(&ctx, dt, |row, eq, value| {
                accumulator.add(row * num_eq + eq, value);
            })
        })?;

        let mut defect = SolutionVector::from_flat(accumulator.into_vec(), num_eq);
        self.constrain_dirichlet(&mut defect, current);
        Ok(defect)
    }

    /// Overwrite each vertex row with the problem's initial values.
    ///
    /// Vertices are shared between elements; each is written exactly
    /// once, on its first visit, with the visiting element's context.
    pub fn apply_initial_conditions(&self) -> SolutionVector {
        let mut state = self.zero_vector();
        let mut visited = vec![false; self.grid.n_vertices()];

        for element in self.grid.elements() {
            for local in 0..self.grid.n_element_vertices(element) {
                let vertex = self.grid.vertex_index(element, local);
                if visited[vertex.get()] {
                    continue;
                }
                visited[vertex.get()] = true;
                let values = self.problem.initial(
                    vertex,
                    element,
                    self.grid.vertex_position(element, local),
                    self.grid.local_position(element, local),
                );
                state.set_vertex(vertex, &values);
            }
        }

        debug!(
            vertices = self.grid.n_vertices(),
            "applied initial conditions"
        );
        state
    }

    /// Overwrite Dirichlet rows of `state` with the prescribed values.
    ///
    /// Called before each nonlinear solve so that constrained vertices
    /// start (and stay) on their prescribed values.
    pub fn apply_dirichlet(&self, state: &mut SolutionVector) {
        self.visit_dirichlet(|assembler, vertex, element, world| {
            let values = assembler.problem.dirichlet(vertex, element, world);
            state.set_vertex(vertex, &values);
        });
    }

    /// Replace Dirichlet defect rows with `current − prescribed`.
    ///
    /// The constraint rows make the Jacobian's Dirichlet block the
    /// identity, so the Newton update restores the prescribed values
    /// even if an intermediate iterate drifted.
    pub fn constrain_dirichlet(&self, defect: &mut SolutionVector, current: &SolutionVector) {
        let num_eq = self.num_eq();
        self.visit_dirichlet(|assembler, vertex, element, world| {
            let prescribed = assembler.problem.dirichlet(vertex, element, world);
            for eq in 0..num_eq {
                *defect.entry_mut(vertex.get(), eq) = current.entry(vertex.get(), eq) - prescribed[eq];
            }
        });
    }

    /// Visit every boundary vertex with a Dirichlet condition once.
    fn visit_dirichlet(
        &self,
        mut visit: impl FnMut(&Self, crate::types::VertexIndex, ElementIndex, [f64; 2]),
    ) {
        let mut visited = vec![false; self.grid.n_vertices()];
        for element in self.grid.elements() {
            if !self.grid.on_boundary(element) {
                continue;
            }
            for local in 0..self.grid.n_element_vertices(element) {
                if !self.grid.boundary_vertex(element, local) {
                    continue;
                }
                let vertex = self.grid.vertex_index(element, local);
                if visited[vertex.get()] {
                    continue;
                }
                visited[vertex.get()] = true;

                let world = self.grid.vertex_position(element, local);
                if self.problem.boundary_condition(vertex, element, world)
                    == BoundaryCondition::Dirichlet
                {
                    visit(self, vertex, element, world);
                }
            }
        }
    }
}

// =============================================================================
// Atomic scatter-add buffer
// =============================================================================

/// Lock-free f64 accumulator for parallel scatter-adds.
///
/// Stores each value as its bit pattern in an `AtomicU64` and adds via a
/// compare-exchange loop; contention is light because only vertices
/// shared between concurrently processed elements collide.
#[cfg(feature = "parallel")]
struct AtomicDefectBuffer {
    bits: Vec<std::sync::atomic::AtomicU64>,
}

#[cfg(feature = "parallel")]
impl AtomicDefectBuffer {
    fn zeros(len: usize) -> Self {
        let bits = (0..len)
            .map(|_| std::sync::atomic::AtomicU64::new(0.0f64.to_bits()))
            .collect();
        Self { bits }
    }

    fn add(&self, idx: usize, value: f64) {
        use std::sync::atomic::Ordering;
        let cell = &self.bits[idx];
        let mut observed = cell.load(Ordering::Relaxed);
        loop {
            let updated = (f64::from_bits(observed) + value).to_bits();
            match cell.compare_exchange_weak(observed, updated, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => observed = actual,
            }
        }
    }

    fn into_vec(self) -> Vec<f64> {
        self.bits
            .into_iter()
            .map(|cell| f64::from_bits(cell.into_inner()))
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
