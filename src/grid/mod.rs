//! Mesh collaborator interface.
//!
//! The core never owns mesh data structures; it consumes them through
//! the [`BoxGrid`] trait, which exposes exactly the queries the box
//! scheme needs: leaf-element iteration, vertex lookup, SCV volumes,
//! SCV-face geometry, P1 shape-function gradients and boundary
//! adjacency. [`SegmentGrid`] is a small reference implementation used
//! by the tests and examples.

mod segment;

pub use segment::{GridError, SegmentGrid};

use crate::types::{ElementIndex, ScvFaceIndex, ScvIndex, VertexIndex};

/// Geometry of one sub-control-volume face inside an element.
#[derive(Clone, Copy, Debug)]
pub struct ScvFaceGeometry {
    /// SCV on the side the normal points away from
    pub inside: ScvIndex,
    /// SCV on the side the normal points towards
    pub outside: ScvIndex,
    /// Area-weighted normal, oriented inside -> outside
    pub normal: [f64; 2],
}

/// Read-only mesh queries required by the box scheme.
///
/// Implementations must be cheap to query repeatedly: the assembler
/// revisits every element once per residual evaluation, and the Newton
/// collaborator evaluates the residual many times per time step.
pub trait BoxGrid: Send + Sync {
    /// Number of leaf elements.
    fn n_elements(&self) -> usize;

    /// Number of mesh vertices.
    fn n_vertices(&self) -> usize;

    /// Number of vertices (== sub-control volumes) of one element.
    fn n_element_vertices(&self, element: ElementIndex) -> usize;

    /// Global vertex id of a local element vertex.
    fn vertex_index(&self, element: ElementIndex, local: usize) -> VertexIndex;

    /// World coordinates of a local element vertex.
    fn vertex_position(&self, element: ElementIndex, local: usize) -> [f64; 2];

    /// Reference-element coordinates of a local element vertex.
    fn local_position(&self, element: ElementIndex, local: usize) -> [f64; 2];

    /// Volume of the sub-control volume owned by a local vertex.
    fn scv_volume(&self, element: ElementIndex, scv: ScvIndex) -> f64;

    /// Number of interior SCV faces of one element.
    fn n_scv_faces(&self, element: ElementIndex) -> usize;

    /// Geometry of one interior SCV face.
    fn scv_face(&self, element: ElementIndex, face: ScvFaceIndex) -> ScvFaceGeometry;

    /// Gradients of the P1 shape functions, one per local vertex.
    ///
    /// For affine elements the gradients are constant over the element,
    /// so a single value per vertex suffices for face evaluations.
    fn shape_gradients(&self, element: ElementIndex) -> Vec<[f64; 2]>;

    /// Whether the element touches the domain boundary.
    fn on_boundary(&self, element: ElementIndex) -> bool;

    /// Whether a local element vertex lies on the domain boundary.
    fn boundary_vertex(&self, element: ElementIndex, local: usize) -> bool;

    /// Forward-only, restartable iteration over leaf elements.
    fn elements(&self) -> Box<dyn Iterator<Item = ElementIndex> + '_> {
        Box::new(ElementIndex::iter(self.n_elements()))
    }
}
