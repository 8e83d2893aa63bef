//! Segment grid: 1D interval elements embedded in the plane.
//!
//! Each element is an interval [x_k, x_{k+1}] with two vertices, two
//! sub-control volumes (the interval halves) and one interior SCV face
//! at the midpoint with unit-area normal pointing in +x. This is the
//! smallest geometry that exercises every assembly path, and fluxes on
//! it can be verified by hand against Darcy's law.

use thiserror::Error;

use super::{BoxGrid, ScvFaceGeometry};
use crate::types::{ElementIndex, ScvFaceIndex, ScvIndex, VertexIndex};

/// Errors when constructing a [`SegmentGrid`].
#[derive(Error, Debug)]
pub enum GridError {
    /// Fewer than two vertex coordinates supplied.
    #[error("segment grid needs at least 2 vertices, got {0}")]
    TooFewVertices(usize),

    /// Vertex coordinates not strictly increasing.
    #[error("vertex coordinates must be strictly increasing (x[{index}] = {value} <= x[{index}-1])")]
    NonMonotonic { index: usize, value: f64 },
}

/// A 1D line mesh along the x-axis (y = 0).
#[derive(Clone, Debug)]
pub struct SegmentGrid {
    coords: Vec<f64>,
}

impl SegmentGrid {
    /// Build from strictly increasing vertex coordinates.
    pub fn new(coords: Vec<f64>) -> Result<Self, GridError> {
        if coords.len() < 2 {
            return Err(GridError::TooFewVertices(coords.len()));
        }
        for i in 1..coords.len() {
            if coords[i] <= coords[i - 1] {
                return Err(GridError::NonMonotonic {
                    index: i,
                    value: coords[i],
                });
            }
        }
        Ok(Self { coords })
    }

    /// Uniform grid with `n_elements` intervals on [x0, x1].
    ///
    /// # Panics
    /// Panics if `n_elements == 0` or `x1 <= x0`.
    pub fn uniform(x0: f64, x1: f64, n_elements: usize) -> Self {
        assert!(n_elements > 0, "need at least one element");
        assert!(x1 > x0, "x1 must exceed x0");
        let dx = (x1 - x0) / n_elements as f64;
        let coords = (0..=n_elements).map(|i| x0 + i as f64 * dx).collect();
        Self { coords }
    }

    /// Length of one element.
    fn element_length(&self, element: ElementIndex) -> f64 {
        let k = element.get();
        self.coords[k + 1] - self.coords[k]
    }
}

impl BoxGrid for SegmentGrid {
    fn n_elements(&self) -> usize {
        self.coords.len() - 1
    }

    fn n_vertices(&self) -> usize {
        self.coords.len()
    }

    fn n_element_vertices(&self, _element: ElementIndex) -> usize {
        2
    }

    fn vertex_index(&self, element: ElementIndex, local: usize) -> VertexIndex {
        debug_assert!(local < 2);
        VertexIndex::new(element.get() + local)
    }

    fn vertex_position(&self, element: ElementIndex, local: usize) -> [f64; 2] {
        [self.coords[element.get() + local], 0.0]
    }

    fn local_position(&self, _element: ElementIndex, local: usize) -> [f64; 2] {
        [local as f64, 0.0]
    }

    fn scv_volume(&self, element: ElementIndex, scv: ScvIndex) -> f64 {
        debug_assert!(scv.get() < 2);
        0.5 * self.element_length(element)
    }

    fn n_scv_faces(&self, _element: ElementIndex) -> usize {
        1
    }

    fn scv_face(&self, _element: ElementIndex, face: ScvFaceIndex) -> ScvFaceGeometry {
        debug_assert_eq!(face.get(), 0);
        ScvFaceGeometry {
            inside: ScvIndex::new(0),
            outside: ScvIndex::new(1),
            normal: [1.0, 0.0],
        }
    }

    fn shape_gradients(&self, element: ElementIndex) -> Vec<[f64; 2]> {
        let inv_len = 1.0 / self.element_length(element);
        vec![[-inv_len, 0.0], [inv_len, 0.0]]
    }

    fn on_boundary(&self, element: ElementIndex) -> bool {
        element.get() == 0 || element.get() == self.n_elements() - 1
    }

    fn boundary_vertex(&self, element: ElementIndex, local: usize) -> bool {
        let vertex = self.vertex_index(element, local);
        vertex.get() == 0 || vertex.get() == self.n_vertices() - 1
    }
}

// =============================================================================
// Tests
// =============================================================================
