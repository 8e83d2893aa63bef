//! Mesh-wide solution storage.

use crate::model::PrimaryVariables;
use crate::types::VertexIndex;

/// Flat block vector: one row of `num_eq` scalars per mesh vertex.
///
/// Used for both solution states and defect vectors; the row layout is
/// the registry's dense slot layout.
#[derive(Clone, Debug, PartialEq)]
pub struct SolutionVector {
    data: Vec<f64>,
    num_eq: usize,
}

impl SolutionVector {
    /// A zero vector with `n_vertices` rows of `num_eq` entries.
    pub fn zeros(n_vertices: usize, num_eq: usize) -> Self {
        assert!(num_eq > 0, "need at least one equation per row");
        Self {
            data: vec![0.0; n_vertices * num_eq],
            num_eq,
        }
    }

    /// Wrap an existing flat buffer.
    ///
    /// # Panics
    /// Panics if the buffer length is not a multiple of `num_eq`.
    pub fn from_flat(data: Vec<f64>, num_eq: usize) -> Self {
        assert!(num_eq > 0, "need at least one equation per row");
        assert_eq!(data.len() % num_eq, 0, "buffer not divisible into rows");
        Self { data, num_eq }
    }

    /// Number of vertex rows.
    #[inline]
    pub fn n_vertices(&self) -> usize {
        self.data.len() / self.num_eq
    }

    /// Entries per row.
    #[inline]
    pub fn num_eq(&self) -> usize {
        self.num_eq
    }

    /// Total number of scalar entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the vector has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// One scalar entry.
    #[inline]
    pub fn entry(&self, row: usize, eq: usize) -> f64 {
        debug_assert!(eq < self.num_eq);
        self.data[row * self.num_eq + eq]
    }

    /// Mutable access to one scalar entry.
    #[inline]
    pub fn entry_mut(&mut self, row: usize, eq: usize) -> &mut f64 {
        debug_assert!(eq < self.num_eq);
        &mut self.data[row * self.num_eq + eq]
    }

    /// The row of one vertex.
    #[inline]
    pub fn vertex(&self, vertex: VertexIndex) -> &[f64] {
        let start = vertex.get() * self.num_eq;
        &self.data[start..start + self.num_eq]
    }

    /// The row of one vertex as owned primary variables.
    pub fn vertex_primary(&self, vertex: VertexIndex) -> PrimaryVariables {
        PrimaryVariables::from_vec(self.vertex(vertex).to_vec())
    }

    /// Overwrite the row of one vertex.
    ///
    /// # Panics
    /// Panics if the slot counts differ.
    pub fn set_vertex(&mut self, vertex: VertexIndex, values: &PrimaryVariables) {
        assert_eq!(values.len(), self.num_eq, "slot count mismatch");
        let start = vertex.get() * self.num_eq;
        self.data[start..start + self.num_eq].copy_from_slice(values.as_slice());
    }

    /// Raw flat storage.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable raw flat storage.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// self <- self + c * other.
    ///
    /// # Panics
    /// Panics if the shapes differ.
    pub fn axpy(&mut self, c: f64, other: &Self) {
        assert_eq!(self.data.len(), other.data.len(), "shape mismatch");
        assert_eq!(self.num_eq, other.num_eq, "shape mismatch");
        for (v, o) in self.data.iter_mut().zip(&other.data) {
            *v += c * o;
        }
    }

    /// Euclidean norm over all entries.
    pub fn two_norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Maximum absolute entry.
    pub fn max_norm(&self) -> f64 {
        self.data.iter().fold(0.0, |acc, v| acc.max(v.abs()))
    }

    /// Whether every entry is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

// =============================================================================
// Tests
// =============================================================================
