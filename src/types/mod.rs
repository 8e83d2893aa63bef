//! Common scalar and index types.

mod indices;

pub use indices::{ElementIndex, ScvFaceIndex, ScvIndex, VertexIndex};
