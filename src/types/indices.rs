//! Strongly-typed index newtypes.
//!
//! These types prevent mixing up different kinds of indices
//! (element vs vertex vs sub-control volume vs face).

use std::fmt;

/// Macro to generate index newtypes with common functionality.
macro_rules! define_index {
    (
        $(#[$meta:meta])*
        $name:ident, $display_prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Create a new index.
            #[inline]
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            /// Get the raw index value.
            #[inline]
            pub const fn get(self) -> usize {
                self.0
            }

            /// Convert to usize.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// First index (0).
            pub const ZERO: Self = Self(0);

            /// Increment index by one.
            #[inline]
            pub fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $display_prefix, self.0)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(index: usize) -> Self {
                Self(index)
            }
        }

        impl From<$name> for usize {
            #[inline]
            fn from(idx: $name) -> usize {
                idx.0
            }
        }

        // Allow using as array index
        impl<T> std::ops::Index<$name> for [T] {
            type Output = T;
            #[inline]
            fn index(&self, idx: $name) -> &T {
                &self[idx.0]
            }
        }

        impl<T> std::ops::IndexMut<$name> for [T] {
            #[inline]
            fn index_mut(&mut self, idx: $name) -> &mut T {
                &mut self[idx.0]
            }
        }

        impl<T> std::ops::Index<$name> for Vec<T> {
            type Output = T;
            #[inline]
            fn index(&self, idx: $name) -> &T {
                &self[idx.0]
            }
        }

        impl<T> std::ops::IndexMut<$name> for Vec<T> {
            #[inline]
            fn index_mut(&mut self, idx: $name) -> &mut T {
                &mut self[idx.0]
            }
        }
    };
}

define_index!(
    /// Element index in a mesh.
    ///
    /// Identifies one leaf element of the grid collaborator.
    ///
    /// # Example
    ///
    /// ```
    /// use boxflow::types::ElementIndex;
    ///
    /// let elem = ElementIndex::new(42);
    /// assert_eq!(elem.get(), 42);
    /// ```
    ElementIndex,
    "E"
);

define_index!(
    /// Global vertex index in a mesh.
    ///
    /// Primary variables and global defect entries are stored per vertex.
    ///
    /// # Example
    ///
    /// ```
    /// use boxflow::types::VertexIndex;
    ///
    /// let vertex = VertexIndex::new(7);
    /// assert_eq!(vertex.get(), 7);
    /// ```
    VertexIndex,
    "V"
);

define_index!(
    /// Sub-control-volume index, local to an element.
    ///
    /// In the box scheme each element vertex owns one sub-control volume,
    /// so SCV indices coincide with local vertex indices.
    ScvIndex,
    "S"
);

define_index!(
    /// Sub-control-volume face index, local to an element.
    ///
    /// SCV faces separate two sub-control volumes inside one element and
    /// carry the flux contributions of the local residual.
    ScvFaceIndex,
    "F"
);

// =============================================================================
// Iterator support
// =============================================================================

impl ElementIndex {
    /// Create an iterator over [0, n) element indices.
    ///
    /// # Example
    ///
    /// ```
    /// use boxflow::types::ElementIndex;
    ///
    /// let indices: Vec<_> = ElementIndex::iter(5).collect();
    /// assert_eq!(indices.len(), 5);
    /// assert_eq!(indices[4].get(), 4);
    /// ```
    pub fn iter(n: usize) -> impl Iterator<Item = ElementIndex> + ExactSizeIterator {
        (0..n).map(ElementIndex)
    }
}

impl VertexIndex {
    /// Create an iterator over [0, n) vertex indices.
    pub fn iter(n: usize) -> impl Iterator<Item = VertexIndex> + ExactSizeIterator {
        (0..n).map(VertexIndex)
    }
}

impl ScvIndex {
    /// Create an iterator over [0, n) SCV indices.
    pub fn iter(n: usize) -> impl Iterator<Item = ScvIndex> + ExactSizeIterator {
        (0..n).map(ScvIndex)
    }
}

impl ScvFaceIndex {
    /// Create an iterator over [0, n) SCV face indices.
    pub fn iter(n: usize) -> impl Iterator<Item = ScvFaceIndex> + ExactSizeIterator {
        (0..n).map(ScvFaceIndex)
    }
}

// =============================================================================
// Tests
// =============================================================================
