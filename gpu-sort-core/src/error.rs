//! Precondition errors raised before any buffer is touched.
//!
//! Entry points return `anyhow::Result`; callers that need to branch on the
//! failure kind can `downcast_ref::<SortError>()`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SortError {
    #[error("shape must have at least one dimension")]
    EmptyShape,

    #[error("shape {shape:?} describes {expected} elements but the buffer holds {actual}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("shape {0:?} overflows the addressable element count")]
    ShapeOverflow(Vec<usize>),

    #[error("{what} holds {actual} elements, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("index {index} is out of bounds for a buffer of {len} elements")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("unsupported element type: {0}")]
    UnsupportedType(String),

    #[error("mixed element types: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("backend `{0}` is not available in this build")]
    BackendUnavailable(&'static str),
}
