//! Row layout of a batched array and the segment-key buffer derived from it.

use anyhow::{bail, Result};
use tracing::debug;

use crate::backend::SortBackend;
use crate::error::SortError;

/// How a row-major array of `size` elements splits into independently sorted
/// rows along its last axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLayout {
    pub size: usize,
    pub row_length: usize,
    pub rows: usize,
    pub ndim: usize,
}

impl SegmentLayout {
    /// Validate `shape` against a buffer of `len` elements.
    pub fn from_shape(shape: &[usize], len: usize) -> Result<Self> {
        let Some(&row_length) = shape.last() else {
            bail!(SortError::EmptyShape);
        };
        let size = shape
            .iter()
            .try_fold(1usize, |acc, &extent| acc.checked_mul(extent))
            .ok_or_else(|| SortError::ShapeOverflow(shape.to_vec()))?;
        if size != len {
            bail!(SortError::ShapeMismatch {
                shape: shape.to_vec(),
                expected: size,
                actual: len,
            });
        }
        let rows = if row_length == 0 { 0 } else { size / row_length };
        Ok(Self {
            size,
            row_length,
            rows,
            ndim: shape.len(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// True when one plain sort covers the whole buffer.
    pub fn is_single_segment(&self) -> bool {
        self.ndim == 1 || self.row_length == self.size
    }
}

/// Write `scratch[i] = i / row_length` for every element of `layout`.
pub fn synthesize_segment_keys<B: SortBackend>(
    backend: &B,
    scratch: &mut B::Buffer<usize>,
    layout: &SegmentLayout,
) -> Result<()> {
    let available = backend.len(scratch);
    if available != layout.size {
        bail!(SortError::LengthMismatch {
            what: "segment scratch",
            expected: layout.size,
            actual: available,
        });
    }
    if layout.is_empty() {
        return Ok(());
    }
    debug!(
        "segment keys: {} rows of {} on {}",
        layout.rows,
        layout.row_length,
        backend.name()
    );
    backend.fill_segment_ids(scratch, layout.row_length)
}
