//! Batched sort of the last axis.
//!
//! Every row is sorted independently with two stable passes over the whole
//! buffer. The first sorts all values globally, carrying their row ids. The
//! second sorts the row ids, carrying the values; because it is stable the
//! values inside each row keep the ascending order from the first pass.

use anyhow::Result;
use tracing::debug;

use crate::backend::SortBackend;
use crate::element::SortKey;
use crate::segment::{synthesize_segment_keys, SegmentLayout};

/// Sort every row of `data` (row-major, `shape`) in place.
///
/// `scratch` must hold as many elements as `data` when `shape` has more than
/// one axis; its contents are overwritten. For one-dimensional input it is
/// never touched.
pub fn sort<B: SortBackend, T: SortKey>(
    backend: &B,
    data: &mut B::Buffer<T>,
    scratch: &mut B::Buffer<usize>,
    shape: &[usize],
) -> Result<()> {
    let layout = SegmentLayout::from_shape(shape, backend.len(data))?;
    if layout.is_empty() {
        return Ok(());
    }

    if layout.is_single_segment() {
        debug!("sort: single segment of {} on {}", layout.size, backend.name());
        backend.stable_sort(data)?;
        return backend.synchronize();
    }

    synthesize_segment_keys(backend, scratch, &layout)?;
    debug!(
        "sort: {} segments of {} on {}",
        layout.rows,
        layout.row_length,
        backend.name()
    );
    backend.stable_sort_by_key(data, scratch)?;
    backend.stable_sort_by_key(scratch, data)?;
    backend.synchronize()
}
