//! Multi-key permutation sort.
//!
//! Keys are applied from least to most significant: starting from the
//! identity, each pass stably re-sorts the permutation by one key array. The
//! last pass decides the final order and stability preserves the order set
//! by earlier passes among its ties, so the **last** key array is primary.

use anyhow::{bail, Result};
use tracing::debug;

use crate::backend::SortBackend;
use crate::element::SortKey;
use crate::error::SortError;

/// Compute the permutation sorting `length` records lexicographically by
/// `num_keys` key arrays stored back to back in `keys` (array `i` starts at
/// `i * length`).
///
/// `perm` must hold exactly `length` elements; its previous contents are
/// discarded. With no keys the result is the identity permutation.
pub fn lexsort<B: SortBackend, T: SortKey>(
    backend: &B,
    perm: &mut B::Buffer<usize>,
    keys: &B::Buffer<T>,
    num_keys: usize,
    length: usize,
) -> Result<()> {
    let perm_len = backend.len(perm);
    if perm_len != length {
        bail!(SortError::LengthMismatch {
            what: "permutation",
            expected: length,
            actual: perm_len,
        });
    }
    let needed = num_keys.checked_mul(length).unwrap_or(usize::MAX);
    let available = backend.len(keys);
    if available < needed {
        bail!(SortError::LengthMismatch {
            what: "lexsort keys",
            expected: needed,
            actual: available,
        });
    }
    if length == 0 {
        return Ok(());
    }

    debug!(
        "lexsort: {} keys x {} records on {}",
        num_keys,
        length,
        backend.name()
    );
    backend.fill_identity(perm)?;
    for i in 0..num_keys {
        apply_key(backend, perm, keys, i * length)?;
    }
    backend.synchronize()
}

/// Stably re-sort an existing permutation by one more key array, read from
/// `key` starting at `offset`.
///
/// This is one lexsort pass on its own, which lets callers combine key arrays
/// of different element types: start from [`SortBackend::fill_identity`] and
/// call this once per key, least significant first.
pub fn permute_by_key<B: SortBackend, T: SortKey>(
    backend: &B,
    perm: &mut B::Buffer<usize>,
    key: &B::Buffer<T>,
    offset: usize,
) -> Result<()> {
    let n = backend.len(perm);
    let needed = offset.checked_add(n).unwrap_or(usize::MAX);
    let available = backend.len(key);
    if available < needed {
        bail!(SortError::LengthMismatch {
            what: "lexsort key",
            expected: needed,
            actual: available,
        });
    }
    if n == 0 {
        return Ok(());
    }
    apply_key(backend, perm, key, offset)?;
    backend.synchronize()
}

fn apply_key<B: SortBackend, T: SortKey>(
    backend: &B,
    perm: &mut B::Buffer<usize>,
    keys: &B::Buffer<T>,
    offset: usize,
) -> Result<()> {
    let n = backend.len(perm);
    let mut gathered = backend.alloc::<T>(n)?;
    let result = match backend.gather(keys, offset, perm, &mut gathered) {
        Ok(()) => backend.stable_sort_by_key(&mut gathered, perm),
        Err(e) => Err(e),
    };
    backend.release(gathered);
    result
}
