use anyhow::{bail, Result};
use tracing::debug;

use crate::backend::SortBackend;
use crate::element::SortKey;
use crate::error::SortError;

/// Write into `perm` the stable permutation that sorts `data` ascending.
///
/// `data` is left untouched: the sort runs on a transient copy, which is
/// released before returning.
pub fn argsort<B: SortBackend, T: SortKey>(
    backend: &B,
    perm: &mut B::Buffer<usize>,
    data: &B::Buffer<T>,
) -> Result<()> {
    let n = backend.len(data);
    let perm_len = backend.len(perm);
    if perm_len != n {
        bail!(SortError::LengthMismatch {
            what: "permutation",
            expected: n,
            actual: perm_len,
        });
    }
    if n == 0 {
        return Ok(());
    }

    debug!("argsort: {} elements on {}", n, backend.name());
    backend.fill_identity(perm)?;
    let mut keys = backend.duplicate(data)?;
    let result = backend.stable_sort_by_key(&mut keys, perm);
    backend.release(keys);
    result?;
    backend.synchronize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;

    #[test]
    fn permutation_sorts_data() {
        let backend = CpuBackend::default();
        let data = vec![5i32, 3, 4];
        let mut perm = vec![0usize; 3];
        argsort(&backend, &mut perm, &data).unwrap();
        assert_eq!(perm, vec![1, 2, 0]);
        assert_eq!(data, vec![5, 3, 4]);
    }

    #[test]
    fn equal_keys_keep_index_order() {
        let backend = CpuBackend::new(Some(2), 0).unwrap();
        let data = vec![1u8, 0, 1, 0, 1];
        let mut perm = vec![0usize; 5];
        argsort(&backend, &mut perm, &data).unwrap();
        assert_eq!(perm, vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn nan_indices_come_last() {
        let backend = CpuBackend::default();
        let data = vec![f32::NAN, 2.0, f32::NAN, -1.0];
        let mut perm = vec![0usize; 4];
        argsort(&backend, &mut perm, &data).unwrap();
        assert_eq!(perm, vec![3, 1, 0, 2]);
    }

    #[test]
    fn empty_and_mismatched() {
        let backend = CpuBackend::default();
        let empty: Vec<u64> = Vec::new();
        let mut perm: Vec<usize> = Vec::new();
        argsort(&backend, &mut perm, &empty).unwrap();

        let data = vec![1u64, 2];
        let err = argsort(&backend, &mut perm, &data).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SortError>(),
            Some(SortError::LengthMismatch { expected: 2, actual: 0, .. })
        ));
    }
}
