//! Host-side arrays tagged with their element type, and the helpers that move
//! them through a backend.
//!
//! The helpers upload, run one of the generic entry points and download the
//! result. Buffers the caller would otherwise provide (scratch and
//! permutation) are requested through the `malloc` memory hooks.

use anyhow::{bail, Result};
use gpu_sort_memory::with_malloc_hooks;
use tracing::debug;

use crate::backend::{memory_event, SortBackend};
use crate::element::{DType, DeviceElement, SortElement, SortKey};
use crate::error::SortError;
use crate::segment::SegmentLayout;
use crate::{argsort, batched, lexsort};

/// A host array of one of the supported element types.
#[derive(Debug, Clone, PartialEq)]
pub enum SortArray {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

/// Bind the vector inside a [`SortArray`] to `$v` and evaluate `$body` once per
/// element type.
macro_rules! with_sort_array {
    ($array:expr, $v:ident => $body:expr) => {
        match $array {
            $crate::dispatch::SortArray::Int8($v) => $body,
            $crate::dispatch::SortArray::Int16($v) => $body,
            $crate::dispatch::SortArray::Int32($v) => $body,
            $crate::dispatch::SortArray::Int64($v) => $body,
            $crate::dispatch::SortArray::UInt8($v) => $body,
            $crate::dispatch::SortArray::UInt16($v) => $body,
            $crate::dispatch::SortArray::UInt32($v) => $body,
            $crate::dispatch::SortArray::UInt64($v) => $body,
            $crate::dispatch::SortArray::Float32($v) => $body,
            $crate::dispatch::SortArray::Float64($v) => $body,
        }
    };
}
pub(crate) use with_sort_array;

impl SortArray {
    pub fn dtype(&self) -> DType {
        match self {
            SortArray::Int8(_) => DType::Int8,
            SortArray::Int16(_) => DType::Int16,
            SortArray::Int32(_) => DType::Int32,
            SortArray::Int64(_) => DType::Int64,
            SortArray::UInt8(_) => DType::UInt8,
            SortArray::UInt16(_) => DType::UInt16,
            SortArray::UInt32(_) => DType::UInt32,
            SortArray::UInt64(_) => DType::UInt64,
            SortArray::Float32(_) => DType::Float32,
            SortArray::Float64(_) => DType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        with_sort_array!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the elements if the array holds `T`.
    pub fn as_slice<T: SortElement>(&self) -> Option<&[T]> {
        T::from_array(self).map(Vec::as_slice)
    }

    /// Take the elements out as a `Vec<T>`.
    pub fn into_vec<T: SortElement>(mut self) -> Result<Vec<T>> {
        let found = self.dtype();
        match T::from_array_mut(&mut self) {
            Some(values) => Ok(std::mem::take(values)),
            None => bail!(SortError::TypeMismatch {
                expected: T::DTYPE.name(),
                found: found.name(),
            }),
        }
    }

    /// Reorder the elements so that `out[j] = self[perm[j]]`.
    pub fn take(&self, perm: &[usize]) -> Result<SortArray> {
        with_sort_array!(self, v => take_values(v, perm).map(SortElement::into_array))
    }
}

impl<T: SortElement> From<Vec<T>> for SortArray {
    fn from(values: Vec<T>) -> Self {
        T::into_array(values)
    }
}

fn take_values<T: Copy>(values: &[T], perm: &[usize]) -> Result<Vec<T>> {
    perm.iter()
        .map(|&i| {
            values.get(i).copied().ok_or_else(|| {
                anyhow::Error::from(SortError::IndexOutOfBounds {
                    index: i,
                    len: values.len(),
                })
            })
        })
        .collect()
}

/// Allocate a caller-side buffer, reporting it to the `malloc` hooks.
pub fn request_buffer<B: SortBackend, T: DeviceElement>(
    backend: &B,
    len: usize,
) -> Result<B::Buffer<T>> {
    let event = memory_event::<B, T>(backend, len);
    with_malloc_hooks(&event, || backend.alloc::<T>(len))
}

/// Sort every last-axis row of `values` in place.
pub fn sort_host<B: SortBackend, T: SortKey>(
    backend: &B,
    values: &mut [T],
    shape: &[usize],
) -> Result<()> {
    let layout = SegmentLayout::from_shape(shape, values.len())?;
    if layout.is_empty() {
        return Ok(());
    }

    let mut data = backend.upload(values)?;
    let result = if layout.is_single_segment() {
        // no scratch for a single row
        backend
            .stable_sort(&mut data)
            .and_then(|()| backend.synchronize())
    } else {
        request_buffer::<B, usize>(backend, layout.size).and_then(|mut scratch| {
            let result = batched::sort(backend, &mut data, &mut scratch, shape);
            backend.release(scratch);
            result
        })
    };
    let sorted = result.and_then(|()| backend.download(&data));
    backend.release(data);
    values.copy_from_slice(&sorted?);
    Ok(())
}

/// Permutation that stably sorts `values`.
pub fn argsort_host<B: SortBackend, T: SortKey>(backend: &B, values: &[T]) -> Result<Vec<usize>> {
    if values.is_empty() {
        return Ok(Vec::new());
    }
    let data = backend.upload(values)?;
    let perm = request_buffer::<B, usize>(backend, values.len()).and_then(|mut perm| {
        let host = argsort::argsort(backend, &mut perm, &data).and_then(|()| backend.download(&perm));
        backend.release(perm);
        host
    });
    backend.release(data);
    perm
}

/// Lexsort `num_keys` key arrays of `length` elements stored back to back.
pub fn lexsort_host<B: SortBackend, T: SortKey>(
    backend: &B,
    keys: &[T],
    num_keys: usize,
    length: usize,
) -> Result<Vec<usize>> {
    let needed = num_keys.checked_mul(length).unwrap_or(usize::MAX);
    if keys.len() < needed {
        bail!(SortError::LengthMismatch {
            what: "lexsort keys",
            expected: needed,
            actual: keys.len(),
        });
    }
    if length == 0 {
        return Ok(Vec::new());
    }
    if num_keys == 0 {
        return Ok((0..length).collect());
    }

    let data = backend.upload(&keys[..needed])?;
    let perm = request_buffer::<B, usize>(backend, length).and_then(|mut perm| {
        let host = lexsort::lexsort(backend, &mut perm, &data, num_keys, length)
            .and_then(|()| backend.download(&perm));
        backend.release(perm);
        host
    });
    backend.release(data);
    perm
}

/// Lexsort key arrays that may differ in element type. The last array is the
/// primary key.
pub fn lexsort_arrays_host<B: SortBackend>(backend: &B, keys: &[SortArray]) -> Result<Vec<usize>> {
    let Some(first) = keys.first() else {
        bail!("lexsort needs at least one key array to know the record count");
    };
    let length = first.len();
    for key in &keys[1..] {
        if key.len() != length {
            bail!(SortError::LengthMismatch {
                what: "lexsort key array",
                expected: length,
                actual: key.len(),
            });
        }
    }
    if length == 0 {
        return Ok(Vec::new());
    }

    debug!(
        "lexsort_arrays: {} keys x {} records on {}",
        keys.len(),
        length,
        backend.name()
    );
    let mut perm = request_buffer::<B, usize>(backend, length)?;
    let result = backend
        .fill_identity(&mut perm)
        .and_then(|()| {
            keys.iter().try_for_each(|key| {
                with_sort_array!(key, values => {
                    let buffer = backend.upload(values)?;
                    let pass = lexsort::permute_by_key(backend, &mut perm, &buffer, 0);
                    backend.release(buffer);
                    pass
                })
            })
        })
        .and_then(|()| backend.download(&perm));
    backend.release(perm);
    result
}
