//! The stable sort primitive and the buffer operations the three entry points
//! are composed from.
//!
//! Backends own the notion of a buffer ([`SortBackend::Buffer`]): a host
//! `Vec<T>` for [`CpuBackend`], a `CudaSlice<T>` for `CudaBackend`. The
//! algorithms in [`crate::batched`], [`crate::lexsort`] and [`crate::argsort`]
//! only ever talk to this trait.

use anyhow::Result;
use gpu_sort_kernels::CudaType;
use gpu_sort_memory::MemoryEvent;

use crate::element::{DeviceElement, SortKey};

pub mod cpu;
#[cfg(feature = "cuda")]
pub mod cuda;

pub use cpu::CpuBackend;
#[cfg(feature = "cuda")]
pub use cuda::CudaBackend;

/// A stable, ascending sort-by-key primitive plus the handful of data-parallel
/// helpers needed around it.
///
/// Operations may be asynchronous with respect to the host but must execute
/// in issue order; [`SortBackend::synchronize`] waits for all of them.
pub trait SortBackend: Send + Sync {
    type Buffer<T: DeviceElement>: Send;

    /// Short backend name used in logs and memory events.
    fn name(&self) -> &'static str;

    /// Device ordinal reported in memory events.
    fn device_id(&self) -> usize {
        0
    }

    /// Allocate a zero-initialised buffer of `len` elements.
    fn alloc<T: DeviceElement>(&self, len: usize) -> Result<Self::Buffer<T>>;

    /// Allocate a buffer holding a copy of `host`.
    fn upload<T: DeviceElement>(&self, host: &[T]) -> Result<Self::Buffer<T>>;

    /// Copy a buffer back to the host.
    fn download<T: DeviceElement>(&self, buffer: &Self::Buffer<T>) -> Result<Vec<T>>;

    /// Allocate a copy of `buffer`.
    fn duplicate<T: DeviceElement>(&self, buffer: &Self::Buffer<T>) -> Result<Self::Buffer<T>>;

    /// Release a buffer. Dropping works too, but only `release` reports the
    /// event to memory hooks.
    fn release<T: DeviceElement>(&self, buffer: Self::Buffer<T>);

    fn len<T: DeviceElement>(&self, buffer: &Self::Buffer<T>) -> usize;

    /// `out[i] = i`.
    fn fill_identity(&self, out: &mut Self::Buffer<usize>) -> Result<()>;

    /// `out[i] = i / row_length`.
    fn fill_segment_ids(&self, out: &mut Self::Buffer<usize>, row_length: usize) -> Result<()>;

    /// `out[j] = src[offset + indices[j]]` for every `j < len(out)`.
    fn gather<T: SortKey>(
        &self,
        src: &Self::Buffer<T>,
        offset: usize,
        indices: &Self::Buffer<usize>,
        out: &mut Self::Buffer<T>,
    ) -> Result<()>;

    /// Stable ascending sort of `keys` in place.
    fn stable_sort<K: SortKey>(&self, keys: &mut Self::Buffer<K>) -> Result<()>;

    /// Stable ascending sort of `keys`, moving `values` in lock-step.
    ///
    /// Both buffers must have the same length.
    fn stable_sort_by_key<K: SortKey, V: DeviceElement>(
        &self,
        keys: &mut Self::Buffer<K>,
        values: &mut Self::Buffer<V>,
    ) -> Result<()>;

    /// Wait for every operation issued so far.
    fn synchronize(&self) -> Result<()>;
}

/// Memory event describing a buffer of `len` elements of `T` on `backend`.
pub(crate) fn memory_event<B: SortBackend, T: DeviceElement>(
    backend: &B,
    len: usize,
) -> MemoryEvent {
    MemoryEvent::new(
        backend.name(),
        backend.device_id(),
        <T as CudaType>::ELEM.suffix,
        len,
        std::mem::size_of::<T>(),
    )
}
