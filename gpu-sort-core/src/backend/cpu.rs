//! Host implementation of the sort primitive.
//!
//! Buffers are plain vectors. Sorting uses rayon's parallel stable merge sort
//! above `parallel_threshold` elements and the standard library's stable sort
//! below it. A dedicated thread pool can be requested; otherwise rayon's global
//! pool is used.

use std::cmp::Ordering;

use anyhow::{bail, Context, Result};
use gpu_sort_memory::{with_alloc_hooks, with_free_hooks};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use super::{memory_event, SortBackend};
use crate::element::{DeviceElement, SortKey};
use crate::error::SortError;

/// Length below which the CPU backend stays on the calling thread.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

pub struct CpuBackend {
    pool: Option<ThreadPool>,
    parallel_threshold: usize,
}

impl CpuBackend {
    /// Build a backend, optionally with its own pool of `threads` workers.
    pub fn new(threads: Option<usize>, parallel_threshold: usize) -> Result<Self> {
        let pool = match threads {
            Some(n) => Some(
                ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("gpu-sort-cpu-{}", i))
                    .build()
                    .context("Failed to build CPU sort thread pool")?,
            ),
            None => None,
        };
        info!(
            "CpuBackend: initialised (threads: {}, parallel threshold: {})",
            threads.map_or_else(|| "global pool".to_string(), |n| n.to_string()),
            parallel_threshold
        );
        Ok(Self {
            pool,
            parallel_threshold,
        })
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn is_parallel(&self, len: usize) -> bool {
        len >= self.parallel_threshold
    }

    fn sort_slice<E, F>(&self, items: &mut [E], cmp: F)
    where
        E: Send,
        F: Fn(&E, &E) -> Ordering + Sync + Send,
    {
        if self.is_parallel(items.len()) {
            self.install(|| items.par_sort_by(cmp));
        } else {
            items.sort_by(cmp);
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self {
            pool: None,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl SortBackend for CpuBackend {
    type Buffer<T: DeviceElement> = Vec<T>;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn alloc<T: DeviceElement>(&self, len: usize) -> Result<Self::Buffer<T>> {
        let event = memory_event::<Self, T>(self, len);
        Ok(with_alloc_hooks(&event, || vec![T::default(); len]))
    }

    fn upload<T: DeviceElement>(&self, host: &[T]) -> Result<Self::Buffer<T>> {
        let event = memory_event::<Self, T>(self, host.len());
        Ok(with_alloc_hooks(&event, || host.to_vec()))
    }

    fn download<T: DeviceElement>(&self, buffer: &Self::Buffer<T>) -> Result<Vec<T>> {
        Ok(buffer.clone())
    }

    fn duplicate<T: DeviceElement>(&self, buffer: &Self::Buffer<T>) -> Result<Self::Buffer<T>> {
        self.upload(buffer)
    }

    fn release<T: DeviceElement>(&self, buffer: Self::Buffer<T>) {
        let event = memory_event::<Self, T>(self, buffer.len());
        with_free_hooks(&event, || drop(buffer));
    }

    fn len<T: DeviceElement>(&self, buffer: &Self::Buffer<T>) -> usize {
        buffer.len()
    }

    fn fill_identity(&self, out: &mut Self::Buffer<usize>) -> Result<()> {
        if self.is_parallel(out.len()) {
            self.install(|| out.par_iter_mut().enumerate().for_each(|(i, v)| *v = i));
        } else {
            out.iter_mut().enumerate().for_each(|(i, v)| *v = i);
        }
        Ok(())
    }

    fn fill_segment_ids(&self, out: &mut Self::Buffer<usize>, row_length: usize) -> Result<()> {
        if out.is_empty() {
            return Ok(());
        }
        if row_length == 0 {
            bail!("segment ids need a positive row length");
        }
        if self.is_parallel(out.len()) {
            self.install(|| {
                out.par_iter_mut()
                    .enumerate()
                    .for_each(|(i, v)| *v = i / row_length)
            });
        } else {
            out.iter_mut()
                .enumerate()
                .for_each(|(i, v)| *v = i / row_length);
        }
        Ok(())
    }

    fn gather<T: SortKey>(
        &self,
        src: &Self::Buffer<T>,
        offset: usize,
        indices: &Self::Buffer<usize>,
        out: &mut Self::Buffer<T>,
    ) -> Result<()> {
        if indices.len() < out.len() {
            bail!(SortError::LengthMismatch {
                what: "gather indices",
                expected: out.len(),
                actual: indices.len(),
            });
        }
        let len = src.len();
        let fill = |(slot, &idx): (&mut T, &usize)| -> Result<()> {
            let at = offset.checked_add(idx).unwrap_or(usize::MAX);
            *slot = *src
                .get(at)
                .ok_or(SortError::IndexOutOfBounds { index: at, len })?;
            Ok(())
        };
        if self.is_parallel(out.len()) {
            self.install(|| out.par_iter_mut().zip(indices.par_iter()).try_for_each(fill))
        } else {
            out.iter_mut().zip(indices.iter()).try_for_each(fill)
        }
    }

    fn stable_sort<K: SortKey>(&self, keys: &mut Self::Buffer<K>) -> Result<()> {
        debug!("CpuBackend::stable_sort n={}", keys.len());
        self.sort_slice(keys.as_mut_slice(), |a, b| a.sort_cmp(b));
        Ok(())
    }

    fn stable_sort_by_key<K: SortKey, V: DeviceElement>(
        &self,
        keys: &mut Self::Buffer<K>,
        values: &mut Self::Buffer<V>,
    ) -> Result<()> {
        if keys.len() != values.len() {
            bail!(SortError::LengthMismatch {
                what: "sort payload",
                expected: keys.len(),
                actual: values.len(),
            });
        }
        debug!("CpuBackend::stable_sort_by_key n={}", keys.len());
        if keys.len() <= 1 {
            return Ok(());
        }

        let mut pairs: Vec<(K, V)> = keys.iter().copied().zip(values.iter().copied()).collect();
        self.sort_slice(&mut pairs, |a, b| a.0.sort_cmp(&b.0));
        for ((key, value), (k, v)) in keys.iter_mut().zip(values.iter_mut()).zip(pairs) {
            *key = k;
            *value = v;
        }
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        Ok(())
    }
}
