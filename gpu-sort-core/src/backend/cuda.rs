//! CUDA implementation of the sort primitive.
//!
//! Buffers are `CudaSlice`s on one device. Every kernel is issued on the
//! device's default stream, so consecutive passes are ordered without explicit
//! synchronisation; [`SortBackend::synchronize`] blocks until they finish.

use anyhow::{bail, Context, Result};
use cudarc::driver::{CudaDevice, CudaSlice, DeviceSlice};
use gpu_sort_kernels::SortKernel;
use gpu_sort_memory::{with_alloc_hooks, with_free_hooks};
use std::sync::Arc;
use tracing::{debug, info};

use super::{memory_event, SortBackend};
use crate::element::{DeviceElement, SortKey};
use crate::error::SortError;

pub struct CudaBackend {
    device: Arc<CudaDevice>,
    kernel: SortKernel,
    ordinal: usize,
}

impl CudaBackend {
    pub fn new(ordinal: usize, block_size: u32) -> Result<Self> {
        let device = CudaDevice::new(ordinal)
            .with_context(|| format!("Failed to open CUDA device {}", ordinal))?;
        info!("CudaBackend: device {} ({})", ordinal, device.name().unwrap_or_default());
        let kernel = SortKernel::new(device.clone(), block_size)?;
        Ok(Self {
            device,
            kernel,
            ordinal,
        })
    }
}

impl SortBackend for CudaBackend {
    type Buffer<T: DeviceElement> = CudaSlice<T>;

    fn name(&self) -> &'static str {
        "cuda"
    }

    fn device_id(&self) -> usize {
        self.ordinal
    }

    fn alloc<T: DeviceElement>(&self, len: usize) -> Result<Self::Buffer<T>> {
        let event = memory_event::<Self, T>(self, len);
        with_alloc_hooks(&event, || self.device.alloc_zeros::<T>(len))
            .with_context(|| format!("Failed to allocate {}", event))
    }

    fn upload<T: DeviceElement>(&self, host: &[T]) -> Result<Self::Buffer<T>> {
        let event = memory_event::<Self, T>(self, host.len());
        with_alloc_hooks(&event, || self.device.htod_sync_copy(host))
            .with_context(|| format!("Failed to upload {}", event))
    }

    fn download<T: DeviceElement>(&self, buffer: &Self::Buffer<T>) -> Result<Vec<T>> {
        self.device
            .dtoh_sync_copy(buffer)
            .context("Failed to download buffer")
    }

    fn duplicate<T: DeviceElement>(&self, buffer: &Self::Buffer<T>) -> Result<Self::Buffer<T>> {
        let mut copy = self.alloc::<T>(buffer.len())?;
        self.device
            .dtod_copy(buffer, &mut copy)
            .context("Failed to duplicate buffer")?;
        Ok(copy)
    }

    fn release<T: DeviceElement>(&self, buffer: Self::Buffer<T>) {
        let event = memory_event::<Self, T>(self, buffer.len());
        with_free_hooks(&event, || drop(buffer));
    }

    fn len<T: DeviceElement>(&self, buffer: &Self::Buffer<T>) -> usize {
        buffer.len()
    }

    fn fill_identity(&self, out: &mut Self::Buffer<usize>) -> Result<()> {
        self.kernel.iota(out)
    }

    fn fill_segment_ids(&self, out: &mut Self::Buffer<usize>, row_length: usize) -> Result<()> {
        if out.len() > 0 && row_length == 0 {
            anyhow::bail!("segment ids need a positive row length");
        }
        self.kernel.segment_ids(out, row_length)
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
        if out.len() == 0 {
            return Ok(());
        }
        let mut fault = self.upload(&[usize::MAX])?;
        let flagged = self
            .kernel
            .gather(src, offset, indices, out, &mut fault)
            .and_then(|()| self.download(&fault));
        self.release(fault);
        match flagged?.first() {
            Some(&index) if index != usize::MAX => bail!(SortError::IndexOutOfBounds {
                index,
                len: src.len(),
            }),
            _ => Ok(()),
        }
    }

    fn stable_sort<K: SortKey>(&self, keys: &mut Self::Buffer<K>) -> Result<()> {
        debug!("CudaBackend::stable_sort n={}", keys.len());
        if keys.len() <= 1 {
            return Ok(());
        }
        // The merge kernel always carries a payload; an index payload is the
        // cheapest one to synthesise.
        let mut payload = self.alloc::<usize>(keys.len())?;
        let result = self.stable_sort_by_key(keys, &mut payload);
        self.release(payload);
        result
    }

    fn stable_sort_by_key<K: SortKey, V: DeviceElement>(
        &self,
        keys: &mut Self::Buffer<K>,
        values: &mut Self::Buffer<V>,
    ) -> Result<()> {
        let n = keys.len();
        if values.len() != n {
            bail!(SortError::LengthMismatch {
                what: "sort payload",
                expected: n,
                actual: values.len(),
            });
        }
        debug!("CudaBackend::stable_sort_by_key n={}", n);
        if n <= 1 {
            return Ok(());
        }
        let mut tmp_keys = self.alloc::<K>(n)?;
        let mut tmp_vals = match self.alloc::<V>(n) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.release(tmp_keys);
                return Err(e);
            }
        };
        let result = self
            .kernel
            .sort_by_key(keys, values, &mut tmp_keys, &mut tmp_vals);
        self.release(tmp_vals);
        self.release(tmp_keys);
        result
    }

    fn synchronize(&self) -> Result<()> {
        self.kernel.synchronize()
    }
}
