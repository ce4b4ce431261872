//! GPU stable sort-by-key kernel wrapper.
//!
//! Bottom-up merge sort: `ceil(log2(n))` launches of `merge_pass`, each one
//! doubling the sorted run width, ping-ponging between the caller's buffers and
//! a caller-supplied temporary pair. All launches go to the device's default stream so each
//! pass sees the previous pass's output.

use anyhow::{anyhow, bail, Context, Result};
use cudarc::driver::{
    CudaDevice, CudaFunction, CudaSlice, DeviceRepr, DeviceSlice, LaunchAsync, LaunchConfig,
    ValidAsZeroBits,
};
use cudarc::nvrtc::compile_ptx;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::codegen::{CudaType, KernelCodegen, INDEX_KERNELS, INDEX_MODULE, PAIR_KERNELS};

// Index buffers are `unsigned long long` on the device.
const _: () = assert!(std::mem::size_of::<usize>() == 8);

/// Default threads per block.
pub const DEFAULT_BLOCK_SIZE: u32 = 512;

/// Element types that can live in a device buffer and be sorted or carried.
pub trait KernelElement: CudaType + DeviceRepr + ValidAsZeroBits + Unpin {}

impl<T: CudaType + DeviceRepr + ValidAsZeroBits + Unpin> KernelElement for T {}

pub struct SortKernel {
    device: Arc<CudaDevice>,
    codegen: KernelCodegen,
    block_size: u32,
    loaded: Mutex<HashSet<String>>,
}

impl SortKernel {
    pub fn new(device: Arc<CudaDevice>, block_size: u32) -> Result<Self> {
        info!("SortKernel: initialised (block size {})", block_size);
        Ok(Self {
            device,
            codegen: KernelCodegen::new(),
            block_size: block_size.max(1),
            loaded: Mutex::new(HashSet::new()),
        })
    }

    /// Compute an appropriate `(grid, block)` for `n` elements.
    pub fn compute_launch_params(n: u64, block: u32) -> (u32, u32) {
        let block = block.max(1);
        let grid = n.div_ceil(block as u64).min(u32::MAX as u64) as u32;
        (grid.max(1), block)
    }

    fn launch_cfg(&self, n: usize) -> LaunchConfig {
        let (grid, block) = Self::compute_launch_params(n as u64, self.block_size);
        LaunchConfig {
            grid_dim: (grid, 1, 1),
            block_dim: (block, 1, 1),
            shared_mem_bytes: 0,
        }
    }

    fn ensure_module(
        &self,
        module: &str,
        kernels: &[&'static str],
        source: impl FnOnce() -> Result<String>,
    ) -> Result<()> {
        let mut loaded = self.loaded.lock();
        if loaded.contains(module) {
            return Ok(());
        }
        debug!("SortKernel: compiling module {}", module);
        let ptx = compile_ptx(source()?)
            .with_context(|| format!("NVRTC compilation of module '{}' failed", module))?;
        self.device
            .load_ptx(ptx, module, kernels)
            .with_context(|| format!("Failed to load module '{}'", module))?;
        loaded.insert(module.to_string());
        Ok(())
    }

    fn func(&self, module: &str, name: &str) -> Result<CudaFunction> {
        self.device
            .get_func(module, name)
            .ok_or_else(|| anyhow!("CUDA kernel '{}::{}' not found", module, name))
    }

    fn pair_module<K: CudaType, V: CudaType>(&self) -> Result<String> {
        let module = self.codegen.pair_module_name(K::ELEM, V::ELEM);
        self.ensure_module(&module, PAIR_KERNELS, || {
            self.codegen.emit_pair_source(K::ELEM, V::ELEM)
        })?;
        Ok(module)
    }

    fn index_module(&self) -> Result<()> {
        self.ensure_module(INDEX_MODULE, INDEX_KERNELS, || {
            Ok(self.codegen.emit_index_source())
        })
    }

    /// `out[i] = i`.
    pub fn iota(&self, out: &mut CudaSlice<usize>) -> Result<()> {
        let n = out.len();
        if n == 0 {
            return Ok(());
        }
        self.index_module()?;
        let func = self.func(INDEX_MODULE, "iota")?;
        let launched = unsafe { func.launch(self.launch_cfg(n), (&mut *out, n as u64)) };
        launched.context("Launching iota")?;
        Ok(())
    }

    /// `out[i] = i / row_length`.
    pub fn segment_ids(&self, out: &mut CudaSlice<usize>, row_length: usize) -> Result<()> {
        let n = out.len();
        if n == 0 {
            return Ok(());
        }
        self.index_module()?;
        let func = self.func(INDEX_MODULE, "segment_ids")?;
        let launched = unsafe {
            func.launch(
                self.launch_cfg(n),
                (&mut *out, n as u64, row_length.max(1) as u64),
            )
        };
        launched.context("Launching segment_ids")?;
        Ok(())
    }

    /// `out[j] = src[offset + indices[j]]`.
    ///
    /// Indices past the end of `src` are skipped and the smallest offending
    /// position is written to `fault[0]`, which must hold `usize::MAX` on
    /// entry.
    pub fn gather<T: KernelElement>(
        &self,
        src: &CudaSlice<T>,
        offset: usize,
        indices: &CudaSlice<usize>,
        out: &mut CudaSlice<T>,
        fault: &mut CudaSlice<usize>,
    ) -> Result<()> {
        let n = out.len().min(indices.len());
        if n == 0 {
            return Ok(());
        }
        if fault.len() == 0 {
            bail!("gather: empty fault buffer");
        }
        let module = self.pair_module::<T, usize>()?;
        let func = self.func(&module, "gather")?;
        let launched = unsafe {
            func.launch(
                self.launch_cfg(n),
                (
                    src,
                    src.len() as u64,
                    offset as u64,
                    indices,
                    &mut *out,
                    n as u64,
                    &mut *fault,
                ),
            )
        };
        launched.with_context(|| format!("Launching gather for {}", T::ELEM.suffix))?;
        Ok(())
    }

    /// Stable ascending sort of `keys`, permuting `values` in lock-step.
    ///
    /// `tmp_keys` and `tmp_vals` are the merge ping-pong buffers and must be
    /// at least as long as `keys`.
    pub fn sort_by_key<K: KernelElement, V: KernelElement>(
        &self,
        keys: &mut CudaSlice<K>,
        values: &mut CudaSlice<V>,
        tmp_keys: &mut CudaSlice<K>,
        tmp_vals: &mut CudaSlice<V>,
    ) -> Result<()> {
        let n = keys.len();
        if values.len() != n {
            bail!("sort_by_key: {} keys but {} values", n, values.len());
        }
        if n <= 1 {
            return Ok(());
        }
        if tmp_keys.len() < n || tmp_vals.len() < n {
            bail!(
                "sort_by_key: merge buffers of {}/{} elements for {} keys",
                tmp_keys.len(),
                tmp_vals.len(),
                n
            );
        }

        let module = self.pair_module::<K, V>()?;
        let merge = self.func(&module, "merge_pass")?;
        let cfg = self.launch_cfg(n);
        debug!(
            "SortKernel::sort_by_key n={} key={} value={}",
            n,
            K::ELEM.suffix,
            V::ELEM.suffix
        );

        // true while the latest sorted runs live in the caller's buffers
        let mut in_caller = true;
        let mut width = 1usize;
        while width < n {
            let params_width = width as u64;
            let launched = if in_caller {
                unsafe {
                    merge.clone().launch(
                        cfg,
                        (&*keys, &*values, &mut *tmp_keys, &mut *tmp_vals, n as u64, params_width),
                    )
                }
            } else {
                unsafe {
                    merge.clone().launch(
                        cfg,
                        (&*tmp_keys, &*tmp_vals, &mut *keys, &mut *values, n as u64, params_width),
                    )
                }
            };
            launched.with_context(|| format!("Launching merge pass (width {})", width))?;
            in_caller = !in_caller;
            width = width.saturating_mul(2);
        }

        if !in_caller {
            let sorted_keys = tmp_keys.slice(0..n);
            let sorted_vals = tmp_vals.slice(0..n);
            self.device
                .dtod_copy(&sorted_keys, keys)
                .context("Copying sorted keys back")?;
            self.device
                .dtod_copy(&sorted_vals, values)
                .context("Copying sorted values back")?;
        }
        Ok(())
    }

    /// Block until every launch issued so far has completed.
    pub fn synchronize(&self) -> Result<()> {
        self.device.synchronize().context("CUDA synchronize failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_params() {
        let (g, b) = SortKernel::compute_launch_params(1_000_000, DEFAULT_BLOCK_SIZE);
        assert_eq!(b, 512);
        assert_eq!(g, 1954);
    }

    #[test]
    fn launch_params_never_zero() {
        assert_eq!(SortKernel::compute_launch_params(0, 256), (1, 256));
        assert_eq!(SortKernel::compute_launch_params(10, 0), (10, 1));
    }

    #[test]
    #[ignore = "requires a CUDA device"]
    fn sorts_on_device() {
        let device = CudaDevice::new(0).unwrap();
        let kernel = SortKernel::new(device.clone(), 128).unwrap();
        let mut keys = device.htod_sync_copy(&[3.0f32, f32::NAN, 1.0, 3.0, -2.0]).unwrap();
        let mut vals = device.htod_sync_copy(&[0usize, 1, 2, 3, 4]).unwrap();
        let mut tmp_keys = device.alloc_zeros::<f32>(5).unwrap();
        let mut tmp_vals = device.alloc_zeros::<usize>(5).unwrap();
        kernel
            .sort_by_key(&mut keys, &mut vals, &mut tmp_keys, &mut tmp_vals)
            .unwrap();
        kernel.synchronize().unwrap();
        let vals = device.dtoh_sync_copy(&vals).unwrap();
        assert_eq!(vals, vec![4, 2, 0, 3, 1]);
    }

    #[test]
    #[ignore = "requires a CUDA device"]
    fn gather_flags_out_of_range_index() {
        let device = CudaDevice::new(0).unwrap();
        let kernel = SortKernel::new(device.clone(), 128).unwrap();
        let src = device.htod_sync_copy(&[10i32, 20, 30]).unwrap();
        let indices = device.htod_sync_copy(&[2usize, 7, 0]).unwrap();
        let mut out = device.alloc_zeros::<i32>(3).unwrap();
        let mut fault = device.htod_sync_copy(&[usize::MAX]).unwrap();
        kernel.gather(&src, 0, &indices, &mut out, &mut fault).unwrap();
        assert_eq!(device.dtoh_sync_copy(&fault).unwrap(), vec![7]);
        assert_eq!(device.dtoh_sync_copy(&out).unwrap(), vec![30, 0, 10]);
    }
}
