use anyhow::Result;
use tracing::info;

pub mod argsort;
pub mod backend;
pub mod batched;
pub mod dispatch;
pub mod element;
pub mod error;
pub mod lexsort;
pub mod segment;

pub use argsort::argsort;
pub use backend::{CpuBackend, SortBackend};
#[cfg(feature = "cuda")]
pub use backend::CudaBackend;
pub use batched::sort;
pub use dispatch::SortArray;
pub use element::{DType, DeviceElement, SortElement, SortKey};
pub use error::SortError;
pub use lexsort::{lexsort, permute_by_key};
pub use segment::SegmentLayout;

use backend::cpu::DEFAULT_PARALLEL_THRESHOLD;
use dispatch::with_sort_array;

/// Which implementation of the stable sort primitive an engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Cpu,
    Cuda,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub backend: BackendKind,
    /// CUDA device ordinal
    pub device_ordinal: usize,
    /// Threads per block for CUDA kernels
    pub block_size: u32,
    /// Dedicated rayon pool size; `None` shares the global pool
    pub cpu_threads: Option<usize>,
    /// Inputs shorter than this are sorted on the calling thread
    pub parallel_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Cpu,
            device_ordinal: 0,
            block_size: 512,
            cpu_threads: None,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl EngineConfig {
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_device_ordinal(mut self, ordinal: usize) -> Self {
        self.device_ordinal = ordinal;
        self
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_cpu_threads(mut self, threads: usize) -> Self {
        self.cpu_threads = Some(threads);
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }
}

enum EngineBackend {
    Cpu(CpuBackend),
    #[cfg(feature = "cuda")]
    Cuda(CudaBackend),
}

macro_rules! on_backend {
    ($engine:expr, $b:ident => $body:expr) => {
        match &$engine.backend {
            EngineBackend::Cpu($b) => $body,
            #[cfg(feature = "cuda")]
            EngineBackend::Cuda($b) => $body,
        }
    };
}

/// Sorts host arrays of any supported element type on the configured backend.
pub struct SortEngine {
    backend: EngineBackend,
    config: EngineConfig,
}

impl SortEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let backend = match config.backend {
            BackendKind::Cpu => EngineBackend::Cpu(CpuBackend::new(
                config.cpu_threads,
                config.parallel_threshold,
            )?),
            #[cfg(feature = "cuda")]
            BackendKind::Cuda => EngineBackend::Cuda(CudaBackend::new(
                config.device_ordinal,
                config.block_size,
            )?),
            #[cfg(not(feature = "cuda"))]
            BackendKind::Cuda => anyhow::bail!(SortError::BackendUnavailable("cuda")),
        };
        let engine = Self { backend, config };
        info!("SortEngine: using {} backend", engine.backend_name());
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        on_backend!(self, b => b.name())
    }

    /// Sort each last-axis row of `array` (row-major, `shape`) in place.
    pub fn sort_array(&self, array: &mut SortArray, shape: &[usize]) -> Result<()> {
        on_backend!(self, b => with_sort_array!(array, values => dispatch::sort_host(b, values, shape)))
    }

    /// Permutation that stably sorts `array`.
    pub fn argsort_array(&self, array: &SortArray) -> Result<Vec<usize>> {
        on_backend!(self, b => with_sort_array!(array, values => dispatch::argsort_host(b, values)))
    }

    /// Lexsort `num_keys` key arrays of `length` elements stored back to back
    /// in `keys`. The last key array is the primary key.
    pub fn lexsort_array(&self, keys: &SortArray, num_keys: usize, length: usize) -> Result<Vec<usize>> {
        on_backend!(self, b => with_sort_array!(keys, values => {
            dispatch::lexsort_host(b, values, num_keys, length)
        }))
    }

    /// Lexsort separate key arrays, possibly of different element types. The
    /// last array is the primary key.
    ///
    /// Unlike [`lexsort()`], which returns the identity for zero keys, an empty
    /// `keys` slice is an error here: without a key array the record count is
    /// unknown.
    pub fn lexsort_arrays(&self, keys: &[SortArray]) -> Result<Vec<usize>> {
        on_backend!(self, b => dispatch::lexsort_arrays_host(b, keys))
    }
}
