//! Batched sort, lexsort and argsort over device-resident numeric arrays.
//!
//! The workspace is split by concern:
//!
//! * [`gpu_sort_core`]: the three entry points, the `SortBackend` abstraction
//!   with its CPU (rayon) and CUDA implementations, and the `SortEngine`
//!   dispatch layer. Re-exported at the crate root.
//! * [`memory`]: hooks that observe buffer allocations and releases.
//! * [`kernels`]: CUDA source generation and, with the `cuda` feature, the
//!   NVRTC-compiled sort kernels.
//! * [`arrow`]: sorting Arrow arrays and record batches.
//!
//! ```no_run
//! use gpu_sort_engine::{EngineConfig, SortArray, SortEngine};
//!
//! # fn main() -> anyhow::Result<()> {
//! let engine = SortEngine::new(EngineConfig::default())?;
//! let mut rows = SortArray::Int32(vec![3, 1, 2, 9, 7, 8]);
//! engine.sort_array(&mut rows, &[2, 3])?;
//! assert_eq!(rows, SortArray::Int32(vec![1, 2, 3, 7, 8, 9]));
//! # Ok(())
//! # }
//! ```

pub use gpu_sort_core::*;

pub use arrow_interop as arrow;
pub use gpu_sort_kernels as kernels;
pub use gpu_sort_memory as memory;
