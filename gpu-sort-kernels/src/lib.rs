//! CUDA kernels behind the engine's stable sort primitive.
//!
//! [`codegen`] is always available and emits the CUDA C source; the launch
//! wrappers in [`sort_kernel`] need the `cuda` feature.

pub mod codegen;
#[cfg(feature = "cuda")]
pub mod sort_kernel;

pub use codegen::{CudaType, ElemType, KernelCodegen};
#[cfg(feature = "cuda")]
pub use sort_kernel::{KernelElement, SortKernel, DEFAULT_BLOCK_SIZE};
