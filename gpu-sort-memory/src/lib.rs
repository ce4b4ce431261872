//! Memory hooks for the sort engine.
//!
//! The engine never pools or caches buffers; these hooks only observe the
//! allocations and releases it performs, e.g. to log them or to measure the
//! scratch footprint of a batched sort.

pub mod builtin_hooks;
pub mod memory_hook;

pub use builtin_hooks::{AllocationStats, AllocationStatsHook, TracingHook};
pub use memory_hook::{
    install, installed_hooks, with_alloc_hooks, with_free_hooks, with_malloc_hooks, HookGuard,
    MemoryEvent, MemoryHook,
};
