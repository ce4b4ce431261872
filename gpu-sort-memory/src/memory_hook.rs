//! Per-thread registry of memory hooks.
//!
//! Hooks observe three kinds of events:
//!
//! * **alloc**: a backend allocates a buffer (device memory for CUDA, a host
//!   vector for the CPU backend).
//! * **malloc**: the dispatch layer requests a caller-side buffer (scratch or
//!   permutation) from a backend. A malloc usually wraps an alloc.
//! * **free**: a transient buffer is explicitly released.
//!
//! Every event has a `*_preprocess` and `*_postprocess` callback. Callbacks run
//! in registration order on the thread that performs the allocation.
//!
//! ```text
//! malloc_preprocess(all hooks)
//!     alloc_preprocess(all hooks)
//!     backend allocation
//!     alloc_postprocess(all hooks)
//! malloc_postprocess(all hooks)
//! ```

use anyhow::{bail, Result};
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Describes one buffer event seen by a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryEvent {
    /// Backend that owns the buffer (`"cpu"`, `"cuda"`).
    pub backend: &'static str,
    /// Device ordinal; always 0 for the CPU backend.
    pub device_id: usize,
    /// Element type name (`"f32"`, `"usize"`, ...).
    pub dtype: &'static str,
    /// Number of elements.
    pub elements: usize,
    /// Size in bytes.
    pub bytes: usize,
}

impl MemoryEvent {
    pub fn new(
        backend: &'static str,
        device_id: usize,
        dtype: &'static str,
        elements: usize,
        elem_size: usize,
    ) -> Self {
        Self {
            backend,
            device_id,
            dtype,
            elements,
            bytes: elements.saturating_mul(elem_size),
        }
    }
}

impl fmt::Display for MemoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {}x{} ({} bytes)",
            self.backend, self.device_id, self.elements, self.dtype, self.bytes
        )
    }
}

/// Callback object invoked around buffer allocations and releases.
///
/// All callbacks default to no-ops; implement only the ones you need. Hooks are
/// shared through `Arc`, so any state must use interior mutability.
pub trait MemoryHook: Send + Sync {
    /// Registry key. Two hooks with the same name cannot be installed at once
    /// on one thread.
    fn name(&self) -> &str;

    fn alloc_preprocess(&self, _event: &MemoryEvent) {}
    fn alloc_postprocess(&self, _event: &MemoryEvent) {}
    fn malloc_preprocess(&self, _event: &MemoryEvent) {}
    fn malloc_postprocess(&self, _event: &MemoryEvent) {}
    fn free_preprocess(&self, _event: &MemoryEvent) {}
    fn free_postprocess(&self, _event: &MemoryEvent) {}
}

thread_local! {
    static HOOKS: RefCell<Vec<Arc<dyn MemoryHook>>> = const { RefCell::new(Vec::new()) };
}

/// Keeps a hook registered until dropped.
///
/// The registry is per thread, so the guard must be dropped on the thread that
/// installed the hook:
///
/// ```
/// use gpu_sort_memory::{install, installed_hooks, AllocationStatsHook};
/// use std::sync::Arc;
///
/// let guard = install(Arc::new(AllocationStatsHook::new())).unwrap();
/// drop(guard);
/// assert!(installed_hooks().is_empty());
/// ```
///
/// It cannot be sent to another thread:
///
/// ```compile_fail
/// use gpu_sort_memory::{install, AllocationStatsHook};
/// use std::sync::Arc;
///
/// let guard = install(Arc::new(AllocationStatsHook::new())).unwrap();
/// std::thread::spawn(move || drop(guard));
/// ```
#[must_use = "the hook is unregistered as soon as the guard is dropped"]
pub struct HookGuard {
    name: String,
    _not_send: PhantomData<*const ()>,
}

impl HookGuard {
    /// Name of the registered hook.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        HOOKS.with(|hooks| {
            hooks.borrow_mut().retain(|h| h.name() != self.name);
        });
        debug!("memory hook '{}' uninstalled", self.name);
    }
}

/// Register `hook` on the current thread.
///
/// Fails if a hook with the same name is already registered.
pub fn install(hook: Arc<dyn MemoryHook>) -> Result<HookGuard> {
    let name = hook.name().to_owned();
    HOOKS.with(|hooks| {
        let mut hooks = hooks.borrow_mut();
        if hooks.iter().any(|h| h.name() == name) {
            bail!("memory hook '{}' is already installed", name);
        }
        hooks.push(hook);
        Ok(())
    })?;
    debug!("memory hook '{}' installed", name);
    Ok(HookGuard {
        name,
        _not_send: PhantomData,
    })
}

/// Names of the hooks registered on the current thread, in call order.
pub fn installed_hooks() -> Vec<String> {
    HOOKS.with(|hooks| hooks.borrow().iter().map(|h| h.name().to_owned()).collect())
}

/// Copy the registered hooks so callbacks may install or drop hooks themselves
/// without re-entering the registry borrow.
fn snapshot() -> Vec<Arc<dyn MemoryHook>> {
    HOOKS.with(|hooks| hooks.borrow().clone())
}

fn run_hooked<R>(
    event: &MemoryEvent,
    pre: fn(&dyn MemoryHook, &MemoryEvent),
    post: fn(&dyn MemoryHook, &MemoryEvent),
    f: impl FnOnce() -> R,
) -> R {
    let hooks = snapshot();
    if hooks.is_empty() {
        return f();
    }
    for hook in &hooks {
        pre(hook.as_ref(), event);
    }
    let out = f();
    for hook in &hooks {
        post(hook.as_ref(), event);
    }
    out
}

/// Run a backend allocation between the `alloc` callbacks.
pub fn with_alloc_hooks<R>(event: &MemoryEvent, f: impl FnOnce() -> R) -> R {
    run_hooked(
        event,
        |h, e| h.alloc_preprocess(e),
        |h, e| h.alloc_postprocess(e),
        f,
    )
}

/// Run a dispatch-layer buffer request between the `malloc` callbacks.
pub fn with_malloc_hooks<R>(event: &MemoryEvent, f: impl FnOnce() -> R) -> R {
    run_hooked(
        event,
        |h, e| h.malloc_preprocess(e),
        |h, e| h.malloc_postprocess(e),
        f,
    )
}

/// Run a buffer release between the `free` callbacks.
pub fn with_free_hooks<R>(event: &MemoryEvent, f: impl FnOnce() -> R) -> R {
    run_hooked(
        event,
        |h, e| h.free_preprocess(e),
        |h, e| h.free_postprocess(e),
        f,
    )
}
