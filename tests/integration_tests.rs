//! Integration tests for the sort engine.
//!
//! Everything here runs on the CPU backend; the CUDA variants at the bottom
//! need the `cuda` feature and a device, and are ignored by default.

use std::sync::Arc;

use gpu_sort_engine::memory::{install, AllocationStatsHook, MemoryEvent, MemoryHook};
use gpu_sort_engine::{
    argsort, lexsort, sort, BackendKind, CpuBackend, EngineConfig, SortArray, SortBackend,
    SortEngine, SortError,
};
use parking_lot::Mutex;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn cpu() -> CpuBackend {
    CpuBackend::default()
}

fn parallel_cpu() -> CpuBackend {
    CpuBackend::new(Some(4), 0).unwrap()
}

fn is_permutation(perm: &[usize], n: usize) -> bool {
    let mut seen = vec![false; n];
    perm.len() == n
        && perm.iter().all(|&i| i < n && !std::mem::replace(&mut seen[i], true))
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_sort_two_rows() {
    let backend = cpu();
    let mut data = backend.upload(&[3i32, 1, 2, 9, 7, 8]).unwrap();
    let mut scratch = backend.alloc::<usize>(6).unwrap();
    sort(&backend, &mut data, &mut scratch, &[2, 3]).unwrap();
    assert_eq!(backend.download(&data).unwrap(), vec![1, 2, 3, 7, 8, 9]);
}

#[test]
fn test_argsort_keeps_data() {
    let backend = cpu();
    let data = backend.upload(&[5i32, 3, 4]).unwrap();
    let mut perm = backend.alloc::<usize>(3).unwrap();
    argsort(&backend, &mut perm, &data).unwrap();
    assert_eq!(perm, vec![1, 2, 0]);
    assert_eq!(data, vec![5, 3, 4]);
}

#[test]
fn test_lexsort_last_key_primary() {
    let backend = cpu();
    // A = [1, 1, 0], B = [0, 0, 0]; B is primary and all ties, A decides
    let keys = backend.upload(&[1i32, 1, 0, 0, 0, 0]).unwrap();
    let mut perm = backend.alloc::<usize>(3).unwrap();
    lexsort(&backend, &mut perm, &keys, 2, 3).unwrap();
    assert_eq!(perm, vec![2, 0, 1]);
}

// ---------------------------------------------------------------------------
// Degenerate inputs
// ---------------------------------------------------------------------------

#[test]
fn test_degenerate_inputs() {
    let backend = cpu();

    let mut one = vec![7.5f32];
    let mut scratch: Vec<usize> = Vec::new();
    sort(&backend, &mut one, &mut scratch, &[1]).unwrap();
    assert_eq!(one, vec![7.5]);

    let mut empty: Vec<f32> = Vec::new();
    sort(&backend, &mut empty, &mut scratch, &[5, 0]).unwrap();

    let mut perm = vec![3usize, 3, 3];
    let keys: Vec<u8> = Vec::new();
    lexsort(&backend, &mut perm, &keys, 0, 3).unwrap();
    assert_eq!(perm, vec![0, 1, 2]);

    let mut none: Vec<usize> = Vec::new();
    argsort(&backend, &mut none, &Vec::<i64>::new()).unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_preconditions_fail_safely() {
    let backend = cpu();
    let mut data = vec![2u32, 1];
    let mut scratch = vec![0usize; 2];

    let err = sort(&backend, &mut data, &mut scratch, &[]).unwrap_err();
    assert_eq!(err.downcast_ref::<SortError>(), Some(&SortError::EmptyShape));
    assert_eq!(data, vec![2, 1]);

    let mut perm = vec![0usize; 3];
    let err = argsort(&backend, &mut perm, &data).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SortError>(),
        Some(SortError::LengthMismatch { .. })
    ));
}

// ---------------------------------------------------------------------------
// Engine dispatch
// ---------------------------------------------------------------------------

#[test]
fn test_engine_scenarios() {
    let engine = SortEngine::new(EngineConfig::default()).unwrap();

    let mut rows = SortArray::Int32(vec![3, 1, 2, 9, 7, 8]);
    engine.sort_array(&mut rows, &[2, 3]).unwrap();
    assert_eq!(rows, SortArray::Int32(vec![1, 2, 3, 7, 8, 9]));

    let data = SortArray::Float64(vec![5.0, 3.0, 4.0]);
    assert_eq!(engine.argsort_array(&data).unwrap(), vec![1, 2, 0]);
    assert_eq!(data, SortArray::Float64(vec![5.0, 3.0, 4.0]));

    let keys = SortArray::UInt16(vec![1, 1, 0, 0, 0, 0]);
    assert_eq!(engine.lexsort_array(&keys, 2, 3).unwrap(), vec![2, 0, 1]);
}

#[test]
fn test_engine_rejects_shape_mismatch() {
    let engine = SortEngine::new(EngineConfig::default()).unwrap();
    let mut rows = SortArray::Int8(vec![1, 2, 3]);
    let err = engine.sort_array(&mut rows, &[2, 2]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SortError>(),
        Some(SortError::ShapeMismatch { expected: 4, actual: 3, .. })
    ));
}

#[cfg(not(feature = "cuda"))]
#[test]
fn test_cuda_backend_unavailable_without_feature() {
    let config = EngineConfig::default().with_backend(BackendKind::Cuda);
    let err = SortEngine::new(config).err().unwrap();
    assert_eq!(
        err.downcast_ref::<SortError>(),
        Some(&SortError::BackendUnavailable("cuda"))
    );
}

// ---------------------------------------------------------------------------
// Memory hooks
// ---------------------------------------------------------------------------

struct EventLog {
    name: String,
    events: Arc<Mutex<Vec<String>>>,
}

impl MemoryHook for EventLog {
    fn name(&self) -> &str {
        &self.name
    }

    fn malloc_preprocess(&self, event: &MemoryEvent) {
        self.events
            .lock()
            .push(format!("{} malloc {} {}", self.name, event.dtype, event.elements));
    }

    fn free_postprocess(&self, event: &MemoryEvent) {
        self.events
            .lock()
            .push(format!("{} free {} {}", self.name, event.dtype, event.elements));
    }
}

#[test]
fn test_hooks_see_scratch_and_transients() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let _first = install(Arc::new(EventLog {
        name: "first".into(),
        events: events.clone(),
    }))
    .unwrap();
    let _second = install(Arc::new(EventLog {
        name: "second".into(),
        events: events.clone(),
    }))
    .unwrap();

    let engine = SortEngine::new(EngineConfig::default()).unwrap();
    let mut rows = SortArray::Int16(vec![2, 1, 4, 3]);
    engine.sort_array(&mut rows, &[2, 2]).unwrap();

    let log = events.lock().clone();
    assert_eq!(&log[..2], &["first malloc usize 4", "second malloc usize 4"]);
    assert!(log.contains(&"first free usize 4".to_string()));
    assert!(log.contains(&"second free i16 4".to_string()));
}

#[test]
fn test_argsort_releases_its_copy() {
    let hook = Arc::new(AllocationStatsHook::new());
    let _guard = install(hook.clone()).unwrap();

    let backend = cpu();
    let data = backend.upload(&[4u64, 2, 9, 1]).unwrap();
    let mut perm = backend.alloc::<usize>(4).unwrap();
    hook.reset();
    argsort(&backend, &mut perm, &data).unwrap();

    let stats = hook.stats();
    assert_eq!(stats.allocs, 1);
    assert_eq!(stats.frees, 1);
    assert_eq!(stats.live_bytes(), 0);
}

#[test]
fn test_duplicate_hook_name_is_rejected() {
    let _guard = install(Arc::new(AllocationStatsHook::with_name("stats"))).unwrap();
    assert!(install(Arc::new(AllocationStatsHook::with_name("stats"))).is_err());
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

fn rows_strategy() -> impl Strategy<Value = (usize, usize, Vec<i16>)> {
    (1usize..8, 0usize..24).prop_flat_map(|(rows, row_length)| {
        (
            Just(rows),
            Just(row_length),
            prop::collection::vec(-50i16..50, rows * row_length),
        )
    })
}

proptest! {
    #[test]
    fn prop_rows_sorted_and_preserved((rows, row_length, values) in rows_strategy()) {
        for backend in [cpu(), parallel_cpu()] {
            let mut data = values.clone();
            let mut scratch = vec![0usize; data.len()];
            sort(&backend, &mut data, &mut scratch, &[rows, row_length]).unwrap();
            if row_length == 0 {
                prop_assert!(data.is_empty());
                continue;
            }
            for (sorted, original) in data.chunks(row_length).zip(values.chunks(row_length)) {
                prop_assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
                let mut expected = original.to_vec();
                expected.sort();
                prop_assert_eq!(sorted, &expected[..]);
            }
        }
    }

    #[test]
    fn prop_argsort_is_sorting_bijection(values in prop::collection::vec(any::<f32>(), 0..200)) {
        let backend = parallel_cpu();
        let before: Vec<u32> = values.iter().map(|v| v.to_bits()).collect();
        let mut perm = vec![0usize; values.len()];
        argsort(&backend, &mut perm, &values).unwrap();

        prop_assert!(is_permutation(&perm, values.len()));
        let after: Vec<u32> = values.iter().map(|v| v.to_bits()).collect();
        prop_assert_eq!(before, after);
        for w in perm.windows(2) {
            let (a, b) = (values[w[0]], values[w[1]]);
            let ordered = if a.is_nan() { b.is_nan() } else { b.is_nan() || a <= b };
            prop_assert!(ordered, "{} before {}", a, b);
            // equal keys keep index order
            if a == b || (a.is_nan() && b.is_nan()) {
                prop_assert!(w[0] < w[1]);
            }
        }
    }

    #[test]
    fn prop_lexsort_orders_by_last_key_first(
        pairs in prop::collection::vec((0u8..4, 0u8..4), 0..100)
    ) {
        let backend = cpu();
        let n = pairs.len();
        let mut keys: Vec<u8> = pairs.iter().map(|p| p.0).collect();
        keys.extend(pairs.iter().map(|p| p.1));
        let mut perm = vec![0usize; n];
        lexsort(&backend, &mut perm, &keys, 2, n).unwrap();

        prop_assert!(is_permutation(&perm, n));
        let mut expected: Vec<usize> = (0..n).collect();
        expected.sort_by_key(|&i| (pairs[i].1, pairs[i].0));
        prop_assert_eq!(perm, expected);
    }

    #[test]
    fn prop_engine_matches_std_stable_sort(values in prop::collection::vec(any::<i64>(), 0..300)) {
        let engine = SortEngine::new(EngineConfig::default().with_parallel_threshold(16)).unwrap();
        let perm = engine.argsort_array(&SortArray::Int64(values.clone())).unwrap();
        let mut expected: Vec<usize> = (0..values.len()).collect();
        expected.sort_by_key(|&i| values[i]);
        prop_assert_eq!(perm, expected);
    }
}

// ---------------------------------------------------------------------------
// CUDA
// ---------------------------------------------------------------------------

#[cfg(feature = "cuda")]
mod cuda {
    use super::*;

    fn engine() -> SortEngine {
        SortEngine::new(EngineConfig::default().with_backend(BackendKind::Cuda)).unwrap()
    }

    #[test]
    #[ignore = "requires a CUDA device"]
    fn test_cuda_scenarios() {
        let engine = engine();
        assert_eq!(engine.backend_name(), "cuda");

        let mut rows = SortArray::Int32(vec![3, 1, 2, 9, 7, 8]);
        engine.sort_array(&mut rows, &[2, 3]).unwrap();
        assert_eq!(rows, SortArray::Int32(vec![1, 2, 3, 7, 8, 9]));

        let data = SortArray::Float32(vec![5.0, 3.0, 4.0]);
        assert_eq!(engine.argsort_array(&data).unwrap(), vec![1, 2, 0]);

        let keys = SortArray::Int64(vec![1, 1, 0, 0, 0, 0]);
        assert_eq!(engine.lexsort_array(&keys, 2, 3).unwrap(), vec![2, 0, 1]);
    }

    #[test]
    #[ignore = "requires a CUDA device"]
    fn test_cuda_matches_cpu() {
        let gpu = engine();
        let cpu = SortEngine::new(EngineConfig::default()).unwrap();
        let values: Vec<f64> = (0..10_000)
            .map(|i| ((i * 7_919) % 1_013) as f64 - 500.0)
            .collect();
        let data = SortArray::Float64(values);
        assert_eq!(
            gpu.argsort_array(&data).unwrap(),
            cpu.argsort_array(&data).unwrap()
        );
    }
}
