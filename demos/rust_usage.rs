use std::sync::Arc;

use anyhow::Result;
use arrow_array::{ArrayRef, Float64Array, Int32Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use gpu_sort_engine::arrow::sort_record_batch;
use gpu_sort_engine::memory::{install, AllocationStatsHook, TracingHook};
use gpu_sort_engine::{BackendKind, EngineConfig, SortArray, SortEngine};
use tracing::{info, Level};

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    info!("GPU Sort Engine - Rust Examples");

    let backend = if cfg!(feature = "cuda") && std::env::var_os("GPU_SORT_CUDA").is_some() {
        BackendKind::Cuda
    } else {
        BackendKind::Cpu
    };
    let engine = SortEngine::new(EngineConfig::default().with_backend(backend))?;

    batched_sort_example(&engine)?;
    argsort_example(&engine)?;
    lexsort_example(&engine)?;
    record_batch_example(&engine)?;
    memory_hook_example(&engine)?;

    Ok(())
}

fn batched_sort_example(engine: &SortEngine) -> Result<()> {
    info!("=== Example 1: Batched sort ===");
    let mut rows = SortArray::Int32(vec![3, 1, 2, 9, 7, 8]);
    engine.sort_array(&mut rows, &[2, 3])?;
    let rows: Vec<i32> = rows.into_vec()?;
    info!("rows sorted independently: {:?}", rows);
    Ok(())
}

fn argsort_example(engine: &SortEngine) -> Result<()> {
    info!("=== Example 2: Argsort ===");
    let data = SortArray::Float64(vec![5.0, 3.0, f64::NAN, 4.0]);
    let perm = engine.argsort_array(&data)?;
    info!("argsort {:?} -> {:?}", data, perm);
    Ok(())
}

fn lexsort_example(engine: &SortEngine) -> Result<()> {
    info!("=== Example 3: Lexsort ===");
    // last key is primary: sort by `last_name`, then `first_name`
    let first_name = SortArray::UInt8(vec![2, 1, 3, 1]);
    let last_name = SortArray::Int64(vec![10, 20, 10, 10]);
    let perm = engine.lexsort_arrays(&[first_name, last_name])?;
    info!("lexsort permutation: {:?}", perm);
    Ok(())
}

fn record_batch_example(engine: &SortEngine) -> Result<()> {
    info!("=== Example 4: Sorting a RecordBatch ===");
    let schema = Arc::new(Schema::new(vec![
        Field::new("region", DataType::Int32, false),
        Field::new("revenue", DataType::Float64, false),
        Field::new("name", DataType::Utf8, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int32Array::from(vec![2, 1, 2, 1])) as ArrayRef,
            Arc::new(Float64Array::from(vec![10.5, 99.0, 3.25, 42.0])),
            Arc::new(StringArray::from(vec!["north", "east", "south", "west"])),
        ],
    )?;
    let sorted = sort_record_batch(engine, &batch, &["region", "revenue"])?;
    info!("sorted batch: {} rows, names {:?}", sorted.num_rows(), sorted.column(2));
    Ok(())
}

fn memory_hook_example(engine: &SortEngine) -> Result<()> {
    info!("=== Example 5: Memory hooks ===");
    let stats = Arc::new(AllocationStatsHook::new());
    let _tracing = install(Arc::new(TracingHook::new()))?;
    let _stats = install(stats.clone())?;

    let mut matrix = SortArray::Float32((0..4096).map(|i| ((i * 31) % 97) as f32).collect());
    engine.sort_array(&mut matrix, &[64, 64])?;
    if let Some(first_row) = matrix.as_slice::<f32>().map(|v| &v[..8]) {
        info!("first row starts {:?}", first_row);
    }
    stats.report();
    Ok(())
}
