//! Sorting entry points over Arrow arrays and record batches.

use anyhow::{bail, Context, Result};
use arrow::compute::take;
use arrow_array::{Array, ArrayRef, FixedSizeListArray, RecordBatch, UInt64Array};
use arrow_schema::DataType;
use gpu_sort_core::SortEngine;
use tracing::debug;

use crate::array_convert::{to_arrow, to_sort_array};
use crate::schema_utils::SchemaExt;

fn permutation_array(perm: Vec<usize>) -> UInt64Array {
    perm.into_iter().map(|i| i as u64).collect::<Vec<_>>().into()
}

/// Return a sorted copy of a primitive array.
pub fn sort_primitive(engine: &SortEngine, array: &dyn Array) -> Result<ArrayRef> {
    let mut values = to_sort_array(array)?;
    let len = values.len();
    engine.sort_array(&mut values, &[len])?;
    Ok(to_arrow(values))
}

/// Sort every list of a fixed-size list array independently.
pub fn sort_fixed_size_list(engine: &SortEngine, list: &FixedSizeListArray) -> Result<FixedSizeListArray> {
    let DataType::FixedSizeList(field, size) = list.data_type() else {
        bail!("Expected a FixedSizeList, got {}", list.data_type());
    };
    if list.null_count() > 0 {
        bail!("Cannot sort a list array with {} null lists", list.null_count());
    }
    let row_length = usize::try_from(*size).context("Negative list size")?;
    let mut values = to_sort_array(list.values().as_ref())?;
    debug!("sort_fixed_size_list: {} lists of {}", list.len(), row_length);
    engine.sort_array(&mut values, &[list.len(), row_length])?;
    FixedSizeListArray::try_new(field.clone(), *size, to_arrow(values), None)
        .context("Rebuilding sorted list array")
}

/// Indices that stably sort `array`.
pub fn argsort_array(engine: &SortEngine, array: &dyn Array) -> Result<UInt64Array> {
    let values = to_sort_array(array)?;
    Ok(permutation_array(engine.argsort_array(&values)?))
}

/// Indices that sort the rows described by `columns`, most significant column
/// first. Columns may differ in type but must have equal lengths.
pub fn lexsort_columns(engine: &SortEngine, columns: &[ArrayRef]) -> Result<UInt64Array> {
    if columns.is_empty() {
        bail!("lexsort_columns needs at least one column");
    }
    // the engine takes the primary key last
    let keys = columns
        .iter()
        .rev()
        .enumerate()
        .map(|(i, c)| {
            to_sort_array(c.as_ref())
                .with_context(|| format!("Sort key {}", columns.len() - 1 - i))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(permutation_array(engine.lexsort_arrays(&keys)?))
}

/// Reorder every column of `batch` by the named key columns, most significant
/// first.
pub fn sort_record_batch(engine: &SortEngine, batch: &RecordBatch, by: &[&str]) -> Result<RecordBatch> {
    let schema = batch.schema();
    let key_columns = schema
        .sort_key_indices(by)?
        .into_iter()
        .map(|idx| batch.column(idx).clone())
        .collect::<Vec<_>>();
    let indices = lexsort_columns(engine, &key_columns)?;
    debug!("sort_record_batch: {} rows by {:?}", batch.num_rows(), by);

    let columns = batch
        .columns()
        .iter()
        .zip(schema.fields())
        .map(|(col, field)| {
            take(col.as_ref(), &indices, None)
                .with_context(|| format!("Reordering column '{}'", field.name()))
        })
        .collect::<Result<Vec<ArrayRef>>>()?;
    RecordBatch::try_new(schema, columns).context("Building sorted RecordBatch")
}
