//! Conversion between Arrow primitive arrays and [`SortArray`].
//!
//! Values are copied out of the Arrow buffer into the host vector the engine
//! uploads. Arrays with nulls are rejected: the engine has no notion of a
//! validity mask.

use anyhow::{bail, Context, Result};
use arrow_array::{
    Array, ArrayRef, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array, Int8Array,
    UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use gpu_sort_core::{DType, SortArray};
use std::sync::Arc;

use crate::schema_utils::dtype_from_arrow;

macro_rules! copy_values {
    ($array:expr, $arrow_ty:ty, $variant:ident) => {{
        let typed = $array
            .as_any()
            .downcast_ref::<$arrow_ty>()
            .with_context(|| format!("Expected {}", stringify!($arrow_ty)))?;
        SortArray::$variant(typed.values().to_vec())
    }};
}

/// Copy a null-free primitive Arrow array into a [`SortArray`].
pub fn to_sort_array(array: &dyn Array) -> Result<SortArray> {
    if array.null_count() > 0 {
        bail!(
            "Cannot sort a {} array with {} nulls",
            array.data_type(),
            array.null_count()
        );
    }
    let values = match dtype_from_arrow(array.data_type())? {
        DType::Int8 => copy_values!(array, Int8Array, Int8),
        DType::Int16 => copy_values!(array, Int16Array, Int16),
        DType::Int32 => copy_values!(array, Int32Array, Int32),
        DType::Int64 => copy_values!(array, Int64Array, Int64),
        DType::UInt8 => copy_values!(array, UInt8Array, UInt8),
        DType::UInt16 => copy_values!(array, UInt16Array, UInt16),
        DType::UInt32 => copy_values!(array, UInt32Array, UInt32),
        DType::UInt64 => copy_values!(array, UInt64Array, UInt64),
        DType::Float32 => copy_values!(array, Float32Array, Float32),
        DType::Float64 => copy_values!(array, Float64Array, Float64),
    };
    Ok(values)
}

/// Wrap a [`SortArray`] back into an Arrow array of the matching type.
pub fn to_arrow(array: SortArray) -> ArrayRef {
    match array {
        SortArray::Int8(v) => Arc::new(Int8Array::from(v)),
        SortArray::Int16(v) => Arc::new(Int16Array::from(v)),
        SortArray::Int32(v) => Arc::new(Int32Array::from(v)),
        SortArray::Int64(v) => Arc::new(Int64Array::from(v)),
        SortArray::UInt8(v) => Arc::new(UInt8Array::from(v)),
        SortArray::UInt16(v) => Arc::new(UInt16Array::from(v)),
        SortArray::UInt32(v) => Arc::new(UInt32Array::from(v)),
        SortArray::UInt64(v) => Arc::new(UInt64Array::from(v)),
        SortArray::Float32(v) => Arc::new(Float32Array::from(v)),
        SortArray::Float64(v) => Arc::new(Float64Array::from(v)),
    }
}
