//! Sort Arrow data with the gpu-sort engine.
//!
//! Primitive arrays of the ten supported numeric types are copied into a
//! [`gpu_sort_core::SortArray`], sorted on the engine's backend and wrapped
//! back into Arrow arrays.
//!
//! # Key order
//!
//! The core lexsort treats its **last** key as primary. Functions in this
//! crate take key columns the way SQL `ORDER BY` lists them, most significant
//! first, and reverse them before calling the engine.
//!
//! Columns with nulls are rejected.

pub mod array_convert;
pub mod schema_utils;
pub mod sort_ops;

pub use array_convert::{to_arrow, to_sort_array};
pub use schema_utils::{dtype_from_arrow, SchemaExt};
pub use sort_ops::{argsort_array, lexsort_columns, sort_fixed_size_list, sort_primitive, sort_record_batch};
