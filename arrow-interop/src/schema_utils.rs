use anyhow::{Context, Result};
use arrow_schema::{DataType, Schema};
use gpu_sort_core::{DType, SortError};

/// Element type the engine uses for an Arrow primitive type.
pub fn dtype_from_arrow(dt: &DataType) -> Result<DType> {
    let dtype = match dt {
        DataType::Int8 => DType::Int8,
        DataType::Int16 => DType::Int16,
        DataType::Int32 => DType::Int32,
        DataType::Int64 => DType::Int64,
        DataType::UInt8 => DType::UInt8,
        DataType::UInt16 => DType::UInt16,
        DataType::UInt32 => DType::UInt32,
        DataType::UInt64 => DType::UInt64,
        DataType::Float32 => DType::Float32,
        DataType::Float64 => DType::Float64,
        other => return Err(SortError::UnsupportedType(other.to_string()).into()),
    };
    Ok(dtype)
}

pub trait SchemaExt {
    /// Columns whose type can be used as a sort key.
    fn sortable_columns(&self) -> Vec<&str>;
    /// Positions of `names`, failing on unknown or unsortable columns.
    fn sort_key_indices(&self, names: &[&str]) -> Result<Vec<usize>>;
}

impl SchemaExt for Schema {
    fn sortable_columns(&self) -> Vec<&str> {
        self.fields()
            .iter()
            .filter(|f| dtype_from_arrow(f.data_type()).is_ok())
            .map(|f| f.name().as_str())
            .collect()
    }

    fn sort_key_indices(&self, names: &[&str]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|n| {
                let idx = self
                    .index_of(n)
                    .with_context(|| format!("Column '{}' not found", n))?;
                dtype_from_arrow(self.field(idx).data_type()).with_context(|| {
                    format!(
                        "Column '{}' cannot be a sort key (sortable: {})",
                        n,
                        self.sortable_columns().join(", ")
                    )
                })?;
                Ok(idx)
            })
            .collect()
    }
}
