//! Export through the Arrow C data interface.
//!
//! Each batch is exported as one struct array whose children are the
//! columns, described by a single struct-typed schema. A consumer imports
//! them with `arrow::ffi::from_ffi` without copying buffers.

use arrow::array::{Array, StructArray};
use arrow::datatypes::SchemaRef;
use arrow::ffi::{FFI_ArrowArray, FFI_ArrowSchema};
use arrow::record_batch::RecordBatch;

use tabula_core::Result;

/// Query results in Arrow C data interface form.
#[derive(Debug)]
pub struct ExportedData {
    /// Struct-typed schema describing every array
    pub schema: FFI_ArrowSchema,
    /// One struct array per batch
    pub arrays: Vec<FFI_ArrowArray>,
    /// Total rows across `arrays`
    pub num_rows: usize,
}

impl ExportedData {
    /// Exports `batches`, which must all match `schema`.
    pub fn try_new(schema: &SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        let ffi_schema = FFI_ArrowSchema::try_from(schema.as_ref())?;
        let num_rows = batches.iter().map(|b| b.num_rows()).sum();
        let arrays = batches
            .into_iter()
            .map(|batch| FFI_ArrowArray::new(&StructArray::from(batch).to_data()))
            .collect();
        Ok(Self {
            schema: ffi_schema,
            arrays,
            num_rows,
        })
    }

    /// Number of exported arrays
    pub fn num_arrays(&self) -> usize {
        self.arrays.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{make_array, AsArray, Int64Array};
    use arrow::datatypes::{DataType, Field, Int64Type, Schema};
    use arrow::ffi::from_ffi;
    use std::sync::Arc;

    #[test]
    fn test_export_import() {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, true)]));
        let batches = vec![
            RecordBatch::try_new(
                schema.clone(),
                vec![Arc::new(Int64Array::from(vec![Some(1), None]))],
            )
            .unwrap(),
            RecordBatch::try_new(schema.clone(), vec![Arc::new(Int64Array::from(vec![3]))])
                .unwrap(),
        ];

        let exported = ExportedData::try_new(&schema, batches).unwrap();
        assert_eq!(exported.num_rows, 3);
        assert_eq!(exported.num_arrays(), 2);

        let ExportedData {
            schema: ffi_schema,
            mut arrays,
            ..
        } = exported;
        let first = arrays.remove(0);
        let data = unsafe { from_ffi(first, &ffi_schema) }.unwrap();
        let array = make_array(data);
        let column = array.as_struct().column(0).as_primitive::<Int64Type>().clone();
        assert_eq!(column.value(0), 1);
        assert!(column.is_null(1));
    }
}
