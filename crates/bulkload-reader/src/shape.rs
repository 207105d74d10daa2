//! Structural compatibility between row shapes and row values.

use crate::error::{ReaderError, Result};
use crate::types::{Datum, RowShape};

/// Check that rows shaped like `src` can be stored as `dst`.
///
/// Columns are matched by position and type; names are ignored.
pub fn match_shapes(dst: &RowShape, src: &RowShape) -> Result<()> {
    if dst.len() != src.len() {
        return Err(ReaderError::SchemaMismatch(format!(
            "Returned row contains {} attributes, but query expects {}.",
            src.len(),
            dst.len()
        )));
    }
    for (i, (d, s)) in dst.columns.iter().zip(&src.columns).enumerate() {
        if !d.data_type.accepts(&s.data_type) {
            return Err(ReaderError::SchemaMismatch(format!(
                "Returned type {} at ordinal position {}, but query expects {}.",
                s.data_type,
                i + 1,
                d.data_type
            )));
        }
    }
    Ok(())
}

/// Check an anonymous row's values against `dst`.
///
/// Nulls fit any column; nested rows are not accepted as column values.
pub fn match_row_values(dst: &RowShape, values: &[Datum]) -> Result<()> {
    if dst.len() != values.len() {
        return Err(ReaderError::SchemaMismatch(format!(
            "Returned row contains {} attributes, but query expects {}.",
            values.len(),
            dst.len()
        )));
    }
    for (i, (column, value)) in dst.columns.iter().zip(values).enumerate() {
        if value.is_null() {
            continue;
        }
        match value.data_type() {
            Some(ty) if column.data_type.accepts(&ty) => {}
            Some(ty) => {
                return Err(ReaderError::SchemaMismatch(format!(
                    "Returned type {ty} at ordinal position {}, but query expects {}.",
                    i + 1,
                    column.data_type
                )))
            }
            None => {
                return Err(ReaderError::SchemaMismatch(format!(
                    "Returned type record at ordinal position {}, but query expects {}.",
                    i + 1,
                    column.data_type
                )))
            }
        }
    }
    Ok(())
}
