//! Record-to-row conversion and the row sink.

use crate::error::{ReaderError, Result};
use crate::row_codec::decode_row;
use crate::types::{DataType, Datum, Row, RowShape};

/// Turns record payloads into typed column arrays for one destination shape.
#[derive(Debug, Clone)]
pub struct TupleFormer {
    shape: RowShape,
    min_fields: usize,
    max_fields: usize,
}

impl TupleFormer {
    /// Records must carry exactly one field per column.
    pub fn new(shape: RowShape) -> Self {
        let n = shape.len();
        Self {
            shape,
            min_fields: n,
            max_fields: n,
        }
    }

    /// Accept between `min` and `max` fields; missing trailing fields are null.
    pub fn with_field_range(mut self, min: usize, max: usize) -> Self {
        self.min_fields = min.min(self.shape.len());
        self.max_fields = max.clamp(self.min_fields, self.shape.len());
        self
    }

    pub fn shape(&self) -> &RowShape {
        &self.shape
    }

    pub fn field_range(&self) -> (usize, usize) {
        (self.min_fields, self.max_fields)
    }

    /// Decode `payload` and convert each field to its column type.
    ///
    /// Text fields go through the column's input conversion; other values
    /// must already have the column's type.
    pub fn form(&self, payload: &[u8]) -> Result<Vec<Datum>> {
        let fields = decode_row(payload).map_err(|e| ReaderError::Conversion {
            field: e.field().unwrap_or(0),
            message: e.to_string(),
        })?;

        if fields.len() < self.min_fields {
            return Err(ReaderError::Conversion {
                field: fields.len(),
                message: format!(
                    "missing data: expected at least {} fields, got {}",
                    self.min_fields,
                    fields.len()
                ),
            });
        }
        if fields.len() > self.max_fields {
            return Err(ReaderError::Conversion {
                field: self.max_fields,
                message: format!(
                    "extra data: expected at most {} fields, got {}",
                    self.max_fields,
                    fields.len()
                ),
            });
        }

        let mut values = Vec::with_capacity(self.shape.len());
        for (i, column) in self.shape.columns.iter().enumerate() {
            let value = match fields.get(i) {
                None | Some(Datum::Null) => Datum::Null,
                Some(Datum::Text(text)) if column.data_type != DataType::Text => {
                    column
                        .data_type
                        .input(text)
                        .map_err(|message| ReaderError::Conversion { field: i, message })?
                }
                Some(value) => match value.data_type() {
                    Some(ty) if column.data_type.accepts(&ty) => value.clone(),
                    found => {
                        let found = found.map_or_else(|| "record".to_string(), |t| t.to_string());
                        return Err(ReaderError::Conversion {
                            field: i,
                            message: format!(
                                "column \"{}\" is of type {} but value is of type {found}",
                                column.name, column.data_type
                            ),
                        });
                    }
                },
            };
            values.push(value);
        }
        Ok(values)
    }
}

/// Optional transform applied to each converted row before constraint checks.
pub trait RowFilter: Send {
    fn apply(&mut self, values: Vec<Datum>) -> Result<Vec<Datum>>;
}

impl<F> RowFilter for F
where
    F: FnMut(Vec<Datum>) -> Result<Vec<Datum>> + Send,
{
    fn apply(&mut self, values: Vec<Datum>) -> Result<Vec<Datum>> {
        self(values)
    }
}

/// Intake of checked rows.
pub trait RowWriter {
    fn insert(&mut self, row: Row) -> Result<()>;
}

impl RowWriter for Vec<Row> {
    fn insert(&mut self, row: Row) -> Result<()> {
        self.push(row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::row_codec::encode_row;
    use crate::types::Column;

    fn payload(values: &[Datum]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_row(values, &mut buf).unwrap();
        buf
    }

    fn former() -> TupleFormer {
        TupleFormer::new(RowShape::anonymous(vec![
            Column::new("id", DataType::Int4),
            Column::new("name", DataType::Text),
            Column::new("tags", DataType::Array(Box::new(DataType::Text))),
        ]))
    }

    #[test]
    fn converts_text_fields_by_column_type() {
        let values = former()
            .form(&payload(&[
                Datum::Text("12".into()),
                Datum::Text("bob".into()),
                Datum::Text("{a,b}".into()),
            ]))
            .unwrap();
        assert_eq!(values[0], Datum::Int4(12));
        assert_eq!(values[1], Datum::Text("bob".into()));
        assert!(matches!(&values[2], Datum::Array { values, .. } if values.len() == 2));
    }

    #[test]
    fn typed_values_pass_through_when_types_match() {
        let values = former()
            .form(&payload(&[Datum::Int4(3), Datum::Null, Datum::Null]))
            .unwrap();
        assert_eq!(values, vec![Datum::Int4(3), Datum::Null, Datum::Null]);

        let err = former()
            .form(&payload(&[Datum::Int8(3), Datum::Null, Datum::Null]))
            .unwrap_err();
        assert!(matches!(err, ReaderError::Conversion { field: 0, .. }));
    }

    #[test]
    fn field_count_limits() {
        let strict = former();
        assert!(matches!(
            strict.form(&payload(&[Datum::Int4(1)])),
            Err(ReaderError::Conversion { field: 1, .. })
        ));

        let relaxed = former().with_field_range(1, 3);
        let values = relaxed.form(&payload(&[Datum::Int4(1)])).unwrap();
        assert_eq!(values, vec![Datum::Int4(1), Datum::Null, Datum::Null]);

        let too_many = payload(&[Datum::Null, Datum::Null, Datum::Null, Datum::Null]);
        assert!(matches!(
            relaxed.form(&too_many),
            Err(ReaderError::Conversion { field: 3, .. })
        ));
    }

    #[test]
    fn bad_input_is_a_record_error() {
        let err = former()
            .form(&payload(&[Datum::Text("x".into()), Datum::Null, Datum::Null]))
            .unwrap_err();
        assert!(err.is_record_error());

        let err = former().form(&[0xff]).unwrap_err();
        assert!(err.is_record_error());
    }
}
