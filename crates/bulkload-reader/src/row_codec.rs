//! Binary row encoding shared by channel writers and the function parser.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────┐
//! │ Field count  │ Fields: tag (1B) + value                 │
//! │ (2B LE)      │ (fixed-size LE, or 4B LE length + bytes) │
//! └──────────────┴──────────────────────────────────────────┘
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::types::{DataType, Datum, Row, TypeId};

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT4: u8 = 2;
const TAG_INT8: u8 = 3;
const TAG_FLOAT8: u8 = 4;
const TAG_TEXT: u8 = 5;
const TAG_BYTEA: u8 = 6;
const TAG_ARRAY: u8 = 7;
const TAG_ROW: u8 = 8;

/// Deepest array or row nesting a payload may carry.
pub const MAX_NESTING: usize = 64;

/// Errors decoding a row payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowCodecError {
    #[error("row payload truncated at field {field}")]
    Truncated { field: usize },

    #[error("unknown value tag {tag} at field {field}")]
    UnknownTag { field: usize, tag: u8 },

    #[error("invalid utf-8 text at field {field}")]
    InvalidText { field: usize },

    #[error("{extra} trailing bytes after last field")]
    TrailingBytes { extra: usize },

    #[error("value nested deeper than {max} levels at field {field}")]
    TooDeep { field: usize, max: usize },

    #[error("too many fields ({0}, max 65535)")]
    TooManyFields(usize),
}

impl RowCodecError {
    /// Zero-based field the error refers to, if any.
    pub fn field(&self) -> Option<usize> {
        match self {
            RowCodecError::Truncated { field }
            | RowCodecError::UnknownTag { field, .. }
            | RowCodecError::InvalidText { field }
            | RowCodecError::TooDeep { field, .. } => Some(*field),
            _ => None,
        }
    }
}

/// Encode row values, appending to `dst`.
pub fn encode_row(values: &[Datum], dst: &mut BytesMut) -> Result<(), RowCodecError> {
    if values.len() > u16::MAX as usize {
        return Err(RowCodecError::TooManyFields(values.len()));
    }
    dst.put_u16_le(values.len() as u16);
    for value in values {
        encode_datum(value, dst)?;
    }
    Ok(())
}

fn encode_datum(value: &Datum, dst: &mut BytesMut) -> Result<(), RowCodecError> {
    match value {
        Datum::Null => dst.put_u8(TAG_NULL),
        Datum::Bool(v) => {
            dst.put_u8(TAG_BOOL);
            dst.put_u8(u8::from(*v));
        }
        Datum::Int4(v) => {
            dst.put_u8(TAG_INT4);
            dst.put_i32_le(*v);
        }
        Datum::Int8(v) => {
            dst.put_u8(TAG_INT8);
            dst.put_i64_le(*v);
        }
        Datum::Float8(v) => {
            dst.put_u8(TAG_FLOAT8);
            dst.put_f64_le(*v);
        }
        Datum::Text(v) => {
            dst.put_u8(TAG_TEXT);
            dst.put_u32_le(v.len() as u32);
            dst.put_slice(v.as_bytes());
        }
        Datum::Bytea(v) => {
            dst.put_u8(TAG_BYTEA);
            dst.put_u32_le(v.len() as u32);
            dst.put_slice(v);
        }
        Datum::Array { elem, values } => {
            dst.put_u8(TAG_ARRAY);
            encode_type(elem, dst);
            dst.put_u32_le(values.len() as u32);
            for v in values {
                encode_datum(v, dst)?;
            }
        }
        Datum::Row(row) => {
            dst.put_u8(TAG_ROW);
            dst.put_u32_le(row.type_id.0);
            encode_row(&row.values, dst)?;
        }
    }
    Ok(())
}

fn encode_type(ty: &DataType, dst: &mut BytesMut) {
    match ty {
        DataType::Bool => dst.put_u8(TAG_BOOL),
        DataType::Int4 => dst.put_u8(TAG_INT4),
        DataType::Int8 => dst.put_u8(TAG_INT8),
        DataType::Float8 => dst.put_u8(TAG_FLOAT8),
        DataType::Text => dst.put_u8(TAG_TEXT),
        DataType::Bytea => dst.put_u8(TAG_BYTEA),
        DataType::Array(elem) => {
            dst.put_u8(TAG_ARRAY);
            encode_type(elem, dst);
        }
    }
}

/// Decode a complete row payload.
pub fn decode_row(payload: &[u8]) -> Result<Vec<Datum>, RowCodecError> {
    let mut src = payload;
    let values = decode_fields(&mut src, 0, 0)?;
    if src.has_remaining() {
        return Err(RowCodecError::TrailingBytes {
            extra: src.remaining(),
        });
    }
    Ok(values)
}

fn decode_fields(
    src: &mut &[u8],
    field: usize,
    depth: usize,
) -> Result<Vec<Datum>, RowCodecError> {
    need(src, 2, field)?;
    let count = src.get_u16_le() as usize;
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        values.push(decode_datum(src, field + i, depth)?);
    }
    Ok(values)
}

fn decode_datum(src: &mut &[u8], field: usize, depth: usize) -> Result<Datum, RowCodecError> {
    need(src, 1, field)?;
    let tag = src.get_u8();
    let value = match tag {
        TAG_NULL => Datum::Null,
        TAG_BOOL => {
            need(src, 1, field)?;
            Datum::Bool(src.get_u8() != 0)
        }
        TAG_INT4 => {
            need(src, 4, field)?;
            Datum::Int4(src.get_i32_le())
        }
        TAG_INT8 => {
            need(src, 8, field)?;
            Datum::Int8(src.get_i64_le())
        }
        TAG_FLOAT8 => {
            need(src, 8, field)?;
            Datum::Float8(src.get_f64_le())
        }
        TAG_TEXT => {
            let bytes = take_bytes(src, field)?;
            let text =
                String::from_utf8(bytes).map_err(|_| RowCodecError::InvalidText { field })?;
            Datum::Text(text)
        }
        TAG_BYTEA => Datum::Bytea(take_bytes(src, field)?),
        TAG_ARRAY => {
            let depth = nest(depth, field)?;
            let elem = decode_type(src, field, depth)?;
            need(src, 4, field)?;
            let count = src.get_u32_le() as usize;
            let mut values = Vec::with_capacity(count.min(src.remaining()));
            for _ in 0..count {
                values.push(decode_datum(src, field, depth)?);
            }
            Datum::Array { elem, values }
        }
        TAG_ROW => {
            let depth = nest(depth, field)?;
            need(src, 4, field)?;
            let type_id = TypeId(src.get_u32_le());
            let values = decode_fields(src, field, depth)?;
            Datum::Row(Row::new(type_id, values))
        }
        tag => return Err(RowCodecError::UnknownTag { field, tag }),
    };
    Ok(value)
}

fn decode_type(src: &mut &[u8], field: usize, depth: usize) -> Result<DataType, RowCodecError> {
    need(src, 1, field)?;
    let ty = match src.get_u8() {
        TAG_BOOL => DataType::Bool,
        TAG_INT4 => DataType::Int4,
        TAG_INT8 => DataType::Int8,
        TAG_FLOAT8 => DataType::Float8,
        TAG_TEXT => DataType::Text,
        TAG_BYTEA => DataType::Bytea,
        TAG_ARRAY => {
            let depth = nest(depth, field)?;
            DataType::Array(Box::new(decode_type(src, field, depth)?))
        }
        tag => return Err(RowCodecError::UnknownTag { field, tag }),
    };
    Ok(ty)
}

fn nest(depth: usize, field: usize) -> Result<usize, RowCodecError> {
    if depth >= MAX_NESTING {
        return Err(RowCodecError::TooDeep {
            field,
            max: MAX_NESTING,
        });
    }
    Ok(depth + 1)
}

fn take_bytes(src: &mut &[u8], field: usize) -> Result<Vec<u8>, RowCodecError> {
    need(src, 4, field)?;
    let len = src.get_u32_le() as usize;
    need(src, len, field)?;
    let bytes = src[..len].to_vec();
    src.advance(len);
    Ok(bytes)
}

fn need(src: &[u8], n: usize, field: usize) -> Result<(), RowCodecError> {
    if src.remaining() < n {
        return Err(RowCodecError::Truncated { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Datum> {
        vec![
            Datum::Int4(7),
            Datum::Null,
            Datum::Text("héllo".into()),
            Datum::Array {
                elem: DataType::Int8,
                values: vec![Datum::Int8(1), Datum::Null],
            },
            Datum::Row(Row::record(vec![Datum::Bool(true)])),
        ]
    }

    #[test]
    fn mixed_row_decodes_to_same_values() {
        let mut buf = BytesMut::new();
        encode_row(&sample(), &mut buf).unwrap();
        assert_eq!(decode_row(&buf).unwrap(), sample());
    }

    #[test]
    fn truncated_payload_reports_field() {
        let mut buf = BytesMut::new();
        encode_row(&sample(), &mut buf).unwrap();
        let cut = &buf[..buf.len() - 3];
        let err = decode_row(cut).unwrap_err();
        assert!(matches!(err, RowCodecError::Truncated { .. }));
        assert!(err.field().is_some());
    }

    #[test]
    fn unknown_tag_rejected() {
        let payload = [1u8, 0, 99];
        assert_eq!(
            decode_row(&payload).unwrap_err(),
            RowCodecError::UnknownTag { field: 0, tag: 99 }
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut buf = BytesMut::new();
        encode_row(&[Datum::Int4(1)], &mut buf).unwrap();
        buf.put_u8(0xff);
        assert_eq!(
            decode_row(&buf).unwrap_err(),
            RowCodecError::TrailingBytes { extra: 1 }
        );
    }

    #[test]
    fn invalid_utf8_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(1);
        buf.put_u8(TAG_TEXT);
        buf.put_u32_le(2);
        buf.put_slice(&[0xff, 0xfe]);
        assert_eq!(
            decode_row(&buf).unwrap_err(),
            RowCodecError::InvalidText { field: 0 }
        );
    }

    #[test]
    fn runaway_nesting_is_rejected() {
        let mut payload = vec![1u8, 0];
        payload.extend(std::iter::repeat_n(TAG_ARRAY, 2_000_000));
        assert_eq!(
            decode_row(&payload).unwrap_err(),
            RowCodecError::TooDeep {
                field: 0,
                max: MAX_NESTING
            }
        );

        let mut rows = vec![1u8, 0];
        for _ in 0..=MAX_NESTING {
            rows.push(TAG_ROW);
            rows.extend_from_slice(&TypeId::RECORD.0.to_le_bytes());
            rows.extend_from_slice(&1u16.to_le_bytes());
        }
        assert!(matches!(
            decode_row(&rows).unwrap_err(),
            RowCodecError::TooDeep { field: 0, .. }
        ));
    }

    #[test]
    fn nesting_within_limit_decodes() {
        let mut value = Datum::Int4(1);
        let mut elem = DataType::Int4;
        for _ in 0..MAX_NESTING - 1 {
            value = Datum::Array {
                elem: elem.clone(),
                values: vec![value],
            };
            elem = DataType::Array(Box::new(elem));
        }
        let mut buf = BytesMut::new();
        encode_row(std::slice::from_ref(&value), &mut buf).unwrap();
        assert_eq!(decode_row(&buf).unwrap(), vec![value]);
    }
}
