//! Column types, values and row shapes.

use std::fmt;

/// Identifier of a registered composite (row) type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// The anonymous record type. Rows of this type carry no catalog entry.
    pub const RECORD: TypeId = TypeId(2249);
    /// First id handed out to user-registered composite types.
    pub const FIRST_USER: TypeId = TypeId(16384);
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scalar and array column types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Bool,
    Int4,
    Int8,
    Float8,
    Text,
    Bytea,
    Array(Box<DataType>),
}

impl DataType {
    /// Parse a type name such as `int4`, `integer`, `text[]`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if let Some(elem) = name.strip_suffix("[]") {
            return Self::from_name(elem).map(|t| DataType::Array(Box::new(t)));
        }
        let ty = match name.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => DataType::Bool,
            "int" | "int4" | "integer" => DataType::Int4,
            "int8" | "bigint" => DataType::Int8,
            "float8" | "double precision" => DataType::Float8,
            "text" | "varchar" => DataType::Text,
            "bytea" => DataType::Bytea,
            _ => return None,
        };
        Some(ty)
    }

    /// Convert the textual representation of a value into a datum.
    pub fn input(&self, text: &str) -> Result<Datum, String> {
        let invalid = || format!("invalid input syntax for type {self}: \"{text}\"");
        match self {
            DataType::Bool => match text.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "yes" | "on" | "1" => Ok(Datum::Bool(true)),
                "f" | "false" | "no" | "off" | "0" => Ok(Datum::Bool(false)),
                _ => Err(invalid()),
            },
            DataType::Int4 => text
                .trim()
                .parse::<i32>()
                .map(Datum::Int4)
                .map_err(|_| invalid()),
            DataType::Int8 => text
                .trim()
                .parse::<i64>()
                .map(Datum::Int8)
                .map_err(|_| invalid()),
            DataType::Float8 => text
                .trim()
                .parse::<f64>()
                .map(Datum::Float8)
                .map_err(|_| invalid()),
            DataType::Text => Ok(Datum::Text(text.to_string())),
            DataType::Bytea => match text.strip_prefix("\\x") {
                Some(hex) => decode_hex(hex).map(Datum::Bytea).ok_or_else(invalid),
                None => Ok(Datum::Bytea(text.as_bytes().to_vec())),
            },
            DataType::Array(elem) => {
                let items = split_array_literal(text).ok_or_else(|| {
                    format!("malformed array literal: \"{text}\"")
                })?;
                let values = items
                    .into_iter()
                    .map(|item| match item {
                        None => Ok(Datum::Null),
                        Some(item) => elem.input(&item),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Datum::Array {
                    elem: (**elem).clone(),
                    values,
                })
            }
        }
    }

    /// Whether a value of type `other` can be stored in a column of this type.
    pub fn accepts(&self, other: &DataType) -> bool {
        self == other
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => f.write_str("boolean"),
            DataType::Int4 => f.write_str("integer"),
            DataType::Int8 => f.write_str("bigint"),
            DataType::Float8 => f.write_str("double precision"),
            DataType::Text => f.write_str("text"),
            DataType::Bytea => f.write_str("bytea"),
            DataType::Array(elem) => write!(f, "{elem}[]"),
        }
    }
}

/// One value. `Null` is a value of every type.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    Int4(i32),
    Int8(i64),
    Float8(f64),
    Text(String),
    Bytea(Vec<u8>),
    Array { elem: DataType, values: Vec<Datum> },
    Row(Row),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Runtime type of a scalar or array value; `None` for nulls and rows.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Datum::Null | Datum::Row(_) => None,
            Datum::Bool(_) => Some(DataType::Bool),
            Datum::Int4(_) => Some(DataType::Int4),
            Datum::Int8(_) => Some(DataType::Int8),
            Datum::Float8(_) => Some(DataType::Float8),
            Datum::Text(_) => Some(DataType::Text),
            Datum::Bytea(_) => Some(DataType::Bytea),
            Datum::Array { elem, .. } => Some(DataType::Array(Box::new(elem.clone()))),
        }
    }

    /// Textual representation, `None` for null.
    pub fn output(&self) -> Option<String> {
        match self {
            Datum::Null => None,
            Datum::Bool(v) => Some(if *v { "t" } else { "f" }.to_string()),
            Datum::Int4(v) => Some(v.to_string()),
            Datum::Int8(v) => Some(v.to_string()),
            Datum::Float8(v) => Some(v.to_string()),
            Datum::Text(v) => Some(v.clone()),
            Datum::Bytea(v) => Some(encode_hex(v)),
            Datum::Array { values, .. } => {
                let items: Vec<String> = values
                    .iter()
                    .map(|v| match v.output() {
                        None => "NULL".to_string(),
                        Some(s) => quote_if_needed(&s, "{},\"\\", true),
                    })
                    .collect();
                Some(format!("{{{}}}", items.join(",")))
            }
            Datum::Row(row) => Some(row.to_text()),
        }
    }
}

/// One destination column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub not_null: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            not_null: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }
}

/// Ordered column list a record must decode into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowShape {
    /// Composite type of the row; [`TypeId::RECORD`] when anonymous.
    pub type_id: TypeId,
    pub columns: Vec<Column>,
}

impl RowShape {
    pub fn new(type_id: TypeId, columns: Vec<Column>) -> Self {
        Self { type_id, columns }
    }

    /// Anonymous shape with the given columns.
    pub fn anonymous(columns: Vec<Column>) -> Self {
        Self::new(TypeId::RECORD, columns)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Parse `name:type,name:type` column specs. A trailing `!` on the type
    /// marks the column NOT NULL.
    pub fn parse_columns(spec: &str) -> Result<Vec<Column>, String> {
        spec.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| {
                let (name, ty) = part
                    .split_once(':')
                    .ok_or_else(|| format!("column spec \"{part}\" must be name:type"))?;
                let (ty, not_null) = match ty.trim().strip_suffix('!') {
                    Some(ty) => (ty, true),
                    None => (ty, false),
                };
                let data_type = DataType::from_name(ty)
                    .ok_or_else(|| format!("unknown type \"{}\"", ty.trim()))?;
                Ok(Column {
                    name: name.trim().to_string(),
                    data_type,
                    not_null,
                })
            })
            .collect()
    }
}

/// A typed row value.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub type_id: TypeId,
    pub values: Vec<Datum>,
}

impl Row {
    pub fn new(type_id: TypeId, values: Vec<Datum>) -> Self {
        Self { type_id, values }
    }

    /// Anonymous record.
    pub fn record(values: Vec<Datum>) -> Self {
        Self::new(TypeId::RECORD, values)
    }

    /// Record text form: `(1,abc,,"x y")`. Nulls are empty; values that are
    /// empty or contain delimiters, quotes or whitespace are double-quoted.
    pub fn to_text(&self) -> String {
        let fields: Vec<String> = self
            .values
            .iter()
            .map(|v| match v.output() {
                None => String::new(),
                Some(s) => quote_if_needed(&s, "(),\"\\", false),
            })
            .collect();
        format!("({})", fields.join(","))
    }
}

fn quote_if_needed(s: &str, specials: &str, quote_null_word: bool) -> String {
    let needs = s.is_empty()
        || s.chars()
            .any(|c| specials.contains(c) || c.is_ascii_whitespace())
        || (quote_null_word && s.eq_ignore_ascii_case("null"));
    if !needs {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push(c);
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Split `{a,"b c",NULL}` into items; `None` marks an unquoted NULL.
fn split_array_literal(text: &str) -> Option<Vec<Option<String>>> {
    let inner = text.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut items = Vec::new();
    if inner.trim().is_empty() {
        return Some(items);
    }

    let mut chars = inner.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            chars.next();
        }
        let mut item = String::new();
        let mut quoted = false;
        if chars.peek() == Some(&'"') {
            quoted = true;
            chars.next();
            loop {
                match chars.next()? {
                    '\\' => item.push(chars.next()?),
                    '"' => break,
                    c => item.push(c),
                }
            }
            while chars.peek().is_some_and(|c| c.is_ascii_whitespace()) {
                chars.next();
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                if c == '\\' {
                    chars.next();
                    item.push(chars.next()?);
                    continue;
                }
                item.push(c);
                chars.next();
            }
            item = item.trim_end().to_string();
        }

        if !quoted && item.eq_ignore_ascii_case("null") {
            items.push(None);
        } else {
            items.push(Some(item));
        }

        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return None,
        }
    }
    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_parse() {
        assert_eq!(DataType::from_name("INTEGER"), Some(DataType::Int4));
        assert_eq!(
            DataType::from_name("text[]"),
            Some(DataType::Array(Box::new(DataType::Text)))
        );
        assert_eq!(DataType::from_name("money"), None);
    }

    #[test]
    fn scalar_input_and_output() {
        assert_eq!(DataType::Int4.input(" 42 ").unwrap(), Datum::Int4(42));
        assert_eq!(DataType::Bool.input("on").unwrap(), Datum::Bool(true));
        assert_eq!(
            DataType::Bytea.input("\\x0aff").unwrap(),
            Datum::Bytea(vec![0x0a, 0xff])
        );
        assert!(DataType::Int4.input("abc").is_err());
        assert_eq!(Datum::Bytea(vec![1, 2]).output().unwrap(), "\\x0102");
        assert_eq!(Datum::Null.output(), None);
    }

    #[test]
    fn array_input_handles_quotes_and_nulls() {
        let ty = DataType::Array(Box::new(DataType::Text));
        let value = ty.input(r#"{a, "b c",NULL,"NULL"}"#).unwrap();
        assert_eq!(
            value,
            Datum::Array {
                elem: DataType::Text,
                values: vec![
                    Datum::Text("a".into()),
                    Datum::Text("b c".into()),
                    Datum::Null,
                    Datum::Text("NULL".into()),
                ],
            }
        );
        assert_eq!(value.output().unwrap(), r#"{a,"b c",NULL,"NULL"}"#);
        assert!(ty.input("a,b").is_err());
    }

    #[test]
    fn row_text_quotes_special_values() {
        let row = Row::record(vec![
            Datum::Int4(1),
            Datum::Text("x y".into()),
            Datum::Null,
            Datum::Text(String::new()),
            Datum::Text("a\"b".into()),
        ]);
        assert_eq!(row.to_text(), r#"(1,"x y",,"","a""b")"#);
    }

    #[test]
    fn column_specs_parse() {
        let cols = RowShape::parse_columns("id:int4!, name:text").unwrap();
        assert_eq!(cols.len(), 2);
        assert!(cols[0].not_null);
        assert_eq!(cols[1].data_type, DataType::Text);
        assert!(RowShape::parse_columns("id").is_err());
        assert!(RowShape::parse_columns("id:money").is_err());
    }
}
