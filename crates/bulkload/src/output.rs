use std::io::{IsTerminal, Write};

use bulkload_reader::{Datum, LoadSummary, Row, RowShape, RowWriter};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Prints loaded rows as they arrive. Table output is buffered until
/// [`RowPrinter::finish`] so column widths fit the whole result.
pub struct RowPrinter {
    format: OutputFormat,
    columns: Vec<String>,
    table: Option<Table>,
}

impl RowPrinter {
    pub fn new(shape: &RowShape, format: OutputFormat) -> Self {
        let columns: Vec<String> = shape.columns.iter().map(|c| c.name.clone()).collect();
        let table = match format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(columns.clone());
                Some(table)
            }
            _ => None,
        };
        Self {
            format,
            columns,
            table,
        }
    }

    pub fn print(&mut self, row: &Row) {
        match self.format {
            OutputFormat::Json => {
                let mut object = Map::new();
                for (name, value) in self.columns.iter().zip(&row.values) {
                    object.insert(name.clone(), datum_to_json(value));
                }
                println!(
                    "{}",
                    serde_json::to_string(&Value::Object(object))
                        .unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Table => {
                if let Some(table) = self.table.as_mut() {
                    table.add_row(
                        row.values
                            .iter()
                            .map(|v| v.output().unwrap_or_default())
                            .collect::<Vec<_>>(),
                    );
                }
            }
            OutputFormat::Pretty => println!("{}", row.to_text()),
            OutputFormat::Raw => {
                let line: Vec<String> = row
                    .values
                    .iter()
                    .map(|v| v.output().unwrap_or_else(|| "\\N".to_string()))
                    .collect();
                print_raw(format!("{}\n", line.join("\t")).as_bytes());
            }
        }
    }

    pub fn finish(self) {
        if let Some(table) = self.table {
            println!("{table}");
        }
    }
}

impl RowWriter for RowPrinter {
    fn insert(&mut self, row: Row) -> bulkload_reader::Result<()> {
        self.print(&row);
        Ok(())
    }
}

#[derive(Serialize)]
struct LoadOutput {
    records: u64,
    rows_loaded: u64,
    parse_errors: u64,
    source_ms: u128,
    convert_ms: u128,
}

/// Print the closing summary of a load. Skipped for raw output so the row
/// stream stays machine-readable.
pub fn print_load_summary(summary: &LoadSummary, format: OutputFormat) {
    let out = LoadOutput {
        records: summary.records,
        rows_loaded: summary.rows_loaded,
        parse_errors: summary.parse_errors,
        source_ms: summary.profile.source.as_millis(),
        convert_ms: summary.profile.convert.as_millis(),
    };
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["RECORDS", "LOADED", "PARSE ERRORS"])
                .add_row(vec![
                    out.records.to_string(),
                    out.rows_loaded.to_string(),
                    out.parse_errors.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "records={} loaded={} parse_errors={} source={}ms convert={}ms",
                out.records, out.rows_loaded, out.parse_errors, out.source_ms, out.convert_ms
            );
        }
        OutputFormat::Raw => {}
    }
}

#[derive(Serialize)]
struct FeedOutput<'a> {
    key: u32,
    socket: &'a str,
    records_sent: u64,
}

pub fn print_feed_summary(key: u32, socket: &str, sent: u64, format: OutputFormat) {
    let out = FeedOutput {
        key,
        socket,
        records_sent: sent,
    };
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KEY", "SOCKET", "SENT"])
                .add_row(vec![key.to_string(), socket.to_string(), sent.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("key={key} socket={socket} sent={sent}"),
        OutputFormat::Raw => print_raw(format!("{sent}\n").as_bytes()),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn datum_to_json(datum: &Datum) -> Value {
    match datum {
        Datum::Null => Value::Null,
        Datum::Bool(v) => Value::Bool(*v),
        Datum::Int4(v) => Value::from(*v),
        Datum::Int8(v) => Value::from(*v),
        Datum::Float8(v) => serde_json::Number::from_f64(*v)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(v.to_string())),
        Datum::Array { values, .. } => Value::Array(values.iter().map(datum_to_json).collect()),
        Datum::Row(row) => Value::Array(row.values.iter().map(datum_to_json).collect()),
        Datum::Text(_) | Datum::Bytea(_) => {
            Value::String(datum.output().unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkload_reader::DataType;

    #[test]
    fn datums_convert_to_json() {
        assert_eq!(datum_to_json(&Datum::Null), Value::Null);
        assert_eq!(datum_to_json(&Datum::Int4(7)), Value::from(7));
        assert_eq!(
            datum_to_json(&Datum::Text("a".into())),
            Value::String("a".into())
        );
        assert_eq!(
            datum_to_json(&Datum::Bytea(vec![0xde, 0xad])),
            Value::String("\\xdead".into())
        );
        let array = Datum::Array {
            elem: DataType::Int4,
            values: vec![Datum::Int4(1), Datum::Null],
        };
        assert_eq!(
            datum_to_json(&array),
            Value::Array(vec![Value::from(1), Value::Null])
        );
    }

    #[test]
    fn non_finite_floats_fall_back_to_strings() {
        assert_eq!(
            datum_to_json(&Datum::Float8(f64::NAN)),
            Value::String("NaN".into())
        );
    }
}
