use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use bulkload_channel::{ChannelConfig, QueueRegistry};
use bulkload_frame::FrameWriter;
use bulkload_reader::{
    encode_row, load, Checker, Column, DataType, Datum, FunctionCatalog, Parser, ParserFactory,
    ReadProfile, Reader, ReaderError, Record, Row, RowShape,
};
use bytes::BytesMut;

fn shape() -> RowShape {
    RowShape::anonymous(vec![
        Column::new("id", DataType::Int8).not_null(),
        Column::new("body", DataType::Text),
    ])
}

#[test]
fn concurrent_writer_through_small_queue() {
    let registry = Arc::new(QueueRegistry::with_config(ChannelConfig {
        queue_capacity: 256,
        ..ChannelConfig::default()
    }));
    let queue = registry.create(11).expect("queue should be created");

    let producer = thread::spawn(move || {
        let mut writer = FrameWriter::new(queue);
        let mut payload = BytesMut::new();
        for id in 0..300i64 {
            // Every tenth body is larger than one block.
            let body = "x".repeat(if id % 10 == 0 { 12_000 } else { id as usize });
            payload.clear();
            encode_row(&[Datum::Int8(id), Datum::Text(body)], &mut payload)
                .expect("row should encode");
            writer.send(&payload).expect("frame should send");
        }
        writer.finish().expect("terminator should send");
    });

    let factory = ParserFactory::new(Arc::new(FunctionCatalog::new()), registry);
    let mut builder = Reader::builder(factory, shape());
    builder.param("TYPE", "TUPLE").unwrap();
    builder.param("INPUT", ":11").unwrap();
    let reader = builder.open().expect("reader should open");

    let mut rows: Vec<Row> = Vec::new();
    let summary = load(reader, &mut rows).expect("load should succeed");
    producer.join().expect("producer should not panic");

    assert_eq!(summary.records, 300);
    assert_eq!(summary.rows_loaded, 300);
    assert_eq!(rows.len(), 300);
    for (id, row) in rows.iter().enumerate() {
        assert_eq!(row.values[0], Datum::Int8(id as i64));
        let expected = if id % 10 == 0 { 12_000 } else { id };
        match &row.values[1] {
            Datum::Text(body) => assert_eq!(body.len(), expected),
            other => panic!("unexpected body {other:?}"),
        }
    }
}

#[test]
fn writer_vanishing_mid_frame_is_fatal() {
    let registry = Arc::new(QueueRegistry::new());
    let mut queue = registry.create(12).expect("queue should be created");
    queue.write_all(&64u32.to_le_bytes()).unwrap();
    queue.write_all(b"short").unwrap();
    drop(queue);

    let factory = ParserFactory::new(Arc::new(FunctionCatalog::new()), registry);
    let mut builder = Reader::builder(factory, shape());
    builder.param("TYPE", "TUPLE").unwrap();
    builder.param("INPUT", ":12").unwrap();
    builder.param("PARSE_ERRORS", "INFINITE").unwrap();
    let reader = builder.open().expect("reader should open");

    let mut rows: Vec<Row> = Vec::new();
    let err = load(reader, &mut rows).expect_err("truncated frame should fail");
    assert!(matches!(err, ReaderError::ProtocolViolation(_)));
    assert!(rows.is_empty());
}

/// Comma-separated text lines read from a file, one record per line.
#[derive(Default)]
struct CsvParser {
    lines: std::vec::IntoIter<String>,
    delimiter: Option<char>,
    scratch: BytesMut,
    count: u64,
}

impl Parser for CsvParser {
    fn kind(&self) -> &'static str {
        "CSV"
    }

    fn init(
        &mut self,
        _checker: &Checker,
        locator: &str,
        _shape: &RowShape,
    ) -> bulkload_reader::Result<()> {
        let text = std::fs::read_to_string(locator).map_err(|err| {
            ReaderError::Configuration(format!("could not open {locator}: {err}"))
        })?;
        self.lines = text
            .lines()
            .map(str::to_string)
            .collect::<Vec<_>>()
            .into_iter();
        Ok(())
    }

    fn read(
        &mut self,
        _checker: &Checker,
        profile: &mut ReadProfile,
    ) -> bulkload_reader::Result<Option<Record<'_>>> {
        let Some(line) = self.lines.next() else {
            return Ok(None);
        };
        let delimiter = self.delimiter.unwrap_or(',');
        let values: Vec<Datum> = line
            .split(delimiter)
            .map(|field| Datum::Text(field.to_string()))
            .collect();
        self.scratch.clear();
        encode_row(&values, &mut self.scratch)
            .map_err(|err| ReaderError::ProtocolViolation(err.to_string()))?;
        self.count += 1;
        profile.bytes += self.scratch.len() as u64;
        Ok(Some(Record::new(&self.scratch)))
    }

    fn term(self: Box<Self>) -> u64 {
        self.count
    }

    fn param(&mut self, keyword: &str, value: &str) -> bulkload_reader::Result<bool> {
        if keyword != "DELIMITER" {
            return Ok(false);
        }
        if self.delimiter.is_some() {
            return Err(ReaderError::Configuration(
                "duplicate DELIMITER specified".to_string(),
            ));
        }
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => self.delimiter = Some(c),
            _ => {
                return Err(ReaderError::Configuration(format!(
                    "DELIMITER must be a single character, got \"{value}\""
                )))
            }
        }
        Ok(true)
    }

    fn dump_params(&self) -> Vec<String> {
        vec![
            "TYPE = CSV".to_string(),
            format!("DELIMITER = {}", self.delimiter.unwrap_or(',')),
        ]
    }

    fn dump_record(
        &self,
        _sink: &mut dyn Write,
        _badfile: &Path,
    ) -> bulkload_reader::Result<()> {
        Ok(())
    }

    fn count(&self) -> u64 {
        self.count
    }
}

fn csv_file(tag: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bulkload-pipeline-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{tag}.csv"));
    std::fs::write(&path, contents).unwrap();
    path
}

fn csv_factory() -> ParserFactory {
    let mut factory = ParserFactory::new(
        Arc::new(FunctionCatalog::new()),
        Arc::new(QueueRegistry::new()),
    );
    factory.register("csv", || -> Box<dyn Parser> { Box::new(CsvParser::default()) });
    factory
}

#[test]
fn registered_parser_kind_loads_through_reader() {
    let path = csv_file("pipe", "1|one\n2|two\n");
    let mut builder = Reader::builder(csv_factory(), shape());
    builder.param("type", "Csv").unwrap();
    builder.param("INFILE", path.to_str().unwrap()).unwrap();
    builder.param("delimiter", "|").unwrap();
    let reader = builder.open().expect("reader should open");

    let params = reader.dump_params();
    assert!(params.contains(&"DELIMITER = |".to_string()));

    let mut rows: Vec<Row> = Vec::new();
    let summary = load(reader, &mut rows).expect("load should succeed");
    assert_eq!(summary.records, 2);
    assert_eq!(
        rows[1].values,
        vec![Datum::Int8(2), Datum::Text("two".to_string())]
    );
}

#[test]
fn keyword_unknown_to_every_layer_is_rejected() {
    let path = csv_file("unknown", "1,one\n");
    let mut builder = Reader::builder(csv_factory(), shape());
    builder.param("TYPE", "CSV").unwrap();
    builder.param("INPUT", path.to_str().unwrap()).unwrap();
    builder.param("QUOTE", "\"").unwrap();
    let err = builder.open().expect_err("unknown keyword should fail");
    assert!(err.to_string().contains("invalid keyword \"QUOTE\""));
}
