//! Load rows from a writer thread through an in-process queue, then from a
//! producer function.
//!
//! Run with:
//!   cargo run -p bulkload --example in-process-load

use std::sync::Arc;
use std::thread;

use bulkload::channel::QueueRegistry;
use bulkload::frame::FrameWriter;
use bulkload::reader::{
    encode_row, load, Column, DataType, Datum, FunctionCatalog, ParserFactory, Reader, Row,
    RowShape,
};
use bytes::BytesMut;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(QueueRegistry::new());
    let queue = registry.create(1)?;

    let writer = thread::spawn(move || -> Result<u64, bulkload::frame::FrameError> {
        let mut frames = FrameWriter::new(queue);
        let mut payload = BytesMut::new();
        for (id, name) in ["ada", "grace", "edsger"].iter().enumerate() {
            payload.clear();
            encode_row(&[Datum::Int4(id as i32), Datum::Text(name.to_string())], &mut payload)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            frames.send(&payload)?;
        }
        frames.finish()?;
        Ok(frames.sent())
    });

    let factory = ParserFactory::new(Arc::new(FunctionCatalog::with_builtins()), registry);
    let shape = RowShape::anonymous(vec![
        Column::new("id", DataType::Int4).not_null(),
        Column::new("name", DataType::Text),
    ]);

    let mut builder = Reader::builder(factory.clone(), shape);
    builder.param("TYPE", "TUPLE")?;
    builder.param("INPUT", ":1")?;
    let mut rows: Vec<Row> = Vec::new();
    let summary = load(builder.open()?, &mut rows)?;
    let sent = writer.join().map_err(|_| "writer thread panicked")??;
    eprintln!("writer sent {sent} records, loaded {}", summary.rows_loaded);
    for row in &rows {
        println!("{}", row.to_text());
    }

    let mut builder = Reader::builder(
        factory,
        RowShape::anonymous(vec![Column::new("n", DataType::Int4)]),
    );
    builder.param("TYPE", "FUNCTION")?;
    builder.param("INPUT", "generate_series(10, 30, 10)")?;
    let mut rows: Vec<Row> = Vec::new();
    load(builder.open()?, &mut rows)?;
    for row in &rows {
        println!("{}", row.to_text());
    }

    Ok(())
}
