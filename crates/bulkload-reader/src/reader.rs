//! The reader driver: pulls records from a parser and turns them into rows.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::checker::{Checker, Encoding};
use crate::error::{ReaderError, Result};
use crate::former::{RowFilter, RowWriter, TupleFormer};
use crate::parser::{Parser, ParserFactory, ReadProfile};
use crate::types::{Row, RowShape};

/// Reader-level control options. Each keyword may be given once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Parser kind (`TYPE`).
    pub kind: Option<String>,
    /// Source locator (`INPUT` / `INFILE`).
    pub input: Option<String>,
    /// Where rejected records are written (`PARSE_BADFILE`).
    pub parse_badfile: Option<PathBuf>,
    /// Maximum number of records to read; `None` is unlimited.
    pub limit: Option<u64>,
    /// Rejected records tolerated before failing; `None` is unlimited.
    pub max_parse_errors: Option<u64>,
    pub encoding: Option<Encoding>,
    pub check_constraints: bool,
    seen: Vec<&'static str>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            kind: None,
            input: None,
            parse_badfile: None,
            limit: None,
            max_parse_errors: Some(0),
            encoding: None,
            check_constraints: false,
            seen: Vec::new(),
        }
    }
}

impl ReaderOptions {
    /// Apply one control keyword. Returns `false` for keywords the reader
    /// does not know, so they can be offered to the parser.
    pub fn apply(&mut self, keyword: &str, value: &str) -> Result<bool> {
        let upper = keyword.trim().to_ascii_uppercase();
        let canonical = match upper.as_str() {
            "TYPE" => "TYPE",
            "INPUT" | "INFILE" => "INPUT",
            "PARSE_BADFILE" => "PARSE_BADFILE",
            "LIMIT" => "LIMIT",
            "PARSE_ERRORS" => "PARSE_ERRORS",
            "ENCODING" => "ENCODING",
            "CHECK_CONSTRAINTS" => "CHECK_CONSTRAINTS",
            _ => return Ok(false),
        };
        if self.seen.contains(&canonical) {
            return Err(ReaderError::Configuration(format!(
                "duplicate {upper} specified"
            )));
        }

        let value = value.trim();
        match canonical {
            "TYPE" => self.kind = Some(value.to_ascii_uppercase()),
            "INPUT" => self.input = Some(value.to_string()),
            "PARSE_BADFILE" => self.parse_badfile = Some(PathBuf::from(value)),
            "LIMIT" => self.limit = parse_count(&upper, value)?,
            "PARSE_ERRORS" => self.max_parse_errors = parse_count(&upper, value)?,
            "ENCODING" => {
                self.encoding = Some(Encoding::from_name(value).ok_or_else(|| {
                    ReaderError::Configuration(format!("invalid encoding \"{value}\""))
                })?)
            }
            _ => self.check_constraints = parse_bool(&upper, value)?,
        }
        self.seen.push(canonical);
        Ok(true)
    }

    /// Effective options, one `KEY = value` line each.
    pub fn dump(&self) -> Vec<String> {
        let count = |v: Option<u64>| v.map_or_else(|| "INFINITE".to_string(), |n| n.to_string());
        let mut lines = Vec::new();
        if let Some(input) = &self.input {
            lines.push(format!("INPUT = {input}"));
        }
        if let Some(badfile) = &self.parse_badfile {
            lines.push(format!("PARSE_BADFILE = {}", badfile.display()));
        }
        lines.push(format!("LIMIT = {}", count(self.limit)));
        lines.push(format!("PARSE_ERRORS = {}", count(self.max_parse_errors)));
        if let Some(encoding) = self.encoding {
            lines.push(format!("ENCODING = {encoding}"));
        }
        lines.push(format!(
            "CHECK_CONSTRAINTS = {}",
            if self.check_constraints { "YES" } else { "NO" }
        ));
        lines
    }
}

/// Non-negative count, or unlimited (`INFINITE` or `-1`).
fn parse_count(keyword: &str, value: &str) -> Result<Option<u64>> {
    if value.eq_ignore_ascii_case("infinite") || value == "-1" {
        return Ok(None);
    }
    value.parse::<u64>().map(Some).map_err(|_| {
        ReaderError::Configuration(format!("invalid value \"{value}\" for {keyword}"))
    })
}

fn parse_bool(keyword: &str, value: &str) -> Result<bool> {
    match value.to_ascii_uppercase().as_str() {
        "YES" | "TRUE" | "ON" | "1" => Ok(true),
        "NO" | "FALSE" | "OFF" | "0" => Ok(false),
        _ => Err(ReaderError::Configuration(format!(
            "invalid value \"{value}\" for {keyword}"
        ))),
    }
}

/// Counters reported when a reader is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadSummary {
    /// Records produced by the parser.
    pub records: u64,
    /// Rows handed to the caller.
    pub rows_loaded: u64,
    /// Records rejected by conversion or constraint checks.
    pub parse_errors: u64,
    pub profile: ReadProfile,
}

/// Configures and opens a [`Reader`].
pub struct ReaderBuilder {
    factory: ParserFactory,
    shape: RowShape,
    options: ReaderOptions,
    checker: Checker,
    filter: Option<Box<dyn RowFilter>>,
    field_range: Option<(usize, usize)>,
    parser_params: Vec<(String, String)>,
}

impl ReaderBuilder {
    pub fn checker(mut self, checker: Checker) -> Self {
        self.checker = checker;
        self
    }

    pub fn filter<F: RowFilter + 'static>(mut self, filter: F) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Accept records with between `min` and `max` fields.
    pub fn field_range(mut self, min: usize, max: usize) -> Self {
        self.field_range = Some((min, max));
        self
    }

    /// Apply a control keyword. Keywords the reader does not recognize are
    /// held for the parser and rejected at [`open`](Self::open) if it does not
    /// recognize them either.
    pub fn param(&mut self, keyword: &str, value: &str) -> Result<()> {
        if !self.options.apply(keyword, value)? {
            self.parser_params
                .push((keyword.trim().to_ascii_uppercase(), value.to_string()));
        }
        Ok(())
    }

    /// Create the parser and open the source.
    pub fn open(self) -> Result<Reader> {
        let ReaderBuilder {
            factory,
            shape,
            options,
            mut checker,
            filter,
            field_range,
            parser_params,
        } = self;

        let kind = options
            .kind
            .clone()
            .ok_or_else(|| ReaderError::Configuration("TYPE must be specified".to_string()))?;
        let input = options
            .input
            .clone()
            .ok_or_else(|| ReaderError::Configuration("INPUT must be specified".to_string()))?;

        checker.encoding = options.encoding;
        checker.check_constraints = options.check_constraints;

        let mut parser = factory.create(&kind)?;
        for (keyword, value) in &parser_params {
            if !parser.param(keyword, value)? {
                return Err(ReaderError::Configuration(format!(
                    "invalid keyword \"{keyword}\""
                )));
            }
        }
        parser.init(&checker, &input, &shape)?;

        let mut former = TupleFormer::new(shape);
        if let Some((min, max)) = field_range {
            former = former.with_field_range(min, max);
        }

        info!(kind = %kind, input = %input, "reader opened");
        Ok(Reader {
            parser,
            options,
            checker,
            former,
            filter,
            profile: ReadProfile::default(),
            records: 0,
            rows_loaded: 0,
            parse_errors: 0,
            badfile: None,
        })
    }
}

/// Pulls records from a parser, converts, filters and checks them.
pub struct Reader {
    parser: Box<dyn Parser>,
    options: ReaderOptions,
    checker: Checker,
    former: TupleFormer,
    filter: Option<Box<dyn RowFilter>>,
    profile: ReadProfile,
    records: u64,
    rows_loaded: u64,
    parse_errors: u64,
    badfile: Option<File>,
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("kind", &self.parser.kind())
            .field("options", &self.options)
            .field("records", &self.records)
            .field("rows_loaded", &self.rows_loaded)
            .field("parse_errors", &self.parse_errors)
            .finish()
    }
}

impl Reader {
    pub fn builder(factory: ParserFactory, shape: RowShape) -> ReaderBuilder {
        ReaderBuilder {
            factory,
            shape,
            options: ReaderOptions::default(),
            checker: Checker::default(),
            filter: None,
            field_range: None,
            parser_params: Vec::new(),
        }
    }

    /// Next loadable row, or `None` at end of input or once `LIMIT` records
    /// have been read.
    ///
    /// Records failing conversion or constraint checks are logged, written to
    /// the bad-record file and skipped, until `PARSE_ERRORS` is exceeded.
    pub fn next(&mut self) -> Result<Option<Row>> {
        loop {
            if self.options.limit.is_some_and(|limit| self.records >= limit) {
                return Ok(None);
            }
            let Some(record) = self.parser.read(&self.checker, &mut self.profile)? else {
                return Ok(None);
            };
            self.records += 1;

            let started = Instant::now();
            let formed = self.former.form(record.payload()).and_then(|values| {
                let values = match &mut self.filter {
                    Some(filter) => filter.apply(values)?,
                    None => values,
                };
                self.checker.check_row(self.former.shape(), &values)?;
                Ok(values)
            });
            self.profile.convert += started.elapsed();

            match formed {
                Ok(values) => {
                    self.rows_loaded += 1;
                    return Ok(Some(Row::new(self.former.shape().type_id, values)));
                }
                Err(err) if err.is_record_error() => self.reject(err)?,
                Err(err) => return Err(err),
            }
        }
    }

    fn reject(&mut self, err: ReaderError) -> Result<()> {
        self.parse_errors += 1;
        warn!(record = self.records, error = %err, "record rejected");
        self.dump_bad_record()?;

        if let Some(max) = self.options.max_parse_errors {
            if self.parse_errors > max {
                return Err(ReaderError::ParseErrorLimit {
                    count: self.parse_errors,
                    max,
                });
            }
        }
        Ok(())
    }

    fn dump_bad_record(&mut self) -> Result<()> {
        let Some(path) = &self.options.parse_badfile else {
            return Ok(());
        };
        if self.badfile.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| ReaderError::BadRecordFile {
                    path: path.clone(),
                    source,
                })?;
            debug!(path = %path.display(), "opened parse badfile");
            self.badfile = Some(file);
        }
        if let Some(file) = self.badfile.as_mut() {
            self.parser.dump_record(file as &mut dyn Write, path)?;
        }
        Ok(())
    }

    /// Log the effective configuration and return it.
    pub fn dump_params(&self) -> Vec<String> {
        let mut lines = self.options.dump();
        lines.extend(self.parser.dump_params());
        for line in &lines {
            info!("{line}");
        }
        lines
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors
    }

    pub fn rows_loaded(&self) -> u64 {
        self.rows_loaded
    }

    pub fn shape(&self) -> &RowShape {
        self.former.shape()
    }

    /// Terminate the parser and report what was loaded.
    pub fn close(self) -> LoadSummary {
        let records = self.parser.term();
        let summary = LoadSummary {
            records,
            rows_loaded: self.rows_loaded,
            parse_errors: self.parse_errors,
            profile: self.profile,
        };
        info!(
            records = summary.records,
            rows = summary.rows_loaded,
            parse_errors = summary.parse_errors,
            source_ms = summary.profile.source.as_millis() as u64,
            convert_ms = summary.profile.convert.as_millis() as u64,
            "reader closed"
        );
        summary
    }
}

/// Drain `reader` into `writer`, then close it.
pub fn load<W: RowWriter + ?Sized>(mut reader: Reader, writer: &mut W) -> Result<LoadSummary> {
    let mut failure = None;
    loop {
        match reader.next() {
            Ok(Some(row)) => {
                if let Err(err) = writer.insert(row) {
                    failure = Some(err);
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    let summary = reader.close();
    match failure {
        Some(err) => Err(err),
        None => Ok(summary),
    }
}
