//! Record sources.
//!
//! A [`Parser`] turns one input source into a sequence of [`Record`]s. Two
//! kinds are built in:
//! - [`FunctionParser`] drives a registered set-producing function
//! - [`TupleParser`] reads length-framed records from a channel
//!
//! Further kinds (for example file formats) are registered on the
//! [`ParserFactory`] under their `TYPE` keyword.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bulkload_channel::ChannelOpener;

use crate::catalog::FunctionCatalog;
use crate::checker::Checker;
use crate::error::{ReaderError, Result};
use crate::types::RowShape;

pub mod function;
pub mod tuple;

pub use function::FunctionParser;
pub use tuple::{TupleParser, BLCKSZ};

/// One raw record, borrowed from the parser until its next `read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    payload: &'a [u8],
}

impl<'a> Record<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Profiling counters accumulated across reads.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReadProfile {
    /// Time spent waiting for the source: channel reads or function calls.
    pub source: Duration,
    /// Time spent forming, filtering and checking rows.
    pub convert: Duration,
    /// Payload bytes handed out as records.
    pub bytes: u64,
    /// Producer function invocations.
    pub invocations: u64,
}

/// Contract shared by every record source.
pub trait Parser: Send {
    /// `TYPE` keyword this parser is registered under.
    fn kind(&self) -> &'static str;

    /// Open the source named by `locator` for rows shaped like `shape`.
    fn init(&mut self, checker: &Checker, locator: &str, shape: &RowShape) -> Result<()>;

    /// Next record, or `None` at end of stream.
    fn read(&mut self, checker: &Checker, profile: &mut ReadProfile)
        -> Result<Option<Record<'_>>>;

    /// Release the source and return the number of records produced.
    fn term(self: Box<Self>) -> u64;

    /// Offer a control keyword. Returns whether the parser recognized it.
    fn param(&mut self, keyword: &str, value: &str) -> Result<bool>;

    /// Effective parser options, one `KEY = value` line each.
    fn dump_params(&self) -> Vec<String>;

    /// Write the last record in readable form followed by a newline and flush.
    fn dump_record(&self, sink: &mut dyn Write, badfile: &Path) -> Result<()>;

    /// Records produced so far.
    fn count(&self) -> u64;
}

/// Constructor for an externally provided parser kind.
pub type ParserCtor = Arc<dyn Fn() -> Box<dyn Parser> + Send + Sync>;

/// Creates parsers by `TYPE` keyword.
#[derive(Clone)]
pub struct ParserFactory {
    catalog: Arc<FunctionCatalog>,
    channels: Arc<dyn ChannelOpener>,
    external: HashMap<String, ParserCtor>,
}

impl ParserFactory {
    pub fn new(catalog: Arc<FunctionCatalog>, channels: Arc<dyn ChannelOpener>) -> Self {
        Self {
            catalog,
            channels,
            external: HashMap::new(),
        }
    }

    /// Register an additional parser kind, e.g. `BINARY` or `CSV`.
    pub fn register<F>(&mut self, kind: &str, ctor: F)
    where
        F: Fn() -> Box<dyn Parser> + Send + Sync + 'static,
    {
        self.external.insert(kind.to_ascii_uppercase(), Arc::new(ctor));
    }

    pub fn catalog(&self) -> &Arc<FunctionCatalog> {
        &self.catalog
    }

    /// Create a parser for `kind` (case-insensitive).
    pub fn create(&self, kind: &str) -> Result<Box<dyn Parser>> {
        let kind = kind.trim().to_ascii_uppercase();
        match kind.as_str() {
            "FUNCTION" => Ok(Box::new(FunctionParser::new(Arc::clone(&self.catalog)))),
            "TUPLE" => Ok(Box::new(TupleParser::new(Arc::clone(&self.channels)))),
            other => self
                .external
                .get(other)
                .map(|ctor| ctor())
                .ok_or_else(|| ReaderError::Configuration(format!("invalid TYPE \"{kind}\""))),
        }
    }

    /// Every kind this factory can create.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds = vec!["FUNCTION".to_string(), "TUPLE".to_string()];
        kinds.extend(self.external.keys().cloned());
        kinds.sort();
        kinds
    }
}

impl fmt::Debug for ParserFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserFactory")
            .field("kinds", &self.kinds())
            .finish()
    }
}
