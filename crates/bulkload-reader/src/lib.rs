//! Record parsers and the reader driver for bulk loading.
//!
//! A load job opens one [`Parser`] through the [`ParserFactory`] and pulls
//! records from it until end of stream:
//! - [`FunctionParser`] drives a registered set-producing function through
//!   the value-per-call or materialize calling convention
//! - [`TupleParser`] reads length-framed records from a channel filled by a
//!   concurrent writer
//!
//! The [`Reader`] turns records into typed [`Row`]s through the
//! [`TupleFormer`], an optional [`RowFilter`] and the [`Checker`], diverting
//! rejected records to a bad-record file.

pub mod builtins;
pub mod call;
pub mod catalog;
pub mod checker;
pub mod error;
pub mod former;
pub mod parser;
pub mod reader;
pub mod row_codec;
pub mod shape;
pub mod types;

pub use call::{parse_call, resolve, CallExpr, ResolvedCall};
pub use catalog::{
    set_function, DefaultValue, ExprDone, FunctionCatalog, FunctionDef, ReturnMode,
    ReturnSetInfo, ReturnType, SetFunction, FUNC_MAX_ARGS,
};
pub use checker::{Checker, Encoding};
pub use error::{ReaderError, Result};
pub use former::{RowFilter, RowWriter, TupleFormer};
pub use parser::{
    FunctionParser, Parser, ParserFactory, ReadProfile, Record, TupleParser, BLCKSZ,
};
pub use reader::{load, LoadSummary, Reader, ReaderBuilder, ReaderOptions};
pub use row_codec::{decode_row, encode_row, RowCodecError, MAX_NESTING};
pub use types::{Column, DataType, Datum, Row, RowShape, TypeId};
