//! Producer functions every catalog starts with.

use crate::catalog::{
    set_function, DefaultValue, ExprDone, FunctionCatalog, FunctionDef, ReturnMode, ReturnType,
    SetFunction,
};
use crate::error::{ReaderError, Result};
use crate::types::{DataType, Datum, Row};

impl FunctionCatalog {
    /// A catalog holding the built-in producer functions.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        register_builtins(&mut catalog);
        catalog
    }
}

/// Register `generate_series` and `unnest_text`.
pub fn register_builtins(catalog: &mut FunctionCatalog) {
    catalog.register_function(
        FunctionDef::new("generate_series", ReturnType::Record, generate_series)
            .in_schema("pg_catalog")
            .arg(DataType::Int4)
            .arg(DataType::Int4)
            .arg(DataType::Int4)
            .default_arg(|| DefaultValue::Single(Datum::Int4(1)))
            .out("value", DataType::Int4)
            .strict()
            .set_returning(),
    );
    catalog.register_function(
        FunctionDef::new("unnest_text", ReturnType::Record, unnest_text)
            .in_schema("pg_catalog")
            .variadic(DataType::Text)
            .out("value", DataType::Text)
            .set_returning(),
    );
}

fn int_arg(args: &[Datum], i: usize) -> Result<i64> {
    match args.get(i) {
        Some(Datum::Int4(v)) => Ok(i64::from(*v)),
        other => Err(ReaderError::ProtocolViolation(format!(
            "generate_series expects integer argument {i}, got {other:?}"
        ))),
    }
}

/// `generate_series(start, stop [, step])`, one row per call.
fn generate_series() -> Box<dyn SetFunction> {
    let mut next: Option<i64> = None;
    set_function(move |args, rsinfo| {
        let start = int_arg(args, 0)?;
        let stop = int_arg(args, 1)?;
        let step = int_arg(args, 2)?;
        if step == 0 {
            return Err(ReaderError::Configuration(
                "step size cannot equal zero".to_string(),
            ));
        }

        let current = next.unwrap_or(start);
        let done = if step > 0 { current > stop } else { current < stop };
        if done {
            rsinfo.is_done = ExprDone::End;
            return Ok(Datum::Null);
        }
        next = Some(current + step);
        rsinfo.is_done = ExprDone::Multiple;
        // `current` lies between start and stop, both i32.
        let value = i32::try_from(current).unwrap_or(i32::MAX);
        Ok(Datum::Row(Row::record(vec![Datum::Int4(value)])))
    })
}

/// `unnest_text(VARIADIC text[])`, the whole set from one call.
fn unnest_text() -> Box<dyn SetFunction> {
    set_function(|args, rsinfo| {
        let values = match args.first() {
            Some(Datum::Array { values, .. }) => values.clone(),
            _ => Vec::new(),
        };
        if !rsinfo.allows_materialize {
            return Err(ReaderError::UnsupportedFeature(
                "materialize mode required, but it is not allowed in this context".to_string(),
            ));
        }
        rsinfo.return_mode = ReturnMode::Materialize;
        rsinfo.set_result = Some(
            values
                .into_iter()
                .map(|value| Row::record(vec![value]))
                .collect(),
        );
        Ok(Datum::Null)
    })
}
