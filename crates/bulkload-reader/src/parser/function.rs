use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use tracing::debug;

use super::{Parser, ReadProfile, Record};
use crate::call::{parse_call, resolve, ResolvedCall};
use crate::catalog::{
    DefaultValue, ExprDone, FunctionCatalog, ReturnMode, ReturnSetInfo, ReturnType, SetFunction,
    FUNC_MAX_ARGS,
};
use crate::checker::Checker;
use crate::error::{ReaderError, Result};
use crate::row_codec::encode_row;
use crate::shape::{match_row_values, match_shapes};
use crate::types::{Datum, Row, RowShape, TypeId};

/// Where the producer is in its calling convention.
enum State {
    Unbound,
    /// Arguments bound, not yet invoked.
    Bound,
    /// The function answers one row per call.
    PerCall,
    /// Serving a materialized batch; the function is not called again.
    Materializing(std::vec::IntoIter<Row>),
    Exhausted,
}

/// Bound call state for one load.
struct Session {
    signature: String,
    body: Box<dyn SetFunction>,
    args: Vec<Datum>,
    rsinfo: ReturnSetInfo,
    shape: RowShape,
    /// Set once the producer's row type is known to fit `shape`.
    row_shape_verified: bool,
}

impl Session {
    /// One-shot row type verification on the first produced row.
    ///
    /// The catalog is consulted only when the row names a composite type other
    /// than the destination's: a concurrent writer may hold the destination
    /// type's lock for the whole load.
    fn verify(&mut self, row: &Row, catalog: &FunctionCatalog) -> Result<()> {
        if self.row_shape_verified {
            return Ok(());
        }
        if row.type_id == TypeId::RECORD {
            match_row_values(&self.shape, &row.values)?;
        } else if row.type_id != self.shape.type_id {
            let produced = catalog.lookup_row_shape(row.type_id)?;
            match_shapes(&self.shape, &produced)?;
        }
        self.row_shape_verified = true;
        Ok(())
    }
}

/// Drives a registered set-producing function.
///
/// The locator is a call expression such as `generate_series(1, 10)`. The
/// function may answer in value-per-call mode (one row per invocation until
/// it signals the end) or in materialize mode (the whole set from a single
/// invocation).
pub struct FunctionParser {
    catalog: Arc<FunctionCatalog>,
    state: State,
    session: Option<Session>,
    current: Option<Row>,
    scratch: BytesMut,
    count: u64,
    calls: u64,
}

impl FunctionParser {
    pub fn new(catalog: Arc<FunctionCatalog>) -> Self {
        Self {
            catalog,
            state: State::Unbound,
            session: None,
            current: None,
            scratch: BytesMut::new(),
            count: 0,
            calls: 0,
        }
    }

    /// Number of times the function has been invoked.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Arguments bound at init, including packed variadic and defaults.
    pub fn bound_args(&self) -> &[Datum] {
        self.session
            .as_ref()
            .map(|s| s.args.as_slice())
            .unwrap_or_default()
    }

    /// Whether the producer's row type has been checked against the destination.
    pub fn row_shape_verified(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.row_shape_verified)
    }

    /// Last row handed out.
    pub fn current_row(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    fn next_row(&mut self, profile: &mut ReadProfile) -> Result<Option<Row>> {
        let session = self.session.as_mut().ok_or_else(|| {
            ReaderError::Configuration("function parser is not initialized".to_string())
        })?;

        loop {
            match &mut self.state {
                State::Unbound => {
                    return Err(ReaderError::Configuration(
                        "function parser is not initialized".to_string(),
                    ))
                }
                State::Exhausted => return Ok(None),
                State::Materializing(cursor) => {
                    let next = cursor.next();
                    return match next {
                        Some(row) => {
                            session.verify(&row, &self.catalog)?;
                            Ok(Some(row))
                        }
                        None => {
                            debug!(function = %session.signature, "materialized batch drained");
                            self.state = State::Exhausted;
                            Ok(None)
                        }
                    };
                }
                State::Bound | State::PerCall => {}
            }

            session.rsinfo.is_done = ExprDone::Single;
            session.rsinfo.return_mode = ReturnMode::ValuePerCall;
            session.rsinfo.set_result = None;

            let started = Instant::now();
            let result = session.body.call(&session.args, &mut session.rsinfo);
            profile.source += started.elapsed();
            profile.invocations += 1;
            self.calls += 1;
            let datum = result?;

            match session.rsinfo.return_mode {
                ReturnMode::ValuePerCall => {
                    if session.rsinfo.is_done == ExprDone::End {
                        debug!(function = %session.signature, calls = self.calls, "set exhausted");
                        self.state = State::Exhausted;
                        return Ok(None);
                    }
                    let row = match datum {
                        Datum::Row(row) => row,
                        Datum::Null => {
                            return Err(ReaderError::ProtocolViolation(
                                "function returning set of rows cannot return null value"
                                    .to_string(),
                            ))
                        }
                        other => {
                            return Err(ReaderError::ProtocolViolation(format!(
                                "function returned a non-row value of type {}",
                                other
                                    .data_type()
                                    .map_or_else(|| "unknown".to_string(), |t| t.to_string())
                            )))
                        }
                    };
                    session.verify(&row, &self.catalog)?;
                    self.state = State::PerCall;
                    return Ok(Some(row));
                }
                ReturnMode::Materialize => {
                    if session.rsinfo.is_done != ExprDone::Single {
                        return Err(ReaderError::ProtocolViolation(
                            "table-function protocol for materialize mode was not followed"
                                .to_string(),
                        ));
                    }
                    match session.rsinfo.set_result.take() {
                        None => {
                            self.state = State::Exhausted;
                            return Ok(None);
                        }
                        Some(rows) => {
                            debug!(
                                function = %session.signature,
                                rows = rows.len(),
                                "function materialized its result"
                            );
                            self.state = State::Materializing(rows.into_iter());
                        }
                    }
                }
                mode => {
                    return Err(ReaderError::ProtocolViolation(format!(
                        "unrecognized table-function return mode: {mode:?}"
                    )))
                }
            }
        }
    }
}

impl Parser for FunctionParser {
    fn kind(&self) -> &'static str {
        "FUNCTION"
    }

    fn init(&mut self, checker: &Checker, locator: &str, shape: &RowShape) -> Result<()> {
        if !matches!(self.state, State::Unbound) {
            return Err(ReaderError::Configuration(
                "function parser is already initialized".to_string(),
            ));
        }
        if locator.trim().eq_ignore_ascii_case("stdin") {
            return Err(ReaderError::Configuration(
                "cannot load from STDIN in the case of \"TYPE = FUNCTION\"".to_string(),
            ));
        }
        if checker.encoding.is_some() {
            return Err(ReaderError::Configuration(
                "does not support parameter \"ENCODING\" in \"TYPE = FUNCTION\"".to_string(),
            ));
        }

        let catalog = Arc::clone(&self.catalog);
        let call = parse_call(locator)?;
        let resolved = resolve(&catalog, &call)?;
        let def = resolved.def;
        if !def.returns_set {
            return Err(ReaderError::UnsupportedFeature(
                "function must return set".to_string(),
            ));
        }

        let row_shape_verified = resolve_result_shape(&catalog, &resolved, shape)?;
        let args = bind_args(&resolved)?;

        debug!(
            function = %def.signature(),
            args = args.len(),
            verified = row_shape_verified,
            "bound producer function"
        );
        self.session = Some(Session {
            signature: def.signature(),
            body: def.instantiate(),
            args,
            rsinfo: ReturnSetInfo::new(shape.clone()),
            shape: shape.clone(),
            row_shape_verified,
        });
        self.state = State::Bound;
        Ok(())
    }

    fn read(
        &mut self,
        _checker: &Checker,
        profile: &mut ReadProfile,
    ) -> Result<Option<Record<'_>>> {
        let Some(row) = self.next_row(profile)? else {
            return Ok(None);
        };

        self.scratch.clear();
        encode_row(&row.values, &mut self.scratch)
            .map_err(|e| ReaderError::ProtocolViolation(e.to_string()))?;
        self.current = Some(row);
        self.count += 1;
        profile.bytes += self.scratch.len() as u64;
        Ok(Some(Record::new(&self.scratch)))
    }

    fn term(self: Box<Self>) -> u64 {
        if let Some(session) = &self.session {
            debug!(
                function = %session.signature,
                records = self.count,
                calls = self.calls,
                "function parser terminated"
            );
        }
        self.count
    }

    fn param(&mut self, _keyword: &str, _value: &str) -> Result<bool> {
        Ok(false)
    }

    fn dump_params(&self) -> Vec<String> {
        vec!["TYPE = FUNCTION".to_string()]
    }

    fn dump_record(&self, sink: &mut dyn Write, badfile: &Path) -> Result<()> {
        let Some(row) = &self.current else {
            return Ok(());
        };
        writeln!(sink, "{}", row.to_text())
            .and_then(|()| sink.flush())
            .map_err(|source| ReaderError::BadRecordFile {
                path: badfile.to_path_buf(),
                source,
            })
    }

    fn count(&self) -> u64 {
        self.count
    }
}

/// Check the declared result type against the destination.
///
/// Returns whether the shape is already verified; otherwise verification is
/// deferred to the first produced row.
fn resolve_result_shape(
    catalog: &FunctionCatalog,
    resolved: &ResolvedCall<'_>,
    shape: &RowShape,
) -> Result<bool> {
    let mismatch = || {
        ReaderError::SchemaMismatch(
            "function return data type and target table data type do not match".to_string(),
        )
    };
    match &resolved.def.return_type {
        ReturnType::Composite(id) if *id == shape.type_id => {
            // Resolve the destination type now, before a concurrent writer
            // takes its lock.
            catalog.lookup_row_shape(*id)?;
            Ok(true)
        }
        ReturnType::Record => match resolved.def.out_shape() {
            Some(produced) => {
                match_shapes(shape, &produced)?;
                Ok(true)
            }
            None => Ok(false),
        },
        ReturnType::Composite(id) if catalog.is_composite(*id) => Ok(false),
        ReturnType::Composite(_) | ReturnType::Scalar(_) => Err(mismatch()),
    }
}

/// Convert literal arguments, pack variadic ones and append defaults.
fn bind_args(resolved: &ResolvedCall<'_>) -> Result<Vec<Datum>> {
    let def = resolved.def;
    let params: Vec<_> = def.input_params().collect();
    let mut args = Vec::with_capacity(params.len());

    for (i, (literal, param)) in resolved.fixed_args().iter().zip(&params).enumerate() {
        let value = match literal {
            None if def.strict => {
                return Err(ReaderError::Configuration(format!(
                    "function is strict, but argument {i} is NULL"
                )))
            }
            None => Datum::Null,
            Some(text) => param
                .data_type
                .input(text)
                .map_err(ReaderError::Configuration)?,
        };
        args.push(value);
    }

    if resolved.nvargs > 0 {
        if let Some(elem) = def.variadic_elem() {
            let values = resolved
                .variadic_args()
                .iter()
                .map(|literal| match literal {
                    None => Ok(Datum::Null),
                    Some(text) => elem.input(text).map_err(ReaderError::Configuration),
                })
                .collect::<Result<Vec<_>>>()?;
            args.push(Datum::Array {
                elem: elem.clone(),
                values,
            });
        }
    }

    let skip = def.defaults.len().saturating_sub(resolved.ndargs);
    for thunk in def.defaults.iter().skip(skip) {
        if args.len() >= FUNC_MAX_ARGS {
            return Err(ReaderError::ResourceLimitExceeded(format!(
                "cannot pass more than {FUNC_MAX_ARGS} arguments to a function"
            )));
        }
        match thunk() {
            DefaultValue::Single(value) => args.push(value),
            DefaultValue::Set(_) => {
                return Err(ReaderError::UnsupportedFeature(
                    "functions and operators can take at most one set argument".to_string(),
                ))
            }
        }
    }

    Ok(args)
}
