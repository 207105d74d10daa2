//! Registered row types and set-producing functions.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::{ReaderError, Result};
use crate::types::{Column, DataType, Datum, Row, RowShape, TypeId};

/// Maximum number of arguments a function call may bind.
pub const FUNC_MAX_ARGS: usize = 100;

/// Calling convention a function chose for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnMode {
    /// One row per invocation.
    ValuePerCall,
    /// The whole result in `set_result` from a single invocation.
    Materialize,
    /// Request flag only; never a valid answer.
    MaterializeRandom,
    /// Request flag only; never a valid answer.
    MaterializePreferred,
}

/// Completion signal of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprDone {
    /// The invocation produced its only result.
    Single,
    /// More results follow.
    Multiple,
    /// No result; the set is exhausted.
    End,
}

/// Per-invocation protocol state shared between the caller and the function.
///
/// The caller resets `is_done` and the null flag before each call; the
/// function sets `return_mode`, `is_done` and, in materialize mode,
/// `set_result`.
#[derive(Debug)]
pub struct ReturnSetInfo {
    /// Row shape the caller expects.
    pub expected: RowShape,
    /// Whether the caller accepts value-per-call mode.
    pub allows_value_per_call: bool,
    /// Whether the caller accepts materialize mode.
    pub allows_materialize: bool,
    pub return_mode: ReturnMode,
    pub is_done: ExprDone,
    pub set_result: Option<Vec<Row>>,
}

impl ReturnSetInfo {
    pub fn new(expected: RowShape) -> Self {
        Self {
            expected,
            allows_value_per_call: true,
            allows_materialize: true,
            return_mode: ReturnMode::ValuePerCall,
            is_done: ExprDone::Single,
            set_result: None,
        }
    }
}

/// Body of a set-producing function. One instance lives for one load.
pub trait SetFunction: Send {
    /// Invoke once. A null result is returned as [`Datum::Null`].
    fn call(&mut self, args: &[Datum], rsinfo: &mut ReturnSetInfo) -> Result<Datum>;
}

impl<F> SetFunction for F
where
    F: FnMut(&[Datum], &mut ReturnSetInfo) -> Result<Datum> + Send,
{
    fn call(&mut self, args: &[Datum], rsinfo: &mut ReturnSetInfo) -> Result<Datum> {
        self(args, rsinfo)
    }
}

/// Box a closure as a function body.
pub fn set_function<F>(f: F) -> Box<dyn SetFunction>
where
    F: FnMut(&[Datum], &mut ReturnSetInfo) -> Result<Datum> + Send + 'static,
{
    Box::new(f)
}

/// Creates a fresh function body for each parser session.
pub type FunctionBody = Arc<dyn Fn() -> Box<dyn SetFunction> + Send + Sync>;

/// Value a default-argument thunk evaluates to.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Single(Datum),
    /// A set-valued default. Never accepted as an argument.
    Set(Vec<Datum>),
}

/// Deferred default expression of a parameter.
pub type DefaultArg = Arc<dyn Fn() -> DefaultValue + Send + Sync>;

/// Declared return type of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    /// A registered composite type (possibly a table's row type).
    Composite(TypeId),
    /// Anonymous record; OUT parameters, if any, give its layout.
    Record,
    /// A non-composite type.
    Scalar(DataType),
}

/// Parameter direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    In,
    Out,
    Variadic,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: Option<String>,
    pub data_type: DataType,
    pub mode: ParamMode,
}

/// A registered function.
#[derive(Clone)]
pub struct FunctionDef {
    pub schema: String,
    pub name: String,
    pub params: Vec<Param>,
    /// Defaults for the trailing input parameters, in declaration order.
    pub defaults: Vec<DefaultArg>,
    pub strict: bool,
    pub returns_set: bool,
    pub return_type: ReturnType,
    body: FunctionBody,
}

impl FunctionDef {
    /// Declare a function in the `public` schema.
    pub fn new<F>(name: impl Into<String>, return_type: ReturnType, body: F) -> Self
    where
        F: Fn() -> Box<dyn SetFunction> + Send + Sync + 'static,
    {
        Self {
            schema: "public".to_string(),
            name: name.into(),
            params: Vec::new(),
            defaults: Vec::new(),
            strict: false,
            returns_set: false,
            return_type,
            body: Arc::new(body),
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Add an input parameter.
    pub fn arg(mut self, data_type: DataType) -> Self {
        self.params.push(Param {
            name: None,
            data_type,
            mode: ParamMode::In,
        });
        self
    }

    /// Add a trailing variadic parameter of the given element type.
    pub fn variadic(mut self, elem: DataType) -> Self {
        self.params.push(Param {
            name: None,
            data_type: DataType::Array(Box::new(elem)),
            mode: ParamMode::Variadic,
        });
        self
    }

    /// Add an OUT parameter; OUT parameters describe a record result.
    pub fn out(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.params.push(Param {
            name: Some(name.into()),
            data_type,
            mode: ParamMode::Out,
        });
        self
    }

    /// Give the next trailing input parameter a default.
    pub fn default_arg<F>(mut self, thunk: F) -> Self
    where
        F: Fn() -> DefaultValue + Send + Sync + 'static,
    {
        self.defaults.push(Arc::new(thunk));
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn set_returning(mut self) -> Self {
        self.returns_set = true;
        self
    }

    /// Input parameters (IN and VARIADIC) in declaration order.
    pub fn input_params(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.mode != ParamMode::Out)
    }

    pub fn input_count(&self) -> usize {
        self.input_params().count()
    }

    /// Element type of the variadic parameter, if declared.
    pub fn variadic_elem(&self) -> Option<&DataType> {
        self.params.iter().find_map(|p| match (&p.mode, &p.data_type) {
            (ParamMode::Variadic, DataType::Array(elem)) => Some(elem.as_ref()),
            _ => None,
        })
    }

    /// Record layout described by OUT parameters, if any.
    pub fn out_shape(&self) -> Option<RowShape> {
        let columns: Vec<Column> = self
            .params
            .iter()
            .filter(|p| p.mode == ParamMode::Out)
            .enumerate()
            .map(|(i, p)| {
                let name = p.name.clone().unwrap_or_else(|| format!("column{}", i + 1));
                Column::new(name, p.data_type.clone())
            })
            .collect();
        if columns.is_empty() {
            None
        } else {
            Some(RowShape::anonymous(columns))
        }
    }

    /// Instantiate the function body for one session.
    pub fn instantiate(&self) -> Box<dyn SetFunction> {
        (self.body)()
    }

    /// `schema.name(type, ...)` for diagnostics.
    pub fn signature(&self) -> String {
        let args: Vec<String> = self
            .input_params()
            .map(|p| match p.mode {
                ParamMode::Variadic => format!("VARIADIC {}", p.data_type),
                _ => p.data_type.to_string(),
            })
            .collect();
        format!("{}.{}({})", self.schema, self.name, args.join(", "))
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("signature", &self.signature())
            .field("defaults", &self.defaults.len())
            .field("strict", &self.strict)
            .field("returns_set", &self.returns_set)
            .field("return_type", &self.return_type)
            .finish()
    }
}

/// Registered composite types and functions.
///
/// Registration happens before loading starts; lookups afterwards go
/// through a shared reference. Row-type lookups are counted because each one
/// stands for a catalog lock acquisition.
#[derive(Default)]
pub struct FunctionCatalog {
    types: HashMap<TypeId, (String, Vec<Column>)>,
    functions: Vec<FunctionDef>,
    next_type: u32,
    row_type_lookups: AtomicU64,
}

impl FunctionCatalog {
    pub fn new() -> Self {
        Self {
            next_type: TypeId::FIRST_USER.0,
            ..Self::default()
        }
    }

    /// Register a composite type (e.g. a table's row type) and return its shape.
    pub fn register_type(&mut self, name: impl Into<String>, columns: Vec<Column>) -> RowShape {
        let id = TypeId(self.next_type.max(TypeId::FIRST_USER.0));
        self.next_type = id.0 + 1;
        let name = name.into();
        debug!(%id, %name, columns = columns.len(), "registered row type");
        self.types.insert(id, (name, columns.clone()));
        RowShape::new(id, columns)
    }

    pub fn register_function(&mut self, def: FunctionDef) {
        debug!(signature = %def.signature(), "registered function");
        self.functions.push(def);
    }

    /// Resolve a registered composite type into its shape.
    pub fn lookup_row_shape(&self, id: TypeId) -> Result<RowShape> {
        self.row_type_lookups.fetch_add(1, Ordering::Relaxed);
        self.types
            .get(&id)
            .map(|(_, columns)| RowShape::new(id, columns.clone()))
            .ok_or_else(|| ReaderError::NotFound(format!("type with id {id} does not exist")))
    }

    /// Whether `id` names a registered composite type.
    pub fn is_composite(&self, id: TypeId) -> bool {
        self.types.contains_key(&id)
    }

    /// Name of a registered composite type.
    pub fn type_name(&self, id: TypeId) -> Option<&str> {
        self.types.get(&id).map(|(name, _)| name.as_str())
    }

    /// Number of row-type lookups performed so far.
    pub fn row_type_lookups(&self) -> u64 {
        self.row_type_lookups.load(Ordering::Relaxed)
    }

    /// Functions named `name`, optionally restricted to `schema`, in
    /// registration order.
    pub fn candidates(&self, schema: Option<&str>, name: &str) -> Vec<&FunctionDef> {
        self.functions
            .iter()
            .filter(|f| {
                f.name.eq_ignore_ascii_case(name)
                    && schema.is_none_or(|s| f.schema.eq_ignore_ascii_case(s))
            })
            .collect()
    }
}

impl fmt::Debug for FunctionCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCatalog")
            .field("types", &self.types.len())
            .field("functions", &self.functions)
            .finish()
    }
}
