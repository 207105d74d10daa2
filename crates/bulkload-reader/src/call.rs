//! Function call expressions used as function-parser locators.
//!
//! A locator such as `public.make_rows(10, 'a b', NULL)` names a function and
//! gives its arguments as untyped literals. Resolution picks the single
//! registered function whose input parameters can absorb that many arguments,
//! counting variadic expansion and trailing defaults.

use crate::catalog::{FunctionCatalog, FunctionDef, FUNC_MAX_ARGS};
use crate::error::{ReaderError, Result};

/// A parsed call expression. `None` arguments are `NULL` literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallExpr {
    pub schema: Option<String>,
    pub name: String,
    pub args: Vec<Option<String>>,
}

/// A call bound to one function.
#[derive(Debug, Clone)]
pub struct ResolvedCall<'a> {
    pub def: &'a FunctionDef,
    /// Literal arguments as written.
    pub args: Vec<Option<String>>,
    /// How many trailing literals feed the variadic parameter.
    pub nvargs: usize,
    /// How many trailing parameters take their default.
    pub ndargs: usize,
}

impl ResolvedCall<'_> {
    /// Literals bound to fixed (non-variadic) parameters.
    pub fn fixed_args(&self) -> &[Option<String>] {
        &self.args[..self.args.len() - self.nvargs]
    }

    /// Literals packed into the variadic array.
    pub fn variadic_args(&self) -> &[Option<String>] {
        &self.args[self.args.len() - self.nvargs..]
    }
}

/// Parse `[schema.]name(arg, ...)`.
pub fn parse_call(text: &str) -> Result<CallExpr> {
    let mut lexer = Lexer::new(text);
    let first = lexer.identifier()?;
    let (schema, name) = if lexer.eat('.') {
        (Some(first), lexer.identifier()?)
    } else {
        (None, first)
    };

    if !lexer.eat('(') {
        return Err(syntax_error(text, "expected '('"));
    }

    let mut args = Vec::new();
    if !lexer.eat(')') {
        loop {
            args.push(lexer.literal()?);
            if args.len() > FUNC_MAX_ARGS {
                return Err(ReaderError::ResourceLimitExceeded(format!(
                    "cannot pass more than {FUNC_MAX_ARGS} arguments to a function"
                )));
            }
            if lexer.eat(',') {
                continue;
            }
            if lexer.eat(')') {
                break;
            }
            return Err(syntax_error(text, "expected ',' or ')'"));
        }
    }

    if !lexer.at_end() {
        return Err(syntax_error(text, "unexpected text after ')'"));
    }

    Ok(CallExpr { schema, name, args })
}

/// Pick the function `call` refers to.
pub fn resolve<'a>(catalog: &'a FunctionCatalog, call: &CallExpr) -> Result<ResolvedCall<'a>> {
    let nargs = call.args.len();
    let mut matches = catalog
        .candidates(call.schema.as_deref(), &call.name)
        .into_iter()
        .filter_map(|def| fit(def, nargs).map(|(nvargs, ndargs)| (def, nvargs, ndargs)));

    let display = display_name(call);
    let Some((def, nvargs, ndargs)) = matches.next() else {
        return Err(ReaderError::NotFound(format!(
            "function {display} with {nargs} argument(s) does not exist"
        )));
    };
    if let Some((other, _, _)) = matches.next() {
        return Err(ReaderError::AmbiguousReference(format!(
            "function {display} is not unique: {} and {}",
            def.signature(),
            other.signature()
        )));
    }

    Ok(ResolvedCall {
        def,
        args: call.args.clone(),
        nvargs,
        ndargs,
    })
}

/// How `nargs` literals map onto `def`: (variadic count, defaulted count).
fn fit(def: &FunctionDef, nargs: usize) -> Option<(usize, usize)> {
    let ninputs = def.input_count();
    if def.variadic_elem().is_some() {
        // At least one literal must feed the variadic parameter.
        let nfixed = ninputs - 1;
        return (nargs > nfixed).then(|| (nargs - nfixed, 0));
    }
    if nargs == ninputs {
        return Some((0, 0));
    }
    if nargs < ninputs && ninputs - nargs <= def.defaults.len() {
        return Some((0, ninputs - nargs));
    }
    None
}

fn display_name(call: &CallExpr) -> String {
    match &call.schema {
        Some(schema) => format!("{schema}.{}", call.name),
        None => call.name.clone(),
    }
}

fn syntax_error(text: &str, detail: &str) -> ReaderError {
    ReaderError::Configuration(format!("invalid function call \"{text}\": {detail}"))
}

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.text.len() - trimmed.len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.rest().chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    /// Bare identifier (folded to lower case) or double-quoted identifier.
    fn identifier(&mut self) -> Result<String> {
        match self.peek() {
            Some('"') => {
                self.pos += 1;
                self.quoted('"')
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let rest = self.rest();
                let end = rest
                    .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
                    .unwrap_or(rest.len());
                self.pos += end;
                Ok(rest[..end].to_lowercase())
            }
            _ => Err(syntax_error(self.text, "expected function name")),
        }
    }

    /// Quoted string literal, bare token, or NULL.
    fn literal(&mut self) -> Result<Option<String>> {
        match self.peek() {
            Some('\'') => {
                self.pos += 1;
                self.quoted('\'').map(Some)
            }
            Some(',') | Some(')') | None => Err(syntax_error(self.text, "missing argument")),
            Some(_) => {
                let rest = self.rest();
                let end = rest.find([',', ')']).unwrap_or(rest.len());
                self.pos += end;
                let token = rest[..end].trim();
                if token.eq_ignore_ascii_case("null") {
                    Ok(None)
                } else {
                    Ok(Some(token.to_string()))
                }
            }
        }
    }

    /// Body of a quoted token after the opening quote; a doubled quote
    /// stands for itself.
    fn quoted(&mut self, quote: char) -> Result<String> {
        let mut out = String::new();
        let mut chars = self.rest().char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == quote {
                if matches!(chars.peek(), Some((_, next)) if *next == quote) {
                    chars.next();
                    out.push(quote);
                    continue;
                }
                self.pos += i + c.len_utf8();
                return Ok(out);
            }
            out.push(c);
        }
        Err(syntax_error(self.text, "unterminated quoted string"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{set_function, DefaultValue, ReturnType};
    use crate::types::{DataType, Datum};

    fn body() -> Box<dyn crate::catalog::SetFunction> {
        set_function(|_, _| Ok(Datum::Null))
    }

    #[test]
    fn parses_names_and_literals() {
        let call = parse_call(r#" Public."MixedCase" ( 1, 'it''s', NULL, -2.5 ,'NULL') "#).unwrap();
        assert_eq!(call.schema.as_deref(), Some("public"));
        assert_eq!(call.name, "MixedCase");
        assert_eq!(
            call.args,
            vec![
                Some("1".to_string()),
                Some("it's".to_string()),
                None,
                Some("-2.5".to_string()),
                Some("NULL".to_string()),
            ]
        );
    }

    #[test]
    fn parses_empty_argument_list() {
        let call = parse_call("f()").unwrap();
        assert!(call.args.is_empty());
        assert!(call.schema.is_none());
    }

    #[test]
    fn rejects_malformed_calls() {
        for text in ["", "f", "f(", "f(1", "f(1,)", "f('x)", "f() trailing", "1f()"] {
            assert!(
                matches!(parse_call(text), Err(ReaderError::Configuration(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn too_many_literals_hit_the_limit() {
        let args = vec!["1"; FUNC_MAX_ARGS + 1].join(",");
        let err = parse_call(&format!("f({args})")).unwrap_err();
        assert!(matches!(err, ReaderError::ResourceLimitExceeded(_)));
    }

    fn catalog() -> FunctionCatalog {
        let mut catalog = FunctionCatalog::new();
        catalog.register_function(
            FunctionDef::new("one", ReturnType::Record, body).arg(DataType::Int4),
        );
        catalog.register_function(
            FunctionDef::new("var", ReturnType::Record, body)
                .arg(DataType::Int4)
                .variadic(DataType::Text),
        );
        catalog.register_function(
            FunctionDef::new("dflt", ReturnType::Record, body)
                .arg(DataType::Int4)
                .arg(DataType::Int4)
                .arg(DataType::Text)
                .default_arg(|| DefaultValue::Single(Datum::Int4(0)))
                .default_arg(|| DefaultValue::Single(Datum::Text("x".into()))),
        );
        catalog.register_function(
            FunctionDef::new("dup", ReturnType::Record, body).arg(DataType::Int4),
        );
        catalog.register_function(
            FunctionDef::new("dup", ReturnType::Record, body).arg(DataType::Text),
        );
        catalog
    }

    #[test]
    fn resolves_exact_variadic_and_default_forms() {
        let catalog = catalog();

        let exact = resolve(&catalog, &parse_call("one(1)").unwrap()).unwrap();
        assert_eq!((exact.nvargs, exact.ndargs), (0, 0));

        let var = resolve(&catalog, &parse_call("var(1, 'a', 'b', NULL)").unwrap()).unwrap();
        assert_eq!(var.nvargs, 3);
        assert_eq!(var.fixed_args(), &[Some("1".to_string())]);
        assert_eq!(var.variadic_args().len(), 3);

        let dflt = resolve(&catalog, &parse_call("dflt(1)").unwrap()).unwrap();
        assert_eq!(dflt.ndargs, 2);
    }

    #[test]
    fn resolution_failures() {
        let catalog = catalog();
        assert!(matches!(
            resolve(&catalog, &parse_call("missing()").unwrap()),
            Err(ReaderError::NotFound(_))
        ));
        assert!(matches!(
            resolve(&catalog, &parse_call("one(1, 2)").unwrap()),
            Err(ReaderError::NotFound(_))
        ));
        assert!(matches!(
            resolve(&catalog, &parse_call("var(1)").unwrap()),
            Err(ReaderError::NotFound(_))
        ));
        assert!(matches!(
            resolve(&catalog, &parse_call("dup(1)").unwrap()),
            Err(ReaderError::AmbiguousReference(_))
        ));
    }
}
