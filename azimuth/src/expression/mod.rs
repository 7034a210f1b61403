//! Resolution of attribute strings into option values.
//!
//! Attribute values may be plain text (`roads`, `EPSG:3857`, `image/png`), JSON-like literals
//! (`true`, `[1, 2]`, `{transparent: true}`) or small expressions that read from the surrounding
//! [`Scope`] (`styles.roads`, `onClick($event)`). Resolution never fails: an attribute that does
//! not evaluate is kept as its raw text, see [`Resolution`].

use std::collections::BTreeMap;

use thiserror::Error;

use crate::value::{OptionMap, OptionValue};

mod parser;

use parser::{Expr, Parser};

/// Error evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    /// Expression contains nothing but whitespace.
    #[error("empty expression")]
    Empty,
    /// Character that cannot start any token.
    #[error("unexpected character `{ch}` at {pos}")]
    UnexpectedChar {
        /// Offending character.
        ch: char,
        /// Byte offset.
        pos: usize,
    },
    /// Token that does not fit the grammar at this point.
    #[error("unexpected token `{token}` at {pos}")]
    UnexpectedToken {
        /// Offending token.
        token: String,
        /// Byte offset.
        pos: usize,
    },
    /// Input ended in the middle of an expression.
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    /// String literal without closing quote.
    #[error("unterminated string starting at {pos}")]
    UnterminatedString {
        /// Byte offset of the opening quote.
        pos: usize,
    },
    /// Malformed numeric literal.
    #[error("invalid number at {pos}")]
    InvalidNumber {
        /// Byte offset.
        pos: usize,
    },
    /// Brackets, parentheses or unary minus nested beyond the parser's limit.
    #[error("expression nested too deeply at {pos}")]
    TooDeep {
        /// Byte offset of the token exceeding the limit.
        pos: usize,
    },
    /// Identifier is neither a local nor a scope variable.
    #[error("`{0}` is not defined")]
    UnknownIdentifier(String),
    /// Call of a value that is not a callback.
    #[error("value is not callable")]
    NotCallable,
}

/// Outcome of resolving one attribute string.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The string evaluated to a value.
    Resolved(OptionValue),
    /// The string did not evaluate and is used verbatim.
    Literal(String),
}

impl Resolution {
    /// Returns the value to store in the option record.
    pub fn into_value(self) -> OptionValue {
        match self {
            Self::Resolved(value) => value,
            Self::Literal(raw) => OptionValue::String(raw),
        }
    }
}

/// Variables visible to attribute expressions.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    variables: OptionMap,
}

impl Scope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Reads a variable.
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.variables.get(name)
    }
}

/// Parsed expression that can be evaluated many times, e.g. an event binding.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    expr: Expr,
}

impl Expression {
    /// Parses the expression.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        Ok(Self {
            source: source.to_string(),
            expr: Parser::parse(source)?,
        })
    }

    /// Source text of the expression.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression. Identifiers are looked up in `locals` first, then in `scope`.
    pub fn evaluate(
        &self,
        scope: &Scope,
        locals: Option<&OptionMap>,
    ) -> Result<OptionValue, ExpressionError> {
        Evaluation { scope, locals }.eval(&self.expr)
    }
}

struct Evaluation<'a> {
    scope: &'a Scope,
    locals: Option<&'a OptionMap>,
}

impl Evaluation<'_> {
    fn eval(&self, expr: &Expr) -> Result<OptionValue, ExpressionError> {
        Ok(match expr {
            Expr::Null => OptionValue::Null,
            Expr::Bool(b) => OptionValue::Bool(*b),
            Expr::Number(n) => OptionValue::Number(*n),
            Expr::String(s) => OptionValue::String(s.clone()),
            Expr::Identifier(name) => self
                .locals
                .and_then(|locals| locals.get(name))
                .or_else(|| self.scope.get(name))
                .cloned()
                .ok_or_else(|| ExpressionError::UnknownIdentifier(name.clone()))?,
            Expr::Array(items) => OptionValue::List(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Object(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value)?);
                }
                OptionValue::Object(map)
            }
            Expr::Member(target, name) => member(&self.eval(target)?, name),
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                match self.eval(index)? {
                    OptionValue::Number(n) if n >= 0.0 && n.fract() == 0.0 => target
                        .as_list()
                        .and_then(|items| items.get(n as usize))
                        .cloned()
                        .unwrap_or_default(),
                    OptionValue::Number(_) => OptionValue::Null,
                    key => member(&target, &key.to_param_string()),
                }
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee)?;
                let callback = callee.as_callback().ok_or(ExpressionError::NotCallable)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                callback.call(&args)
            }
            Expr::Negate(inner) => match self.eval(inner)?.as_f64() {
                Some(n) => OptionValue::Number(-n),
                None => OptionValue::Number(f64::NAN),
            },
        })
    }
}

fn member(target: &OptionValue, name: &str) -> OptionValue {
    match target {
        OptionValue::Object(map) => map.get(name).cloned().unwrap_or_default(),
        OptionValue::List(items) if name == "length" => OptionValue::Number(items.len() as f64),
        OptionValue::String(s) if name == "length" => OptionValue::Number(s.chars().count() as f64),
        _ => OptionValue::Null,
    }
}

/// Evaluates attribute strings against a scope.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluates `expression` with optional local variables shadowing the scope.
    fn evaluate(
        &self,
        expression: &str,
        scope: &Scope,
        locals: Option<&OptionMap>,
    ) -> Result<OptionValue, ExpressionError>;

    /// Resolves an attribute string, falling back to the raw text when it does not evaluate.
    fn resolve(&self, raw: &str, scope: &Scope) -> Resolution {
        match self.evaluate(raw, scope, None) {
            Ok(value) => Resolution::Resolved(value),
            Err(err) => {
                log::trace!("Using `{raw}` literally: {err}");
                Resolution::Literal(raw.to_string())
            }
        }
    }
}

/// Evaluator for the expression language described in the module docs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEvaluator;

impl ExpressionEvaluator for DefaultEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        scope: &Scope,
        locals: Option<&OptionMap>,
    ) -> Result<OptionValue, ExpressionError> {
        Expression::parse(expression)?.evaluate(scope, locals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Callback;

    fn resolve(raw: &str, scope: &Scope) -> Resolution {
        DefaultEvaluator.resolve(raw, scope)
    }

    #[test]
    fn literals_resolve() {
        let scope = Scope::new();
        assert_eq!(
            resolve("true", &scope),
            Resolution::Resolved(OptionValue::Bool(true))
        );
        assert_eq!(
            resolve("'EPSG:900913'", &scope),
            Resolution::Resolved("EPSG:900913".into())
        );
        assert_eq!(
            resolve("[1, 2]", &scope),
            Resolution::Resolved(OptionValue::List(vec![1.into(), 2.into()]))
        );
    }

    #[test]
    fn unresolvable_text_is_literal() {
        let scope = Scope::new();
        assert_eq!(resolve("roads", &scope), Resolution::Literal("roads".into()));
        assert_eq!(
            resolve("image/png", &scope).into_value(),
            OptionValue::from("image/png")
        );
    }

    #[test]
    fn reads_scope_paths() {
        let mut styles = OptionMap::new();
        styles.insert("roads".into(), "red".into());
        let scope = Scope::new().with("styles", styles);

        assert_eq!(
            resolve("styles.roads", &scope),
            Resolution::Resolved("red".into())
        );
        assert_eq!(
            resolve("styles['roads']", &scope),
            Resolution::Resolved("red".into())
        );
        assert_eq!(
            resolve("styles.missing", &scope),
            Resolution::Resolved(OptionValue::Null)
        );
    }

    #[test]
    fn list_index_must_be_natural() {
        let scope = Scope::new().with("list", OptionValue::List(vec!["a".into(), "b".into()]));
        assert_eq!(resolve("list[1]", &scope), Resolution::Resolved("b".into()));
        assert_eq!(
            resolve("list[-1]", &scope),
            Resolution::Resolved(OptionValue::Null)
        );
        assert_eq!(
            resolve("list[0.5]", &scope),
            Resolution::Resolved(OptionValue::Null)
        );
        assert_eq!(
            resolve("list[-'x']", &scope),
            Resolution::Resolved(OptionValue::Null)
        );
    }

    #[test]
    fn deep_nesting_is_literal() {
        let raw = "[".repeat(5000);
        assert_eq!(resolve(&raw, &Scope::new()), Resolution::Literal(raw));
    }

    #[test]
    fn locals_shadow_scope_and_callbacks_run() {
        let echo = Callback::new(|args| args.first().cloned().unwrap_or_default());
        let scope = Scope::new().with("echo", echo).with("x", 1);
        let mut locals = OptionMap::new();
        locals.insert("x".into(), 2.into());

        let expr = Expression::parse("echo(x)").unwrap();
        assert_eq!(
            expr.evaluate(&scope, Some(&locals)).unwrap(),
            OptionValue::Number(2.0)
        );
        assert_eq!(expr.evaluate(&scope, None).unwrap(), OptionValue::Number(1.0));
    }

    #[test]
    fn calling_non_callback_fails() {
        let scope = Scope::new().with("x", 1);
        assert_eq!(
            DefaultEvaluator.evaluate("x()", &scope, None),
            Err(ExpressionError::NotCallable)
        );
    }
}
