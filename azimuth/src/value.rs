//! Loosely typed option values.
//!
//! Markup attributes resolve to anything from a plain string to an object literal or a function
//! supplied by the surrounding scope. [`OptionValue`] is the one type that can hold all of them;
//! builders pick the shapes they understand with the `as_*` accessors.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Mapping from option key to value.
pub type OptionMap = BTreeMap<String, OptionValue>;

/// A function-valued option, e.g. a style function or an event handler.
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn(&[OptionValue]) -> OptionValue + Send + Sync>);

impl Callback {
    /// Wraps a closure.
    pub fn new(f: impl Fn(&[OptionValue]) -> OptionValue + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invokes the callback with the given arguments.
    pub fn call(&self, args: &[OptionValue]) -> OptionValue {
        (self.0)(args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Arc::as_ptr(&self.0))
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Value of a single layer or map option.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OptionValue {
    /// Absent or explicitly null value.
    #[default]
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Any number.
    Number(f64),
    /// Text.
    String(String),
    /// Ordered list.
    List(Vec<OptionValue>),
    /// Structured object.
    Object(OptionMap),
    /// Function supplied by the scope.
    Callback(Callback),
}

impl OptionValue {
    /// Returns the text if the value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a number. Strings holding a number are converted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the flag if the value is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the items if the value is a list.
    pub fn as_list(&self) -> Option<&[OptionValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the entries if the value is an object.
    pub fn as_object(&self) -> Option<&OptionMap> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the callback if the value is function-valued.
    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            Self::Callback(cb) => Some(cb),
            _ => None,
        }
    }

    /// Truthiness as markup authors expect it: `false`, `0`, `NaN`, `""` and null are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::List(_) | Self::Object(_) | Self::Callback(_) => true,
        }
    }

    /// Whether the value is a number or a string that reads as one.
    pub fn is_numeric(&self) -> bool {
        match self {
            Self::Number(n) => !n.is_nan(),
            Self::String(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        }
    }

    /// Formats the value for use inside a URL or a request parameter.
    pub fn to_param_string(&self) -> String {
        match self {
            Self::Null | Self::Callback(_) => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::List(items) => items
                .iter()
                .map(Self::to_param_string)
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) => self.to_json().to_string(),
        }
    }

    /// Converts into JSON. Callbacks have no JSON form and become null.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null | Self::Callback(_) => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<serde_json::Value> for OptionValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<OptionValue>> for OptionValue {
    fn from(value: Vec<OptionValue>) -> Self {
        Self::List(value)
    }
}

impl From<OptionMap> for OptionValue {
    fn from(value: OptionMap) -> Self {
        Self::Object(value)
    }
}

impl From<Callback> for OptionValue {
    fn from(value: Callback) -> Self {
        Self::Callback(value)
    }
}
