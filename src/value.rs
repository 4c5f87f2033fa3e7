//! Dynamic values carried as call parameters and response payloads.
//!
//! Remote services take a mapping of named parameters and answer with an
//! arbitrary payload, so both sides of a call are expressed with [`Value`].
//! Parameter mappings are always keyed by strings: every conversion from
//! key/value pairs stringifies its keys.
//!
//! # Equality
//!
//! `Value` implements [`Eq`] and [`Hash`] so it can key the stored response
//! registry. Floats compare and hash by bit pattern, which keeps the two
//! consistent (a `NaN` equals itself, `0.0` and `-0.0` differ).
use std::{
    collections::BTreeMap,
    fmt,
    hash::{Hash, Hasher},
};

use bincode::{Decode, Encode};

use crate::Error;

/// Named call parameters.
pub type Params = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, Encode, Decode)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(Params),
}

impl Value {
    /// An empty mapping; the payload of a default response.
    pub fn empty_map() -> Self {
        Value::Map(Params::new())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Params> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Converts into a parameter mapping. `Null` is treated as no params.
    ///
    /// # Errors
    /// [`Error::Validation`] when the value is neither a map nor null.
    pub fn into_params(self) -> Result<Params, Error> {
        match self {
            Value::Map(map) => Ok(map),
            Value::Null => Ok(Params::new()),
            other => Err(Error::Validation(format!(
                "expected params to be a map instead of a {}",
                other.kind()
            ))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::List(items) => items.hash(state),
            Value::Map(map) => map.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => write_params(f, map),
        }
    }
}

/// Writes params as `{"key": value, ...}`.
pub(crate) fn write_params(f: &mut impl fmt::Write, params: &Params) -> fmt::Result {
    write!(f, "{{")?;
    for (i, (key, value)) in params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{key:?}: {value}")?;
    }
    write!(f, "}}")
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

macro_rules! from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Value::Int(value as i64)
                }
            }
        )*
    };
}

from_int!(i8, i16, i32, i64, isize, u8, u16, u32);

macro_rules! from_wide_uint {
    ($($t:ty),*) => {
        $(
            /// Values above `i64::MAX` become the nearest [`Value::Float`].
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    match i64::try_from(value) {
                        Ok(i) => Value::Int(i),
                        Err(_) => Value::Float(value as f64),
                    }
                }
            }
        )*
    };
}

from_wide_uint!(u64, usize);

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<Params> for Value {
    fn from(value: Params) -> Self {
        Value::Map(value)
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Value {
    fn from(pairs: [(K, V); N]) -> Self {
        Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
