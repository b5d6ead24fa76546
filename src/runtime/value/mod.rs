//! Script values
//!
//! The values scripts store in their scope instance and hand back to the
//! scheduler. They are cheap to clone (strings are shared) and `Send`, since
//! they travel between a coroutine and the scheduler over channels.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// A script value
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// No value (undefined variables, degraded primitives)
    #[default]
    Void,

    /// Boolean
    Bool(bool),

    /// Integer
    Int(i64),

    /// Scalar
    Float(f64),

    /// 3D vector (positions, velocities)
    Vector([f64; 3]),

    /// Shared string
    String(Arc<str>),
}

impl Value {
    /// Name of the value's type, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "scalar",
            Value::Vector(_) => "vector",
            Value::String(_) => "string",
        }
    }

    /// Check for `Void`
    #[inline]
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// Truthiness used by conditions: `void`, `false`, zero and the empty
    /// string are false
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Void => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Vector(v) => v.iter().any(|c| *c != 0.0),
            Value::String(s) => !s.is_empty(),
        }
    }

    /// Boolean content
    #[inline]
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer content
    #[inline]
    pub fn to_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric content; integers widen to scalars
    #[inline]
    pub fn to_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Numeric content, `0.0` for anything that is not a number
    #[inline]
    pub fn as_f64(&self) -> f64 {
        self.to_float().unwrap_or(0.0)
    }

    /// Vector content
    #[inline]
    pub fn to_vector(&self) -> Option<[f64; 3]> {
        match self {
            Value::Vector(v) => Some(*v),
            _ => None,
        }
    }

    /// String content
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Vector([x, y, z]) => write!(f, "<{}, {}, {}>", x, y, z),
            Value::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<[f64; 3]> for Value {
    fn from(v: [f64; 3]) -> Self {
        Value::Vector(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Void
    }
}

#[cfg(test)]
mod tests;
