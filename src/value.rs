//! Value types that conditions can hold.
//!
//! Every condition type declares a [`ValueType`] tag; every stored condition
//! carries a [`ConditionValue`] whose shape must match that tag.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Shape of the values stored under a condition type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Bool,
    Int,
    Float,
    String,
    /// Structured payload; `dict` is accepted as a tag alias.
    Json,
    Time,
}

impl ValueType {
    /// Textual tag used in messages and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Json => "json",
            Self::Time => "time",
        }
    }

    /// Fits `value` to this type.
    ///
    /// Returns the value to store, or `None` when the shapes are incompatible.
    /// Integers are widened when written to a float type.
    #[must_use]
    pub fn coerce(self, value: ConditionValue) -> Option<ConditionValue> {
        match (self, value) {
            (Self::Bool, v @ ConditionValue::Bool(_))
            | (Self::Int, v @ ConditionValue::Int(_))
            | (Self::Float, v @ ConditionValue::Float(_))
            | (Self::String, v @ ConditionValue::String(_))
            | (Self::Json, v @ ConditionValue::Json(_))
            | (Self::Time, v @ ConditionValue::Time(_)) => Some(v),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float, ConditionValue::Int(i)) => Some(ConditionValue::Float(i as f64)),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(Self::Bool),
            "int" | "integer" => Ok(Self::Int),
            "float" | "double" => Ok(Self::Float),
            "string" | "str" => Ok(Self::String),
            "json" | "dict" => Ok(Self::Json),
            "time" | "datetime" => Ok(Self::Time),
            other => Err(ValidationError::UnknownValueType {
                tag: other.to_string(),
            }),
        }
    }
}

/// Payload of a single condition entry.
///
/// # Examples
///
/// ```
/// use rcdb::ConditionValue;
///
/// let count = ConditionValue::from(1000);
/// assert_eq!(count.as_int(), Some(1000));
/// assert!(count.same_as(&ConditionValue::Int(1000)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConditionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(serde_json::Value),
    Time(DateTime<Utc>),
}

impl ConditionValue {
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Time(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
            Self::Time(_) => "time",
        }
    }

    /// Equality used by reconciliation.
    ///
    /// Identical to `==` except that two NaN floats are equal, so re-sending a
    /// NaN measurement is still an idempotent write.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Json(v) => write!(f, "{v}"),
            Self::Time(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<bool> for ConditionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for ConditionValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for ConditionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for ConditionValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f32> for ConditionValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for ConditionValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for ConditionValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for ConditionValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<serde_json::Value> for ConditionValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<DateTime<Utc>> for ConditionValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Time(v)
    }
}
