//! Error types for RCDB.
//!
//! Every rejected operation produces a distinguishable, strongly typed error.
//! Callers match on the variant to decide whether to retry with corrected
//! arguments, retry with `replace = true`, or surface the failure to an operator.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::condition::ConditionMismatch;
use crate::run::RunNumber;
use crate::value::{ConditionValue, ValueType};

/// Validation errors that occur during input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Name '{name}' contains characters outside [A-Za-z0-9_-]")]
    InvalidName {
        name: String,
    },

    #[error("Name '{name}' exceeds maximum length of {max_length}")]
    NameTooLong {
        name: String,
        max_length: usize,
    },

    #[error("Condition '{type_name}' holds {expected} values, got {actual}")]
    ValueTypeMismatch {
        type_name: String,
        expected: ValueType,
        actual: &'static str,
    },

    #[error("Statistic '{field}' for component '{component}' must be finite, got {value}")]
    NonFiniteStatistic {
        component: String,
        field: &'static str,
        value: f64,
    },

    #[error("Unknown value type '{tag}'")]
    UnknownValueType {
        tag: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Attribute-level difference between a stored condition type and a
/// re-registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinitionDiff {
    /// `(stored, requested)` value types, when they differ.
    pub value_type: Option<(ValueType, ValueType)>,
    /// `(stored, requested)` cardinality flags, when they differ.
    pub is_many_per_run: Option<(bool, bool)>,
}

impl TypeDefinitionDiff {
    /// Returns true if no attribute differs.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.value_type.is_none() && self.is_many_per_run.is_none()
    }
}

impl fmt::Display for TypeDefinitionDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        if let Some((stored, requested)) = self.value_type {
            write!(f, "value_type (stored={stored}, requested={requested})")?;
            first = false;
        }
        if let Some((stored, requested)) = self.is_many_per_run {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "is_many_per_run (stored={stored}, requested={requested})")?;
        }
        Ok(())
    }
}

fn fmt_time(time: Option<&DateTime<Utc>>) -> String {
    time.map_or_else(|| "none".to_string(), DateTime::to_rfc3339)
}

/// Execution errors that occur while applying an operation to the store.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Run not found: {run_number}")]
    RunNotFound {
        run_number: RunNumber,
    },

    #[error("Condition type not found: '{name}'")]
    ConditionTypeNotFound {
        name: String,
    },

    #[error("Condition type '{name}' already exists with a different definition: {diff}")]
    ConditionTypeConflict {
        name: String,
        diff: TypeDefinitionDiff,
    },

    #[error(
        "Condition '{type_name}' for run {run_number} already exists with a different {mismatch}: \
         stored value={stored_value} time={}, requested value={requested_value} time={} \
         (pass replace=true to overwrite)",
        fmt_time(.stored_time.as_ref()),
        fmt_time(.requested_time.as_ref())
    )]
    ConditionConflict {
        run_number: RunNumber,
        type_name: String,
        mismatch: ConditionMismatch,
        stored_value: ConditionValue,
        requested_value: ConditionValue,
        stored_time: Option<DateTime<Utc>>,
        requested_time: Option<DateTime<Utc>>,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
    },

    #[error("I/O error on '{path}': {message}")]
    Io {
        path: String,
        message: String,
    },
}

/// Top-level error type for RCDB.
#[derive(Debug, Error)]
pub enum RcdbError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl RcdbError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if a referenced run or condition type does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Execution(
                ExecutionError::RunNotFound { .. } | ExecutionError::ConditionTypeNotFound { .. }
            )
        )
    }

    /// Returns true if the operation was rejected because it would change
    /// existing data (type redefinition or condition overwrite).
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Execution(
                ExecutionError::ConditionTypeConflict { .. }
                    | ExecutionError::ConditionConflict { .. }
            )
        )
    }

    /// Returns true if this error came from the storage backend.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::Storage { .. } | ExecutionError::Io { .. })
        )
    }

    /// Returns true if retrying the same call with `replace = true` could succeed.
    #[must_use]
    pub const fn is_replaceable(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::ConditionConflict { .. }))
    }
}

/// Result type alias for RCDB operations.
pub type RcdbResult<T> = Result<T, RcdbError>;
