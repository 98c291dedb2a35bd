//! Condition types: the schema of a named condition.
//!
//! A condition type fixes two things for the lifetime of its name:
//! the shape of its values ([`ValueType`]) and its cardinality policy
//! (`is_many_per_run`). Re-registering a name with different attributes is a
//! conflict, never a silent redefinition.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{TypeDefinitionDiff, ValidationError};
use crate::id::uuid_id;
use crate::value::ValueType;

/// Default upper bound on condition type names.
pub const MAX_NAME_LENGTH: usize = 255;

uuid_id!(
    /// Unique identifier for a condition type.
    ConditionTypeId
);

static NAME_PATTERN: OnceLock<Regex> = OnceLock::new();

fn name_pattern() -> &'static Regex {
    NAME_PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_\-]+$").expect("name pattern is a valid regex literal")
    })
}

/// Validates a condition type name.
///
/// # Errors
/// Returns `EmptyName`, `NameTooLong`, or `InvalidName`.
pub fn validate_name(name: &str, max_length: usize) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > max_length {
        return Err(ValidationError::NameTooLong {
            name: name.to_string(),
            max_length,
        });
    }
    if !name_pattern().is_match(name) {
        return Err(ValidationError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Schema of a named condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionType {
    pub id: ConditionTypeId,
    pub name: String,
    pub value_type: ValueType,
    /// `false`: one (value, time) pair per run. `true`: one value per (run, time).
    pub is_many_per_run: bool,
    pub created_at: DateTime<Utc>,
}

impl ConditionType {
    /// Creates a new condition type with a validated name.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] if the name is empty, too long, or
    /// contains characters outside `[A-Za-z0-9_-]`.
    pub fn new(
        name: impl Into<String>,
        value_type: ValueType,
        is_many_per_run: bool,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_name(&name, MAX_NAME_LENGTH)?;
        Ok(Self {
            id: ConditionTypeId::new(),
            name,
            value_type,
            is_many_per_run,
            created_at: Utc::now(),
        })
    }

    /// Compares this stored definition against a requested one.
    ///
    /// Returns `None` when both attributes match.
    #[must_use]
    pub fn definition_diff(
        &self,
        value_type: ValueType,
        is_many_per_run: bool,
    ) -> Option<TypeDefinitionDiff> {
        let diff = TypeDefinitionDiff {
            value_type: (self.value_type != value_type).then_some((self.value_type, value_type)),
            is_many_per_run: (self.is_many_per_run != is_many_per_run)
                .then_some((self.is_many_per_run, is_many_per_run)),
        };
        if diff.is_empty() {
            None
        } else {
            Some(diff)
        }
    }

    /// Audit identifier of this type.
    #[must_use]
    pub fn log_id(&self) -> String {
        format!("condition_types_{}", self.id)
    }
}

/// How a caller names a condition type at the API boundary.
///
/// Resolved to a stored [`ConditionType`] before any reconciliation happens.
#[derive(Debug, Clone, Copy)]
pub enum TypeRef<'a> {
    Name(&'a str),
    Type(&'a ConditionType),
}

impl TypeRef<'_> {
    /// Name of the referenced type.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Type(ty) => &ty.name,
        }
    }
}

impl<'a> From<&'a str> for TypeRef<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a String> for TypeRef<'a> {
    fn from(name: &'a String) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a ConditionType> for TypeRef<'a> {
    fn from(ty: &'a ConditionType) -> Self {
        Self::Type(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("evt_count", MAX_NAME_LENGTH).is_ok());
        assert!(validate_name("component-stat_roc1", MAX_NAME_LENGTH).is_ok());
        assert!(matches!(
            validate_name("", MAX_NAME_LENGTH),
            Err(ValidationError::EmptyName)
        ));
        assert!(matches!(
            validate_name("bad name", MAX_NAME_LENGTH),
            Err(ValidationError::InvalidName { .. })
        ));
        assert!(matches!(
            validate_name("path/like", MAX_NAME_LENGTH),
            Err(ValidationError::InvalidName { .. })
        ));
        for name in ["beam_energy\n", "t\u{e9}mperature", "rate;drop"] {
            assert!(matches!(
                validate_name(name, MAX_NAME_LENGTH),
                Err(ValidationError::InvalidName { .. })
            ));
        }
        assert!(matches!(
            validate_name("abcdef", 5),
            Err(ValidationError::NameTooLong { max_length: 5, .. })
        ));
    }

    #[test]
    fn test_definition_diff() {
        let ct = ConditionType::new("evt_count", ValueType::Int, false).unwrap();
        assert!(ct.definition_diff(ValueType::Int, false).is_none());

        let diff = ct.definition_diff(ValueType::String, false).unwrap();
        assert_eq!(diff.value_type, Some((ValueType::Int, ValueType::String)));
        assert!(diff.is_many_per_run.is_none());

        let diff = ct.definition_diff(ValueType::Float, true).unwrap();
        assert!(diff.value_type.is_some());
        assert_eq!(diff.is_many_per_run, Some((false, true)));
    }

    #[test]
    fn test_type_ref_name() {
        let ct = ConditionType::new("beam_current", ValueType::Float, true).unwrap();
        assert_eq!(TypeRef::from(&ct).name(), "beam_current");
        assert_eq!(TypeRef::from("beam_current").name(), "beam_current");
    }
}
