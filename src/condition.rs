//! Condition values attached to runs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition_type::ConditionTypeId;
use crate::id::uuid_id;
use crate::run::RunNumber;
use crate::value::ConditionValue;

uuid_id!(
    /// Unique identifier for a stored condition entry.
    ConditionId
);

/// A concrete value of a condition type for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: ConditionId,
    pub run_number: RunNumber,
    pub type_id: ConditionTypeId,
    pub value: ConditionValue,
    /// `None` is the untimed slot, a key value of its own.
    pub time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Condition {
    /// Creates a new condition entry.
    #[must_use]
    pub fn new(
        run_number: RunNumber,
        type_id: ConditionTypeId,
        value: ConditionValue,
        time: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ConditionId::new(),
            run_number,
            type_id,
            value,
            time,
            created_at: now,
            updated_at: now,
        }
    }

    /// Audit identifier of this entry.
    #[must_use]
    pub fn log_id(&self) -> String {
        format!("conditions_{}", self.id)
    }
}

/// Which stored fields differ from a rejected write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionMismatch {
    Value,
    Time,
    ValueAndTime,
}

impl ConditionMismatch {
    /// Classifies a mismatch, or `None` when nothing differs.
    #[must_use]
    pub const fn from_flags(value_differs: bool, time_differs: bool) -> Option<Self> {
        match (value_differs, time_differs) {
            (true, true) => Some(Self::ValueAndTime),
            (true, false) => Some(Self::Value),
            (false, true) => Some(Self::Time),
            (false, false) => None,
        }
    }
}

impl fmt::Display for ConditionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => write!(f, "value"),
            Self::Time => write!(f, "time"),
            Self::ValueAndTime => write!(f, "value and time"),
        }
    }
}

/// What a successful write did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// A new entry was created.
    Inserted,
    /// An identical entry already existed; nothing was written.
    Unchanged,
    /// An existing entry was overwritten under `replace`.
    Replaced,
}

/// Result of `write_condition`: the stored entry and what happened to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionWrite {
    pub condition: Condition,
    pub outcome: WriteOutcome,
}

impl ConditionWrite {
    /// Returns true if the store was mutated.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        !matches!(self.outcome, WriteOutcome::Unchanged)
    }
}

/// Result of `read_condition`.
///
/// Single-valued types yield at most one entry; multi-valued types yield the
/// full insertion-ordered collection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionRead {
    Single(Option<Condition>),
    Many(Vec<Condition>),
}

impl ConditionRead {
    /// Returns the single entry of a single-valued read.
    ///
    /// For a multi-valued read this is `None`; use [`Self::into_vec`].
    #[must_use]
    pub fn single(&self) -> Option<&Condition> {
        match self {
            Self::Single(condition) => condition.as_ref(),
            Self::Many(_) => None,
        }
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(condition) => condition.is_none(),
            Self::Many(conditions) => conditions.is_empty(),
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(condition) => usize::from(condition.is_some()),
            Self::Many(conditions) => conditions.len(),
        }
    }

    /// Flattens either shape into a collection.
    #[must_use]
    pub fn into_vec(self) -> Vec<Condition> {
        match self {
            Self::Single(condition) => condition.into_iter().collect(),
            Self::Many(conditions) => conditions,
        }
    }
}
