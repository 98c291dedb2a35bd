//! Audit log records.
//!
//! Every mutation performed through the engine appends a [`LogRecord`]
//! describing what changed, which records were touched, and which run it
//! relates to. Records are append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::uuid_id;
use crate::run::RunNumber;

uuid_id!(
    /// Unique identifier for a log record.
    LogRecordId
);

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: LogRecordId,
    /// `<table>_<id>` keys of the affected records.
    pub table_ids: Vec<String>,
    pub description: String,
    /// Run the change relates to; `None` for run-independent changes
    /// such as creating a condition type.
    pub related_run: Option<RunNumber>,
    pub created_at: DateTime<Utc>,
}

impl LogRecord {
    #[must_use]
    pub fn new(
        table_ids: Vec<String>,
        description: impl Into<String>,
        related_run: Option<RunNumber>,
    ) -> Self {
        Self {
            id: LogRecordId::new(),
            table_ids,
            description: description.into(),
            related_run,
            created_at: Utc::now(),
        }
    }

    /// Table keys joined the way they are shown to operators.
    #[must_use]
    pub fn table_ids_text(&self) -> String {
        self.table_ids.join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ids_text() {
        let record = LogRecord::new(
            vec!["boards_1".to_string(), "dac_presets_2".to_string()],
            "Board conf created",
            Some(RunNumber::new(3)),
        );
        assert_eq!(record.table_ids_text(), "boards_1;dac_presets_2");
        assert_eq!(record.related_run, Some(RunNumber::new(3)));
    }
}
