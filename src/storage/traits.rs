//! Abstract storage traits for RCDB.
//!
//! These traits define the contract that storage backends must implement.
//! Backends enforce the uniqueness constraints listed on each trait as hard
//! constraints: a violating insert fails with [`StorageError::DuplicateKey`]
//! instead of creating a second row.

use thiserror::Error;

use crate::audit::LogRecord;
use crate::condition::{Condition, ConditionId};
use crate::condition_type::{ConditionType, ConditionTypeId};
use crate::config_file::{ConfigurationFile, ConfigurationFileId};
use crate::hardware::{
    Board, BoardConfiguration, BoardId, BoardInstallation, Crate, CrateId, DacPreset,
    DacPresetId,
};
use crate::run::{Run, RunNumber};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Record not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Storage for runs. Unique on run number.
pub trait RunStore: Send + Sync {
    /// Insert a new run. Returns `DuplicateKey` if the number exists.
    fn insert(&self, run: Run) -> Result<(), StorageError>;

    /// Get a run by number.
    fn get(&self, number: RunNumber) -> Result<Option<Run>, StorageError>;

    /// Replace a stored run. Returns `NotFound` if absent.
    fn update(&self, run: Run) -> Result<(), StorageError>;

    /// All runs, ascending by number.
    fn list(&self) -> Result<Vec<Run>, StorageError>;
}

/// Storage for condition types. Unique on name.
pub trait ConditionTypeStore: Send + Sync {
    /// Insert a new type. Returns `DuplicateKey` if the id or name exists.
    fn insert(&self, ty: ConditionType) -> Result<(), StorageError>;

    /// Get a type by ID.
    fn get(&self, id: ConditionTypeId) -> Result<Option<ConditionType>, StorageError>;

    /// Get a type by exact name.
    fn find_by_name(&self, name: &str) -> Result<Option<ConditionType>, StorageError>;

    /// All types, sorted by name.
    fn list(&self) -> Result<Vec<ConditionType>, StorageError>;
}

/// Storage for condition entries.
///
/// Unique on (run, type) when `is_many_per_run` is false and on
/// (run, type, time) when it is true, with `time = None` as its own key.
///
/// Stores do not see condition types, so the cardinality policy arrives with
/// each insert.
pub trait ConditionStore: Send + Sync {
    /// Insert a new entry under the given cardinality policy.
    ///
    /// `is_many_per_run` must be the flag of the entry's condition type. With
    /// `false` any existing entry for (run, type) is a `DuplicateKey`,
    /// whatever its time; with `true` only an entry at the same time is. A
    /// caller passing `true` for a single-valued type bypasses the (run, type)
    /// constraint.
    fn insert(&self, condition: Condition, is_many_per_run: bool) -> Result<(), StorageError>;

    /// Get an entry by ID.
    fn get(&self, id: ConditionId) -> Result<Option<Condition>, StorageError>;

    /// Overwrite a stored entry's value and time.
    ///
    /// The run and type of the entry must not change. Returns `NotFound` if
    /// absent, `DuplicateKey` if the new time collides with a sibling entry.
    fn update(&self, condition: Condition) -> Result<(), StorageError>;

    /// Entries for (run, type), in insertion order.
    fn find_by_run_type(
        &self,
        run: RunNumber,
        type_id: ConditionTypeId,
    ) -> Result<Vec<Condition>, StorageError>;

    /// All entries for a run, in insertion order.
    fn find_by_run(&self, run: RunNumber) -> Result<Vec<Condition>, StorageError>;
}

/// Storage for hardware inventory, keyed by natural identity.
pub trait HardwareStore: Send + Sync {
    /// Unique on (board type, serial).
    fn insert_board(&self, board: Board) -> Result<(), StorageError>;
    fn find_board(&self, board_type: &str, serial: &str) -> Result<Option<Board>, StorageError>;

    /// Unique on name.
    fn insert_crate(&self, unit: Crate) -> Result<(), StorageError>;
    fn find_crate(&self, name: &str) -> Result<Option<Crate>, StorageError>;

    /// Unique on (crate, board, slot).
    fn insert_installation(&self, installation: BoardInstallation) -> Result<(), StorageError>;
    fn find_installation(
        &self,
        crate_id: CrateId,
        board_id: BoardId,
        slot: u32,
    ) -> Result<Option<BoardInstallation>, StorageError>;

    /// Unique on (board, values).
    fn insert_dac_preset(&self, preset: DacPreset) -> Result<(), StorageError>;
    fn find_dac_preset(
        &self,
        board_id: BoardId,
        values: &[i64],
    ) -> Result<Option<DacPreset>, StorageError>;

    /// Unique on (board, preset).
    fn insert_board_configuration(&self, config: BoardConfiguration) -> Result<(), StorageError>;
    fn find_board_configuration(
        &self,
        board_id: BoardId,
        dac_preset_id: DacPresetId,
    ) -> Result<Option<BoardConfiguration>, StorageError>;
}

/// Storage for archived configuration files. Unique on (checksum, path).
pub trait ConfigFileStore: Send + Sync {
    fn insert(&self, file: ConfigurationFile) -> Result<(), StorageError>;

    fn get(&self, id: ConfigurationFileId) -> Result<Option<ConfigurationFile>, StorageError>;

    fn find(&self, checksum: &str, path: &str) -> Result<Option<ConfigurationFile>, StorageError>;
}

/// Append-only audit log.
pub trait LogStore: Send + Sync {
    fn append(&self, record: LogRecord) -> Result<(), StorageError>;

    /// Records related to a run, oldest first.
    fn find_by_run(&self, run: RunNumber) -> Result<Vec<LogRecord>, StorageError>;

    /// Every record, oldest first.
    fn list(&self) -> Result<Vec<LogRecord>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure traits are object-safe
    fn _assert_run_store_object_safe(_: &dyn RunStore) {}
    fn _assert_type_store_object_safe(_: &dyn ConditionTypeStore) {}
    fn _assert_condition_store_object_safe(_: &dyn ConditionStore) {}
    fn _assert_hardware_store_object_safe(_: &dyn HardwareStore) {}
    fn _assert_file_store_object_safe(_: &dyn ConfigFileStore) {}
    fn _assert_log_store_object_safe(_: &dyn LogStore) {}

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::DuplicateKey("conditions(run=1, type=x)".to_string());
        assert!(err.to_string().contains("Duplicate key"));

        let err = StorageError::BackendError("poisoned lock".to_string());
        assert!(err.to_string().contains("poisoned lock"));
    }
}
