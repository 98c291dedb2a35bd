//! The RCDB engine.
//!
//! [`RcdbEngine`] holds injected store handles and applies every public
//! operation against them. Mutating operations run under a write gate shared
//! by all clones of the engine, which makes each check-then-act sequence
//! atomic for writers going through that engine. The stores' uniqueness
//! constraints catch anything that bypasses it.

mod files;
mod hardware;
mod registry;
mod runs;
mod write_path;

use std::sync::{Arc, Mutex, MutexGuard};

pub use write_path::COMPONENT_STAT_PREFIX;

use crate::audit::LogRecord;
use crate::condition_type::MAX_NAME_LENGTH;
use crate::error::{ExecutionError, RcdbError, RcdbResult, ValidationError};
use crate::run::RunNumber;
use crate::storage::memory::InMemoryStores;
use crate::storage::{
    ConditionStore, ConditionTypeStore, ConfigFileStore, HardwareStore, LogStore, RunStore,
    StorageError,
};

/// Trait-object handles to every store the engine uses.
#[derive(Clone)]
pub struct StoreHandles {
    pub runs: Arc<dyn RunStore>,
    pub condition_types: Arc<dyn ConditionTypeStore>,
    pub conditions: Arc<dyn ConditionStore>,
    pub hardware: Arc<dyn HardwareStore>,
    pub files: Arc<dyn ConfigFileStore>,
    pub logs: Arc<dyn LogStore>,
}

impl StoreHandles {
    /// Handles to a fresh set of in-memory stores.
    #[must_use]
    pub fn in_memory() -> Self {
        InMemoryStores::new().handles()
    }
}

/// Engine behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Append a [`LogRecord`] for every mutation.
    pub audit_enabled: bool,
    /// Reject condition values that do not fit the type's value type.
    /// When off, values that cannot be coerced are stored as given.
    pub enforce_value_types: bool,
    /// Longest accepted condition type name.
    pub max_name_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audit_enabled: true,
            enforce_value_types: true,
            max_name_length: MAX_NAME_LENGTH,
        }
    }
}

impl EngineConfig {
    /// Checks the configuration.
    ///
    /// # Errors
    /// `InvalidConfig` if `max_name_length` is zero or above the storable maximum.
    pub fn validate(self) -> RcdbResult<Self> {
        if self.max_name_length == 0 || self.max_name_length > MAX_NAME_LENGTH {
            return Err(RcdbError::Validation(ValidationError::InvalidConfig {
                reason: format!(
                    "max_name_length must be in 1..={MAX_NAME_LENGTH} (got {})",
                    self.max_name_length
                ),
            }));
        }
        Ok(self)
    }
}

/// Run conditions database engine.
#[derive(Clone)]
pub struct RcdbEngine {
    stores: StoreHandles,
    config: EngineConfig,
    write_gate: Arc<Mutex<()>>,
}

impl RcdbEngine {
    /// Create a new engine over the given stores with the default configuration.
    #[must_use]
    pub fn new(stores: StoreHandles) -> Self {
        Self {
            stores,
            config: EngineConfig::default(),
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Create a new engine with an explicit configuration.
    ///
    /// # Errors
    /// `InvalidConfig` if the configuration does not validate.
    pub fn with_config(stores: StoreHandles, config: EngineConfig) -> RcdbResult<Self> {
        Ok(Self {
            stores,
            config: config.validate()?,
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    /// Create an engine over fresh in-memory stores.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(StoreHandles::in_memory())
    }

    /// The store handles this engine writes to.
    #[must_use]
    pub fn stores(&self) -> &StoreHandles {
        &self.stores
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Audit records related to a run, oldest first.
    ///
    /// # Errors
    /// A storage error if the log cannot be read.
    pub fn log_records(&self, run_number: impl Into<RunNumber>) -> RcdbResult<Vec<LogRecord>> {
        self.stores
            .logs
            .find_by_run(run_number.into())
            .map_err(Self::storage_err)
    }

    /// Every audit record, oldest first.
    ///
    /// # Errors
    /// A storage error if the log cannot be read.
    pub fn all_log_records(&self) -> RcdbResult<Vec<LogRecord>> {
        self.stores.logs.list().map_err(Self::storage_err)
    }

    fn lock_writes(&self) -> RcdbResult<MutexGuard<'_, ()>> {
        self.write_gate
            .lock()
            .map_err(|_| RcdbError::internal("engine write gate poisoned"))
    }

    fn storage_err(err: StorageError) -> RcdbError {
        RcdbError::Execution(ExecutionError::Storage {
            message: err.to_string(),
        })
    }

    /// Records a mutation in the audit log.
    ///
    /// Failures are logged and swallowed: the data write has already happened.
    fn audit(&self, table_ids: Vec<String>, description: String, related_run: Option<RunNumber>) {
        tracing::info!(run = ?related_run.map(RunNumber::get), "{description}");
        if !self.config.audit_enabled {
            return;
        }

        let record = LogRecord::new(table_ids, description, related_run);
        if let Err(e) = self.stores.logs.append(record) {
            tracing::warn!(error = %e, "failed to append audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::value::ValueType;

    /// Log store whose appends always fail.
    struct BrokenLogStore;

    impl LogStore for BrokenLogStore {
        fn append(&self, _record: LogRecord) -> Result<(), StorageError> {
            Err(StorageError::BackendError("disk full".to_string()))
        }

        fn find_by_run(&self, _run: RunNumber) -> Result<Vec<LogRecord>, StorageError> {
            Ok(Vec::new())
        }

        fn list(&self) -> Result<Vec<LogRecord>, StorageError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(EngineConfig::default().validate().is_ok());

        let err = EngineConfig {
            max_name_length: 0,
            ..EngineConfig::default()
        }
        .validate()
        .unwrap_err();
        assert!(err.is_validation());

        assert!(RcdbEngine::with_config(
            StoreHandles::in_memory(),
            EngineConfig {
                max_name_length: MAX_NAME_LENGTH + 1,
                ..EngineConfig::default()
            },
        )
        .is_err());
    }

    #[test]
    fn test_audit_failure_does_not_fail_write() {
        let mut stores = StoreHandles::in_memory();
        stores.logs = Arc::new(BrokenLogStore);
        let engine = RcdbEngine::new(stores);

        engine.obtain_run(1u64).unwrap();
        let ty = engine
            .get_or_register_type("evt_count", ValueType::Int, false)
            .unwrap();
        let write = engine.write_condition(1u64, &ty, 10, None, false).unwrap();
        assert!(write.is_mutation());
        assert!(engine.all_log_records().unwrap().is_empty());
    }

    #[test]
    fn test_audit_can_be_disabled() {
        let engine = RcdbEngine::with_config(
            StoreHandles::in_memory(),
            EngineConfig {
                audit_enabled: false,
                ..EngineConfig::default()
            },
        )
        .unwrap();

        engine.obtain_run(7u64).unwrap();
        engine
            .get_or_register_type("evt_count", ValueType::Int, false)
            .unwrap();
        engine.write_condition(7u64, "evt_count", 1, None, false).unwrap();
        assert!(engine.all_log_records().unwrap().is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let engine = RcdbEngine::in_memory();
        let other = engine.clone();
        other.obtain_run(3u64).unwrap();
        assert!(engine.get_run(3u64).unwrap().is_some());
    }
}
