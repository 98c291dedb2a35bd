//! # RCDB - Run Conditions Database
//!
//! RCDB tracks experimental runs and the conditions recorded for each run:
//! named, typed values such as event counts, beam currents, or DAQ component
//! statistics, together with the hardware inventory and configuration files a
//! run used.
//!
//! ## Core Concepts
//!
//! - **ConditionType**: a named schema fixing a value type and a cardinality
//!   policy (one value per run, or one value per (run, time))
//! - **Condition**: a value of a condition type for one run, optionally timed
//! - **Reconciliation**: every write is classified as an insert, an idempotent
//!   no-op, an authorized replace, or a rejected conflict
//! - **Run**: the unit conditions, hardware, and files attach to
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rcdb::{RcdbEngine, ValueType, WriteOutcome};
//!
//! let engine = RcdbEngine::in_memory();
//! engine.obtain_run(42u64)?;
//! engine.get_or_register_type("evt_count", ValueType::Int, false)?;
//!
//! let write = engine.write_condition(42u64, "evt_count", 1000, None, false)?;
//! assert_eq!(write.outcome, WriteOutcome::Inserted);
//!
//! // Same value again: nothing changes.
//! let write = engine.write_condition(42u64, "evt_count", 1000, None, false)?;
//! assert_eq!(write.outcome, WriteOutcome::Unchanged);
//!
//! // A different value needs replace = true.
//! assert!(engine.write_condition(42u64, "evt_count", 2000, None, false).is_err());
//! engine.write_condition(42u64, "evt_count", 2000, None, true)?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod id;

// Core model
pub mod audit;
pub mod condition;
pub mod condition_type;
pub mod config_file;
pub mod error;
pub mod hardware;
pub mod run;
pub mod value;

// Reconciliation, storage, and the engine around them
pub mod engine;
pub mod reconcile;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use audit::{LogRecord, LogRecordId};
pub use condition::{
    Condition, ConditionId, ConditionMismatch, ConditionRead, ConditionWrite, WriteOutcome,
};
pub use condition_type::{ConditionType, ConditionTypeId, TypeRef, MAX_NAME_LENGTH};
pub use config_file::{ConfigurationFile, ConfigurationFileId};
pub use engine::{EngineConfig, RcdbEngine, StoreHandles};
pub use error::{
    ExecutionError, RcdbError, RcdbResult, TypeDefinitionDiff, ValidationError,
};
pub use hardware::{
    Board, BoardConfiguration, BoardConfigurationId, BoardId, BoardInstallation,
    BoardInstallationId, Crate, CrateId, DacPreset, DacPresetId,
};
pub use run::{Run, RunNumber};
pub use storage::{InMemoryStores, StorageError};
pub use value::{ConditionValue, ValueType};
