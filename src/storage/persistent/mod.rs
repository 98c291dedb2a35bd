//! Persistent storage backend for RCDB.
//!
//! A database is a directory holding:
//! - `rcdb.wal`: the write-ahead log, appended before every in-memory apply,
//! - `rcdb.snapshot`: the full state as of the last compaction,
//! - `.lock`: an exclusive lock held for as long as any store is alive.
//!
//! Opening loads the snapshot and replays the WAL over it. Records carry
//! stable ids, so replaying entries the snapshot already contains changes
//! nothing.
//!
//! # Example
//! ```rust,ignore
//! use rcdb::storage::persistent::open_database;
//! use rcdb::RcdbEngine;
//!
//! let stores = open_database("./rcdb-data", None)?;
//! let engine = RcdbEngine::new(stores.handles());
//! ```

mod codec;
mod file_lock;
mod snapshot;
mod stores;
mod wal;

pub use file_lock::FileLock;
pub use snapshot::Snapshot;
pub use stores::{
    CompactionResult, PersistentConditionStore, PersistentConditionTypeStore,
    PersistentConfigFileStore, PersistentHardwareStore, PersistentLogStore, PersistentRunStore,
    PersistentStores, SNAPSHOT_FILE, WAL_FILE,
};
pub use wal::{WalEntry, WalEntryKind, WriteAheadLog};

use std::path::Path;

use crate::error::{RcdbError, RcdbResult, ValidationError};

/// Configuration for persistent storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentConfig {
    /// WAL size (bytes) above which `compact_if_needed` compacts.
    pub max_wal_size: u64,
    /// Whether to fsync after every WAL append.
    pub sync_on_write: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            max_wal_size: 64 * 1024 * 1024,
            sync_on_write: true,
        }
    }
}

impl PersistentConfig {
    const MIN_WAL_SIZE: u64 = 4 * 1024;

    /// Checks the configuration.
    ///
    /// # Errors
    /// `InvalidConfig` if `max_wal_size` is below 4 KiB.
    pub fn validate(self) -> RcdbResult<Self> {
        if self.max_wal_size < Self::MIN_WAL_SIZE {
            return Err(RcdbError::Validation(ValidationError::InvalidConfig {
                reason: format!(
                    "max_wal_size must be at least {} bytes (got {})",
                    Self::MIN_WAL_SIZE,
                    self.max_wal_size
                ),
            }));
        }
        Ok(self)
    }
}

/// Opens or creates a persistent database at `path`.
///
/// # Errors
/// - `InvalidConfig` for a bad configuration
/// - a storage error if the directory cannot be used, another process holds
///   the lock, or the snapshot or WAL is damaged
pub fn open_database(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> RcdbResult<PersistentStores> {
    let config = config.unwrap_or_default().validate()?;
    PersistentStores::open(path.as_ref(), config)
}
