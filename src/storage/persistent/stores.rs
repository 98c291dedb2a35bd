//! Persistent store implementations.
//!
//! Each store keeps the same in-memory index as the in-memory backend and
//! appends every mutation to the shared WAL before applying it. All stores of
//! one database share a [`Journal`], which also owns the directory lock.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use chrono::Utc;

use crate::audit::LogRecord;
use crate::condition::{Condition, ConditionId};
use crate::condition_type::{ConditionType, ConditionTypeId};
use crate::config_file::{ConfigurationFile, ConfigurationFileId};
use crate::engine::StoreHandles;
use crate::error::{ExecutionError, RcdbError, RcdbResult};
use crate::hardware::{
    Board, BoardConfiguration, BoardId, BoardInstallation, Crate, CrateId, DacPreset,
    DacPresetId,
};
use crate::run::{Run, RunNumber};
use crate::storage::index::{
    lock_err, ConditionIndex, ConditionTypeIndex, ConfigFileIndex, HardwareIndex, LogIndex,
    RunIndex,
};
use crate::storage::traits::{
    ConditionStore, ConditionTypeStore, ConfigFileStore, HardwareStore, LogStore, RunStore,
    StorageError,
};
use crate::value::ConditionValue;

use super::file_lock::FileLock;
use super::snapshot::Snapshot;
use super::wal::{WalEntryKind, WriteAheadLog};
use super::PersistentConfig;

/// WAL file name inside the database directory.
pub const WAL_FILE: &str = "rcdb.wal";
/// Snapshot file name inside the database directory.
pub const SNAPSHOT_FILE: &str = "rcdb.snapshot";

fn storage_err(context: &str, err: impl std::fmt::Display) -> RcdbError {
    RcdbError::Execution(ExecutionError::Storage {
        message: format!("{context}: {err}"),
    })
}

/// WAL plus the lock that makes this process its only writer.
///
/// Mutations hold `gate` for reading while they log and apply; compaction
/// holds it for writing so no mutation lands between snapshot and truncate.
pub(crate) struct Journal {
    wal: WriteAheadLog,
    gate: RwLock<()>,
    _lock: FileLock,
}

impl Journal {
    fn enter(&self, context: &'static str) -> Result<RwLockReadGuard<'_, ()>, StorageError> {
        self.gate.read().map_err(|_| lock_err(context))
    }

    fn log(&self, kind: WalEntryKind) -> Result<(), StorageError> {
        self.wal
            .append(kind)
            .map(|_| ())
            .map_err(|e| StorageError::BackendError(format!("WAL write failed: {e}")))
    }
}

/// Aggregate of all persistent stores for one database directory.
pub struct PersistentStores {
    dir: PathBuf,
    config: PersistentConfig,
    journal: Arc<Journal>,

    pub runs: Arc<PersistentRunStore>,
    pub condition_types: Arc<PersistentConditionTypeStore>,
    pub conditions: Arc<PersistentConditionStore>,
    pub hardware: Arc<PersistentHardwareStore>,
    pub files: Arc<PersistentConfigFileStore>,
    pub logs: Arc<PersistentLogStore>,
}

impl std::fmt::Debug for PersistentStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStores")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PersistentStores {
    /// Opens or creates a database in `dir`.
    ///
    /// Loads the snapshot, then replays the WAL on top of it.
    ///
    /// # Errors
    /// A storage error if the directory cannot be created, another process
    /// holds the lock, or the snapshot or WAL is damaged.
    pub fn open(dir: &Path, config: PersistentConfig) -> RcdbResult<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| storage_err("failed to create database directory", e))?;

        let lock = FileLock::acquire(dir).map_err(|e| storage_err("failed to acquire lock", e))?;
        let wal = WriteAheadLog::open(&dir.join(WAL_FILE), config.sync_on_write)
            .map_err(|e| storage_err("failed to open WAL", e))?;

        let journal = Arc::new(Journal {
            wal,
            gate: RwLock::new(()),
            _lock: lock,
        });

        let stores = Self {
            dir: dir.to_path_buf(),
            config,
            runs: Arc::new(PersistentRunStore::new(journal.clone())),
            condition_types: Arc::new(PersistentConditionTypeStore::new(journal.clone())),
            conditions: Arc::new(PersistentConditionStore::new(journal.clone())),
            hardware: Arc::new(PersistentHardwareStore::new(journal.clone())),
            files: Arc::new(PersistentConfigFileStore::new(journal.clone())),
            logs: Arc::new(PersistentLogStore::new(journal.clone())),
            journal,
        };

        let restored = stores.load_snapshot()?;
        let replayed = stores.replay_wal()?;
        tracing::info!(
            dir = %dir.display(),
            snapshot_records = restored,
            wal_entries = replayed,
            "opened persistent database"
        );

        Ok(stores)
    }

    /// Database directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Trait-object handles for an engine.
    ///
    /// The handles keep the journal, and with it the directory lock, alive
    /// after this value is dropped.
    #[must_use]
    pub fn handles(&self) -> StoreHandles {
        StoreHandles {
            runs: self.runs.clone(),
            condition_types: self.condition_types.clone(),
            conditions: self.conditions.clone(),
            hardware: self.hardware.clone(),
            files: self.files.clone(),
            logs: self.logs.clone(),
        }
    }

    fn load_snapshot(&self) -> RcdbResult<usize> {
        let Some(snapshot) = Snapshot::load(&self.dir.join(SNAPSHOT_FILE))
            .map_err(|e| storage_err("failed to read snapshot", e))?
        else {
            return Ok(0);
        };
        let count = snapshot.record_count();

        let mut runs = self
            .runs
            .index
            .write()
            .map_err(|_| storage_err("snapshot.runs", "poisoned lock"))?;
        snapshot.runs.into_iter().for_each(|r| runs.upsert(r));

        let mut types = self
            .condition_types
            .index
            .write()
            .map_err(|_| storage_err("snapshot.condition_types", "poisoned lock"))?;
        snapshot.condition_types.into_iter().for_each(|t| types.upsert(t));

        let mut conditions = self
            .conditions
            .index
            .write()
            .map_err(|_| storage_err("snapshot.conditions", "poisoned lock"))?;
        snapshot.conditions.into_iter().for_each(|c| conditions.upsert(c));

        let mut hardware = self
            .hardware
            .index
            .write()
            .map_err(|_| storage_err("snapshot.hardware", "poisoned lock"))?;
        snapshot.boards.into_iter().for_each(|b| hardware.upsert_board(b));
        snapshot.crates.into_iter().for_each(|c| hardware.upsert_crate(c));
        snapshot
            .installations
            .into_iter()
            .for_each(|i| hardware.upsert_installation(i));
        snapshot.dac_presets.into_iter().for_each(|p| hardware.upsert_preset(p));
        snapshot
            .board_configurations
            .into_iter()
            .for_each(|c| hardware.upsert_configuration(c));

        let mut files = self
            .files
            .index
            .write()
            .map_err(|_| storage_err("snapshot.files", "poisoned lock"))?;
        snapshot.files.into_iter().for_each(|f| files.upsert(f));

        let mut logs = self
            .logs
            .index
            .write()
            .map_err(|_| storage_err("snapshot.logs", "poisoned lock"))?;
        snapshot.logs.into_iter().for_each(|l| logs.upsert(l));

        Ok(count)
    }

    /// Replays the WAL. Entries upsert by id, so entries already covered by
    /// the snapshot are harmless.
    fn replay_wal(&self) -> RcdbResult<usize> {
        let iter = self
            .journal
            .wal
            .iter()
            .map_err(|e| storage_err("failed to iterate WAL", e))?;

        let mut count = 0;
        for entry in iter {
            let entry = entry.map_err(|e| storage_err("corrupted WAL entry", e))?;
            self.apply(entry.kind)
                .map_err(|e| storage_err("failed to apply WAL entry", e))?;
            count += 1;
        }
        Ok(count)
    }

    fn apply(&self, kind: WalEntryKind) -> Result<(), StorageError> {
        match kind {
            WalEntryKind::RunInsert(run) | WalEntryKind::RunUpdate(run) => {
                self.runs.index.write().map_err(|_| lock_err("replay.run"))?.upsert(run);
            }
            WalEntryKind::ConditionTypeInsert(ty) => {
                self.condition_types
                    .index
                    .write()
                    .map_err(|_| lock_err("replay.condition_type"))?
                    .upsert(ty);
            }
            WalEntryKind::ConditionInsert(c) | WalEntryKind::ConditionUpdate(c) => {
                self.conditions
                    .index
                    .write()
                    .map_err(|_| lock_err("replay.condition"))?
                    .upsert(c);
            }
            WalEntryKind::BoardInsert(board) => {
                self.hardware_index("replay.board")?.upsert_board(board);
            }
            WalEntryKind::CrateInsert(unit) => {
                self.hardware_index("replay.crate")?.upsert_crate(unit);
            }
            WalEntryKind::InstallationInsert(installation) => {
                self.hardware_index("replay.installation")?
                    .upsert_installation(installation);
            }
            WalEntryKind::DacPresetInsert(preset) => {
                self.hardware_index("replay.dac_preset")?.upsert_preset(preset);
            }
            WalEntryKind::BoardConfigurationInsert(config) => {
                self.hardware_index("replay.board_configuration")?
                    .upsert_configuration(config);
            }
            WalEntryKind::FileInsert(file) => {
                self.files.index.write().map_err(|_| lock_err("replay.file"))?.upsert(file);
            }
            WalEntryKind::LogAppend(record) => {
                self.logs.index.write().map_err(|_| lock_err("replay.log"))?.upsert(record);
            }
        }
        Ok(())
    }

    fn hardware_index(
        &self,
        context: &'static str,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HardwareIndex>, StorageError> {
        self.hardware.index.write().map_err(|_| lock_err(context))
    }

    /// Writes a snapshot of the current state and truncates the WAL.
    ///
    /// Mutations block for the duration. If this fails before the WAL is
    /// truncated, the next open replays the WAL over whichever snapshot is on
    /// disk and arrives at the same state.
    ///
    /// # Errors
    /// A storage error if the snapshot cannot be written or the WAL cannot
    /// be truncated.
    pub fn compact(&self) -> RcdbResult<CompactionResult> {
        let _gate = self
            .journal
            .gate
            .write()
            .map_err(|_| storage_err("compaction", "poisoned gate lock"))?;

        let wal_size_before = self.wal_size();
        let snapshot = self.capture().map_err(|e| storage_err("compaction", e))?;
        let records = snapshot.record_count();

        snapshot
            .write_atomic(&self.dir.join(SNAPSHOT_FILE))
            .map_err(|e| storage_err("failed to write snapshot", e))?;
        self.journal
            .wal
            .truncate()
            .map_err(|e| storage_err("failed to truncate WAL", e))?;

        let result = CompactionResult {
            records,
            wal_size_before,
            wal_size_after: self.wal_size(),
        };
        tracing::info!(
            records = result.records,
            wal_size_before = result.wal_size_before,
            wal_size_after = result.wal_size_after,
            "compacted persistent database"
        );
        Ok(result)
    }

    /// Compacts when the WAL has outgrown `max_wal_size`.
    ///
    /// # Errors
    /// See [`Self::compact`].
    pub fn compact_if_needed(&self) -> RcdbResult<Option<CompactionResult>> {
        if self.needs_compaction() {
            self.compact().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Returns true if the WAL exceeds the configured size limit.
    #[must_use]
    pub fn needs_compaction(&self) -> bool {
        self.wal_size() > self.config.max_wal_size
    }

    /// Current WAL size in bytes (0 if it cannot be read).
    #[must_use]
    pub fn wal_size(&self) -> u64 {
        self.journal.wal.size_bytes().unwrap_or(0)
    }

    fn capture(&self) -> Result<Snapshot, StorageError> {
        let hardware = self.hardware.index.read().map_err(|_| lock_err("capture.hardware"))?;
        let snapshot = Snapshot {
            created_at: Some(Utc::now()),
            runs: self.runs.index.read().map_err(|_| lock_err("capture.runs"))?.list(),
            condition_types: self
                .condition_types
                .index
                .read()
                .map_err(|_| lock_err("capture.condition_types"))?
                .list(),
            conditions: self
                .conditions
                .index
                .read()
                .map_err(|_| lock_err("capture.conditions"))?
                .all(),
            boards: hardware.boards(),
            crates: hardware.crates(),
            installations: hardware.installations(),
            dac_presets: hardware.presets(),
            board_configurations: hardware.configurations(),
            files: self.files.index.read().map_err(|_| lock_err("capture.files"))?.all(),
            logs: self.logs.index.read().map_err(|_| lock_err("capture.logs"))?.all(),
        };
        Ok(snapshot)
    }
}

/// Result of a compaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    /// Records written to the snapshot.
    pub records: usize,
    pub wal_size_before: u64,
    pub wal_size_after: u64,
}

// --- Runs ---

pub struct PersistentRunStore {
    journal: Arc<Journal>,
    index: RwLock<RunIndex>,
}

impl PersistentRunStore {
    fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            index: RwLock::new(RunIndex::default()),
        }
    }
}

impl RunStore for PersistentRunStore {
    fn insert(&self, run: Run) -> Result<(), StorageError> {
        let _gate = self.journal.enter("run.insert")?;
        let mut index = self.index.write().map_err(|_| lock_err("run.insert"))?;
        index.check_insert(&run)?;
        self.journal.log(WalEntryKind::RunInsert(run.clone()))?;
        index.upsert(run);
        Ok(())
    }

    fn get(&self, number: RunNumber) -> Result<Option<Run>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("run.get"))?;
        Ok(index.get(number))
    }

    fn update(&self, run: Run) -> Result<(), StorageError> {
        let _gate = self.journal.enter("run.update")?;
        let mut index = self.index.write().map_err(|_| lock_err("run.update"))?;
        index.check_update(&run)?;
        self.journal.log(WalEntryKind::RunUpdate(run.clone()))?;
        index.upsert(run);
        Ok(())
    }

    fn list(&self) -> Result<Vec<Run>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("run.list"))?;
        Ok(index.list())
    }
}

// --- Condition types ---

pub struct PersistentConditionTypeStore {
    journal: Arc<Journal>,
    index: RwLock<ConditionTypeIndex>,
}

impl PersistentConditionTypeStore {
    fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            index: RwLock::new(ConditionTypeIndex::default()),
        }
    }
}

impl ConditionTypeStore for PersistentConditionTypeStore {
    fn insert(&self, ty: ConditionType) -> Result<(), StorageError> {
        let _gate = self.journal.enter("condition_type.insert")?;
        let mut index = self
            .index
            .write()
            .map_err(|_| lock_err("condition_type.insert"))?;
        index.check_insert(&ty)?;
        self.journal.log(WalEntryKind::ConditionTypeInsert(ty.clone()))?;
        index.upsert(ty);
        Ok(())
    }

    fn get(&self, id: ConditionTypeId) -> Result<Option<ConditionType>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("condition_type.get"))?;
        Ok(index.get(id))
    }

    fn find_by_name(&self, name: &str) -> Result<Option<ConditionType>, StorageError> {
        let index = self
            .index
            .read()
            .map_err(|_| lock_err("condition_type.find_by_name"))?;
        Ok(index.find_by_name(name))
    }

    fn list(&self) -> Result<Vec<ConditionType>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("condition_type.list"))?;
        Ok(index.list())
    }
}

// --- Conditions ---

pub struct PersistentConditionStore {
    journal: Arc<Journal>,
    index: RwLock<ConditionIndex>,
}

impl PersistentConditionStore {
    fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            index: RwLock::new(ConditionIndex::default()),
        }
    }
}

/// The JSON payload encoding has no NaN or infinity; such a float would be
/// written as `null` and fail to decode on replay.
fn check_encodable(condition: &Condition) -> Result<(), StorageError> {
    match condition.value {
        ConditionValue::Float(v) if !v.is_finite() => Err(StorageError::SerializationError(
            format!("condition {} holds non-finite float {v}", condition.id),
        )),
        _ => Ok(()),
    }
}

impl ConditionStore for PersistentConditionStore {
    fn insert(&self, condition: Condition, is_many_per_run: bool) -> Result<(), StorageError> {
        let _gate = self.journal.enter("condition.insert")?;
        let mut index = self.index.write().map_err(|_| lock_err("condition.insert"))?;
        index.check_insert(&condition, is_many_per_run)?;
        check_encodable(&condition)?;
        self.journal.log(WalEntryKind::ConditionInsert(condition.clone()))?;
        index.upsert(condition);
        Ok(())
    }

    fn get(&self, id: ConditionId) -> Result<Option<Condition>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("condition.get"))?;
        Ok(index.get(id))
    }

    fn update(&self, condition: Condition) -> Result<(), StorageError> {
        let _gate = self.journal.enter("condition.update")?;
        let mut index = self.index.write().map_err(|_| lock_err("condition.update"))?;
        index.check_update(&condition)?;
        check_encodable(&condition)?;
        self.journal.log(WalEntryKind::ConditionUpdate(condition.clone()))?;
        index.upsert(condition);
        Ok(())
    }

    fn find_by_run_type(
        &self,
        run: RunNumber,
        type_id: ConditionTypeId,
    ) -> Result<Vec<Condition>, StorageError> {
        let index = self
            .index
            .read()
            .map_err(|_| lock_err("condition.find_by_run_type"))?;
        Ok(index.find_by_run_type(run, type_id))
    }

    fn find_by_run(&self, run: RunNumber) -> Result<Vec<Condition>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("condition.find_by_run"))?;
        Ok(index.find_by_run(run))
    }
}

// --- Hardware ---

pub struct PersistentHardwareStore {
    journal: Arc<Journal>,
    index: RwLock<HardwareIndex>,
}

impl PersistentHardwareStore {
    fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            index: RwLock::new(HardwareIndex::default()),
        }
    }
}

impl HardwareStore for PersistentHardwareStore {
    fn insert_board(&self, board: Board) -> Result<(), StorageError> {
        let _gate = self.journal.enter("board.insert")?;
        let mut index = self.index.write().map_err(|_| lock_err("board.insert"))?;
        index.check_board(&board)?;
        self.journal.log(WalEntryKind::BoardInsert(board.clone()))?;
        index.upsert_board(board);
        Ok(())
    }

    fn find_board(&self, board_type: &str, serial: &str) -> Result<Option<Board>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("board.find"))?;
        Ok(index.find_board(board_type, serial))
    }

    fn insert_crate(&self, unit: Crate) -> Result<(), StorageError> {
        let _gate = self.journal.enter("crate.insert")?;
        let mut index = self.index.write().map_err(|_| lock_err("crate.insert"))?;
        index.check_crate(&unit)?;
        self.journal.log(WalEntryKind::CrateInsert(unit.clone()))?;
        index.upsert_crate(unit);
        Ok(())
    }

    fn find_crate(&self, name: &str) -> Result<Option<Crate>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("crate.find"))?;
        Ok(index.find_crate(name))
    }

    fn insert_installation(&self, installation: BoardInstallation) -> Result<(), StorageError> {
        let _gate = self.journal.enter("installation.insert")?;
        let mut index = self.index.write().map_err(|_| lock_err("installation.insert"))?;
        index.check_installation(&installation)?;
        self.journal
            .log(WalEntryKind::InstallationInsert(installation.clone()))?;
        index.upsert_installation(installation);
        Ok(())
    }

    fn find_installation(
        &self,
        crate_id: CrateId,
        board_id: BoardId,
        slot: u32,
    ) -> Result<Option<BoardInstallation>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("installation.find"))?;
        Ok(index.find_installation(crate_id, board_id, slot))
    }

    fn insert_dac_preset(&self, preset: DacPreset) -> Result<(), StorageError> {
        let _gate = self.journal.enter("dac_preset.insert")?;
        let mut index = self.index.write().map_err(|_| lock_err("dac_preset.insert"))?;
        index.check_preset(&preset)?;
        self.journal.log(WalEntryKind::DacPresetInsert(preset.clone()))?;
        index.upsert_preset(preset);
        Ok(())
    }

    fn find_dac_preset(
        &self,
        board_id: BoardId,
        values: &[i64],
    ) -> Result<Option<DacPreset>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("dac_preset.find"))?;
        Ok(index.find_preset(board_id, values))
    }

    fn insert_board_configuration(&self, config: BoardConfiguration) -> Result<(), StorageError> {
        let _gate = self.journal.enter("board_configuration.insert")?;
        let mut index = self
            .index
            .write()
            .map_err(|_| lock_err("board_configuration.insert"))?;
        index.check_configuration(&config)?;
        self.journal
            .log(WalEntryKind::BoardConfigurationInsert(config.clone()))?;
        index.upsert_configuration(config);
        Ok(())
    }

    fn find_board_configuration(
        &self,
        board_id: BoardId,
        dac_preset_id: DacPresetId,
    ) -> Result<Option<BoardConfiguration>, StorageError> {
        let index = self
            .index
            .read()
            .map_err(|_| lock_err("board_configuration.find"))?;
        Ok(index.find_configuration(board_id, dac_preset_id))
    }
}

// --- Configuration files ---

pub struct PersistentConfigFileStore {
    journal: Arc<Journal>,
    index: RwLock<ConfigFileIndex>,
}

impl PersistentConfigFileStore {
    fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            index: RwLock::new(ConfigFileIndex::default()),
        }
    }
}

impl ConfigFileStore for PersistentConfigFileStore {
    fn insert(&self, file: ConfigurationFile) -> Result<(), StorageError> {
        let _gate = self.journal.enter("file.insert")?;
        let mut index = self.index.write().map_err(|_| lock_err("file.insert"))?;
        index.check_insert(&file)?;
        self.journal.log(WalEntryKind::FileInsert(file.clone()))?;
        index.upsert(file);
        Ok(())
    }

    fn get(&self, id: ConfigurationFileId) -> Result<Option<ConfigurationFile>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("file.get"))?;
        Ok(index.get(id))
    }

    fn find(&self, checksum: &str, path: &str) -> Result<Option<ConfigurationFile>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("file.find"))?;
        Ok(index.find(checksum, path))
    }
}

// --- Audit log ---

pub struct PersistentLogStore {
    journal: Arc<Journal>,
    index: RwLock<LogIndex>,
}

impl PersistentLogStore {
    fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            index: RwLock::new(LogIndex::default()),
        }
    }
}

impl LogStore for PersistentLogStore {
    fn append(&self, record: LogRecord) -> Result<(), StorageError> {
        let _gate = self.journal.enter("log.append")?;
        let mut index = self.index.write().map_err(|_| lock_err("log.append"))?;
        index.check_append(&record)?;
        self.journal.log(WalEntryKind::LogAppend(record.clone()))?;
        index.upsert(record);
        Ok(())
    }

    fn find_by_run(&self, run: RunNumber) -> Result<Vec<LogRecord>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("log.find_by_run"))?;
        Ok(index.find_by_run(run))
    }

    fn list(&self) -> Result<Vec<LogRecord>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("log.list"))?;
        Ok(index.all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::value::{ConditionValue, ValueType};

    fn open(dir: &Path) -> PersistentStores {
        PersistentStores::open(dir, PersistentConfig::default()).unwrap()
    }

    #[test]
    fn test_open_write_reopen() {
        let dir = tempdir().unwrap();
        let ty = ConditionType::new("event_count", ValueType::Int, false).unwrap();

        {
            let stores = open(dir.path());
            stores.runs.insert(Run::new(42u64)).unwrap();
            stores.condition_types.insert(ty.clone()).unwrap();
            stores
                .conditions
                .insert(
                    Condition::new(RunNumber::new(42), ty.id, ConditionValue::Int(1000), None),
                    false,
                )
                .unwrap();
        }

        let stores = open(dir.path());
        assert!(stores.runs.get(RunNumber::new(42)).unwrap().is_some());
        assert_eq!(stores.condition_types.find_by_name("event_count").unwrap(), Some(ty.clone()));

        let rows = stores.conditions.find_by_run_type(RunNumber::new(42), ty.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, ConditionValue::Int(1000));
    }

    #[test]
    fn test_rejected_write_is_not_logged() {
        let dir = tempdir().unwrap();
        let stores = open(dir.path());
        stores.runs.insert(Run::new(1u64)).unwrap();
        let size = stores.wal_size();

        assert!(stores.runs.insert(Run::new(1u64)).is_err());
        assert_eq!(stores.wal_size(), size);
    }

    #[test]
    fn test_compaction_survives_reopen() {
        let dir = tempdir().unwrap();

        {
            let stores = open(dir.path());
            for n in 0..10u64 {
                stores.runs.insert(Run::new(n)).unwrap();
            }
            let result = stores.compact().unwrap();
            assert_eq!(result.records, 10);
            assert!(result.wal_size_after < result.wal_size_before);
            assert!(dir.path().join(SNAPSHOT_FILE).exists());

            // Writes after compaction land in the fresh WAL.
            stores.runs.insert(Run::new(10u64)).unwrap();
        }

        let stores = open(dir.path());
        assert_eq!(stores.runs.list().unwrap().len(), 11);
    }

    #[test]
    fn test_replay_over_snapshot_is_idempotent() {
        let dir = tempdir().unwrap();
        let wal_copy = dir.path().join("wal.bak");

        {
            let stores = open(dir.path());
            let ty = ConditionType::new("rate", ValueType::Float, true).unwrap();
            stores.runs.insert(Run::new(5u64)).unwrap();
            stores.condition_types.insert(ty.clone()).unwrap();
            stores
                .conditions
                .insert(
                    Condition::new(RunNumber::new(5), ty.id, ConditionValue::Float(1.5), None),
                    true,
                )
                .unwrap();
            stores
                .logs
                .append(LogRecord::new(vec![], "Run created", Some(RunNumber::new(5))))
                .unwrap();

            fs::copy(dir.path().join(WAL_FILE), &wal_copy).unwrap();
            stores.compact().unwrap();
        }

        // Crash between snapshot write and WAL truncation.
        fs::copy(&wal_copy, dir.path().join(WAL_FILE)).unwrap();

        let stores = open(dir.path());
        assert_eq!(stores.runs.list().unwrap().len(), 1);
        assert_eq!(stores.conditions.find_by_run(RunNumber::new(5)).unwrap().len(), 1);
        assert_eq!(stores.logs.list().unwrap().len(), 1);
        assert_eq!(stores.condition_types.list().unwrap().len(), 1);
    }

    #[test]
    fn test_second_open_fails_while_locked() {
        let dir = tempdir().unwrap();
        let stores = open(dir.path());
        let handles = stores.handles();
        drop(stores);

        // Handles keep the lock.
        let err = PersistentStores::open(dir.path(), PersistentConfig::default())
            .err()
            .unwrap();
        assert!(err.is_storage());

        drop(handles);
        open(dir.path());
    }

    #[test]
    fn test_compact_if_needed_respects_limit() {
        let dir = tempdir().unwrap();
        let config = PersistentConfig {
            max_wal_size: 4 * 1024,
            sync_on_write: false,
        };
        let stores = PersistentStores::open(dir.path(), config).unwrap();
        assert!(stores.compact_if_needed().unwrap().is_none());

        let mut n = 0u64;
        while !stores.needs_compaction() {
            stores.runs.insert(Run::new(n)).unwrap();
            n += 1;
        }
        assert!(stores.compact_if_needed().unwrap().is_some());
        assert!(!stores.needs_compaction());
        assert_eq!(stores.runs.list().unwrap().len() as u64, n);
    }

    #[test]
    fn test_non_finite_float_rejected_before_logging() {
        let dir = tempdir().unwrap();
        let stores = open(dir.path());
        let size = stores.wal_size();

        let condition = Condition::new(
            RunNumber::new(1),
            ConditionTypeId::new(),
            ConditionValue::Float(f64::NAN),
            None,
        );
        let err = stores.conditions.insert(condition, false).unwrap_err();
        assert!(matches!(err, StorageError::SerializationError(_)));
        assert_eq!(stores.wal_size(), size);
    }
}
