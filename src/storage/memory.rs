//! In-memory storage backend.
//!
//! This module provides thread-safe in-memory implementations of the storage traits.
//! It is intended for embedded usage, tests, and as a reference implementation.

use std::sync::{Arc, RwLock};

use crate::audit::LogRecord;
use crate::condition::{Condition, ConditionId};
use crate::condition_type::{ConditionType, ConditionTypeId};
use crate::config_file::{ConfigurationFile, ConfigurationFileId};
use crate::engine::StoreHandles;
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

/// Thread-safe in-memory run store.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    index: RwLock<RunIndex>,
}

impl InMemoryRunStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for InMemoryRunStore {
    fn insert(&self, run: Run) -> Result<(), StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("run.insert"))?;
        index.check_insert(&run)?;
        index.upsert(run);
        Ok(())
    }

    fn get(&self, number: RunNumber) -> Result<Option<Run>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("run.get"))?;
        Ok(index.get(number))
    }

    fn update(&self, run: Run) -> Result<(), StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("run.update"))?;
        index.check_update(&run)?;
        index.upsert(run);
        Ok(())
    }

    fn list(&self) -> Result<Vec<Run>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("run.list"))?;
        Ok(index.list())
    }
}

/// Thread-safe in-memory condition type store.
#[derive(Debug, Default)]
pub struct InMemoryConditionTypeStore {
    index: RwLock<ConditionTypeIndex>,
}

impl InMemoryConditionTypeStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConditionTypeStore for InMemoryConditionTypeStore {
    fn insert(&self, ty: ConditionType) -> Result<(), StorageError> {
        let mut index = self
            .index
            .write()
            .map_err(|_| lock_err("condition_type.insert"))?;
        index.check_insert(&ty)?;
        index.upsert(ty);
        Ok(())
    }

    fn get(&self, id: ConditionTypeId) -> Result<Option<ConditionType>, StorageError> {
        let index = self
            .index
            .read()
            .map_err(|_| lock_err("condition_type.get"))?;
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
        let index = self
            .index
            .read()
            .map_err(|_| lock_err("condition_type.list"))?;
        Ok(index.list())
    }
}

/// Thread-safe in-memory condition store.
#[derive(Debug, Default)]
pub struct InMemoryConditionStore {
    index: RwLock<ConditionIndex>,
}

impl InMemoryConditionStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConditionStore for InMemoryConditionStore {
    fn insert(&self, condition: Condition, is_many_per_run: bool) -> Result<(), StorageError> {
        let mut index = self
            .index
            .write()
            .map_err(|_| lock_err("condition.insert"))?;
        index.check_insert(&condition, is_many_per_run)?;
        index.upsert(condition);
        Ok(())
    }

    fn get(&self, id: ConditionId) -> Result<Option<Condition>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("condition.get"))?;
        Ok(index.get(id))
    }

    fn update(&self, condition: Condition) -> Result<(), StorageError> {
        let mut index = self
            .index
            .write()
            .map_err(|_| lock_err("condition.update"))?;
        index.check_update(&condition)?;
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
        let index = self
            .index
            .read()
            .map_err(|_| lock_err("condition.find_by_run"))?;
        Ok(index.find_by_run(run))
    }
}

/// Thread-safe in-memory hardware inventory.
#[derive(Debug, Default)]
pub struct InMemoryHardwareStore {
    index: RwLock<HardwareIndex>,
}

impl InMemoryHardwareStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HardwareStore for InMemoryHardwareStore {
    fn insert_board(&self, board: Board) -> Result<(), StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("board.insert"))?;
        index.check_board(&board)?;
        index.upsert_board(board);
        Ok(())
    }

    fn find_board(&self, board_type: &str, serial: &str) -> Result<Option<Board>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("board.find"))?;
        Ok(index.find_board(board_type, serial))
    }

    fn insert_crate(&self, unit: Crate) -> Result<(), StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("crate.insert"))?;
        index.check_crate(&unit)?;
        index.upsert_crate(unit);
        Ok(())
    }

    fn find_crate(&self, name: &str) -> Result<Option<Crate>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("crate.find"))?;
        Ok(index.find_crate(name))
    }

    fn insert_installation(&self, installation: BoardInstallation) -> Result<(), StorageError> {
        let mut index = self
            .index
            .write()
            .map_err(|_| lock_err("installation.insert"))?;
        index.check_installation(&installation)?;
        index.upsert_installation(installation);
        Ok(())
    }

    fn find_installation(
        &self,
        crate_id: CrateId,
        board_id: BoardId,
        slot: u32,
    ) -> Result<Option<BoardInstallation>, StorageError> {
        let index = self
            .index
            .read()
            .map_err(|_| lock_err("installation.find"))?;
        Ok(index.find_installation(crate_id, board_id, slot))
    }

    fn insert_dac_preset(&self, preset: DacPreset) -> Result<(), StorageError> {
        let mut index = self
            .index
            .write()
            .map_err(|_| lock_err("dac_preset.insert"))?;
        index.check_preset(&preset)?;
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
        let mut index = self
            .index
            .write()
            .map_err(|_| lock_err("board_configuration.insert"))?;
        index.check_configuration(&config)?;
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

/// Thread-safe in-memory configuration file archive.
#[derive(Debug, Default)]
pub struct InMemoryConfigFileStore {
    index: RwLock<ConfigFileIndex>,
}

impl InMemoryConfigFileStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigFileStore for InMemoryConfigFileStore {
    fn insert(&self, file: ConfigurationFile) -> Result<(), StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("file.insert"))?;
        index.check_insert(&file)?;
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

/// Thread-safe in-memory audit log.
#[derive(Debug, Default)]
pub struct InMemoryLogStore {
    index: RwLock<LogIndex>,
}

impl InMemoryLogStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for InMemoryLogStore {
    fn append(&self, record: LogRecord) -> Result<(), StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("log.append"))?;
        index.check_append(&record)?;
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

/// Convenience bundle of in-memory stores.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStores {
    /// Run store.
    pub runs: Arc<InMemoryRunStore>,
    /// Condition type store.
    pub condition_types: Arc<InMemoryConditionTypeStore>,
    /// Condition store.
    pub conditions: Arc<InMemoryConditionStore>,
    /// Hardware inventory.
    pub hardware: Arc<InMemoryHardwareStore>,
    /// Configuration file archive.
    pub files: Arc<InMemoryConfigFileStore>,
    /// Audit log.
    pub logs: Arc<InMemoryLogStore>,
}

impl InMemoryStores {
    /// Create a new bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trait-object handles for an engine. The stores stay shared with this bundle.
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
}
