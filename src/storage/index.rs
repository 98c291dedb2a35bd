//! In-memory indexes shared by every storage backend.
//!
//! Each index exposes the same three steps:
//! - `check_*` validates a write against the uniqueness constraints without mutating,
//! - `upsert` applies a record by id (used after a check, during WAL replay, and when
//!   loading a snapshot),
//! - read accessors returning owned clones.
//!
//! Splitting check from apply lets the persistent backend log a write only after it
//! is known to succeed.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::audit::{LogRecord, LogRecordId};
use crate::condition::{Condition, ConditionId};
use crate::condition_type::{ConditionType, ConditionTypeId};
use crate::config_file::{ConfigurationFile, ConfigurationFileId};
use crate::hardware::{
    Board, BoardConfiguration, BoardConfigurationId, BoardId, BoardInstallation,
    BoardInstallationId, Crate, CrateId, DacPreset, DacPresetId,
};
use crate::run::{Run, RunNumber};
use crate::storage::traits::StorageError;

pub(crate) fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

// --- Runs ---

#[derive(Debug, Default)]
pub(crate) struct RunIndex {
    by_number: BTreeMap<RunNumber, Run>,
}

impl RunIndex {
    pub fn check_insert(&self, run: &Run) -> Result<(), StorageError> {
        if self.by_number.contains_key(&run.number) {
            return Err(StorageError::DuplicateKey(format!("runs(number={})", run.number)));
        }
        Ok(())
    }

    pub fn check_update(&self, run: &Run) -> Result<(), StorageError> {
        if self.by_number.contains_key(&run.number) {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!("run {}", run.number)))
        }
    }

    pub fn upsert(&mut self, run: Run) {
        self.by_number.insert(run.number, run);
    }

    pub fn get(&self, number: RunNumber) -> Option<Run> {
        self.by_number.get(&number).cloned()
    }

    pub fn list(&self) -> Vec<Run> {
        self.by_number.values().cloned().collect()
    }
}

// --- Condition types ---

#[derive(Debug, Default)]
pub(crate) struct ConditionTypeIndex {
    by_id: HashMap<ConditionTypeId, ConditionType>,
    by_name: HashMap<String, ConditionTypeId>,
}

impl ConditionTypeIndex {
    pub fn check_insert(&self, ty: &ConditionType) -> Result<(), StorageError> {
        if self.by_id.contains_key(&ty.id) {
            return Err(StorageError::DuplicateKey(format!("condition_types(id={})", ty.id)));
        }
        if self.by_name.contains_key(&ty.name) {
            return Err(StorageError::DuplicateKey(format!(
                "condition_types(name={})",
                ty.name
            )));
        }
        Ok(())
    }

    pub fn upsert(&mut self, ty: ConditionType) {
        if let Some(prev) = self.by_id.get(&ty.id) {
            if prev.name != ty.name {
                self.by_name.remove(&prev.name);
            }
        }
        self.by_name.insert(ty.name.clone(), ty.id);
        self.by_id.insert(ty.id, ty);
    }

    pub fn get(&self, id: ConditionTypeId) -> Option<ConditionType> {
        self.by_id.get(&id).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<ConditionType> {
        self.by_name
            .get(name)
            .and_then(|id| self.by_id.get(id))
            .cloned()
    }

    pub fn list(&self) -> Vec<ConditionType> {
        let mut out: Vec<ConditionType> = self.by_id.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

// --- Conditions ---

#[derive(Debug, Default)]
pub(crate) struct ConditionIndex {
    by_id: HashMap<ConditionId, Condition>,
    /// Global insertion order; per-key orders are derived from it.
    order: Vec<ConditionId>,
    by_run_type: HashMap<(RunNumber, ConditionTypeId), Vec<ConditionId>>,
    by_run: HashMap<RunNumber, Vec<ConditionId>>,
}

impl ConditionIndex {
    fn siblings(
        &self,
        run: RunNumber,
        type_id: ConditionTypeId,
    ) -> impl Iterator<Item = &Condition> {
        self.by_run_type
            .get(&(run, type_id))
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
    }

    pub fn check_insert(
        &self,
        condition: &Condition,
        is_many_per_run: bool,
    ) -> Result<(), StorageError> {
        if self.by_id.contains_key(&condition.id) {
            return Err(StorageError::DuplicateKey(format!("conditions(id={})", condition.id)));
        }

        let mut siblings = self.siblings(condition.run_number, condition.type_id);
        let collides = if is_many_per_run {
            siblings.any(|c| c.time == condition.time)
        } else {
            siblings.next().is_some()
        };

        if collides {
            return Err(StorageError::DuplicateKey(format!(
                "conditions(run={}, type={}, many={is_many_per_run}, time={:?})",
                condition.run_number, condition.type_id, condition.time
            )));
        }
        Ok(())
    }

    pub fn check_update(&self, condition: &Condition) -> Result<(), StorageError> {
        let prev = self
            .by_id
            .get(&condition.id)
            .ok_or_else(|| StorageError::NotFound(format!("condition {}", condition.id)))?;

        if prev.run_number != condition.run_number || prev.type_id != condition.type_id {
            return Err(StorageError::BackendError(format!(
                "condition {} cannot move to another run or type",
                condition.id
            )));
        }

        let collides = self
            .siblings(condition.run_number, condition.type_id)
            .any(|c| c.id != condition.id && c.time == condition.time);
        if collides {
            return Err(StorageError::DuplicateKey(format!(
                "conditions(run={}, type={}, time={:?})",
                condition.run_number, condition.type_id, condition.time
            )));
        }
        Ok(())
    }

    pub fn upsert(&mut self, condition: Condition) {
        if !self.by_id.contains_key(&condition.id) {
            self.order.push(condition.id);
            self.by_run_type
                .entry((condition.run_number, condition.type_id))
                .or_default()
                .push(condition.id);
            self.by_run
                .entry(condition.run_number)
                .or_default()
                .push(condition.id);
        }
        self.by_id.insert(condition.id, condition);
    }

    pub fn get(&self, id: ConditionId) -> Option<Condition> {
        self.by_id.get(&id).cloned()
    }

    pub fn find_by_run_type(&self, run: RunNumber, type_id: ConditionTypeId) -> Vec<Condition> {
        self.siblings(run, type_id).cloned().collect()
    }

    pub fn find_by_run(&self, run: RunNumber) -> Vec<Condition> {
        self.by_run
            .get(&run)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }

    /// Every entry in insertion order.
    pub fn all(&self) -> Vec<Condition> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }
}

// --- Hardware ---

#[derive(Debug, Default)]
pub(crate) struct HardwareIndex {
    boards: HashMap<BoardId, Board>,
    board_keys: HashMap<(String, String), BoardId>,
    crates: HashMap<CrateId, Crate>,
    crate_names: HashMap<String, CrateId>,
    installations: HashMap<BoardInstallationId, BoardInstallation>,
    installation_keys: HashMap<(CrateId, BoardId, u32), BoardInstallationId>,
    presets: HashMap<DacPresetId, DacPreset>,
    preset_keys: HashMap<(BoardId, Vec<i64>), DacPresetId>,
    configurations: HashMap<BoardConfigurationId, BoardConfiguration>,
    configuration_keys: HashMap<(BoardId, DacPresetId), BoardConfigurationId>,
}

fn board_key(board: &Board) -> (String, String) {
    (board.board_type.clone(), board.serial.clone())
}

impl HardwareIndex {
    pub fn check_board(&self, board: &Board) -> Result<(), StorageError> {
        if self.boards.contains_key(&board.id) || self.board_keys.contains_key(&board_key(board)) {
            return Err(StorageError::DuplicateKey(format!(
                "boards(type={}, serial={})",
                board.board_type, board.serial
            )));
        }
        Ok(())
    }

    pub fn upsert_board(&mut self, board: Board) {
        self.board_keys.insert(board_key(&board), board.id);
        self.boards.insert(board.id, board);
    }

    pub fn find_board(&self, board_type: &str, serial: &str) -> Option<Board> {
        self.board_keys
            .get(&(board_type.to_string(), serial.to_string()))
            .and_then(|id| self.boards.get(id))
            .cloned()
    }

    pub fn check_crate(&self, unit: &Crate) -> Result<(), StorageError> {
        if self.crates.contains_key(&unit.id) || self.crate_names.contains_key(&unit.name) {
            return Err(StorageError::DuplicateKey(format!("crates(name={})", unit.name)));
        }
        Ok(())
    }

    pub fn upsert_crate(&mut self, unit: Crate) {
        self.crate_names.insert(unit.name.clone(), unit.id);
        self.crates.insert(unit.id, unit);
    }

    pub fn find_crate(&self, name: &str) -> Option<Crate> {
        self.crate_names
            .get(name)
            .and_then(|id| self.crates.get(id))
            .cloned()
    }

    pub fn check_installation(&self, installation: &BoardInstallation) -> Result<(), StorageError> {
        let key = (installation.crate_id, installation.board_id, installation.slot);
        if self.installations.contains_key(&installation.id)
            || self.installation_keys.contains_key(&key)
        {
            return Err(StorageError::DuplicateKey(format!(
                "board_installations(crate={}, board={}, slot={})",
                installation.crate_id, installation.board_id, installation.slot
            )));
        }
        Ok(())
    }

    pub fn upsert_installation(&mut self, installation: BoardInstallation) {
        self.installation_keys.insert(
            (installation.crate_id, installation.board_id, installation.slot),
            installation.id,
        );
        self.installations.insert(installation.id, installation);
    }

    pub fn find_installation(
        &self,
        crate_id: CrateId,
        board_id: BoardId,
        slot: u32,
    ) -> Option<BoardInstallation> {
        self.installation_keys
            .get(&(crate_id, board_id, slot))
            .and_then(|id| self.installations.get(id))
            .cloned()
    }

    pub fn check_preset(&self, preset: &DacPreset) -> Result<(), StorageError> {
        let key = (preset.board_id, preset.values.clone());
        if self.presets.contains_key(&preset.id) || self.preset_keys.contains_key(&key) {
            return Err(StorageError::DuplicateKey(format!(
                "dac_presets(board={}, values={:?})",
                preset.board_id, preset.values
            )));
        }
        Ok(())
    }

    pub fn upsert_preset(&mut self, preset: DacPreset) {
        self.preset_keys
            .insert((preset.board_id, preset.values.clone()), preset.id);
        self.presets.insert(preset.id, preset);
    }

    pub fn find_preset(&self, board_id: BoardId, values: &[i64]) -> Option<DacPreset> {
        self.preset_keys
            .get(&(board_id, values.to_vec()))
            .and_then(|id| self.presets.get(id))
            .cloned()
    }

    pub fn check_configuration(&self, config: &BoardConfiguration) -> Result<(), StorageError> {
        let key = (config.board_id, config.dac_preset_id);
        if self.configurations.contains_key(&config.id)
            || self.configuration_keys.contains_key(&key)
        {
            return Err(StorageError::DuplicateKey(format!(
                "board_configurations(board={}, preset={})",
                config.board_id, config.dac_preset_id
            )));
        }
        Ok(())
    }

    pub fn upsert_configuration(&mut self, config: BoardConfiguration) {
        self.configuration_keys
            .insert((config.board_id, config.dac_preset_id), config.id);
        self.configurations.insert(config.id, config);
    }

    pub fn find_configuration(
        &self,
        board_id: BoardId,
        dac_preset_id: DacPresetId,
    ) -> Option<BoardConfiguration> {
        self.configuration_keys
            .get(&(board_id, dac_preset_id))
            .and_then(|id| self.configurations.get(id))
            .cloned()
    }

    pub fn boards(&self) -> Vec<Board> {
        self.boards.values().cloned().collect()
    }

    pub fn crates(&self) -> Vec<Crate> {
        self.crates.values().cloned().collect()
    }

    pub fn installations(&self) -> Vec<BoardInstallation> {
        self.installations.values().cloned().collect()
    }

    pub fn presets(&self) -> Vec<DacPreset> {
        self.presets.values().cloned().collect()
    }

    pub fn configurations(&self) -> Vec<BoardConfiguration> {
        self.configurations.values().cloned().collect()
    }
}

// --- Configuration files ---

#[derive(Debug, Default)]
pub(crate) struct ConfigFileIndex {
    by_id: HashMap<ConfigurationFileId, ConfigurationFile>,
    by_key: HashMap<(String, String), ConfigurationFileId>,
}

impl ConfigFileIndex {
    pub fn check_insert(&self, file: &ConfigurationFile) -> Result<(), StorageError> {
        let key = (file.checksum.clone(), file.path.clone());
        if self.by_id.contains_key(&file.id) || self.by_key.contains_key(&key) {
            return Err(StorageError::DuplicateKey(format!(
                "files(checksum={}, path={})",
                file.checksum, file.path
            )));
        }
        Ok(())
    }

    pub fn upsert(&mut self, file: ConfigurationFile) {
        self.by_key
            .insert((file.checksum.clone(), file.path.clone()), file.id);
        self.by_id.insert(file.id, file);
    }

    pub fn get(&self, id: ConfigurationFileId) -> Option<ConfigurationFile> {
        self.by_id.get(&id).cloned()
    }

    pub fn find(&self, checksum: &str, path: &str) -> Option<ConfigurationFile> {
        self.by_key
            .get(&(checksum.to_string(), path.to_string()))
            .and_then(|id| self.by_id.get(id))
            .cloned()
    }

    pub fn all(&self) -> Vec<ConfigurationFile> {
        self.by_id.values().cloned().collect()
    }
}

// --- Audit log ---

#[derive(Debug, Default)]
pub(crate) struct LogIndex {
    records: Vec<LogRecord>,
    ids: HashSet<LogRecordId>,
}

impl LogIndex {
    pub fn check_append(&self, record: &LogRecord) -> Result<(), StorageError> {
        if self.ids.contains(&record.id) {
            return Err(StorageError::DuplicateKey(format!("logs(id={})", record.id)));
        }
        Ok(())
    }

    /// Appends unless a record with the same id is already present.
    pub fn upsert(&mut self, record: LogRecord) {
        if self.ids.insert(record.id) {
            self.records.push(record);
        }
    }

    pub fn find_by_run(&self, run: RunNumber) -> Vec<LogRecord> {
        self.records
            .iter()
            .filter(|r| r.related_run == Some(run))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<LogRecord> {
        self.records.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use crate::value::{ConditionValue, ValueType};

    #[test]
    fn single_valued_key_is_run_and_type() {
        let mut index = ConditionIndex::default();
        let ty = ConditionType::new("event_count", ValueType::Int, false).unwrap();
        let run = RunNumber::new(1);

        let first = Condition::new(run, ty.id, ConditionValue::Int(1), None);
        index.check_insert(&first, false).unwrap();
        index.upsert(first);

        // A different time is still the same key.
        let second = Condition::new(run, ty.id, ConditionValue::Int(2), Some(Utc::now()));
        assert!(matches!(
            index.check_insert(&second, false),
            Err(StorageError::DuplicateKey(_))
        ));

        // Other runs are independent.
        let other = Condition::new(RunNumber::new(2), ty.id, ConditionValue::Int(2), None);
        index.check_insert(&other, false).unwrap();
    }

    #[test]
    fn multi_valued_key_includes_time() {
        let mut index = ConditionIndex::default();
        let ty = ConditionType::new("rate", ValueType::Float, true).unwrap();
        let run = RunNumber::new(1);
        let t = Utc::now();

        let untimed = Condition::new(run, ty.id, ConditionValue::Float(1.0), None);
        let timed = Condition::new(run, ty.id, ConditionValue::Float(2.0), Some(t));
        index.check_insert(&untimed, true).unwrap();
        index.upsert(untimed);
        index.check_insert(&timed, true).unwrap();
        index.upsert(timed.clone());

        let dup = Condition::new(run, ty.id, ConditionValue::Float(3.0), Some(t));
        assert!(index.check_insert(&dup, true).is_err());

        let dup_untimed = Condition::new(run, ty.id, ConditionValue::Float(3.0), None);
        assert!(index.check_insert(&dup_untimed, true).is_err());

        // Moving the timed entry onto the untimed slot collides.
        let mut moved = timed;
        moved.time = None;
        assert!(matches!(
            index.check_update(&moved),
            Err(StorageError::DuplicateKey(_))
        ));

        let values: Vec<f64> = index
            .find_by_run_type(run, ty.id)
            .iter()
            .filter_map(|c| c.value.as_float())
            .collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn upsert_keeps_position_and_is_idempotent() {
        let mut index = ConditionIndex::default();
        let ty = ConditionType::new("x", ValueType::Int, true).unwrap();
        let run = RunNumber::new(5);
        let a = Condition::new(run, ty.id, ConditionValue::Int(1), None);
        let b = Condition::new(run, ty.id, ConditionValue::Int(2), Some(Utc::now()));
        index.upsert(a.clone());
        index.upsert(b.clone());

        let mut a2 = a.clone();
        a2.value = ConditionValue::Int(10);
        index.upsert(a2.clone());
        index.upsert(a2);
        index.upsert(b);

        let all = index.find_by_run(run);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a.id);
        assert_eq!(all[0].value, ConditionValue::Int(10));
        assert_eq!(index.all().len(), 2);
    }

    #[test]
    fn update_rejects_unknown_and_moved_entries() {
        let mut index = ConditionIndex::default();
        let ty = ConditionType::new("x", ValueType::Int, false).unwrap();
        let c = Condition::new(RunNumber::new(1), ty.id, ConditionValue::Int(1), None);
        assert!(matches!(index.check_update(&c), Err(StorageError::NotFound(_))));

        index.upsert(c.clone());
        let mut moved = c;
        moved.run_number = RunNumber::new(2);
        assert!(matches!(
            index.check_update(&moved),
            Err(StorageError::BackendError(_))
        ));
    }

    #[test]
    fn hardware_natural_keys() {
        let mut index = HardwareIndex::default();
        let board = Board::new("fadc250", "SN-1");
        index.check_board(&board).unwrap();
        index.upsert_board(board.clone());
        assert!(index.check_board(&Board::new("fadc250", "SN-1")).is_err());
        assert_eq!(index.find_board("fadc250", "SN-1").map(|b| b.id), Some(board.id));
        assert!(index.find_board("fadc250", "SN-2").is_none());

        let preset = DacPreset::new(board.id, vec![1, 2, 3]);
        index.upsert_preset(preset.clone());
        assert_eq!(
            index.find_preset(board.id, &[1, 2, 3]).map(|p| p.id),
            Some(preset.id)
        );
        assert!(index.find_preset(board.id, &[1, 2]).is_none());
    }

    #[test]
    fn log_upsert_skips_replayed_records() {
        let mut index = LogIndex::default();
        let record =
            LogRecord::new(vec!["runs_1".to_string()], "Run created", Some(RunNumber::new(1)));
        index.upsert(record.clone());
        assert!(index.check_append(&record).is_err());
        index.upsert(record);
        assert_eq!(index.all().len(), 1);
        assert_eq!(index.find_by_run(RunNumber::new(1)).len(), 1);
        assert!(index.find_by_run(RunNumber::new(2)).is_empty());
    }
}
