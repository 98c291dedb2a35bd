//! Full-state snapshots written by compaction.
//!
//! A snapshot is one codec frame holding every record. It is written to a
//! temporary file, fsynced, and renamed over the previous snapshot, so a crash
//! leaves either the old or the new snapshot in place.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Result as IoResult, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::LogRecord;
use crate::condition::Condition;
use crate::condition_type::ConditionType;
use crate::config_file::ConfigurationFile;
use crate::hardware::{Board, BoardConfiguration, BoardInstallation, Crate, DacPreset};
use crate::run::Run;

use super::codec;

/// Serialized database state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub created_at: Option<DateTime<Utc>>,
    pub runs: Vec<Run>,
    pub condition_types: Vec<ConditionType>,
    /// In insertion order.
    pub conditions: Vec<Condition>,
    pub boards: Vec<Board>,
    pub crates: Vec<Crate>,
    pub installations: Vec<BoardInstallation>,
    pub dac_presets: Vec<DacPreset>,
    pub board_configurations: Vec<BoardConfiguration>,
    pub files: Vec<ConfigurationFile>,
    /// In append order.
    pub logs: Vec<LogRecord>,
}

impl Snapshot {
    /// Total number of records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.runs.len()
            + self.condition_types.len()
            + self.conditions.len()
            + self.boards.len()
            + self.crates.len()
            + self.installations.len()
            + self.dac_presets.len()
            + self.board_configurations.len()
            + self.files.len()
            + self.logs.len()
    }

    /// Reads the snapshot at `path`, or `None` if there is none yet.
    pub fn load(path: &Path) -> IoResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let mut reader = BufReader::new(File::open(path)?);
        codec::read_header(&mut reader)?;
        codec::decode(&mut reader).map(Some)
    }

    /// Atomically replaces the snapshot at `path`.
    pub fn write_atomic(&self, path: &Path) -> IoResult<()> {
        let temp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4()));

        let result = (|| -> IoResult<()> {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            let mut writer = BufWriter::new(file);
            codec::write_header(&mut writer)?;
            writer.write_all(&codec::encode(self)?)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            fs::rename(&temp_path, path)
        })();

        if result.is_err() && temp_path.exists() {
            // Best effort; the write error is returned.
            let _ = fs::remove_file(&temp_path);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::value::ValueType;

    #[test]
    fn test_missing_snapshot_is_none() {
        let dir = tempdir().unwrap();
        assert!(Snapshot::load(&dir.path().join("rcdb.snapshot")).unwrap().is_none());
    }

    #[test]
    fn test_write_replaces_previous() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rcdb.snapshot");

        let mut first = Snapshot::default();
        first.runs.push(Run::new(1u64));
        first.write_atomic(&path).unwrap();

        let mut second = first.clone();
        second.runs.push(Run::new(2u64));
        second
            .condition_types
            .push(ConditionType::new("evt_count", ValueType::Int, false).unwrap());
        second.write_atomic(&path).unwrap();

        let loaded = Snapshot::load(&path).unwrap().unwrap();
        assert_eq!(loaded.runs.len(), 2);
        assert_eq!(loaded.record_count(), 3);

        // No temp files left behind.
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
