//! Runs: time-bounded data-taking sessions identified by a run number.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config_file::ConfigurationFileId;
use crate::hardware::{BoardConfigurationId, BoardInstallationId};

/// Run number as assigned by the data acquisition system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunNumber(u64);

impl RunNumber {
    #[must_use]
    pub const fn new(number: u64) -> Self {
        Self(number)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RunNumber {
    fn from(number: u64) -> Self {
        Self(number)
    }
}

impl From<u32> for RunNumber {
    fn from(number: u32) -> Self {
        Self(u64::from(number))
    }
}

impl From<RunNumber> for u64 {
    fn from(number: RunNumber) -> Self {
        number.0
    }
}

/// A run and the run-level bookkeeping attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub number: RunNumber,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_events: Option<u64>,
    /// Board installations present during the run.
    pub board_installations: Vec<BoardInstallationId>,
    /// Board configurations (board + DAC preset) used in the run.
    pub board_configurations: Vec<BoardConfigurationId>,
    /// Archived configuration files used by the run.
    pub files: Vec<ConfigurationFileId>,
    pub created_at: DateTime<Utc>,
}

impl Run {
    /// Creates an empty run record.
    #[must_use]
    pub fn new(number: impl Into<RunNumber>) -> Self {
        Self {
            number: number.into(),
            start_time: None,
            end_time: None,
            total_events: None,
            board_installations: Vec::new(),
            board_configurations: Vec::new(),
            files: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Audit identifier of this run.
    #[must_use]
    pub fn log_id(&self) -> String {
        format!("runs_{}", self.number)
    }

    /// Run duration, when both ends are known.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Associates a board installation. Returns false if it was already present.
    pub fn attach_installation(&mut self, id: BoardInstallationId) -> bool {
        attach(&mut self.board_installations, id)
    }

    /// Associates a board configuration. Returns false if it was already present.
    pub fn attach_board_configuration(&mut self, id: BoardConfigurationId) -> bool {
        attach(&mut self.board_configurations, id)
    }

    /// Associates a configuration file. Returns false if it was already present.
    pub fn attach_file(&mut self, id: ConfigurationFileId) -> bool {
        attach(&mut self.files, id)
    }
}

fn attach<T: PartialEq>(list: &mut Vec<T>, id: T) -> bool {
    if list.contains(&id) {
        return false;
    }
    list.push(id);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_is_empty() {
        let run = Run::new(42u64);
        assert_eq!(run.number, RunNumber::new(42));
        assert!(run.start_time.is_none());
        assert!(run.total_events.is_none());
        assert_eq!(run.log_id(), "runs_42");
        assert!(run.duration().is_none());
    }

    #[test]
    fn test_attach_is_idempotent() {
        let mut run = Run::new(1u64);
        let id = ConfigurationFileId::new();
        assert!(run.attach_file(id));
        assert!(!run.attach_file(id));
        assert_eq!(run.files, vec![id]);
    }

    #[test]
    fn test_duration() {
        let mut run = Run::new(1u64);
        let start = Utc::now();
        run.start_time = Some(start);
        run.end_time = Some(start + chrono::Duration::minutes(90));
        assert_eq!(run.duration(), Some(chrono::Duration::minutes(90)));
    }
}
