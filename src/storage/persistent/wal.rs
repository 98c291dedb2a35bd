//! Write-ahead log.
//!
//! Every mutation is appended here before it is applied to the in-memory
//! indexes. On open the log is replayed on top of the last snapshot.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [ENTRY 1: codec-framed WalEntry]
//! [ENTRY 2: codec-framed WalEntry]
//! ...
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Error as IoError, ErrorKind, Result as IoResult, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::LogRecord;
use crate::condition::Condition;
use crate::condition_type::ConditionType;
use crate::config_file::ConfigurationFile;
use crate::hardware::{Board, BoardConfiguration, BoardInstallation, Crate, DacPreset};
use crate::run::Run;

use super::codec;

/// A single entry in the write-ahead log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing within one log generation.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: WalEntryKind,
}

/// The logged mutation. Every variant carries the full record so replay can
/// upsert by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntryKind {
    RunInsert(Run),
    RunUpdate(Run),
    ConditionTypeInsert(ConditionType),
    ConditionInsert(Condition),
    ConditionUpdate(Condition),
    BoardInsert(Board),
    CrateInsert(Crate),
    InstallationInsert(BoardInstallation),
    DacPresetInsert(DacPreset),
    BoardConfigurationInsert(BoardConfiguration),
    FileInsert(ConfigurationFile),
    LogAppend(LogRecord),
}

struct WalState {
    writer: BufWriter<File>,
    sequence: u64,
}

/// Append-only log file. Thread-safe via an internal mutex.
pub struct WriteAheadLog {
    path: PathBuf,
    state: Mutex<WalState>,
    sync_on_write: bool,
}

impl WriteAheadLog {
    /// Opens or creates the log at `path`.
    ///
    /// An existing log is scanned to recover the last sequence number. A
    /// partial entry left by a crash mid-append is cut off; any other damage
    /// fails the open. A file shorter than the header is reinitialised.
    pub fn open(path: &Path, sync_on_write: bool) -> IoResult<Self> {
        let len = if path.exists() {
            std::fs::metadata(path)?.len()
        } else {
            0
        };

        let sequence = if len >= codec::HEADER_LEN {
            let (sequence, valid_end) = Self::recover(path)?;
            if valid_end < len {
                tracing::warn!(
                    path = %path.display(),
                    discarded_bytes = len - valid_end,
                    "WAL ends with a partial entry; truncating"
                );
                let file = OpenOptions::new().write(true).open(path)?;
                file.set_len(valid_end)?;
                file.sync_all()?;
            }
            sequence
        } else {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            codec::write_header(&mut file)?;
            if sync_on_write {
                file.sync_all()?;
            }
            0
        };

        let file = OpenOptions::new().append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(WalState {
                writer: BufWriter::new(file),
                sequence,
            }),
            sync_on_write,
        })
    }

    fn lock(&self) -> IoResult<MutexGuard<'_, WalState>> {
        self.state
            .lock()
            .map_err(|_| IoError::new(ErrorKind::Other, "poisoned WAL lock"))
    }

    /// Appends an entry, returning its sequence number.
    pub fn append(&self, kind: WalEntryKind) -> IoResult<u64> {
        let mut state = self.lock()?;
        let sequence = state.sequence + 1;
        let encoded = codec::encode(&WalEntry {
            sequence,
            timestamp: Utc::now(),
            kind,
        })?;

        state.writer.write_all(&encoded)?;
        state.writer.flush()?;
        if self.sync_on_write {
            state.writer.get_ref().sync_data()?;
        }

        state.sequence = sequence;
        Ok(sequence)
    }

    /// Iterates over the entries currently on disk.
    pub fn iter(&self) -> IoResult<WalIterator> {
        WalIterator::new(&self.path)
    }

    /// Sequence number of the last appended entry.
    pub fn current_sequence(&self) -> IoResult<u64> {
        Ok(self.lock()?.sequence)
    }

    /// WAL file size in bytes.
    pub fn size_bytes(&self) -> IoResult<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Drops every entry, leaving only the header.
    ///
    /// Call only after the state the entries describe has been durably
    /// written elsewhere.
    pub fn truncate(&self) -> IoResult<()> {
        let mut state = self.lock()?;
        state.writer.flush()?;

        let file = state.writer.get_mut();
        file.set_len(0)?;
        codec::write_header(file)?;
        if self.sync_on_write {
            file.sync_all()?;
        }

        state.sequence = 0;
        Ok(())
    }

    /// Returns the last sequence number and the offset just past the last
    /// complete entry.
    fn recover(path: &Path) -> IoResult<(u64, u64)> {
        let mut iter = WalIterator::new(path)?;
        let mut last = 0;
        for entry in iter.by_ref() {
            let entry = entry.map_err(|e| {
                tracing::warn!(after_sequence = last, error = %e, "WAL corruption detected");
                e
            })?;
            last = entry.sequence;
        }
        Ok((last, iter.valid_end))
    }
}

/// Iterator over WAL entries.
///
/// A frame cut short by a crash ends iteration; any other decode failure is
/// yielded as an error.
pub struct WalIterator {
    reader: BufReader<File>,
    file_size: u64,
    valid_end: u64,
}

impl WalIterator {
    fn new(path: &Path) -> IoResult<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        codec::read_header(&mut reader)?;
        Ok(Self {
            reader,
            file_size,
            valid_end: codec::HEADER_LEN,
        })
    }
}

impl Iterator for WalIterator {
    type Item = IoResult<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.stream_position() {
            Ok(pos) if pos >= self.file_size => return None,
            Ok(_) => {}
            Err(e) => return Some(Err(e)),
        }

        match codec::decode(&mut self.reader) {
            Ok(entry) => match self.reader.stream_position() {
                Ok(pos) => {
                    self.valid_end = pos;
                    Some(Ok(entry))
                }
                Err(e) => Some(Err(e)),
            },
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }
}
