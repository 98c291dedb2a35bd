//! Archived configuration files.
//!
//! Files are content-addressed: a record is identified by the blake3 checksum
//! of its content together with the path it was read from. The same file used
//! by many runs is stored once.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::uuid_id;

uuid_id!(
    /// Unique identifier for an archived configuration file.
    ConfigurationFileId
);

/// Hex-encoded blake3 checksum of `content`.
#[must_use]
pub fn checksum(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// A configuration file captured at the time a run used it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationFile {
    pub id: ConfigurationFileId,
    pub path: String,
    pub checksum: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ConfigurationFile {
    /// Builds a record from already-read file content.
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: ConfigurationFileId::new(),
            path: path.into(),
            checksum: checksum(content.as_bytes()),
            content,
            created_at: Utc::now(),
        }
    }

    /// Reads a file from disk.
    ///
    /// Non UTF-8 bytes are replaced; the checksum is taken over the raw bytes.
    ///
    /// # Errors
    /// Returns the underlying I/O error if the file cannot be read.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self {
            id: ConfigurationFileId::new(),
            path: path.to_string_lossy().into_owned(),
            checksum: checksum(&bytes),
            content: String::from_utf8_lossy(&bytes).into_owned(),
            created_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn log_id(&self) -> String {
        format!("files_{}", self.id)
    }
}
