//! Framing codec for WAL entries and snapshots.
//!
//! Every record is JSON framed as:
//! ```text
//! [version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
//! ```
//! Files start with [`MAGIC`] followed by the codec version.

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

/// Current codec version.
pub const CODEC_VERSION: u8 = 1;

/// Magic bytes identifying RCDB files.
pub const MAGIC: [u8; 4] = *b"RCDB";

/// Upper bound on a single framed record.
const MAX_RECORD_SIZE: usize = 256 * 1024 * 1024;

fn invalid(message: String) -> IoError {
    IoError::new(ErrorKind::InvalidData, message)
}

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Serializes and frames a value.
pub fn encode<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let data =
        serde_json::to_vec(value).map_err(|e| invalid(format!("serialization failed: {e}")))?;

    if data.len() > MAX_RECORD_SIZE {
        return Err(invalid(format!(
            "record size {} exceeds maximum {MAX_RECORD_SIZE}",
            data.len()
        )));
    }
    let len = u32::try_from(data.len()).map_err(|_| invalid("record too large".to_string()))?;

    let mut out = Vec::with_capacity(data.len() + 9);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&crc32(&data).to_le_bytes());
    Ok(out)
}

/// Reads one framed record, verifying version and checksum.
///
/// # Errors
/// `UnexpectedEof` if the stream ends inside the frame; `InvalidData` on a
/// version, size, checksum, or deserialization failure.
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> IoResult<T> {
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(invalid(format!(
            "unsupported codec version: {} (expected {CODEC_VERSION})",
            version[0]
        )));
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_RECORD_SIZE {
        return Err(invalid(format!(
            "record size {len} exceeds maximum {MAX_RECORD_SIZE}"
        )));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = crc32(&data);
    if stored != computed {
        return Err(invalid(format!(
            "CRC mismatch: stored={stored:08x}, computed={computed:08x}"
        )));
    }

    serde_json::from_slice(&data).map_err(|e| invalid(format!("deserialization failed: {e}")))
}

/// Writes the file header.
pub fn write_header(writer: &mut impl Write) -> IoResult<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[CODEC_VERSION])
}

/// Reads and validates the file header, returning the codec version.
pub fn read_header(reader: &mut impl Read) -> IoResult<u8> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(invalid(format!(
            "invalid magic bytes: expected {MAGIC:?}, got {magic:?}"
        )));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    Ok(version[0])
}

/// Length of the file header in bytes.
pub const HEADER_LEN: u64 = 5;
