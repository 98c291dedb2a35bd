//! Hardware inventory: boards, crates, slot installations, DAC presets.
//!
//! All of these are get-or-create records keyed by their natural identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::uuid_id;

uuid_id!(
    /// Unique identifier for a board.
    BoardId
);
uuid_id!(
    /// Unique identifier for a crate.
    CrateId
);
uuid_id!(
    /// Unique identifier for a board installation.
    BoardInstallationId
);
uuid_id!(
    /// Unique identifier for a DAC preset.
    DacPresetId
);
uuid_id!(
    /// Unique identifier for a board configuration.
    BoardConfigurationId
);

/// A physical board, identified by (type, serial number).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub board_type: String,
    pub serial: String,
    pub created_at: DateTime<Utc>,
}

impl Board {
    #[must_use]
    pub fn new(board_type: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            id: BoardId::new(),
            board_type: board_type.into(),
            serial: serial.into(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn log_id(&self) -> String {
        format!("boards_{}", self.id)
    }
}

/// An electronics crate, identified by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crate {
    pub id: CrateId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Crate {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CrateId::new(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn log_id(&self) -> String {
        format!("crates_{}", self.id)
    }
}

/// A board placed in a crate slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardInstallation {
    pub id: BoardInstallationId,
    pub crate_id: CrateId,
    pub board_id: BoardId,
    pub slot: u32,
    pub created_at: DateTime<Utc>,
}

impl BoardInstallation {
    #[must_use]
    pub fn new(crate_id: CrateId, board_id: BoardId, slot: u32) -> Self {
        Self {
            id: BoardInstallationId::new(),
            crate_id,
            board_id,
            slot,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn log_id(&self) -> String {
        format!("board_installations_{}", self.id)
    }
}

/// A set of DAC values loaded onto a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DacPreset {
    pub id: DacPresetId,
    pub board_id: BoardId,
    pub values: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

impl DacPreset {
    #[must_use]
    pub fn new(board_id: BoardId, values: Vec<i64>) -> Self {
        Self {
            id: DacPresetId::new(),
            board_id,
            values,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn log_id(&self) -> String {
        format!("dac_presets_{}", self.id)
    }
}

/// The pairing of a board with the DAC preset it ran with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfiguration {
    pub id: BoardConfigurationId,
    pub board_id: BoardId,
    pub dac_preset_id: DacPresetId,
    pub created_at: DateTime<Utc>,
}

impl BoardConfiguration {
    #[must_use]
    pub fn new(board_id: BoardId, dac_preset_id: DacPresetId) -> Self {
        Self {
            id: BoardConfigurationId::new(),
            board_id,
            dac_preset_id,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn log_id(&self) -> String {
        format!("board_configurations_{}", self.id)
    }
}
