//! Hardware inventory operations.
//!
//! Every record here is get-or-create on its natural identity: asking twice
//! for the same board, crate, slot installation, DAC preset, or board
//! configuration returns the same stored record.

use crate::error::RcdbResult;
use crate::hardware::{Board, BoardConfiguration, BoardInstallation, Crate, DacPreset};
use crate::run::{Run, RunNumber};

use super::RcdbEngine;

impl RcdbEngine {
    /// Returns the board with this type and serial number, creating it if absent.
    ///
    /// # Errors
    /// A storage error if the inventory cannot be read or written.
    pub fn obtain_board(&self, board_type: &str, serial: &str) -> RcdbResult<Board> {
        let _guard = self.lock_writes()?;
        self.obtain_board_locked(board_type, serial)
    }

    fn obtain_board_locked(&self, board_type: &str, serial: &str) -> RcdbResult<Board> {
        if let Some(board) = self
            .stores
            .hardware
            .find_board(board_type, serial)
            .map_err(Self::storage_err)?
        {
            return Ok(board);
        }

        tracing::debug!(
            "Board type='{board_type}' sn='{serial}' is not found in DB. Creating record"
        );
        let board = Board::new(board_type, serial);
        self.stores
            .hardware
            .insert_board(board.clone())
            .map_err(Self::storage_err)?;

        self.audit(
            vec![board.log_id()],
            format!("Board type='{board_type}' sn='{serial}' added to DB"),
            None,
        );
        Ok(board)
    }

    /// Returns the crate with this name, creating it if absent.
    ///
    /// # Errors
    /// A storage error if the inventory cannot be read or written.
    pub fn obtain_crate(&self, name: &str) -> RcdbResult<Crate> {
        let _guard = self.lock_writes()?;
        self.obtain_crate_locked(name)
    }

    fn obtain_crate_locked(&self, name: &str) -> RcdbResult<Crate> {
        if let Some(unit) = self
            .stores
            .hardware
            .find_crate(name)
            .map_err(Self::storage_err)?
        {
            return Ok(unit);
        }

        tracing::debug!("Crate '{name}' is not found in DB. Creating record");
        let unit = Crate::new(name);
        self.stores
            .hardware
            .insert_crate(unit.clone())
            .map_err(Self::storage_err)?;

        self.audit(
            vec![unit.log_id()],
            format!("Crate '{name}' is added to DB"),
            None,
        );
        Ok(unit)
    }

    /// Returns the installation of `board` in `slot` of `unit`, creating it if absent.
    ///
    /// # Errors
    /// A storage error if the inventory cannot be read or written.
    pub fn obtain_board_installation(
        &self,
        unit: &Crate,
        board: &Board,
        slot: u32,
    ) -> RcdbResult<BoardInstallation> {
        let _guard = self.lock_writes()?;
        self.obtain_board_installation_locked(unit, board, slot)
    }

    fn obtain_board_installation_locked(
        &self,
        unit: &Crate,
        board: &Board,
        slot: u32,
    ) -> RcdbResult<BoardInstallation> {
        if let Some(installation) = self
            .stores
            .hardware
            .find_installation(unit.id, board.id, slot)
            .map_err(Self::storage_err)?
        {
            return Ok(installation);
        }

        let installation = BoardInstallation::new(unit.id, board.id, slot);
        self.stores
            .hardware
            .insert_installation(installation.clone())
            .map_err(Self::storage_err)?;

        self.audit(
            vec![installation.log_id(), unit.log_id(), board.log_id()],
            format!(
                "Board installation for crate='{}', board='{}', sn='{}', slot='{}' added to DB",
                unit.name, board.board_type, board.serial, slot
            ),
            None,
        );
        Ok(installation)
    }

    /// Obtains crate, board, and the installation joining them in one step.
    ///
    /// # Errors
    /// A storage error if the inventory cannot be read or written.
    pub fn install_board(
        &self,
        crate_name: &str,
        board_type: &str,
        serial: &str,
        slot: u32,
    ) -> RcdbResult<BoardInstallation> {
        let _guard = self.lock_writes()?;
        let unit = self.obtain_crate_locked(crate_name)?;
        let board = self.obtain_board_locked(board_type, serial)?;
        self.obtain_board_installation_locked(&unit, &board, slot)
    }

    /// Returns the DAC preset of `board` with exactly these values, creating it if absent.
    ///
    /// # Errors
    /// A storage error if the inventory cannot be read or written.
    pub fn obtain_dac_preset(&self, board: &Board, values: &[i64]) -> RcdbResult<DacPreset> {
        let _guard = self.lock_writes()?;
        if let Some(preset) = self
            .stores
            .hardware
            .find_dac_preset(board.id, values)
            .map_err(Self::storage_err)?
        {
            return Ok(preset);
        }

        let preset = DacPreset::new(board.id, values.to_vec());
        self.stores
            .hardware
            .insert_dac_preset(preset.clone())
            .map_err(Self::storage_err)?;

        self.audit(
            vec![preset.log_id(), board.log_id()],
            format!(
                "DAC preset with {} values added for board type='{}' sn='{}'",
                values.len(),
                board.board_type,
                board.serial
            ),
            None,
        );
        Ok(preset)
    }

    /// Records that `board` ran with `preset` in a run.
    ///
    /// The run is created if absent. The (board, preset) configuration is
    /// shared across runs and attached to each run at most once.
    ///
    /// # Errors
    /// A storage error if the inventory or the run cannot be read or written.
    pub fn add_board_config_to_run(
        &self,
        run_number: impl Into<RunNumber>,
        board: &Board,
        preset: &DacPreset,
    ) -> RcdbResult<BoardConfiguration> {
        let run_number = run_number.into();
        let _guard = self.lock_writes()?;
        let mut run = self.obtain_run_locked(run_number)?;

        let config = match self
            .stores
            .hardware
            .find_board_configuration(board.id, preset.id)
            .map_err(Self::storage_err)?
        {
            Some(config) => config,
            None => {
                let config = BoardConfiguration::new(board.id, preset.id);
                self.stores
                    .hardware
                    .insert_board_configuration(config.clone())
                    .map_err(Self::storage_err)?;

                self.audit(
                    vec![config.log_id(), board.log_id(), preset.log_id()],
                    format!(
                        "Board conf create. board.id='{}', dac_preset.id='{}'",
                        board.id, preset.id
                    ),
                    Some(run_number),
                );
                config
            }
        };

        if run.attach_board_configuration(config.id) {
            self.stores
                .runs
                .update(run.clone())
                .map_err(Self::storage_err)?;
            self.audit(
                vec![config.log_id(), run.log_id()],
                format!("Board conf id='{}' added to run='{}'", config.id, run_number),
                Some(run_number),
            );
        }
        Ok(config)
    }

    /// Records that `installation` was present during a run.
    ///
    /// The run is created if absent. Attaching the same installation twice is
    /// a no-op.
    ///
    /// # Errors
    /// A storage error if the run cannot be read or written.
    pub fn add_board_installation_to_run(
        &self,
        run_number: impl Into<RunNumber>,
        installation: &BoardInstallation,
    ) -> RcdbResult<Run> {
        let run_number = run_number.into();
        let _guard = self.lock_writes()?;
        let mut run = self.obtain_run_locked(run_number)?;

        if run.attach_installation(installation.id) {
            self.stores
                .runs
                .update(run.clone())
                .map_err(Self::storage_err)?;
            self.audit(
                vec![installation.log_id(), run.log_id()],
                format!(
                    "Add board_installation='{}' to run='{}'",
                    installation.id, run_number
                ),
                Some(run_number),
            );
        }
        Ok(run)
    }
}
