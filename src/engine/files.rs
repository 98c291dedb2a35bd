//! Configuration file archival.

use std::path::Path;

use crate::config_file::ConfigurationFile;
use crate::error::{ExecutionError, RcdbResult};
use crate::run::RunNumber;

use super::RcdbEngine;

impl RcdbEngine {
    /// Archives the file at `path` and associates it with a run.
    ///
    /// The file is read now. An identical file (same checksum and path) is
    /// stored once and shared by every run that used it. The run is created if
    /// absent.
    ///
    /// # Errors
    /// - `Io` if the file cannot be read
    /// - a storage error if the archive or the run cannot be read or written
    pub fn add_configuration_file(
        &self,
        run_number: impl Into<RunNumber>,
        path: impl AsRef<Path>,
    ) -> RcdbResult<ConfigurationFile> {
        let run_number = run_number.into();
        let path = path.as_ref();
        let read = ConfigurationFile::read(path).map_err(|e| ExecutionError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let _guard = self.lock_writes()?;
        let mut run = self.obtain_run_locked(run_number)?;

        let file = match self
            .stores
            .files
            .find(&read.checksum, &read.path)
            .map_err(Self::storage_err)?
        {
            Some(existing) => existing,
            None => {
                self.stores
                    .files
                    .insert(read.clone())
                    .map_err(Self::storage_err)?;
                self.audit(
                    vec![read.log_id(), run.log_id()],
                    format!(
                        "File added to DB. Path: '{}'. Run: '{}'",
                        read.path, run_number
                    ),
                    Some(run_number),
                );
                read
            }
        };

        if run.attach_file(file.id) {
            self.stores
                .runs
                .update(run.clone())
                .map_err(Self::storage_err)?;
            self.audit(
                vec![file.log_id(), run.log_id()],
                format!(
                    "File associated. Path: '{}'. Run: '{}'",
                    file.path, run_number
                ),
                Some(run_number),
            );
        }
        Ok(file)
    }

    /// Files associated with a run, in association order.
    ///
    /// # Errors
    /// - `RunNotFound` if the run does not exist
    /// - a storage error if a referenced file is missing from the archive
    pub fn files_for_run(
        &self,
        run_number: impl Into<RunNumber>,
    ) -> RcdbResult<Vec<ConfigurationFile>> {
        let run = self.lookup_run(run_number)?;
        run.files
            .iter()
            .map(|id| -> RcdbResult<ConfigurationFile> {
                self.stores
                    .files
                    .get(*id)
                    .map_err(Self::storage_err)?
                    .ok_or_else(|| {
                        ExecutionError::Storage {
                            message: format!(
                                "configuration file {id} referenced by run {} is missing",
                                run.number
                            ),
                        }
                        .into()
                    })
            })
            .collect()
    }
}
