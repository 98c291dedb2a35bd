//! Run bookkeeping.

use chrono::{DateTime, Utc};

use crate::error::{ExecutionError, RcdbResult};
use crate::run::{Run, RunNumber};

use super::RcdbEngine;

impl RcdbEngine {
    /// The run with this number, if it exists.
    ///
    /// # Errors
    /// A storage error if the run cannot be read.
    pub fn get_run(&self, run_number: impl Into<RunNumber>) -> RcdbResult<Option<Run>> {
        self.stores
            .runs
            .get(run_number.into())
            .map_err(Self::storage_err)
    }

    /// The run with this number.
    ///
    /// # Errors
    /// `RunNotFound` if it does not exist.
    pub fn lookup_run(&self, run_number: impl Into<RunNumber>) -> RcdbResult<Run> {
        let run_number = run_number.into();
        self.get_run(run_number)?
            .ok_or_else(|| ExecutionError::RunNotFound { run_number }.into())
    }

    /// Returns the run with this number, creating it if absent.
    ///
    /// # Errors
    /// A storage error if the run cannot be read or created.
    pub fn obtain_run(&self, run_number: impl Into<RunNumber>) -> RcdbResult<Run> {
        let run_number = run_number.into();
        let _guard = self.lock_writes()?;
        self.obtain_run_locked(run_number)
    }

    pub(super) fn obtain_run_locked(&self, run_number: RunNumber) -> RcdbResult<Run> {
        if let Some(run) = self.get_run(run_number)? {
            return Ok(run);
        }

        tracing::debug!(run = run_number.get(), "run is not found in DB. Creating record");
        let run = Run::new(run_number);
        self.stores
            .runs
            .insert(run.clone())
            .map_err(Self::storage_err)?;

        self.audit(
            vec![run.log_id()],
            format!("Run number='{run_number}' created"),
            Some(run_number),
        );
        Ok(run)
    }

    /// Sets the run start time, creating the run if needed.
    ///
    /// # Errors
    /// A storage error if the run cannot be read or written.
    pub fn set_run_start_time(
        &self,
        run_number: impl Into<RunNumber>,
        start_time: DateTime<Utc>,
    ) -> RcdbResult<Run> {
        self.update_run(run_number.into(), |run| {
            run.start_time = Some(start_time);
            format!(
                "Start time changed to '{}' for run '{}'",
                start_time.to_rfc3339(),
                run.number
            )
        })
    }

    /// Sets the run end time, creating the run if needed.
    ///
    /// # Errors
    /// A storage error if the run cannot be read or written.
    pub fn set_run_end_time(
        &self,
        run_number: impl Into<RunNumber>,
        end_time: DateTime<Utc>,
    ) -> RcdbResult<Run> {
        self.update_run(run_number.into(), |run| {
            run.end_time = Some(end_time);
            format!(
                "End time changed to '{}' for run '{}'",
                end_time.to_rfc3339(),
                run.number
            )
        })
    }

    /// Records the total event count of a run, creating the run if needed.
    ///
    /// # Errors
    /// A storage error if the run cannot be read or written.
    pub fn set_run_statistics(
        &self,
        run_number: impl Into<RunNumber>,
        total_events: u64,
    ) -> RcdbResult<Run> {
        self.update_run(run_number.into(), |run| {
            run.total_events = Some(total_events);
            format!("Run statistics updated. total_events='{total_events}'")
        })
    }

    /// All runs, ascending by number.
    ///
    /// # Errors
    /// A storage error if the runs cannot be read.
    pub fn list_runs(&self) -> RcdbResult<Vec<Run>> {
        self.stores.runs.list().map_err(Self::storage_err)
    }

    fn update_run(
        &self,
        run_number: RunNumber,
        apply: impl FnOnce(&mut Run) -> String,
    ) -> RcdbResult<Run> {
        let _guard = self.lock_writes()?;
        let mut run = self.obtain_run_locked(run_number)?;
        let description = apply(&mut run);
        self.stores
            .runs
            .update(run.clone())
            .map_err(Self::storage_err)?;

        self.audit(vec![run.log_id()], description, Some(run_number));
        Ok(run)
    }
}
