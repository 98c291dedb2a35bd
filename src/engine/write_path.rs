//! Condition write and read paths.
//!
//! A write resolves the run and the type, fits the value to the type, fetches
//! the entries stored for (run, type), and lets [`reconcile::decide`] pick the
//! outcome. The store is touched only for an insert or a replace.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::condition::{Condition, ConditionRead, ConditionWrite, WriteOutcome};
use crate::condition_type::{validate_name, ConditionType, TypeRef};
use crate::error::{ExecutionError, RcdbError, RcdbResult, ValidationError};
use crate::reconcile::{self, Decision, Incoming, Rejection};
use crate::run::RunNumber;
use crate::value::{ConditionValue, ValueType};

use super::RcdbEngine;

/// Prefix of the per-component statistics condition types.
pub const COMPONENT_STAT_PREFIX: &str = "component_stat_";

impl RcdbEngine {
    /// Writes a condition value for a run.
    ///
    /// `time = None` addresses the untimed slot. With `replace = false` a write
    /// that would change stored data is rejected; with `replace = true` it
    /// overwrites the stored entry in place.
    ///
    /// # Errors
    /// - `RunNotFound` if the run does not exist (runs are never auto-created here)
    /// - `ConditionTypeNotFound` if the type does not resolve
    /// - `ValueTypeMismatch` if the value does not fit the type
    /// - `ConditionConflict` if the key holds different data and `replace` is false
    pub fn write_condition<'a>(
        &self,
        run_number: impl Into<RunNumber>,
        type_ref: impl Into<TypeRef<'a>>,
        value: impl Into<ConditionValue>,
        time: Option<DateTime<Utc>>,
        replace: bool,
    ) -> RcdbResult<ConditionWrite> {
        let run_number = run_number.into();
        let type_ref = type_ref.into();
        let value = value.into();

        let _guard = self.lock_writes()?;
        self.write_condition_locked(run_number, type_ref, value, time, replace)
    }

    pub(super) fn write_condition_locked(
        &self,
        run_number: RunNumber,
        type_ref: TypeRef<'_>,
        value: ConditionValue,
        time: Option<DateTime<Utc>>,
        replace: bool,
    ) -> RcdbResult<ConditionWrite> {
        self.lookup_run(run_number)?;
        let ty = self.resolve_type(type_ref)?;
        let value = self.fit_value(&ty, value)?;

        let existing = self
            .stores
            .conditions
            .find_by_run_type(run_number, ty.id)
            .map_err(Self::storage_err)?;

        let incoming = Incoming {
            value: &value,
            time,
            replace,
        };
        let decision = reconcile::decide(&ty, &existing, &incoming)
            .map_err(|rejection| conflict(run_number, &ty, &incoming, rejection))?;

        match decision {
            Decision::Unchanged(stored) => {
                tracing::debug!(
                    run = run_number.get(),
                    condition = %ty.name,
                    "condition unchanged"
                );
                Ok(ConditionWrite {
                    condition: stored.clone(),
                    outcome: WriteOutcome::Unchanged,
                })
            }
            Decision::Insert => {
                let condition = Condition::new(run_number, ty.id, value, time);
                self.stores
                    .conditions
                    .insert(condition.clone(), ty.is_many_per_run)
                    .map_err(Self::storage_err)?;

                self.audit(
                    vec![condition.log_id()],
                    format!(
                        "Condition '{}' set to {} for run '{}'",
                        ty.name, condition.value, run_number
                    ),
                    Some(run_number),
                );
                Ok(ConditionWrite {
                    condition,
                    outcome: WriteOutcome::Inserted,
                })
            }
            Decision::Replace(stored) => {
                let mut condition = stored.clone();
                let previous = std::mem::replace(&mut condition.value, value);
                condition.time = time;
                condition.updated_at = Utc::now();
                self.stores
                    .conditions
                    .update(condition.clone())
                    .map_err(Self::storage_err)?;

                self.audit(
                    vec![condition.log_id()],
                    format!(
                        "Condition '{}' replaced for run '{}': {} -> {}",
                        ty.name, run_number, previous, condition.value
                    ),
                    Some(run_number),
                );
                Ok(ConditionWrite {
                    condition,
                    outcome: WriteOutcome::Replaced,
                })
            }
        }
    }

    /// Reads the stored value(s) of a condition for a run.
    ///
    /// Single-valued types yield `ConditionRead::Single`, multi-valued types
    /// `ConditionRead::Many` in insertion order. An unknown run reads as empty.
    ///
    /// # Errors
    /// `ConditionTypeNotFound` if the type does not resolve.
    pub fn read_condition<'a>(
        &self,
        run_number: impl Into<RunNumber>,
        type_ref: impl Into<TypeRef<'a>>,
    ) -> RcdbResult<ConditionRead> {
        let run_number = run_number.into();
        let ty = self.resolve_type(type_ref.into())?;

        let mut entries = self
            .stores
            .conditions
            .find_by_run_type(run_number, ty.id)
            .map_err(Self::storage_err)?;

        if ty.is_many_per_run {
            Ok(ConditionRead::Many(entries))
        } else {
            entries.truncate(1);
            Ok(ConditionRead::Single(entries.pop()))
        }
    }

    /// Every condition attached to a run, in insertion order.
    ///
    /// # Errors
    /// A storage error if the conditions cannot be read.
    pub fn conditions_for_run(
        &self,
        run_number: impl Into<RunNumber>,
    ) -> RcdbResult<Vec<Condition>> {
        self.stores
            .conditions
            .find_by_run(run_number.into())
            .map_err(Self::storage_err)
    }

    /// Records DAQ statistics for one component at `time`.
    ///
    /// Stored as a multi-valued JSON condition named
    /// `component_stat_<component_name>`, registered on first use.
    ///
    /// # Errors
    /// `NonFiniteStatistic` if a rate is NaN or infinite; otherwise as for
    /// [`Self::write_condition`], including a conflict if different
    /// statistics were already recorded at the same time.
    #[allow(clippy::too_many_arguments)]
    pub fn add_run_component_statistics(
        &self,
        run_number: impl Into<RunNumber>,
        time: DateTime<Utc>,
        component_name: &str,
        component_type: &str,
        event_rate: f64,
        data_rate: f64,
        event_count: u64,
    ) -> RcdbResult<ConditionWrite> {
        let run_number = run_number.into();
        let name = format!("{COMPONENT_STAT_PREFIX}{component_name}");
        validate_name(&name, self.config.max_name_length)?;
        for (field, value) in [("event-rate", event_rate), ("data-rate", data_rate)] {
            if !value.is_finite() {
                return Err(ValidationError::NonFiniteStatistic {
                    component: component_name.to_string(),
                    field,
                    value,
                }
                .into());
            }
        }

        let value = json!({
            "type": component_type,
            "event-rate": event_rate,
            "data-rate": data_rate,
            "event-count": event_count,
        });

        let _guard = self.lock_writes()?;
        let ty = self.get_or_register_type_locked(&name, ValueType::Json, true)?;
        self.write_condition_locked(
            run_number,
            TypeRef::Type(&ty),
            ConditionValue::Json(value),
            Some(time),
            false,
        )
    }

    fn fit_value(&self, ty: &ConditionType, value: ConditionValue) -> RcdbResult<ConditionValue> {
        let actual = value.type_name();
        if let Some(fitted) = ty.value_type.coerce(value.clone()) {
            return Ok(fitted);
        }
        if !self.config.enforce_value_types {
            tracing::debug!(
                condition = %ty.name,
                expected = %ty.value_type,
                actual,
                "storing value of mismatched type"
            );
            return Ok(value);
        }
        Err(ValidationError::ValueTypeMismatch {
            type_name: ty.name.clone(),
            expected: ty.value_type,
            actual,
        }
        .into())
    }
}

fn conflict(
    run_number: RunNumber,
    ty: &ConditionType,
    incoming: &Incoming<'_>,
    rejection: Rejection<'_>,
) -> RcdbError {
    ExecutionError::ConditionConflict {
        run_number,
        type_name: ty.name.clone(),
        mismatch: rejection.mismatch,
        stored_value: rejection.existing.value.clone(),
        requested_value: incoming.value.clone(),
        stored_time: rejection.existing.time,
        requested_time: incoming.time,
    }
    .into()
}
