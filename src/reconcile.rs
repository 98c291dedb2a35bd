//! Condition write reconciliation.
//!
//! Given a condition type's cardinality policy, the entries already stored for
//! (run, type), and an incoming (value, time, replace) request, [`decide`]
//! picks exactly one outcome:
//!
//! | stored state                          | `replace = false` | `replace = true` |
//! |---------------------------------------|-------------------|------------------|
//! | no entry for the key                  | insert            | insert           |
//! | same key, same value (and time)       | no-op             | no-op            |
//! | same key, different value or time     | reject            | replace          |
//!
//! The key is the run alone for single-valued types, so the time is part of
//! the payload and changing it is a conflict. For multi-valued types the key
//! is (run, time) and the untimed slot `None` is a key of its own.
//!
//! This module is pure: it reads nothing and writes nothing. The engine wraps
//! it in the store transaction.

use chrono::{DateTime, Utc};

use crate::condition::{Condition, ConditionMismatch};
use crate::condition_type::ConditionType;
use crate::value::ConditionValue;

/// The write being reconciled.
#[derive(Debug, Clone, Copy)]
pub struct Incoming<'a> {
    pub value: &'a ConditionValue,
    pub time: Option<DateTime<Utc>>,
    pub replace: bool,
}

/// Accepted outcome of a write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision<'a> {
    /// No entry holds the key; create one.
    Insert,
    /// An identical entry exists; leave the store untouched.
    Unchanged(&'a Condition),
    /// Overwrite this entry's value and time.
    Replace(&'a Condition),
}

/// A write that would change stored data without `replace`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rejection<'a> {
    pub existing: &'a Condition,
    pub mismatch: ConditionMismatch,
}

/// Time-key equality: `None` matches only `None`, concrete times match by value.
#[must_use]
pub fn times_match(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
    a == b
}

/// Decides what a write does.
///
/// `existing` must hold only entries for the write's (run, type), in
/// insertion order.
///
/// # Errors
/// Returns a [`Rejection`] when an entry exists for the key with a different
/// value (or, for single-valued types, a different time) and `replace` is not set.
pub fn decide<'a>(
    ty: &ConditionType,
    existing: &'a [Condition],
    incoming: &Incoming<'_>,
) -> Result<Decision<'a>, Rejection<'a>> {
    if ty.is_many_per_run {
        decide_many(existing, incoming)
    } else {
        decide_single(existing.first(), incoming)
    }
}

fn decide_single<'a>(
    existing: Option<&'a Condition>,
    incoming: &Incoming<'_>,
) -> Result<Decision<'a>, Rejection<'a>> {
    let Some(stored) = existing else {
        return Ok(Decision::Insert);
    };

    let value_differs = !stored.value.same_as(incoming.value);
    let time_differs = !times_match(stored.time, incoming.time);

    match ConditionMismatch::from_flags(value_differs, time_differs) {
        None => Ok(Decision::Unchanged(stored)),
        Some(_) if incoming.replace => Ok(Decision::Replace(stored)),
        Some(mismatch) => Err(Rejection {
            existing: stored,
            mismatch,
        }),
    }
}

fn decide_many<'a>(
    existing: &'a [Condition],
    incoming: &Incoming<'_>,
) -> Result<Decision<'a>, Rejection<'a>> {
    let Some(stored) = existing
        .iter()
        .find(|c| times_match(c.time, incoming.time))
    else {
        return Ok(Decision::Insert);
    };

    if stored.value.same_as(incoming.value) {
        Ok(Decision::Unchanged(stored))
    } else if incoming.replace {
        Ok(Decision::Replace(stored))
    } else {
        Err(Rejection {
            existing: stored,
            mismatch: ConditionMismatch::Value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};

    use crate::run::RunNumber;
    use crate::value::ValueType;

    fn t(offset_ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 9, 1, 14, 21, 1).unwrap() + Duration::milliseconds(offset_ms)
    }

    fn stored(
        ty: &ConditionType,
        value: impl Into<ConditionValue>,
        time: Option<DateTime<Utc>>,
    ) -> Condition {
        Condition::new(RunNumber::new(1), ty.id, value.into(), time)
    }

    fn incoming(
        value: &ConditionValue,
        time: Option<DateTime<Utc>>,
        replace: bool,
    ) -> Incoming<'_> {
        Incoming {
            value,
            time,
            replace,
        }
    }

    #[test]
    fn test_times_match_is_total() {
        assert!(times_match(None, None));
        assert!(times_match(Some(t(1)), Some(t(1))));
        assert!(!times_match(None, Some(t(1))));
        assert!(!times_match(Some(t(1)), None));
        assert!(!times_match(Some(t(1)), Some(t(2))));
    }

    #[test]
    fn test_single_insert_noop_conflict_replace() {
        let ty = ConditionType::new("event_count", ValueType::Int, false).unwrap();
        let v1000 = ConditionValue::Int(1000);
        let v2222 = ConditionValue::Int(2222);

        assert_eq!(decide(&ty, &[], &incoming(&v1000, None, false)), Ok(Decision::Insert));

        let rows = vec![stored(&ty, 1000, None)];
        assert_eq!(
            decide(&ty, &rows, &incoming(&v1000, None, false)),
            Ok(Decision::Unchanged(&rows[0]))
        );

        let rejected = decide(&ty, &rows, &incoming(&v2222, None, false)).unwrap_err();
        assert_eq!(rejected.mismatch, ConditionMismatch::Value);
        assert_eq!(rejected.existing.id, rows[0].id);

        assert_eq!(
            decide(&ty, &rows, &incoming(&v2222, None, true)),
            Ok(Decision::Replace(&rows[0]))
        );
    }

    #[test]
    fn test_single_time_is_payload_not_key() {
        let ty = ConditionType::new("timed", ValueType::Int, false).unwrap();
        let one = ConditionValue::Int(1);
        let five = ConditionValue::Int(5);
        let rows = vec![stored(&ty, 1, Some(t(222)))];

        assert!(matches!(
            decide(&ty, &rows, &incoming(&one, Some(t(222)), false)),
            Ok(Decision::Unchanged(_))
        ));

        let err = decide(&ty, &rows, &incoming(&one, Some(t(333)), false)).unwrap_err();
        assert_eq!(err.mismatch, ConditionMismatch::Time);

        let err = decide(&ty, &rows, &incoming(&five, Some(t(222)), false)).unwrap_err();
        assert_eq!(err.mismatch, ConditionMismatch::Value);

        let err = decide(&ty, &rows, &incoming(&five, None, false)).unwrap_err();
        assert_eq!(err.mismatch, ConditionMismatch::ValueAndTime);

        assert!(matches!(
            decide(&ty, &rows, &incoming(&five, Some(t(333)), true)),
            Ok(Decision::Replace(_))
        ));
    }

    #[test]
    fn test_single_untimed_vs_timed_conflicts() {
        let ty = ConditionType::new("status", ValueType::String, false).unwrap();
        let on = ConditionValue::from("on");
        let rows = vec![stored(&ty, "on", None)];
        let err = decide(&ty, &rows, &incoming(&on, Some(t(0)), false)).unwrap_err();
        assert_eq!(err.mismatch, ConditionMismatch::Time);
    }

    #[test]
    fn test_many_keys_by_time() {
        let ty = ConditionType::new("event_count", ValueType::Int, true).unwrap();
        let rows = vec![
            stored(&ty, 2222, None),
            stored(&ty, 3333, Some(t(222))),
        ];

        // Same value at the untimed slot: no-op.
        let v2222 = ConditionValue::Int(2222);
        assert_eq!(
            decide(&ty, &rows, &incoming(&v2222, None, false)),
            Ok(Decision::Unchanged(&rows[0]))
        );

        // Different value at an occupied time: conflict.
        let v4444 = ConditionValue::Int(4444);
        let err = decide(&ty, &rows, &incoming(&v4444, Some(t(222)), false)).unwrap_err();
        assert_eq!(err.existing.id, rows[1].id);
        assert_eq!(err.mismatch, ConditionMismatch::Value);

        // Free time: insert.
        assert_eq!(
            decide(&ty, &rows, &incoming(&v4444, Some(t(333)), false)),
            Ok(Decision::Insert)
        );

        // Replace targets the matching time only.
        assert_eq!(
            decide(&ty, &rows, &incoming(&v4444, Some(t(222)), true)),
            Ok(Decision::Replace(&rows[1]))
        );
    }

    #[test]
    fn test_many_untimed_slot_is_distinct() {
        let ty = ConditionType::new("rate", ValueType::Float, true).unwrap();
        let rows = vec![stored(&ty, 1.5, Some(t(0)))];
        let v = ConditionValue::Float(9.0);
        assert_eq!(decide(&ty, &rows, &incoming(&v, None, false)), Ok(Decision::Insert));
    }

    #[test]
    fn test_replace_with_identical_value_is_still_noop() {
        let ty = ConditionType::new("event_count", ValueType::Int, false).unwrap();
        let rows = vec![stored(&ty, 7, None)];
        let v = ConditionValue::Int(7);
        assert!(matches!(
            decide(&ty, &rows, &incoming(&v, None, true)),
            Ok(Decision::Unchanged(_))
        ));
    }
}
