//! Recovery tests for the persistent backend, driven through the engine.
//!
//! These tests verify that:
//! - engine writes survive close and reopen
//! - compaction preserves state and keeps reconciliation intact afterwards
//! - a torn WAL tail loses only the torn entry
//! - float values come back bit-exact, so rewrites after reopen stay unchanged
//! - one process owns a database directory at a time

#![cfg(feature = "persistent")]

use std::fs;

use chrono::{TimeZone, Utc};
use tempfile::tempdir;

use rcdb::storage::persistent::{open_database, PersistentConfig, WAL_FILE};
use rcdb::{ConditionValue, RcdbEngine, ValueType, WriteOutcome};

fn config() -> Option<PersistentConfig> {
    Some(PersistentConfig {
        sync_on_write: false,
        ..PersistentConfig::default()
    })
}

#[test]
fn test_engine_state_survives_reopen() {
    let dir = tempdir().unwrap();
    let t0 = Utc.with_ymd_and_hms(2015, 9, 1, 14, 21, 1).unwrap();

    let (condition_id, installation_id) = {
        let stores = open_database(dir.path(), config()).unwrap();
        let engine = RcdbEngine::new(stores.handles());

        engine.obtain_run(42u64).unwrap();
        engine
            .get_or_register_type("evt_count", ValueType::Int, false)
            .unwrap();
        engine
            .get_or_register_type("beam_current", ValueType::Float, true)
            .unwrap();

        let write = engine
            .write_condition(42u64, "evt_count", 1000, None, false)
            .unwrap();
        engine
            .write_condition(42u64, "evt_count", 2000, None, true)
            .unwrap();
        engine
            .write_condition(42u64, "beam_current", 150.0, Some(t0), false)
            .unwrap();

        let installation = engine.install_board("ROC1", "fADC250", "SN-1", 4).unwrap();
        engine
            .add_board_installation_to_run(42u64, &installation)
            .unwrap();

        (write.condition.id, installation.id)
    };

    let stores = open_database(dir.path(), config()).unwrap();
    let engine = RcdbEngine::new(stores.handles());

    let read = engine.read_condition(42u64, "evt_count").unwrap();
    let stored = read.single().unwrap();
    assert_eq!(stored.id, condition_id);
    assert_eq!(stored.value, ConditionValue::Int(2000));

    // Reconciliation keeps working against recovered state.
    let again = engine
        .write_condition(42u64, "beam_current", 150.0, Some(t0), false)
        .unwrap();
    assert_eq!(again.outcome, WriteOutcome::Unchanged);
    assert!(engine
        .write_condition(42u64, "beam_current", 151.0, Some(t0), false)
        .unwrap_err()
        .is_replaceable());

    let run = engine.lookup_run(42u64).unwrap();
    assert_eq!(run.board_installations, vec![installation_id]);
    assert!(!engine.all_log_records().unwrap().is_empty());
}

#[test]
fn test_compaction_then_reopen() {
    let dir = tempdir().unwrap();

    {
        let stores = open_database(dir.path(), config()).unwrap();
        let engine = RcdbEngine::new(stores.handles());
        engine
            .get_or_register_type("evt_count", ValueType::Int, false)
            .unwrap();
        for run in 1..=20u64 {
            engine.obtain_run(run).unwrap();
            engine
                .write_condition(run, "evt_count", i64::try_from(run).unwrap() * 10, None, false)
                .unwrap();
        }

        let result = stores.compact().unwrap();
        assert!(result.records > 40);
        assert!(result.wal_size_after < result.wal_size_before);

        // Writes after compaction land in the fresh WAL.
        engine
            .write_condition(5u64, "evt_count", 999, None, true)
            .unwrap();
    }

    let stores = open_database(dir.path(), config()).unwrap();
    let engine = RcdbEngine::new(stores.handles());
    assert_eq!(engine.list_runs().unwrap().len(), 20);
    assert_eq!(
        engine
            .read_condition(5u64, "evt_count")
            .unwrap()
            .single()
            .unwrap()
            .value,
        ConditionValue::Int(999)
    );
    assert_eq!(
        engine
            .read_condition(20u64, "evt_count")
            .unwrap()
            .single()
            .unwrap()
            .value,
        ConditionValue::Int(200)
    );
}

#[test]
fn test_float_rewrite_after_reopen_is_unchanged() {
    let dir = tempdir().unwrap();
    let rate = 1.0715660391465826e-75_f64;

    {
        let stores = open_database(dir.path(), config()).unwrap();
        let engine = RcdbEngine::new(stores.handles());
        engine.obtain_run(1u64).unwrap();
        engine
            .get_or_register_type("rate", ValueType::Float, false)
            .unwrap();
        engine.write_condition(1u64, "rate", rate, None, false).unwrap();
    }

    // Recovered from the WAL.
    {
        let stores = open_database(dir.path(), config()).unwrap();
        let engine = RcdbEngine::new(stores.handles());
        let stored = engine.read_condition(1u64, "rate").unwrap();
        let stored = stored.single().unwrap().value.as_float().unwrap();
        assert_eq!(stored.to_bits(), rate.to_bits());

        let again = engine.write_condition(1u64, "rate", rate, None, false).unwrap();
        assert_eq!(again.outcome, WriteOutcome::Unchanged);
        stores.compact().unwrap();
    }

    // Recovered from the snapshot.
    let stores = open_database(dir.path(), config()).unwrap();
    let engine = RcdbEngine::new(stores.handles());
    let again = engine.write_condition(1u64, "rate", rate, None, false).unwrap();
    assert_eq!(again.outcome, WriteOutcome::Unchanged);
}

#[test]
fn test_torn_wal_tail_loses_only_last_write() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join(WAL_FILE);

    let size_before_last = {
        let stores = open_database(dir.path(), config()).unwrap();
        let engine = RcdbEngine::with_config(
            stores.handles(),
            rcdb::EngineConfig {
                audit_enabled: false,
                ..rcdb::EngineConfig::default()
            },
        )
        .unwrap();
        engine.obtain_run(1u64).unwrap();
        engine.obtain_run(2u64).unwrap();
        let size = fs::metadata(&wal_path).unwrap().len();
        engine.obtain_run(3u64).unwrap();
        size
    };

    // Simulate a crash halfway through the last append.
    let full = fs::metadata(&wal_path).unwrap().len();
    let file = fs::OpenOptions::new().write(true).open(&wal_path).unwrap();
    file.set_len(size_before_last + (full - size_before_last) / 2)
        .unwrap();
    drop(file);

    let stores = open_database(dir.path(), config()).unwrap();
    let engine = RcdbEngine::new(stores.handles());
    let numbers: Vec<u64> = engine
        .list_runs()
        .unwrap()
        .into_iter()
        .map(|r| r.number.get())
        .collect();
    assert_eq!(numbers, [1, 2]);

    // The database stays writable after recovery.
    engine.obtain_run(3u64).unwrap();
    drop(engine);
    drop(stores);

    let stores = open_database(dir.path(), config()).unwrap();
    assert_eq!(RcdbEngine::new(stores.handles()).list_runs().unwrap().len(), 3);
}

#[test]
fn test_directory_is_locked_while_open() {
    let dir = tempdir().unwrap();
    let stores = open_database(dir.path(), config()).unwrap();

    let err = open_database(dir.path(), config()).unwrap_err();
    assert!(err.is_storage());

    drop(stores);
    open_database(dir.path(), config()).unwrap();
}

#[test]
fn test_invalid_config_rejected() {
    let dir = tempdir().unwrap();
    let err = open_database(
        dir.path(),
        Some(PersistentConfig {
            max_wal_size: 1,
            sync_on_write: true,
        }),
    )
    .unwrap_err();
    assert!(err.is_validation());
}
