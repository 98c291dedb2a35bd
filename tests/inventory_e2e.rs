//! End-to-end tests for run bookkeeping, hardware inventory, and file archival.

use std::fs;

use chrono::{Duration, TimeZone, Utc};
use tempfile::tempdir;

use rcdb::storage::HardwareStore;
use rcdb::{InMemoryStores, RcdbEngine, ValueType};

/// A start-of-run sequence the way a DAQ run-control script drives it.
#[test]
fn test_start_of_run_sequence() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("run.cnf");
    fs::write(&config_path, "TRIGGER FCAL_BCAL\nFADC250_MODE 9\n").unwrap();

    let stores = InMemoryStores::new();
    let engine = RcdbEngine::new(stores.handles());
    let start = Utc.with_ymd_and_hms(2016, 2, 10, 8, 0, 0).unwrap();

    engine.set_run_start_time(11_500u64, start).unwrap();
    let file = engine.add_configuration_file(11_500u64, &config_path).unwrap();

    let installation = engine.install_board("ROCBCAL1", "fADC250", "FA-0042", 3).unwrap();
    engine
        .add_board_installation_to_run(11_500u64, &installation)
        .unwrap();

    let board = engine.obtain_board("fADC250", "FA-0042").unwrap();
    let preset = engine.obtain_dac_preset(&board, &[3200; 16]).unwrap();
    let config = engine
        .add_board_config_to_run(11_500u64, &board, &preset)
        .unwrap();

    engine
        .get_or_register_type("run_type", ValueType::String, false)
        .unwrap();
    engine
        .write_condition(11_500u64, "run_type", "PHYSICS", None, false)
        .unwrap();

    engine
        .set_run_end_time(11_500u64, start + Duration::minutes(90))
        .unwrap();
    engine.set_run_statistics(11_500u64, 42_000_000).unwrap();

    let run = engine.lookup_run(11_500u64).unwrap();
    assert_eq!(run.files, vec![file.id]);
    assert_eq!(run.board_installations, vec![installation.id]);
    assert_eq!(run.board_configurations, vec![config.id]);
    assert_eq!(run.duration(), Some(Duration::minutes(90)));
    assert_eq!(run.total_events, Some(42_000_000));

    // Engine writes are visible through the stores it was given.
    assert_eq!(
        stores.hardware.find_board("fADC250", "FA-0042").unwrap(),
        Some(board)
    );

    let descriptions: Vec<_> = engine
        .log_records(11_500u64)
        .unwrap()
        .into_iter()
        .map(|r| r.description)
        .collect();
    assert!(descriptions
        .iter()
        .any(|d| d.starts_with("Start time changed to")));
    assert!(descriptions
        .iter()
        .any(|d| d.starts_with("File added to DB. Path:")));
    assert!(descriptions
        .iter()
        .any(|d| d.starts_with("Board conf id=")));
}

#[test]
fn test_hardware_inventory_is_shared_between_runs() {
    let engine = RcdbEngine::in_memory();

    for run in 1..=3u64 {
        let installation = engine.install_board("ROCFCAL4", "F1TDC", "TDC-7", 10).unwrap();
        engine.add_board_installation_to_run(run, &installation).unwrap();
    }

    let runs = engine.list_runs().unwrap();
    assert_eq!(runs.len(), 3);
    let first = runs[0].board_installations.clone();
    assert_eq!(first.len(), 1);
    assert!(runs.iter().all(|r| r.board_installations == first));

    // One board, one crate, one installation.
    let created = engine
        .all_log_records()
        .unwrap()
        .into_iter()
        .filter(|r| r.related_run.is_none())
        .count();
    assert_eq!(created, 3);
}

#[test]
fn test_dac_presets_are_per_board_and_values() {
    let engine = RcdbEngine::in_memory();
    let a = engine.obtain_board("fADC250", "A").unwrap();
    let b = engine.obtain_board("fADC250", "B").unwrap();

    let pa = engine.obtain_dac_preset(&a, &[1, 2, 3]).unwrap();
    let pb = engine.obtain_dac_preset(&b, &[1, 2, 3]).unwrap();
    let pa2 = engine.obtain_dac_preset(&a, &[1, 2, 4]).unwrap();

    assert_ne!(pa.id, pb.id);
    assert_ne!(pa.id, pa2.id);
    assert_eq!(engine.obtain_dac_preset(&a, &[1, 2, 3]).unwrap().id, pa.id);
}

#[test]
fn test_component_statistics_over_a_run() {
    let engine = RcdbEngine::in_memory();
    engine.obtain_run(500u64).unwrap();
    let start = Utc.with_ymd_and_hms(2016, 2, 10, 8, 0, 0).unwrap();

    for minute in 0..5 {
        engine
            .add_run_component_statistics(
                500u64,
                start + Duration::minutes(minute),
                "ROCBCAL1",
                "ROC",
                20_000.0,
                1.5,
                u64::try_from(minute).unwrap() * 1_200_000,
            )
            .unwrap();
    }

    let stats = engine
        .read_condition(500u64, "component_stat_ROCBCAL1")
        .unwrap()
        .into_vec();
    assert_eq!(stats.len(), 5);
    assert_eq!(
        stats[4].value.as_json().unwrap()["event-count"],
        serde_json::json!(4_800_000u64)
    );
}
