#![forbid(unsafe_code)]

use std::fs;

use chrono::{DateTime, Duration, TimeZone, Utc};
use cyclegate_contracts::outcome::{
    CycleLineage, CycleRecord, OutcomeRecord, CYCLE_RECORD_CONTRACT_VERSION,
};
use cyclegate_storage::cycle_log::CycleLog;
use cyclegate_storage::StorageError;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn record(cycle_id: &str, unit_id: &str, minutes: i64) -> CycleRecord {
    CycleRecord {
        schema_version: CYCLE_RECORD_CONTRACT_VERSION,
        cycle_id: cycle_id.to_string(),
        outcome: OutcomeRecord {
            unit_id: unit_id.to_string(),
            timestamp: base() + Duration::minutes(minutes),
            accepted: true,
            latency_ms: 42.5,
            error_flags: Vec::new(),
            quality_score: Some(90.0),
        },
        engine_lane: "onnxruntime_cuda".to_string(),
        execution_provider: "CUDAExecutionProvider".to_string(),
        vram_used_mb: 512.0,
        lineage: CycleLineage {
            unit_id: unit_id.to_string(),
            matrix_row: Some("win_cuda12".to_string()),
            governance_hash: "ba7816bf8f01cfea".to_string(),
            registry_version: "2024.06.1".to_string(),
            scoring_profile: "inference_default".to_string(),
        },
    }
}

#[test]
fn at_cycle_log_01_recent_records_are_filtered_by_unit_and_ordered() {
    let dir = tempfile::tempdir().unwrap();
    let log = CycleLog::new(dir.path().join("cycle_reports"));
    log.append(&record("c1", "unit_a", 1)).unwrap();
    log.append(&record("c2", "unit_b", 2)).unwrap();
    log.append(&record("c3", "unit_a", 3)).unwrap();
    log.append(&record("c4", "unit_a", 4)).unwrap();

    let recent = log.recent_for_unit("unit_a", 2).unwrap();
    let ids: Vec<&str> = recent.iter().map(|r| r.cycle_id.as_str()).collect();
    assert_eq!(ids, vec!["c4", "c3"]);
}

#[test]
fn at_cycle_log_02_existing_record_is_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let log = CycleLog::new(dir.path());
    log.append(&record("dup", "unit_a", 1)).unwrap();
    let err = log.append(&record("dup", "unit_a", 2)).unwrap_err();
    assert!(matches!(err, StorageError::Io { .. }));
    let kept = log.recent_for_unit("unit_a", 10).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].outcome.timestamp, base() + Duration::minutes(1));
}

#[test]
fn at_cycle_log_03_corrupt_and_foreign_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let log = CycleLog::new(dir.path());
    log.append(&record("good", "unit_a", 1)).unwrap();
    fs::write(dir.path().join("cycle_broken.json"), b"{ nope").unwrap();
    fs::write(dir.path().join("notes.txt"), b"unrelated").unwrap();
    let records = log.recent_for_unit("unit_a", 10).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].cycle_id, "good");
}

#[test]
fn at_cycle_log_04_missing_directory_is_empty_history() {
    let dir = tempfile::tempdir().unwrap();
    let log = CycleLog::new(dir.path().join("never_created"));
    assert!(log.recent_for_unit("unit_a", 50).unwrap().is_empty());
}

#[test]
fn at_cycle_log_05_allocated_ids_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let log = CycleLog::new(dir.path());
    let first = log.allocate_cycle_id(base());
    log.append(&record(&first, "unit_a", 0)).unwrap();
    let second = log.allocate_cycle_id(base());
    assert_ne!(first, second);
    assert!(second.starts_with(&first));
    log.append(&record(&second, "unit_a", 0)).unwrap();
}

#[test]
fn at_cycle_log_06_flattened_outcome_fields_sit_at_top_level() {
    let dir = tempfile::tempdir().unwrap();
    let log = CycleLog::new(dir.path());
    let path = log.append(&record("flat", "unit_a", 0)).unwrap();
    assert_eq!(path.file_name().unwrap(), "cycle_flat.json");
    let doc: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
    assert_eq!(doc["unit_id"], "unit_a");
    assert_eq!(doc["lineage"]["matrix_row"], "win_cuda12");
}
