#![forbid(unsafe_code)]

use std::fs;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use cyclegate_contracts::unit::{
    ActivationGates, CandidateUnit, EngineLaneSpec, UnitRegistry, UnitStatus,
    REGISTRY_CONTRACT_VERSION,
};
use cyclegate_storage::registry::RegistryStore;
use cyclegate_storage::StorageError;

fn unit(id: &str) -> CandidateUnit {
    CandidateUnit {
        unit_id: id.to_string(),
        name: Some(format!("{id} display")),
        engine_lane: EngineLaneSpec {
            primary: "onnxruntime_cuda".to_string(),
            fallback: Some("cpu".to_string()),
            required_providers: vec!["CUDAExecutionProvider".to_string()],
        },
        compatibility_rows: ["win_cuda12".to_string()].into_iter().collect(),
        activation_gates: ActivationGates::default(),
        scoring_profile: "inference_default".to_string(),
        status: UnitStatus::Shadow,
        promotion_history: Vec::new(),
    }
}

fn registry() -> UnitRegistry {
    UnitRegistry {
        schema_version: REGISTRY_CONTRACT_VERSION,
        registry_version: "2024.06.1".to_string(),
        last_updated: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        units: vec![unit("unit_a"), unit("unit_b")],
    }
}

#[test]
fn at_registry_01_save_then_load_preserves_units_and_stamps_time() {
    let dir = tempfile::tempdir().unwrap();
    let store = RegistryStore::new(dir.path().join("artifacts").join("unit_registry.json"));
    let now = Utc.with_ymd_and_hms(2024, 6, 2, 8, 30, 0).unwrap();
    let mut reg = registry();
    store.save(&mut reg, now).unwrap();

    let back = store.load().unwrap();
    assert_eq!(back.last_updated, now);
    assert_eq!(back.units.len(), 2);
    assert_eq!(back.unit("unit_b").unwrap().status, UnitStatus::Shadow);
}

#[test]
fn at_registry_02_missing_registry_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = RegistryStore::new(dir.path().join("unit_registry.json"));
    assert!(matches!(store.load(), Err(StorageError::NotFound { .. })));
}

#[test]
fn at_registry_03_unknown_status_is_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unit_registry.json");
    let mut doc = serde_json::to_value(registry()).unwrap();
    doc["units"][0]["status"] = serde_json::Value::String("active".to_string());
    fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
    let err = RegistryStore::new(&path).load().unwrap_err();
    assert!(err.is_corrupt());
}

#[test]
fn at_registry_04_invalid_registry_is_never_written() {
    let dir = tempfile::tempdir().unwrap();
    let store = RegistryStore::new(dir.path().join("unit_registry.json"));
    let mut good = registry();
    store.save(&mut good, Utc::now()).unwrap();
    let before = fs::read(store.path()).unwrap();

    let mut bad = registry();
    bad.units.push(unit("unit_a"));
    let err = store.save(&mut bad, Utc::now()).unwrap_err();
    assert!(matches!(err, StorageError::Contract { .. }));
    assert_eq!(fs::read(store.path()).unwrap(), before);
}

#[test]
fn at_registry_05_second_writer_times_out_while_lock_is_held() {
    let dir = tempfile::tempdir().unwrap();
    let store = RegistryStore::new(dir.path().join("unit_registry.json"))
        .with_lock_wait(Duration::from_millis(150));
    let held = store.lock().unwrap();
    // A separate file handle is a separate lock owner.
    let err = store.lock().unwrap_err();
    assert!(matches!(err, StorageError::LockTimeout { .. }));
    drop(held);
    assert!(store.lock().is_ok());
}

#[test]
fn at_registry_06_failed_write_keeps_the_prior_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = RegistryStore::new(dir.path().join("unit_registry.json"));
    let mut good = registry();
    store.save(&mut good, Utc::now()).unwrap();
    let before = fs::read(store.path()).unwrap();

    // The temp file cannot be created where a directory already sits.
    fs::create_dir(dir.path().join("unit_registry.json.tmp")).unwrap();
    let mut changed = registry();
    changed.units[0].status = UnitStatus::Promoted;
    let err = store.save(&mut changed, Utc::now()).unwrap_err();
    assert!(matches!(err, StorageError::Io { .. }));
    assert_eq!(fs::read(store.path()).unwrap(), before);
    assert_eq!(
        store.load().unwrap().unit("unit_a").unwrap().status,
        UnitStatus::Shadow
    );
}

#[test]
fn at_registry_07_failed_rename_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unit_registry.json");
    fs::create_dir(&path).unwrap();
    fs::write(path.join("keep"), b"x").unwrap();

    let store = RegistryStore::new(&path);
    let err = store.save(&mut registry(), Utc::now()).unwrap_err();
    assert!(matches!(err, StorageError::Io { .. }));
    assert!(path.join("keep").exists());
    assert!(!dir.path().join("unit_registry.json.tmp").exists());
}
