#![forbid(unsafe_code)]

use std::fs;

use chrono::{Duration, TimeZone, Utc};
use cyclegate_contracts::probe::{
    fact_names, OverallStatus, ProbeFact, ProbeReport, PROBE_CONTRACT_VERSION,
};
use cyclegate_storage::probe_cache::{CacheLookup, ProbeCache, DEFAULT_PROBE_TTL_SECS};

fn report(at_hour: u32) -> ProbeReport {
    ProbeReport {
        schema_version: PROBE_CONTRACT_VERSION,
        timestamp: Utc.with_ymd_and_hms(2024, 6, 1, at_hour, 0, 0).unwrap(),
        matrix_version: "2024.06".to_string(),
        facts: vec![ProbeFact::passed(
            fact_names::DRIVER,
            Some("551.23".to_string()),
        )],
        active_row_id: None,
        overall_status: OverallStatus::Partial,
        notes: vec!["no compatible row found in matrix".to_string()],
        available_providers: Vec::new(),
        degraded: false,
    }
}

fn cache(dir: &tempfile::TempDir) -> ProbeCache {
    ProbeCache::new(
        dir.path().join("probe_report.json"),
        Duration::seconds(DEFAULT_PROBE_TTL_SECS),
    )
}

#[test]
fn at_probe_cache_01_fresh_report_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let c = cache(&dir);
    c.store(&report(10)).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap();
    assert_eq!(c.lookup(now).unwrap(), CacheLookup::Fresh(report(10)));
}

#[test]
fn at_probe_cache_02_report_older_than_ttl_is_stale() {
    let dir = tempfile::tempdir().unwrap();
    let c = cache(&dir);
    c.store(&report(10)).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 1).unwrap();
    assert_eq!(
        c.lookup(now).unwrap(),
        CacheLookup::Stale { age_secs: 3601 }
    );
}

#[test]
fn at_probe_cache_03_corrupt_cache_is_a_miss_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let c = cache(&dir);
    fs::write(c.path(), b"{\"timestamp\": 12").unwrap();
    let lookup = c.lookup(Utc::now()).unwrap();
    assert!(matches!(lookup, CacheLookup::Corrupt { .. }));
    assert!(lookup.into_fresh().is_none());
}

#[test]
fn at_probe_cache_04_absent_cache_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(cache(&dir).lookup(Utc::now()).unwrap(), CacheLookup::Missing);
}

#[test]
fn at_probe_cache_05_future_dated_report_is_stale() {
    let dir = tempfile::tempdir().unwrap();
    let c = cache(&dir);
    c.store(&report(12)).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap();
    assert!(matches!(c.lookup(now).unwrap(), CacheLookup::Stale { .. }));
}
