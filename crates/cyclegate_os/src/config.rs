#![forbid(unsafe_code)]

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cyclegate_engines::metrics::DEFAULT_METRICS_WINDOW;
use cyclegate_storage::probe_cache::DEFAULT_PROBE_TTL_SECS;
use cyclegate_storage::registry::DEFAULT_LOCK_WAIT;

use crate::OrchestratorError;

pub mod env_keys {
    pub const ROOT: &str = "CYCLEGATE_ROOT";
    pub const REGISTRY: &str = "CYCLEGATE_REGISTRY";
    pub const MATRIX: &str = "CYCLEGATE_MATRIX";
    pub const PROBE_REPORT: &str = "CYCLEGATE_PROBE_REPORT";
    pub const SCORING_PROFILES: &str = "CYCLEGATE_SCORING_PROFILES";
    pub const CYCLES_DIR: &str = "CYCLEGATE_CYCLES_DIR";
    pub const GOVERNANCE_DOC: &str = "CYCLEGATE_GOVERNANCE_DOC";
    pub const PROBE_TTL_SECS: &str = "CYCLEGATE_PROBE_TTL_SECS";
    pub const CHECK_TIMEOUT_SECS: &str = "CYCLEGATE_CHECK_TIMEOUT_SECS";
    pub const METRICS_WINDOW: &str = "CYCLEGATE_METRICS_WINDOW";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub registry_path: PathBuf,
    pub matrix_path: PathBuf,
    pub probe_report_path: PathBuf,
    pub scoring_profiles_path: PathBuf,
    pub cycles_dir: PathBuf,
    pub governance_doc_path: PathBuf,
    pub probe_ttl: chrono::Duration,
    pub check_timeout: Duration,
    pub metrics_window: usize,
    pub lock_wait: Duration,
}

impl OrchestratorConfig {
    /// Default layout under one workspace root.
    pub fn mvp_v1(root: &Path) -> Self {
        let artifacts = root.join("artifacts");
        let compatibility = artifacts.join("compatibility");
        Self {
            registry_path: artifacts.join("unit_registry.json"),
            matrix_path: compatibility.join("matrix.json"),
            probe_report_path: compatibility.join("probe_report.json"),
            scoring_profiles_path: artifacts.join("scoring_profiles.json"),
            cycles_dir: root.join("cycle_reports"),
            governance_doc_path: root.join("GOVERNANCE.md"),
            probe_ttl: chrono::Duration::seconds(DEFAULT_PROBE_TTL_SECS),
            check_timeout: Duration::from_secs(10),
            metrics_window: DEFAULT_METRICS_WINDOW,
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    pub fn from_env() -> Result<Self, OrchestratorError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from a key lookup; absent or blank keys keep their
    /// defaults, malformed numbers are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OrchestratorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let root = get(env_keys::ROOT)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut config = Self::mvp_v1(&root);

        if let Some(v) = get(env_keys::REGISTRY) {
            config.registry_path = PathBuf::from(v);
        }
        if let Some(v) = get(env_keys::MATRIX) {
            config.matrix_path = PathBuf::from(v);
        }
        if let Some(v) = get(env_keys::PROBE_REPORT) {
            config.probe_report_path = PathBuf::from(v);
        }
        if let Some(v) = get(env_keys::SCORING_PROFILES) {
            config.scoring_profiles_path = PathBuf::from(v);
        }
        if let Some(v) = get(env_keys::CYCLES_DIR) {
            config.cycles_dir = PathBuf::from(v);
        }
        if let Some(v) = get(env_keys::GOVERNANCE_DOC) {
            config.governance_doc_path = PathBuf::from(v);
        }
        if let Some(v) = get(env_keys::PROBE_TTL_SECS) {
            let secs: u32 = parse_number(env_keys::PROBE_TTL_SECS, &v)?;
            config.probe_ttl = chrono::Duration::seconds(i64::from(secs));
        }
        if let Some(v) = get(env_keys::CHECK_TIMEOUT_SECS) {
            let secs: u64 = parse_number(env_keys::CHECK_TIMEOUT_SECS, &v)?;
            config.check_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get(env_keys::METRICS_WINDOW) {
            config.metrics_window = parse_number(env_keys::METRICS_WINDOW, &v)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.metrics_window == 0 {
            return Err(OrchestratorError::InvalidArgument(format!(
                "{} must be >= 1",
                env_keys::METRICS_WINDOW
            )));
        }
        if self.check_timeout.is_zero() {
            return Err(OrchestratorError::InvalidArgument(format!(
                "{} must be >= 1",
                env_keys::CHECK_TIMEOUT_SECS
            )));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, OrchestratorError> {
    raw.trim().parse().map_err(|_| {
        OrchestratorError::InvalidArgument(format!("{key} must be a non-negative integer, got '{raw}'"))
    })
}
