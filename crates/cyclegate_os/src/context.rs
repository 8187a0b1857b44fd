#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cyclegate_contracts::matrix::CompatibilityMatrix;
use cyclegate_contracts::probe::ProbeReport;
use cyclegate_contracts::scoring::ScoringProfiles;
use cyclegate_contracts::unit::UnitRegistry;
use cyclegate_engines::host_checks::default_checks;
use cyclegate_engines::lineage::governance_hash;
use cyclegate_engines::probe::{CapabilityCheck, CompatibilityProbe, ProbeConfig};
use cyclegate_storage::cycle_log::CycleLog;
use cyclegate_storage::documents::{read_optional_bytes, read_validated};
use cyclegate_storage::probe_cache::{CacheLookup, ProbeCache};
use cyclegate_storage::registry::RegistryStore;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{OrchestratorConfig, OrchestratorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    Cache,
    Fresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedReport {
    pub report: ProbeReport,
    pub source: ReportSource,
}

/// Everything one invocation needs, passed explicitly to each flow. Holds the
/// probe cache and its TTL so cache behavior is testable in isolation.
#[derive(Clone)]
pub struct CycleContext {
    config: OrchestratorConfig,
    probe: CompatibilityProbe,
    cache: ProbeCache,
    registry: RegistryStore,
    cycle_log: CycleLog,
}

impl CycleContext {
    /// Context probing the real host.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_checks(config, default_checks())
    }

    pub fn with_checks(config: OrchestratorConfig, checks: Vec<Arc<dyn CapabilityCheck>>) -> Self {
        let probe = CompatibilityProbe::new(
            ProbeConfig {
                check_timeout: config.check_timeout,
            },
            checks,
        );
        let cache = ProbeCache::new(config.probe_report_path.clone(), config.probe_ttl);
        let registry = RegistryStore::new(config.registry_path.clone()).with_lock_wait(config.lock_wait);
        let cycle_log = CycleLog::new(config.cycles_dir.clone());
        Self {
            config,
            probe,
            cache,
            registry,
            cycle_log,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    pub fn cycle_log(&self) -> &CycleLog {
        &self.cycle_log
    }

    pub fn cache(&self) -> &ProbeCache {
        &self.cache
    }

    pub fn load_matrix(&self) -> Result<CompatibilityMatrix, OrchestratorError> {
        read_validated(&self.config.matrix_path)
            .map_err(|e| OrchestratorError::missing("compatibility matrix", e))
    }

    pub fn load_registry(&self) -> Result<UnitRegistry, OrchestratorError> {
        self.registry
            .load()
            .map_err(|e| OrchestratorError::missing("unit registry", e))
    }

    /// An absent profiles document means built-in weights; a present but
    /// unreadable one is a configuration error.
    pub fn load_scoring_profiles(&self) -> Result<ScoringProfiles, OrchestratorError> {
        match read_validated(&self.config.scoring_profiles_path) {
            Ok(profiles) => Ok(profiles),
            Err(err) if err.is_not_found() => {
                debug!(path = %err.path().display(), "no scoring profiles; using defaults");
                Ok(ScoringProfiles::default())
            }
            Err(err) => Err(OrchestratorError::missing("scoring profiles", err)),
        }
    }

    pub fn governance_hash(&self) -> Result<String, OrchestratorError> {
        let doc = read_optional_bytes(&self.config.governance_doc_path)
            .map_err(|e| OrchestratorError::missing("governance document", e))?;
        Ok(governance_hash(doc.as_deref()))
    }

    /// Runs the probe battery now, bypassing and then refreshing the cache.
    pub fn fresh_report(&self, now: DateTime<Utc>) -> Result<ProbeReport, OrchestratorError> {
        let matrix = self.load_matrix()?;
        Ok(self.generate(&matrix, now))
    }

    /// Cached report when fresh, otherwise a newly generated one. The matrix
    /// is loaded and validated either way.
    pub fn probe_report(&self, now: DateTime<Utc>) -> Result<ResolvedReport, OrchestratorError> {
        let matrix = self.load_matrix()?;
        match self.cache.lookup(now) {
            Ok(CacheLookup::Fresh(report)) => {
                debug!(age_secs = report.age(now).num_seconds(), "probe cache hit");
                return Ok(ResolvedReport {
                    report,
                    source: ReportSource::Cache,
                });
            }
            Ok(CacheLookup::Stale { age_secs }) => debug!(age_secs, "probe cache stale"),
            Ok(CacheLookup::Missing) => debug!("probe cache missing"),
            Ok(CacheLookup::Corrupt { detail }) => debug!(%detail, "probe cache corrupt"),
            Err(err) => warn!(error = %err, "probe cache unreadable"),
        }
        Ok(ResolvedReport {
            report: self.generate(&matrix, now),
            source: ReportSource::Fresh,
        })
    }

    fn generate(&self, matrix: &CompatibilityMatrix, now: DateTime<Utc>) -> ProbeReport {
        let report = self.probe.generate_report(matrix, now);
        info!(
            status = report.overall_status.as_str(),
            row_id = report.active_row_id.as_deref().unwrap_or("none"),
            "probe report generated"
        );
        // The cache only saves work; failing to refresh it is not fatal.
        if let Err(err) = self.cache.store(&report) {
            warn!(error = %err, "could not write probe cache");
        }
        report
    }
}
