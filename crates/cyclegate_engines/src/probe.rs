#![forbid(unsafe_code)]

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use cyclegate_contracts::matrix::CompatibilityMatrix;
use cyclegate_contracts::probe::{
    fact_names, OverallStatus, ProbeFact, ProbeReport, PROBE_CONTRACT_VERSION,
};
use tracing::{debug, warn};

use crate::matrix::match_active_row;

/// One capability check in the probe battery. Implementations read host state
/// only; tests supply synthetic checks.
pub trait CapabilityCheck: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self) -> ProbeFact;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub check_timeout: Duration,
}

impl ProbeConfig {
    pub fn mvp_v1() -> Self {
        Self {
            check_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct CompatibilityProbe {
    config: ProbeConfig,
    checks: Vec<Arc<dyn CapabilityCheck>>,
}

impl CompatibilityProbe {
    pub fn new(config: ProbeConfig, checks: Vec<Arc<dyn CapabilityCheck>>) -> Self {
        Self { config, checks }
    }

    pub fn config(&self) -> ProbeConfig {
        self.config
    }

    /// Runs every check on its own thread. A check that panics or overruns the
    /// timeout becomes a failed fact; it never aborts the others.
    pub fn run_checks(&self) -> Vec<ProbeFact> {
        let started = Instant::now();
        let mut pending = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let (tx, rx) = mpsc::channel();
            let worker = Arc::clone(check);
            let spawned = thread::Builder::new()
                .name(format!("probe-{}", check.name()))
                .spawn(move || {
                    let _ = tx.send(worker.run());
                });
            pending.push((check.name(), spawned.map(|_| rx)));
        }

        let mut facts = Vec::with_capacity(pending.len());
        for (name, rx) in pending {
            let fact = match rx {
                Err(err) => ProbeFact::failed(name, format!("check could not start: {err}")),
                Ok(rx) => {
                    let remaining = self.config.check_timeout.saturating_sub(started.elapsed());
                    match rx.recv_timeout(remaining) {
                        Ok(mut fact) => {
                            fact.name = name.to_string();
                            fact
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            warn!(check = name, "probe check timed out");
                            ProbeFact::timed_out(name)
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            warn!(check = name, "probe check panicked");
                            ProbeFact::failed(name, "check panicked")
                        }
                    }
                }
            };
            debug!(check = name, passed = fact.passed, "probe check finished");
            facts.push(fact);
        }
        facts
    }

    pub fn generate_report(&self, matrix: &CompatibilityMatrix, now: DateTime<Utc>) -> ProbeReport {
        build_report(matrix, self.run_checks(), now)
    }
}

/// Derives the full report from facts and the matrix; no host access.
pub fn build_report(
    matrix: &CompatibilityMatrix,
    facts: Vec<ProbeFact>,
    now: DateTime<Utc>,
) -> ProbeReport {
    let row_match = match_active_row(matrix, &facts);
    let overall_status = overall_status(row_match.active_row_id.is_some(), &facts);

    let mut available_providers: Vec<String> = facts
        .iter()
        .find(|fact| fact.name == fact_names::INFERENCE_RUNTIME)
        .and_then(|fact| fact.providers.clone())
        .unwrap_or_default();
    available_providers.sort();
    available_providers.dedup();

    ProbeReport {
        schema_version: PROBE_CONTRACT_VERSION,
        timestamp: now,
        matrix_version: matrix.matrix_version.clone(),
        facts,
        active_row_id: row_match.active_row_id,
        overall_status,
        notes: row_match.notes,
        available_providers,
        degraded: overall_status == OverallStatus::Fail,
    }
}

pub fn overall_status(row_matched: bool, facts: &[ProbeFact]) -> OverallStatus {
    let passed = facts.iter().filter(|fact| fact.passed).count();
    let total = facts.len();
    if row_matched && passed == total {
        OverallStatus::Pass
    } else if row_matched || (total > 0 && passed * 2 >= total) {
        OverallStatus::Partial
    } else {
        OverallStatus::Fail
    }
}
