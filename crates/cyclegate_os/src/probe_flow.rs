#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::context::{ReportSource, ResolvedReport};
use crate::{CycleContext, OrchestratorError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeSummary {
    #[serde(flatten)]
    pub resolved: ResolvedReport,
}

impl ProbeSummary {
    pub fn exit_code(&self) -> i32 {
        self.resolved.report.overall_status.exit_code()
    }
}

/// `probe`: probes the host and matches the matrix. Uses a fresh cached
/// report only when `use_cache` is set.
pub fn run_probe(
    ctx: &CycleContext,
    now: DateTime<Utc>,
    use_cache: bool,
) -> Result<ProbeSummary, OrchestratorError> {
    let resolved = if use_cache {
        ctx.probe_report(now)?
    } else {
        ResolvedReport {
            report: ctx.fresh_report(now)?,
            source: ReportSource::Fresh,
        }
    };
    Ok(ProbeSummary { resolved })
}
