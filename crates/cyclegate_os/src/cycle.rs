#![forbid(unsafe_code)]

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use cyclegate_contracts::outcome::{CycleRecord, CYCLE_RECORD_CONTRACT_VERSION};
use cyclegate_contracts::unit::{CandidateUnit, UnitRegistry, UnitStatus};
use cyclegate_engines::executor::CycleExecutor;
use cyclegate_engines::lane::{select_lane, LaneSelection};
use cyclegate_engines::lineage::cycle_lineage;
use cyclegate_engines::scoring::outcome_record;
use serde::Serialize;
use tracing::info;

use crate::context::ReportSource;
use crate::error::exit_codes;
use crate::evaluate::{evaluate_registry, EvaluationSummary};
use crate::summary::Summary;
use crate::{CycleContext, OrchestratorError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleRequest {
    pub unit_id: Option<String>,
    pub dry_run: bool,
    /// Run the gate evaluator over the whole registry after recording.
    pub evaluate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub unit_id: String,
    pub unit_status: UnitStatus,
    pub active_row_id: Option<String>,
    pub probe_degraded: bool,
    pub probe_source: ReportSource,
    pub lane: LaneSelection,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<CycleRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationSummary>,
}

impl CycleSummary {
    pub fn exit_code(&self) -> i32 {
        let rejected = self
            .record
            .as_ref()
            .is_some_and(|record| !record.outcome.accepted);
        let demoted = self
            .evaluation
            .as_ref()
            .is_some_and(|e| e.exit_code() != exit_codes::OK);
        if self.probe_degraded || rejected || demoted {
            exit_codes::PARTIAL
        } else {
            exit_codes::OK
        }
    }
}

/// The unit a cycle runs for: the named one in any status, or the first
/// shadow or promoted unit that lists the active row.
pub fn choose_unit<'a>(
    registry: &'a UnitRegistry,
    requested: Option<&str>,
    active_row_id: Option<&str>,
) -> Result<&'a CandidateUnit, OrchestratorError> {
    if let Some(unit_id) = requested {
        return registry
            .unit(unit_id)
            .ok_or_else(|| OrchestratorError::UnitNotFound {
                unit_id: unit_id.to_string(),
            });
    }
    registry
        .units
        .iter()
        .find(|unit| {
            unit.status.is_executable()
                && match active_row_id {
                    Some(row) => unit.compatibility_rows.contains(row),
                    None => true,
                }
        })
        .ok_or_else(|| OrchestratorError::NoEligibleUnit {
            reason: match active_row_id {
                Some(row) => format!("no shadow or promoted unit lists row {row}"),
                None => "no shadow or promoted unit in registry".to_string(),
            },
        })
}

/// `run-cycle`: probe, select a lane, execute once, score and append the
/// cycle record. A dry run stops after lane selection and writes nothing.
pub fn run_cycle(
    ctx: &CycleContext,
    executor: &mut dyn CycleExecutor,
    request: &CycleRequest,
    now: DateTime<Utc>,
) -> Result<CycleSummary, OrchestratorError> {
    let resolved = ctx.probe_report(now)?;
    let report = &resolved.report;
    let registry = ctx.load_registry()?;
    let unit = choose_unit(
        &registry,
        request.unit_id.as_deref(),
        report.active_row_id.as_deref(),
    )?;
    let lane = select_lane(unit, report);
    info!(
        unit_id = %unit.unit_id,
        lane = %lane.lane,
        provider = %lane.provider,
        reason = lane.reason.as_str(),
        "lane selected"
    );

    let mut summary = CycleSummary {
        unit_id: unit.unit_id.clone(),
        unit_status: unit.status,
        active_row_id: report.active_row_id.clone(),
        probe_degraded: report.degraded,
        probe_source: resolved.source,
        lane,
        dry_run: request.dry_run,
        record: None,
        record_path: None,
        evaluation: None,
    };
    if request.dry_run {
        return Ok(summary);
    }

    let profiles = ctx.load_scoring_profiles()?;
    let governance_hash = ctx.governance_hash()?;
    let profile = profiles.resolve(&unit.scoring_profile);

    let execution = executor.execute(unit, &summary.lane);
    let outcome = outcome_record(unit, &execution, &profile, now);
    let record = CycleRecord {
        schema_version: CYCLE_RECORD_CONTRACT_VERSION,
        cycle_id: ctx.cycle_log().allocate_cycle_id(now),
        outcome,
        engine_lane: summary.lane.lane.clone(),
        execution_provider: summary.lane.provider.clone(),
        vram_used_mb: execution.vram_used_mb,
        lineage: cycle_lineage(
            unit,
            report.active_row_id.as_deref(),
            &governance_hash,
            &registry.registry_version,
        ),
    };
    let appended = ctx.cycle_log().append(&record);
    summary.record = Some(record);
    let path = match appended {
        Ok(path) => path,
        Err(err) => {
            return Err(OrchestratorError::interrupted(
                Summary::RunCycle(summary),
                OrchestratorError::Persistence(err),
            ));
        }
    };
    if let Some(record) = &summary.record {
        info!(
            cycle_id = %record.cycle_id,
            unit_id = %record.outcome.unit_id,
            accepted = record.outcome.accepted,
            "cycle recorded"
        );
    }
    summary.record_path = Some(path);

    if request.evaluate {
        match evaluate_registry(ctx, now, false) {
            Ok(evaluation) => summary.evaluation = Some(evaluation),
            Err(err) => {
                let err = match err {
                    OrchestratorError::Interrupted {
                        summary: partial,
                        source,
                    } => {
                        if let Summary::Evaluate(evaluation) = *partial {
                            summary.evaluation = Some(evaluation);
                        }
                        *source
                    }
                    other => other,
                };
                return Err(OrchestratorError::interrupted(Summary::RunCycle(summary), err));
            }
        }
    }
    Ok(summary)
}
