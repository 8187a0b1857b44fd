#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use cyclegate_contracts::outcome::OutcomeRecord;
use cyclegate_contracts::unit::{HistoryEntry, UnitRegistry};
use cyclegate_engines::gates::{apply_evaluation, evaluate_unit, GateEvaluation, Recommendation};
use cyclegate_engines::metrics::aggregate;
use serde::Serialize;
use tracing::info;

use crate::error::exit_codes;
use crate::summary::Summary;
use crate::{CycleContext, OrchestratorError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedTransition {
    pub unit_id: String,
    pub entry: HistoryEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub dry_run: bool,
    pub active_row_id: Option<String>,
    pub evaluations: Vec<GateEvaluation>,
    pub transitions: Vec<AppliedTransition>,
    pub registry_written: bool,
}

impl EvaluationSummary {
    pub fn exit_code(&self) -> i32 {
        let demoted = self
            .evaluations
            .iter()
            .any(|e| e.recommendation == Recommendation::Demote);
        if demoted {
            exit_codes::PARTIAL
        } else {
            exit_codes::OK
        }
    }
}

/// `evaluate`: gates every unit in the registry. Holds the registry lock for
/// the whole batch and writes the document at most once, and only when a
/// status actually changed. When the lock or the write fails the error still
/// carries the evaluations.
pub fn evaluate_registry(
    ctx: &CycleContext,
    now: DateTime<Utc>,
    dry_run: bool,
) -> Result<EvaluationSummary, OrchestratorError> {
    let report = ctx.probe_report(now)?.report;
    let active_row_id = report.active_row_id;

    if dry_run {
        let mut registry = ctx.load_registry()?;
        return evaluate_units(ctx, &mut registry, active_row_id, false, now);
    }

    let _lock = match ctx.registry().lock() {
        Ok(lock) => lock,
        Err(err) => {
            let mut registry = ctx.load_registry()?;
            let preview = evaluate_units(ctx, &mut registry, active_row_id, false, now)?;
            return Err(OrchestratorError::interrupted(
                Summary::Evaluate(preview),
                OrchestratorError::Persistence(err),
            ));
        }
    };
    let mut registry = ctx.load_registry()?;
    let mut summary = evaluate_units(ctx, &mut registry, active_row_id, true, now)?;
    if !summary.transitions.is_empty() {
        if let Err(err) = ctx.registry().save(&mut registry, now) {
            return Err(OrchestratorError::interrupted(
                Summary::Evaluate(summary),
                OrchestratorError::Persistence(err),
            ));
        }
        summary.registry_written = true;
    }
    Ok(summary)
}

fn evaluate_units(
    ctx: &CycleContext,
    registry: &mut UnitRegistry,
    active_row_id: Option<String>,
    apply: bool,
    now: DateTime<Utc>,
) -> Result<EvaluationSummary, OrchestratorError> {
    let window_size = ctx.config().metrics_window;
    let mut evaluations = Vec::with_capacity(registry.units.len());
    let mut transitions = Vec::new();
    for unit in &mut registry.units {
        let outcomes: Vec<OutcomeRecord> = ctx
            .cycle_log()
            .recent_for_unit(&unit.unit_id, window_size)
            .map_err(OrchestratorError::Persistence)?
            .into_iter()
            .map(|record| record.outcome)
            .collect();
        let window = aggregate(&outcomes, window_size);
        let evaluation = evaluate_unit(unit, &window, active_row_id.as_deref());
        info!(
            unit_id = %unit.unit_id,
            cycles = evaluation.cycles_evaluated,
            recommendation = evaluation.recommendation.as_str(),
            reason = %evaluation.reason,
            "unit evaluated"
        );
        if apply {
            if let Some(entry) = apply_evaluation(unit, &evaluation, now) {
                info!(
                    unit_id = %unit.unit_id,
                    from = entry.from_status.as_str(),
                    to = entry.to_status.as_str(),
                    "status transition applied"
                );
                transitions.push(AppliedTransition {
                    unit_id: unit.unit_id.clone(),
                    entry,
                });
            }
        }
        evaluations.push(evaluation);
    }
    Ok(EvaluationSummary {
        dry_run: !apply,
        active_row_id,
        evaluations,
        transitions,
        registry_written: false,
    })
}
