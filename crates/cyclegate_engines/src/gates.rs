#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use cyclegate_contracts::metrics::{MetricsWindow, RollingMetrics};
use cyclegate_contracts::unit::{ActivationGates, CandidateUnit, HistoryEntry, UnitStatus};
use cyclegate_contracts::ReasonCodeId;
use serde::Serialize;

pub mod reason_codes {
    use cyclegate_contracts::ReasonCodeId;

    // Gate evaluator reason-code namespace.
    pub const GATE_INSUFFICIENT_DATA: ReasonCodeId = ReasonCodeId(0x4741_0001);
    pub const GATE_PROMOTE_ALL_PASSED: ReasonCodeId = ReasonCodeId(0x4741_0002);
    pub const GATE_PROMOTE_RECOVERED: ReasonCodeId = ReasonCodeId(0x4741_0003);
    pub const GATE_HOLD_STILL_PASSING: ReasonCodeId = ReasonCodeId(0x4741_0004);
    pub const GATE_DEMOTE_CRITICAL_FAILED: ReasonCodeId = ReasonCodeId(0x4741_0005);
    pub const GATE_HOLD_CRITICAL_FAILED: ReasonCodeId = ReasonCodeId(0x4741_0006);
    pub const GATE_HOLD_SOFT_FAILED: ReasonCodeId = ReasonCodeId(0x4741_0007);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Promote,
    Demote,
    Hold,
    InsufficientData,
}

impl Recommendation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Promote => "promote",
            Self::Demote => "demote",
            Self::Hold => "hold",
            Self::InsufficientData => "insufficient_data",
        }
    }
}

/// Individual gate outcomes. Metric gates are `None` when the min-cycles
/// short-circuit stopped evaluation before they were checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateChecks {
    pub compatibility: bool,
    pub min_cycles: bool,
    pub acceptance: Option<bool>,
    pub latency: Option<bool>,
    pub error_rate: Option<bool>,
}

impl GateChecks {
    pub fn all_passed(&self) -> bool {
        self.compatibility
            && self.acceptance == Some(true)
            && self.latency == Some(true)
            && self.error_rate == Some(true)
    }

    pub fn critical_failed(&self) -> bool {
        !self.compatibility || self.acceptance == Some(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateEvaluation {
    pub unit_id: String,
    pub current_status: UnitStatus,
    pub cycles_evaluated: u32,
    pub metrics: MetricsWindow,
    pub gates: GateChecks,
    pub recommendation: Recommendation,
    pub reason_code: ReasonCodeId,
    pub reason: String,
    pub new_status: UnitStatus,
}

impl GateEvaluation {
    pub fn changes_status(&self) -> bool {
        self.new_status != self.current_status
    }
}

/// Evaluates one unit's gates against its rolling metrics. Pure: the unit is
/// not touched; see [`apply_evaluation`].
pub fn evaluate_unit(
    unit: &CandidateUnit,
    window: &MetricsWindow,
    active_row_id: Option<&str>,
) -> GateEvaluation {
    let gates = &unit.activation_gates;
    let compatibility = unit.admits_row(active_row_id);
    let cycles = window.cycle_count();
    let current = unit.status;

    let evaluation = |checks: GateChecks,
                      recommendation: Recommendation,
                      reason_code: ReasonCodeId,
                      reason: String,
                      new_status: UnitStatus| {
        GateEvaluation {
            unit_id: unit.unit_id.clone(),
            current_status: current,
            cycles_evaluated: cycles,
            metrics: *window,
            gates: checks,
            recommendation,
            reason_code,
            reason,
            new_status,
        }
    };

    let metrics = match window.metrics() {
        Some(m) if cycles >= gates.min_cycles => m,
        _ => {
            let checks = GateChecks {
                compatibility,
                min_cycles: false,
                acceptance: None,
                latency: None,
                error_rate: None,
            };
            return evaluation(
                checks,
                Recommendation::InsufficientData,
                reason_codes::GATE_INSUFFICIENT_DATA,
                format!("only {}/{} cycles evaluated", cycles, gates.min_cycles),
                current,
            );
        }
    };

    let checks = GateChecks {
        compatibility,
        min_cycles: true,
        acceptance: Some(metrics.acceptance_rate >= gates.acceptance_threshold),
        latency: Some(
            metrics
                .latency_p95_ms
                .map_or(true, |p95| p95 <= gates.latency_p95_max_ms),
        ),
        error_rate: Some(metrics.error_rate <= gates.error_rate_max),
    };

    if checks.all_passed() {
        let summary = passing_summary(metrics, gates);
        return match current {
            UnitStatus::Shadow => evaluation(
                checks,
                Recommendation::Promote,
                reason_codes::GATE_PROMOTE_ALL_PASSED,
                format!("all gates passed: {summary}"),
                UnitStatus::Promoted,
            ),
            UnitStatus::Paused => evaluation(
                checks,
                Recommendation::Promote,
                reason_codes::GATE_PROMOTE_RECOVERED,
                format!("gates recovered: {summary}"),
                UnitStatus::Promoted,
            ),
            UnitStatus::Promoted => evaluation(
                checks,
                Recommendation::Hold,
                reason_codes::GATE_HOLD_STILL_PASSING,
                "already promoted, gates still passing".to_string(),
                current,
            ),
        };
    }

    let failures = failing_summary(&checks, metrics, gates);
    if checks.critical_failed() {
        if current == UnitStatus::Promoted {
            evaluation(
                checks,
                Recommendation::Demote,
                reason_codes::GATE_DEMOTE_CRITICAL_FAILED,
                format!("critical gates failed: {failures}"),
                UnitStatus::Paused,
            )
        } else {
            evaluation(
                checks,
                Recommendation::Hold,
                reason_codes::GATE_HOLD_CRITICAL_FAILED,
                format!("gates not met for promotion: {failures}"),
                current,
            )
        }
    } else {
        evaluation(
            checks,
            Recommendation::Hold,
            reason_codes::GATE_HOLD_SOFT_FAILED,
            format!("some gates failing, monitoring: {failures}"),
            current,
        )
    }
}

/// Applies a status change to the unit and returns the appended history
/// entry. Returns `None` and leaves the unit untouched when the status would
/// not change.
pub fn apply_evaluation(
    unit: &mut CandidateUnit,
    evaluation: &GateEvaluation,
    now: DateTime<Utc>,
) -> Option<HistoryEntry> {
    if evaluation.unit_id != unit.unit_id
        || evaluation.current_status != unit.status
        || !evaluation.changes_status()
    {
        return None;
    }
    let entry = HistoryEntry {
        timestamp: now,
        from_status: unit.status,
        to_status: evaluation.new_status,
        reason: evaluation.reason.clone(),
        cycles_evaluated: evaluation.cycles_evaluated,
    };
    unit.status = evaluation.new_status;
    unit.promotion_history.push(entry.clone());
    Some(entry)
}

fn passing_summary(metrics: &RollingMetrics, gates: &ActivationGates) -> String {
    let mut parts = vec![format!(
        "acceptance {}% >= {}%",
        metrics.acceptance_rate, gates.acceptance_threshold
    )];
    if let Some(p95) = metrics.latency_p95_ms {
        parts.push(format!(
            "latency p95 {}ms <= {}ms",
            p95, gates.latency_p95_max_ms
        ));
    }
    parts.push(format!(
        "error rate {}% <= {}%",
        metrics.error_rate, gates.error_rate_max
    ));
    parts.join(", ")
}

fn failing_summary(checks: &GateChecks, metrics: &RollingMetrics, gates: &ActivationGates) -> String {
    let mut parts = Vec::new();
    if !checks.compatibility {
        parts.push("compatibility row mismatch".to_string());
    }
    if checks.acceptance == Some(false) {
        parts.push(format!(
            "acceptance {}% < {}%",
            metrics.acceptance_rate, gates.acceptance_threshold
        ));
    }
    if checks.latency == Some(false) {
        if let Some(p95) = metrics.latency_p95_ms {
            parts.push(format!(
                "latency p95 {}ms > {}ms",
                p95, gates.latency_p95_max_ms
            ));
        }
    }
    if checks.error_rate == Some(false) {
        parts.push(format!(
            "error rate {}% > {}%",
            metrics.error_rate, gates.error_rate_max
        ));
    }
    parts.join(", ")
}
