#![forbid(unsafe_code)]

use std::fmt::Write as _;

use cyclegate_engines::gates::GateEvaluation;
use serde::Serialize;

use crate::context::ReportSource;
use crate::cycle::CycleSummary;
use crate::evaluate::EvaluationSummary;
use crate::probe_flow::ProbeSummary;

/// What an invocation prints on stdout, as text or JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Summary {
    Probe(ProbeSummary),
    RunCycle(CycleSummary),
    Evaluate(EvaluationSummary),
}

impl Summary {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Probe(s) => s.exit_code(),
            Self::RunCycle(s) => s.exit_code(),
            Self::Evaluate(s) => s.exit_code(),
        }
    }

    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        match self {
            Self::Probe(s) => probe_text(&mut out, s),
            Self::RunCycle(s) => cycle_text(&mut out, s),
            Self::Evaluate(s) => evaluation_text(&mut out, s),
        }
        out
    }
}

fn probe_text(out: &mut String, summary: &ProbeSummary) {
    let report = &summary.resolved.report;
    let _ = writeln!(
        out,
        "probe: {} (matrix {}, {})",
        report.overall_status.as_str(),
        report.matrix_version,
        match summary.resolved.source {
            ReportSource::Cache => "cached",
            ReportSource::Fresh => "fresh",
        }
    );
    for fact in &report.facts {
        let mark = if fact.passed { "ok  " } else { "FAIL" };
        let detail = match (&fact.version, &fact.error) {
            (_, Some(err)) => err.as_str(),
            (Some(version), None) => version.as_str(),
            (None, None) => "",
        };
        let _ = writeln!(out, "  [{mark}] {:<14} {detail}", fact.name);
    }
    let _ = writeln!(
        out,
        "active row: {}",
        report.active_row_id.as_deref().unwrap_or("none")
    );
    if !report.available_providers.is_empty() {
        let _ = writeln!(out, "providers: {}", report.available_providers.join(", "));
    }
    for note in &report.notes {
        let _ = writeln!(out, "note: {note}");
    }
}

fn cycle_text(out: &mut String, summary: &CycleSummary) {
    let _ = writeln!(
        out,
        "unit: {} ({})",
        summary.unit_id,
        summary.unit_status.as_str()
    );
    let _ = writeln!(
        out,
        "active row: {}{}",
        summary.active_row_id.as_deref().unwrap_or("none"),
        if summary.probe_degraded { " [degraded]" } else { "" }
    );
    let _ = writeln!(
        out,
        "lane: {} via {} ({})",
        summary.lane.lane,
        summary.lane.provider,
        summary.lane.reason.as_str()
    );
    if summary.dry_run {
        let _ = writeln!(out, "dry run: nothing executed or written");
    }
    if let Some(record) = &summary.record {
        let outcome = &record.outcome;
        let _ = writeln!(
            out,
            "cycle {}: {} latency={}ms vram={}MB score={}",
            record.cycle_id,
            if outcome.accepted { "accepted" } else { "rejected" },
            outcome.latency_ms,
            record.vram_used_mb.round(),
            outcome
                .quality_score
                .map_or_else(|| "-".to_string(), |s| s.to_string())
        );
        for flag in &outcome.error_flags {
            let _ = writeln!(out, "  error: {flag}");
        }
    }
    if let Some(evaluation) = &summary.evaluation {
        evaluation_text(out, evaluation);
    }
}

fn evaluation_text(out: &mut String, summary: &EvaluationSummary) {
    let _ = writeln!(
        out,
        "evaluate{}: active row {}",
        if summary.dry_run { " (dry run)" } else { "" },
        summary.active_row_id.as_deref().unwrap_or("none")
    );
    for evaluation in &summary.evaluations {
        evaluation_line(out, evaluation);
    }
    if summary.registry_written {
        let _ = writeln!(
            out,
            "registry updated: {} transition(s)",
            summary.transitions.len()
        );
    } else {
        let _ = writeln!(out, "registry unchanged");
    }
}

fn evaluation_line(out: &mut String, evaluation: &GateEvaluation) {
    let status = if evaluation.changes_status() {
        format!(
            "{} -> {}",
            evaluation.current_status.as_str(),
            evaluation.new_status.as_str()
        )
    } else {
        evaluation.current_status.as_str().to_string()
    };
    let _ = writeln!(
        out,
        "  {:<24} {:<17} {:<20} cycles={} {}",
        evaluation.unit_id,
        evaluation.recommendation.as_str(),
        status,
        evaluation.cycles_evaluated,
        evaluation.reason
    );
}
