#![forbid(unsafe_code)]

use cyclegate_contracts::probe::{providers, ProbeReport};
use cyclegate_contracts::unit::CandidateUnit;
use serde::Serialize;

pub const CPU_LANE: &str = "cpu";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneReason {
    /// The host matched a row the unit is not declared for.
    RowNotAdmitted,
    Primary,
    Fallback,
    /// Fallback named, but unknown or its provider is not available.
    FallbackUnavailable,
    NoUsableLane,
}

impl LaneReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RowNotAdmitted => "row_not_admitted",
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::FallbackUnavailable => "fallback_unavailable",
            Self::NoUsableLane => "no_usable_lane",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneSelection {
    pub lane: String,
    pub provider: String,
    pub reason: LaneReason,
}

impl LaneSelection {
    fn cpu(reason: LaneReason) -> Self {
        Self {
            lane: CPU_LANE.to_string(),
            provider: providers::CPU.to_string(),
            reason,
        }
    }

    pub fn is_cpu(&self) -> bool {
        self.lane == CPU_LANE
    }
}

/// Named fallback lanes and the provider each one runs on.
pub fn fallback_provider(fallback: &str) -> Option<&'static str> {
    match fallback {
        "onnxruntime_cuda" => Some(providers::CUDA),
        "onnxruntime_tensorrt" => Some(providers::TENSORRT),
        "directml" => Some(providers::DIRECTML),
        "rocm" => Some(providers::ROCM),
        CPU_LANE => Some(providers::CPU),
        _ => None,
    }
}

/// Picks the lane for one unit against one probe report. Reads nothing else.
pub fn select_lane(unit: &CandidateUnit, report: &ProbeReport) -> LaneSelection {
    if let Some(row) = report.active_row_id.as_deref() {
        if !unit.compatibility_rows.contains(row) {
            return LaneSelection::cpu(LaneReason::RowNotAdmitted);
        }
    }

    let spec = &unit.engine_lane;
    let primary_ready = !report.degraded
        && spec
            .required_providers
            .iter()
            .all(|provider| report.has_provider(provider));
    if primary_ready {
        let provider = spec
            .required_providers
            .first()
            .map(String::as_str)
            .unwrap_or(providers::CPU);
        return LaneSelection {
            lane: spec.primary.clone(),
            provider: provider.to_string(),
            reason: LaneReason::Primary,
        };
    }

    match spec.fallback.as_deref() {
        Some(CPU_LANE) => LaneSelection::cpu(LaneReason::Fallback),
        Some(fallback) => match fallback_provider(fallback) {
            Some(provider) if report.has_provider(provider) => LaneSelection {
                lane: fallback.to_string(),
                provider: provider.to_string(),
                reason: LaneReason::Fallback,
            },
            _ => LaneSelection::cpu(LaneReason::FallbackUnavailable),
        },
        None => LaneSelection::cpu(LaneReason::NoUsableLane),
    }
}
