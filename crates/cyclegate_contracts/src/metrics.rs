#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingMetrics {
    pub cycle_count: u32,
    pub acceptance_rate: f64,
    pub error_rate: f64,
    /// `None` when no record in the window carried a usable latency.
    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub quality_score_avg: Option<f64>,
}

/// Result of aggregating a window. An empty window is never reported as zeros.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricsWindow {
    NoData,
    Observed(RollingMetrics),
}

impl MetricsWindow {
    pub fn cycle_count(&self) -> u32 {
        match self {
            Self::NoData => 0,
            Self::Observed(m) => m.cycle_count,
        }
    }

    pub fn metrics(&self) -> Option<&RollingMetrics> {
        match self {
            Self::NoData => None,
            Self::Observed(m) => Some(m),
        }
    }
}
