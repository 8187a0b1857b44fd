#![forbid(unsafe_code)]

use cyclegate_contracts::metrics::{MetricsWindow, RollingMetrics};
use cyclegate_contracts::outcome::OutcomeRecord;

pub const DEFAULT_METRICS_WINDOW: usize = 50;

/// Below this many samples p95 is reported as the maximum.
pub const P95_MIN_SAMPLES: usize = 20;

/// Aggregates the most recent `window` records. `records` must already be
/// ordered most recent first and belong to a single unit.
pub fn aggregate(records: &[OutcomeRecord], window: usize) -> MetricsWindow {
    let recent = &records[..records.len().min(window)];
    if recent.is_empty() {
        return MetricsWindow::NoData;
    }

    let total = recent.len();
    let accepted = recent.iter().filter(|r| r.accepted).count();
    let errored = recent.iter().filter(|r| r.has_errors()).count();

    let mut latencies: Vec<f64> = recent
        .iter()
        .map(|r| r.latency_ms)
        .filter(|l| l.is_finite() && *l > 0.0)
        .collect();
    latencies.sort_by(f64::total_cmp);

    let (latency_p50_ms, latency_p95_ms) = if latencies.is_empty() {
        (None, None)
    } else {
        let p50 = nearest_rank(&latencies, 50);
        let p95 = if latencies.len() < P95_MIN_SAMPLES {
            latencies.last().copied()
        } else {
            nearest_rank(&latencies, 95)
        };
        (p50, p95)
    };

    let scores: Vec<f64> = recent
        .iter()
        .filter_map(|r| r.quality_score)
        .filter(|s| s.is_finite())
        .collect();
    let quality_score_avg =
        (!scores.is_empty()).then(|| round2(scores.iter().sum::<f64>() / scores.len() as f64));

    MetricsWindow::Observed(RollingMetrics {
        cycle_count: u32::try_from(total).unwrap_or(u32::MAX),
        acceptance_rate: percent(accepted, total),
        error_rate: percent(errored, total),
        latency_p50_ms,
        latency_p95_ms,
        quality_score_avg,
    })
}

/// Nearest-rank percentile over an ascending slice: the value at
/// `ceil(pct * n / 100) - 1`, computed in integers.
pub fn nearest_rank(sorted: &[f64], pct: usize) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let rank = (pct * n).div_ceil(100).max(1);
    sorted.get(rank.min(n) - 1).copied()
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(100.0 * count as f64 / total as f64)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
