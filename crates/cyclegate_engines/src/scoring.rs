#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use cyclegate_contracts::outcome::OutcomeRecord;
use cyclegate_contracts::scoring::ScoringProfile;
use cyclegate_contracts::unit::CandidateUnit;

use crate::executor::ExecutionOutcome;
use crate::metrics::round2;

const BASE_SCORE_SUCCESS: f64 = 70.0;
const BASE_SCORE_FAILURE: f64 = 30.0;
const LATENCY_OVER_BUDGET: f64 = -10.0;

pub const ERROR_FLAG_EXECUTION_FAILED: &str = "execution_failed";

/// Scores one execution in 0..=100 against the unit's latency budget.
pub fn score_outcome(
    outcome: &ExecutionOutcome,
    latency_budget_ms: f64,
    profile: &ScoringProfile,
) -> f64 {
    let mut score = if outcome.success {
        BASE_SCORE_SUCCESS
    } else {
        BASE_SCORE_FAILURE
    };
    if outcome.latency_ms <= latency_budget_ms {
        score += profile.weights.latency_p95;
    } else {
        score += LATENCY_OVER_BUDGET;
    }
    if !outcome.success {
        score += profile.penalties.timeout;
    }
    round2(score.clamp(0.0, 100.0))
}

/// Turns an execution into the outcome record the metrics window reads.
pub fn outcome_record(
    unit: &CandidateUnit,
    outcome: &ExecutionOutcome,
    profile: &ScoringProfile,
    now: DateTime<Utc>,
) -> OutcomeRecord {
    let gates = &unit.activation_gates;
    let score = score_outcome(outcome, gates.latency_p95_max_ms, profile);
    let mut error_flags = Vec::new();
    if !outcome.success {
        error_flags.push(
            outcome
                .error
                .clone()
                .unwrap_or_else(|| ERROR_FLAG_EXECUTION_FAILED.to_string()),
        );
    }
    OutcomeRecord {
        unit_id: unit.unit_id.clone(),
        timestamp: now,
        accepted: outcome.success && score >= gates.acceptance_threshold,
        latency_ms: round2(outcome.latency_ms),
        error_flags,
        quality_score: Some(score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyclegate_contracts::scoring::{ScoringPenalties, ScoringWeights};
    use cyclegate_contracts::unit::{ActivationGates, EngineLaneSpec, UnitStatus};
    use cyclegate_contracts::Validate;

    fn outcome(success: bool, latency_ms: f64) -> ExecutionOutcome {
        ExecutionOutcome {
            success,
            latency_ms,
            vram_used_mb: 0.0,
            error: (!success).then(|| "device lost".to_string()),
        }
    }

    fn unit() -> CandidateUnit {
        CandidateUnit {
            unit_id: "unit_a".to_string(),
            name: None,
            engine_lane: EngineLaneSpec {
                primary: "cpu".to_string(),
                fallback: None,
                required_providers: Vec::new(),
            },
            compatibility_rows: Default::default(),
            activation_gates: ActivationGates {
                latency_p95_max_ms: 50.0,
                ..ActivationGates::default()
            },
            scoring_profile: "inference_default".to_string(),
            status: UnitStatus::Shadow,
            promotion_history: Vec::new(),
        }
    }

    #[test]
    fn at_score_01_default_profile_scores() {
        let profile = ScoringProfile::default();
        assert_eq!(score_outcome(&outcome(true, 20.0), 50.0, &profile), 90.0);
        assert_eq!(score_outcome(&outcome(true, 80.0), 50.0, &profile), 60.0);
        assert_eq!(score_outcome(&outcome(false, 20.0), 50.0, &profile), 25.0);
        assert_eq!(score_outcome(&outcome(false, 80.0), 50.0, &profile), 0.0);
    }

    #[test]
    fn at_score_02_score_is_clamped() {
        let generous = ScoringProfile {
            weights: ScoringWeights { latency_p95: 80.0 },
            penalties: ScoringPenalties::default(),
        };
        assert_eq!(score_outcome(&outcome(true, 1.0), 50.0, &generous), 100.0);
    }

    #[test]
    fn at_score_03_acceptance_needs_success_and_threshold() {
        let profile = ScoringProfile::default();
        let fast = outcome_record(&unit(), &outcome(true, 20.0), &profile, Utc::now());
        assert!(fast.accepted);
        assert_eq!(fast.quality_score, Some(90.0));
        assert!(fast.error_flags.is_empty());
        assert!(fast.validate().is_ok());

        let slow = outcome_record(&unit(), &outcome(true, 80.0), &profile, Utc::now());
        assert!(!slow.accepted);

        let failed = outcome_record(&unit(), &outcome(false, 20.0), &profile, Utc::now());
        assert!(!failed.accepted);
        assert_eq!(failed.error_flags, vec!["device lost".to_string()]);
        assert_eq!(failed.unit_id, "unit_a");
    }
}
