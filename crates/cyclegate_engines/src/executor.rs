#![forbid(unsafe_code)]

use cyclegate_contracts::unit::CandidateUnit;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::lane::LaneSelection;

/// What one execution reported. Failures are data, never errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub latency_ms: f64,
    pub vram_used_mb: f64,
    pub error: Option<String>,
}

/// Runs one cycle of a unit on a selected lane.
pub trait CycleExecutor {
    fn execute(&mut self, unit: &CandidateUnit, lane: &LaneSelection) -> ExecutionOutcome;
}

/// Stand-in executor producing plausible timings without touching hardware.
#[derive(Debug)]
pub struct SimulatedExecutor {
    rng: StdRng,
    success_rate: f64,
}

impl SimulatedExecutor {
    pub const DEFAULT_SUCCESS_RATE: f64 = 0.9;

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            success_rate: Self::DEFAULT_SUCCESS_RATE,
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            success_rate: Self::DEFAULT_SUCCESS_RATE,
        }
    }

    pub fn with_success_rate(mut self, rate: f64) -> Self {
        self.success_rate = rate.clamp(0.0, 1.0);
        self
    }
}

impl CycleExecutor for SimulatedExecutor {
    fn execute(&mut self, unit: &CandidateUnit, lane: &LaneSelection) -> ExecutionOutcome {
        let latency_ms = self.rng.gen_range(5.0..100.0);
        let vram_used_mb = if lane.is_cpu() {
            0.0
        } else {
            self.rng.gen_range(100.0..1000.0)
        };
        let success = self.rng.gen_bool(self.success_rate);
        debug!(
            unit_id = %unit.unit_id,
            lane = %lane.lane,
            success,
            latency_ms,
            "simulated execution"
        );
        ExecutionOutcome {
            success,
            latency_ms,
            vram_used_mb,
            error: (!success).then(|| "simulated execution failure".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lane::{LaneReason, CPU_LANE};
    use cyclegate_contracts::probe::providers;
    use cyclegate_contracts::unit::{ActivationGates, EngineLaneSpec, UnitStatus};

    fn unit() -> CandidateUnit {
        CandidateUnit {
            unit_id: "unit_sim".to_string(),
            name: None,
            engine_lane: EngineLaneSpec {
                primary: "onnxruntime_cuda".to_string(),
                fallback: Some(CPU_LANE.to_string()),
                required_providers: vec![providers::CUDA.to_string()],
            },
            compatibility_rows: Default::default(),
            activation_gates: ActivationGates::default(),
            scoring_profile: "inference_default".to_string(),
            status: UnitStatus::Shadow,
            promotion_history: Vec::new(),
        }
    }

    fn lane(name: &str, provider: &str) -> LaneSelection {
        LaneSelection {
            lane: name.to_string(),
            provider: provider.to_string(),
            reason: LaneReason::Primary,
        }
    }

    #[test]
    fn at_exec_01_same_seed_same_outcomes() {
        let gpu = lane("onnxruntime_cuda", providers::CUDA);
        let mut a = SimulatedExecutor::seeded(7);
        let mut b = SimulatedExecutor::seeded(7);
        for _ in 0..10 {
            assert_eq!(a.execute(&unit(), &gpu), b.execute(&unit(), &gpu));
        }
    }

    #[test]
    fn at_exec_02_outputs_stay_in_simulated_ranges() {
        let gpu = lane("onnxruntime_cuda", providers::CUDA);
        let cpu = lane(CPU_LANE, providers::CPU);
        let mut exec = SimulatedExecutor::seeded(42);
        for _ in 0..100 {
            let out = exec.execute(&unit(), &gpu);
            assert!((5.0..100.0).contains(&out.latency_ms));
            assert!((100.0..1000.0).contains(&out.vram_used_mb));
            assert_eq!(out.success, out.error.is_none());
            assert_eq!(exec.execute(&unit(), &cpu).vram_used_mb, 0.0);
        }
    }

    #[test]
    fn at_exec_03_success_rate_extremes() {
        let gpu = lane("onnxruntime_cuda", providers::CUDA);
        let mut never = SimulatedExecutor::seeded(1).with_success_rate(0.0);
        let mut always = SimulatedExecutor::seeded(1).with_success_rate(1.0);
        for _ in 0..20 {
            assert!(!never.execute(&unit(), &gpu).success);
            assert!(always.execute(&unit(), &gpu).success);
        }
    }
}
