#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use cyclegate_contracts::matrix::{
    CompatibilityMatrix, CompatibilityRow, DriverVersionRange, RowStatus,
};
use cyclegate_contracts::outcome::{
    CycleLineage, CycleRecord, OutcomeRecord, CYCLE_RECORD_CONTRACT_VERSION,
};
use cyclegate_contracts::probe::{fact_names, providers, ProbeFact};
use cyclegate_contracts::unit::{
    ActivationGates, CandidateUnit, EngineLaneSpec, UnitRegistry, UnitStatus,
    REGISTRY_CONTRACT_VERSION,
};
use cyclegate_engines::probe::CapabilityCheck;
use cyclegate_storage::documents::atomic_write_json;
use tempfile::TempDir;

use crate::{CycleContext, OrchestratorConfig};

pub struct StaticCheck {
    name: &'static str,
    fact: ProbeFact,
}

impl CapabilityCheck for StaticCheck {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(&self) -> ProbeFact {
        self.fact.clone()
    }
}

fn check(name: &'static str, fact: ProbeFact) -> Arc<dyn CapabilityCheck> {
    Arc::new(StaticCheck { name, fact })
}

pub fn healthy_checks() -> Vec<Arc<dyn CapabilityCheck>> {
    vec![
        check(
            fact_names::DRIVER,
            ProbeFact::passed(fact_names::DRIVER, Some("551.23".to_string())),
        ),
        check(
            fact_names::RUNTIME,
            ProbeFact::passed(fact_names::RUNTIME, Some("12.4".to_string())),
        ),
        check(
            fact_names::INFERENCE_RUNTIME,
            ProbeFact::passed(fact_names::INFERENCE_RUNTIME, Some("1.18.0".to_string()))
                .with_providers(vec![providers::CPU.to_string(), providers::CUDA.to_string()]),
        ),
    ]
}

pub fn dead_host_checks() -> Vec<Arc<dyn CapabilityCheck>> {
    vec![
        check(
            fact_names::DRIVER,
            ProbeFact::failed(fact_names::DRIVER, "nvidia-smi not found in PATH"),
        ),
        check(
            fact_names::RUNTIME,
            ProbeFact::failed(fact_names::RUNTIME, "CUDA_PATH not set or nvcc not found"),
        ),
        check(
            fact_names::INFERENCE_RUNTIME,
            ProbeFact::failed(fact_names::INFERENCE_RUNTIME, "onnxruntime not installed"),
        ),
    ]
}

pub fn unit(unit_id: &str, status: UnitStatus) -> CandidateUnit {
    CandidateUnit {
        unit_id: unit_id.to_string(),
        name: None,
        engine_lane: EngineLaneSpec {
            primary: "onnxruntime_cuda".to_string(),
            fallback: Some("cpu".to_string()),
            required_providers: vec![providers::CUDA.to_string()],
        },
        compatibility_rows: ["win_cuda12".to_string()].into_iter().collect(),
        activation_gates: ActivationGates {
            min_cycles: 5,
            acceptance_threshold: 80.0,
            latency_p95_max_ms: 100.0,
            error_rate_max: 10.0,
        },
        scoring_profile: "inference_default".to_string(),
        status,
        promotion_history: Vec::new(),
    }
}

pub struct Fixture {
    // Held so the directory outlives the fixture's paths.
    _dir: TempDir,
    pub config: OrchestratorConfig,
    pub now: DateTime<Utc>,
    checks: Vec<Arc<dyn CapabilityCheck>>,
}

impl Fixture {
    pub fn healthy() -> Self {
        Self::with_checks(healthy_checks())
    }

    pub fn dead_host() -> Self {
        Self::with_checks(dead_host_checks())
    }

    fn with_checks(checks: Vec<Arc<dyn CapabilityCheck>>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = OrchestratorConfig::mvp_v1(dir.path());
        let matrix = CompatibilityMatrix {
            matrix_version: "2024.06".to_string(),
            rows: vec![CompatibilityRow {
                row_id: "win_cuda12".to_string(),
                status: RowStatus::Approved,
                driver_version_range: DriverVersionRange {
                    min: "535".to_string(),
                    max: None,
                },
                runtime_version_major: 12,
                required_providers: [providers::CUDA.to_string()].into_iter().collect(),
            }],
        };
        atomic_write_json(&config.matrix_path, &matrix).unwrap();
        let fx = Self {
            _dir: dir,
            config,
            now: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            checks,
        };
        fx.write_registry(vec![
            unit("unit_a", UnitStatus::Shadow),
            unit("unit_b", UnitStatus::Paused),
        ]);
        fx
    }

    pub fn context(&self) -> CycleContext {
        CycleContext::with_checks(self.config.clone(), self.checks.clone())
    }

    pub fn write_registry(&self, units: Vec<CandidateUnit>) {
        let registry = UnitRegistry {
            schema_version: REGISTRY_CONTRACT_VERSION,
            registry_version: "2024.06.1".to_string(),
            last_updated: self.now - Duration::days(1),
            units,
        };
        atomic_write_json(&self.config.registry_path, &registry).unwrap();
    }

    /// Appends `count` historical cycle records for a unit, oldest first.
    pub fn seed_cycles(&self, unit_id: &str, count: usize, accepted: usize, latency_ms: f64) {
        let log = self.context().cycle_log().clone();
        for i in 0..count {
            let record = CycleRecord {
                schema_version: CYCLE_RECORD_CONTRACT_VERSION,
                cycle_id: format!("seed_{unit_id}_{i:03}"),
                outcome: OutcomeRecord {
                    unit_id: unit_id.to_string(),
                    timestamp: self.now - Duration::minutes((count - i) as i64),
                    accepted: i < accepted,
                    latency_ms,
                    error_flags: Vec::new(),
                    quality_score: Some(90.0),
                },
                engine_lane: "onnxruntime_cuda".to_string(),
                execution_provider: providers::CUDA.to_string(),
                vram_used_mb: 256.0,
                lineage: CycleLineage {
                    unit_id: unit_id.to_string(),
                    matrix_row: Some("win_cuda12".to_string()),
                    governance_hash: "governance_not_found".to_string(),
                    registry_version: "2024.06.1".to_string(),
                    scoring_profile: "inference_default".to_string(),
                },
            };
            log.append(&record).unwrap();
        }
    }
}
