#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{validate_non_negative, validate_percent, validate_token};
use crate::{ContractViolation, SchemaVersion, Validate};

pub const REGISTRY_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);
pub const DEFAULT_SCORING_PROFILE: &str = "inference_default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Shadow,
    Promoted,
    Paused,
}

impl UnitStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shadow => "shadow",
            Self::Promoted => "promoted",
            Self::Paused => "paused",
        }
    }

    /// Paused units are held back from execution until re-promoted.
    pub const fn is_executable(self) -> bool {
        matches!(self, Self::Shadow | Self::Promoted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLaneSpec {
    pub primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    /// Ordered; the first entry is the provider used on the primary lane.
    #[serde(default)]
    pub required_providers: Vec<String>,
}

impl Validate for EngineLaneSpec {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("engine_lane.primary", &self.primary, 64)?;
        if let Some(fallback) = &self.fallback {
            validate_token("engine_lane.fallback", fallback, 64)?;
        }
        let mut seen = HashSet::new();
        for provider in &self.required_providers {
            validate_token("engine_lane.required_providers[]", provider, 64)?;
            if !seen.insert(provider.as_str()) {
                return Err(ContractViolation::InvalidValue {
                    field: "engine_lane.required_providers",
                    reason: "must be unique",
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivationGates {
    #[serde(default = "default_min_cycles")]
    pub min_cycles: u32,
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,
    #[serde(default = "default_latency_p95_max_ms")]
    pub latency_p95_max_ms: f64,
    #[serde(default = "default_error_rate_max")]
    pub error_rate_max: f64,
}

fn default_min_cycles() -> u32 {
    5
}

fn default_acceptance_threshold() -> f64 {
    80.0
}

fn default_latency_p95_max_ms() -> f64 {
    1000.0
}

fn default_error_rate_max() -> f64 {
    10.0
}

impl Default for ActivationGates {
    fn default() -> Self {
        Self {
            min_cycles: default_min_cycles(),
            acceptance_threshold: default_acceptance_threshold(),
            latency_p95_max_ms: default_latency_p95_max_ms(),
            error_rate_max: default_error_rate_max(),
        }
    }
}

impl Validate for ActivationGates {
    fn validate(&self) -> Result<(), ContractViolation> {
        // Zero would let the evaluator run over an empty window.
        if self.min_cycles == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "activation_gates.min_cycles",
                reason: "must be >= 1",
            });
        }
        validate_percent(
            "activation_gates.acceptance_threshold",
            self.acceptance_threshold,
        )?;
        validate_non_negative(
            "activation_gates.latency_p95_max_ms",
            self.latency_p95_max_ms,
        )?;
        validate_percent("activation_gates.error_rate_max", self.error_rate_max)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub from_status: UnitStatus,
    pub to_status: UnitStatus,
    pub reason: String,
    pub cycles_evaluated: u32,
}

impl Validate for HistoryEntry {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.from_status == self.to_status {
            return Err(ContractViolation::InvalidValue {
                field: "history_entry.to_status",
                reason: "must differ from from_status",
            });
        }
        validate_token("history_entry.reason", &self.reason, 512)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateUnit {
    pub unit_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub engine_lane: EngineLaneSpec,
    #[serde(default)]
    pub compatibility_rows: BTreeSet<String>,
    #[serde(default)]
    pub activation_gates: ActivationGates,
    #[serde(default = "default_scoring_profile")]
    pub scoring_profile: String,
    pub status: UnitStatus,
    #[serde(default)]
    pub promotion_history: Vec<HistoryEntry>,
}

fn default_scoring_profile() -> String {
    DEFAULT_SCORING_PROFILE.to_string()
}

impl CandidateUnit {
    /// Compatibility gate: no declared rows means no requirement.
    pub fn admits_row(&self, active_row_id: Option<&str>) -> bool {
        if self.compatibility_rows.is_empty() {
            return true;
        }
        active_row_id.is_some_and(|row| self.compatibility_rows.contains(row))
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.unit_id)
    }
}

impl Validate for CandidateUnit {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("candidate_unit.unit_id", &self.unit_id, 96)?;
        if let Some(name) = &self.name {
            validate_token("candidate_unit.name", name, 128)?;
        }
        self.engine_lane.validate()?;
        for row in &self.compatibility_rows {
            validate_token("candidate_unit.compatibility_rows[]", row, 64)?;
        }
        self.activation_gates.validate()?;
        validate_token("candidate_unit.scoring_profile", &self.scoring_profile, 64)?;
        let mut expected_from = None;
        for entry in &self.promotion_history {
            entry.validate()?;
            if let Some(prev_to) = expected_from {
                if entry.from_status != prev_to {
                    return Err(ContractViolation::InvalidValue {
                        field: "candidate_unit.promotion_history",
                        reason: "entries must chain from the previous to_status",
                    });
                }
            }
            expected_from = Some(entry.to_status);
        }
        if let Some(last) = expected_from {
            if last != self.status {
                return Err(ContractViolation::InvalidValue {
                    field: "candidate_unit.status",
                    reason: "must equal the last promotion_history to_status",
                });
            }
        }
        Ok(())
    }
}

/// The persisted registry document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRegistry {
    pub schema_version: SchemaVersion,
    #[serde(default = "default_registry_version")]
    pub registry_version: String,
    pub last_updated: DateTime<Utc>,
    pub units: Vec<CandidateUnit>,
}

fn default_registry_version() -> String {
    "unknown".to_string()
}

impl UnitRegistry {
    pub fn unit(&self, unit_id: &str) -> Option<&CandidateUnit> {
        self.units.iter().find(|unit| unit.unit_id == unit_id)
    }

    pub fn unit_mut(&mut self, unit_id: &str) -> Option<&mut CandidateUnit> {
        self.units.iter_mut().find(|unit| unit.unit_id == unit_id)
    }
}

impl Validate for UnitRegistry {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != REGISTRY_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "unit_registry.schema_version",
                reason: "must match REGISTRY_CONTRACT_VERSION",
            });
        }
        validate_token("unit_registry.registry_version", &self.registry_version, 64)?;
        let mut seen = HashSet::new();
        for unit in &self.units {
            unit.validate()?;
            if !seen.insert(unit.unit_id.as_str()) {
                return Err(ContractViolation::InvalidValue {
                    field: "unit_registry.units",
                    reason: "unit_id must be unique",
                });
            }
        }
        Ok(())
    }
}
