#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{validate_non_negative, validate_percent, validate_token};
use crate::{ContractViolation, SchemaVersion, Validate};

pub const CYCLE_RECORD_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub unit_id: String,
    pub timestamp: DateTime<Utc>,
    pub accepted: bool,
    pub latency_ms: f64,
    #[serde(default)]
    pub error_flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
}

impl OutcomeRecord {
    pub fn has_errors(&self) -> bool {
        !self.error_flags.is_empty()
    }
}

impl Validate for OutcomeRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("outcome_record.unit_id", &self.unit_id, 96)?;
        validate_non_negative("outcome_record.latency_ms", self.latency_ms)?;
        for flag in &self.error_flags {
            validate_token("outcome_record.error_flags[]", flag, 256)?;
        }
        if let Some(score) = self.quality_score {
            validate_percent("outcome_record.quality_score", score)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleLineage {
    pub unit_id: String,
    pub matrix_row: Option<String>,
    pub governance_hash: String,
    pub registry_version: String,
    pub scoring_profile: String,
}

/// One persisted document per execution cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub schema_version: SchemaVersion,
    pub cycle_id: String,
    #[serde(flatten)]
    pub outcome: OutcomeRecord,
    pub engine_lane: String,
    pub execution_provider: String,
    pub vram_used_mb: f64,
    pub lineage: CycleLineage,
}

impl Validate for CycleRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != CYCLE_RECORD_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "cycle_record.schema_version",
                reason: "must match CYCLE_RECORD_CONTRACT_VERSION",
            });
        }
        validate_token("cycle_record.cycle_id", &self.cycle_id, 128)?;
        if !self
            .cycle_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ContractViolation::InvalidValue {
                field: "cycle_record.cycle_id",
                reason: "must be [A-Za-z0-9_-]",
            });
        }
        self.outcome.validate()?;
        validate_token("cycle_record.engine_lane", &self.engine_lane, 64)?;
        validate_token(
            "cycle_record.execution_provider",
            &self.execution_provider,
            64,
        )?;
        validate_non_negative("cycle_record.vram_used_mb", self.vram_used_mb)?;
        if self.lineage.unit_id != self.outcome.unit_id {
            return Err(ContractViolation::InvalidValue {
                field: "cycle_record.lineage.unit_id",
                reason: "must equal outcome unit_id",
            });
        }
        Ok(())
    }
}
