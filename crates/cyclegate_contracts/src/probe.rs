#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::common::validate_token;
use crate::{ContractViolation, SchemaVersion, Validate};

pub const PROBE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Stable names of the capability checks in the probe battery.
pub mod fact_names {
    pub const DRIVER: &str = "nvidia_driver";
    pub const RUNTIME: &str = "cuda_runtime";
    pub const MATH_LIBRARY: &str = "cudnn";
    pub const ACCELERATOR_LIBRARY: &str = "tensorrt";
    pub const INFERENCE_RUNTIME: &str = "onnxruntime";
}

pub mod providers {
    pub const CPU: &str = "CPUExecutionProvider";
    pub const CUDA: &str = "CUDAExecutionProvider";
    pub const TENSORRT: &str = "TensorrtExecutionProvider";
    pub const DIRECTML: &str = "DmlExecutionProvider";
    pub const ROCM: &str = "ROCMExecutionProvider";
}

pub const PROBE_ERROR_TIMEOUT: &str = "timeout";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFact {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeFact {
    pub fn passed(name: &str, version: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            version,
            path: None,
            providers: None,
            error: None,
        }
    }

    pub fn failed(name: &str, error: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            version: None,
            path: None,
            providers: None,
            error: Some(error.into()),
        }
    }

    pub fn timed_out(name: &str) -> Self {
        Self::failed(name, PROBE_ERROR_TIMEOUT)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_providers(mut self, providers: Vec<String>) -> Self {
        self.providers = Some(providers);
        self
    }
}

impl Validate for ProbeFact {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("probe_fact.name", &self.name, 64)?;
        if self.passed && self.error.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "probe_fact.error",
                reason: "must be None when passed=true",
            });
        }
        if let Some(providers) = &self.providers {
            for provider in providers {
                validate_token("probe_fact.providers[]", provider, 64)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Pass,
    Partial,
    Fail,
}

impl OverallStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Partial => "partial",
            Self::Fail => "fail",
        }
    }

    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Pass => 0,
            Self::Partial => 1,
            Self::Fail => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub schema_version: SchemaVersion,
    pub timestamp: DateTime<Utc>,
    pub matrix_version: String,
    pub facts: Vec<ProbeFact>,
    pub active_row_id: Option<String>,
    pub overall_status: OverallStatus,
    pub notes: Vec<String>,
    /// Providers listed by the inference-runtime fact, sorted and de-duplicated.
    #[serde(default)]
    pub available_providers: Vec<String>,
    #[serde(default)]
    pub degraded: bool,
}

impl ProbeReport {
    pub fn fact(&self, name: &str) -> Option<&ProbeFact> {
        self.facts.iter().find(|fact| fact.name == name)
    }

    pub fn has_provider(&self, provider: &str) -> bool {
        self.available_providers.iter().any(|p| p == provider)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.timestamp)
    }

    /// Staleness is purely age based. A report timestamped in the future is
    /// treated as stale too, since its age cannot be trusted.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = self.age(now);
        age < Duration::zero() || age >= ttl
    }
}

impl Validate for ProbeReport {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != PROBE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "probe_report.schema_version",
                reason: "must match PROBE_CONTRACT_VERSION",
            });
        }
        validate_token("probe_report.matrix_version", &self.matrix_version, 64)?;
        let mut names = BTreeSet::new();
        for fact in &self.facts {
            fact.validate()?;
            if !names.insert(fact.name.as_str()) {
                return Err(ContractViolation::InvalidValue {
                    field: "probe_report.facts",
                    reason: "fact names must be unique",
                });
            }
        }
        if let Some(row_id) = &self.active_row_id {
            validate_token("probe_report.active_row_id", row_id, 64)?;
        }
        if self.overall_status == OverallStatus::Pass && self.active_row_id.is_none() {
            return Err(ContractViolation::InvalidValue {
                field: "probe_report.overall_status",
                reason: "pass requires an active row",
            });
        }
        Ok(())
    }
}
