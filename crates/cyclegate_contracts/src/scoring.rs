#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::validate_token;
use crate::unit::DEFAULT_SCORING_PROFILE;
use crate::{ContractViolation, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_latency_weight")]
    pub latency_p95: f64,
}

fn default_latency_weight() -> f64 {
    20.0
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            latency_p95: default_latency_weight(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringPenalties {
    /// Added (normally negative) when an execution fails.
    #[serde(default = "default_timeout_penalty")]
    pub timeout: f64,
}

fn default_timeout_penalty() -> f64 {
    -25.0
}

impl Default for ScoringPenalties {
    fn default() -> Self {
        Self {
            timeout: default_timeout_penalty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoringProfile {
    #[serde(default)]
    pub weights: ScoringWeights,
    #[serde(default)]
    pub penalties: ScoringPenalties,
}

impl Validate for ScoringProfile {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !self.weights.latency_p95.is_finite() {
            return Err(ContractViolation::NotFinite {
                field: "scoring_profile.weights.latency_p95",
            });
        }
        if !self.penalties.timeout.is_finite() {
            return Err(ContractViolation::NotFinite {
                field: "scoring_profile.penalties.timeout",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoringProfiles {
    #[serde(default)]
    pub profiles: BTreeMap<String, ScoringProfile>,
}

impl ScoringProfiles {
    /// Unknown ids resolve to the default profile, then to built-in weights.
    pub fn resolve(&self, profile_id: &str) -> ScoringProfile {
        self.profiles
            .get(profile_id)
            .or_else(|| self.profiles.get(DEFAULT_SCORING_PROFILE))
            .copied()
            .unwrap_or_default()
    }
}

impl Validate for ScoringProfiles {
    fn validate(&self) -> Result<(), ContractViolation> {
        for (id, profile) in &self.profiles {
            validate_token("scoring_profiles.profiles{}", id, 64)?;
            profile.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(latency_p95: f64) -> ScoringProfile {
        ScoringProfile {
            weights: ScoringWeights { latency_p95 },
            penalties: ScoringPenalties::default(),
        }
    }

    #[test]
    fn at_scoring_01_resolve_falls_back_to_default_then_builtin() {
        let mut profiles = ScoringProfiles::default();
        assert_eq!(profiles.resolve("vision_fast"), ScoringProfile::default());

        profiles
            .profiles
            .insert(DEFAULT_SCORING_PROFILE.to_string(), profile(15.0));
        profiles
            .profiles
            .insert("vision_fast".to_string(), profile(30.0));
        assert_eq!(profiles.resolve("vision_fast").weights.latency_p95, 30.0);
        assert_eq!(profiles.resolve("unknown").weights.latency_p95, 15.0);
    }

    #[test]
    fn at_scoring_02_absent_fields_take_builtin_values() {
        let doc: ScoringProfiles =
            serde_json::from_str(r#"{"profiles":{"inference_default":{"weights":{}}}}"#).unwrap();
        let resolved = doc.resolve(DEFAULT_SCORING_PROFILE);
        assert_eq!(resolved.weights.latency_p95, 20.0);
        assert_eq!(resolved.penalties.timeout, -25.0);
        assert!(doc.validate().is_ok());
    }
}
