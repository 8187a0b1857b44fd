#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::common::validate_token;
use crate::{ContractViolation, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Approved,
    Testing,
    Deprecated,
}

impl RowStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Testing => "testing",
            Self::Deprecated => "deprecated",
        }
    }

    pub const fn is_matchable(self) -> bool {
        matches!(self, Self::Approved | Self::Testing)
    }
}

/// Dotted numeric version such as `535.104.05`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DottedVersion(Vec<u32>);

impl DottedVersion {
    /// Parses the leading dotted-numeric part of `raw`; trailing text after a
    /// space or dash is ignored (`"12.4 (nvcc)"` parses as `12.4`).
    pub fn parse(raw: &str) -> Option<Self> {
        let head = raw
            .trim()
            .split(|c: char| c.is_whitespace() || c == '-' || c == '+')
            .next()?;
        let mut parts = Vec::new();
        for piece in head.split('.') {
            let digits: String = piece.chars().take_while(char::is_ascii_digit).collect();
            if digits.is_empty() {
                break;
            }
            parts.push(digits.parse::<u32>().ok()?);
            if digits.len() != piece.len() {
                break;
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(Self(parts))
    }

    pub fn major(&self) -> u32 {
        self.0[0]
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// Compares only as many components as `bound` declares, so a bound of
    /// `550` covers every `550.x` release.
    pub fn cmp_to_bound(&self, bound: &DottedVersion) -> Ordering {
        for (idx, b) in bound.0.iter().enumerate() {
            let v = self.0.get(idx).copied().unwrap_or(0);
            match v.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverVersionRange {
    pub min: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
}

impl DriverVersionRange {
    pub fn contains(&self, version: &DottedVersion) -> bool {
        let Some(min) = DottedVersion::parse(&self.min) else {
            return false;
        };
        if version.cmp_to_bound(&min) == Ordering::Less {
            return false;
        }
        match self.max.as_deref().map(DottedVersion::parse) {
            None => true,
            Some(Some(max)) => version.cmp_to_bound(&max) != Ordering::Greater,
            Some(None) => false,
        }
    }
}

impl Validate for DriverVersionRange {
    fn validate(&self) -> Result<(), ContractViolation> {
        let Some(min) = DottedVersion::parse(&self.min) else {
            return Err(ContractViolation::InvalidValue {
                field: "driver_version_range.min",
                reason: "must be a dotted numeric version",
            });
        };
        if let Some(raw_max) = &self.max {
            let Some(max) = DottedVersion::parse(raw_max) else {
                return Err(ContractViolation::InvalidValue {
                    field: "driver_version_range.max",
                    reason: "must be a dotted numeric version",
                });
            };
            if max.cmp_to_bound(&min) == Ordering::Less {
                return Err(ContractViolation::InvalidValue {
                    field: "driver_version_range.max",
                    reason: "must be >= min",
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityRow {
    pub row_id: String,
    pub status: RowStatus,
    pub driver_version_range: DriverVersionRange,
    pub runtime_version_major: u32,
    #[serde(default)]
    pub required_providers: BTreeSet<String>,
}

impl Validate for CompatibilityRow {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("compatibility_row.row_id", &self.row_id, 64)?;
        self.driver_version_range.validate()?;
        for provider in &self.required_providers {
            validate_token("compatibility_row.required_providers[]", provider, 64)?;
        }
        Ok(())
    }
}

/// Ordered rows; earlier rows win ties during matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityMatrix {
    pub matrix_version: String,
    pub rows: Vec<CompatibilityRow>,
}

impl CompatibilityMatrix {
    pub fn row(&self, row_id: &str) -> Option<&CompatibilityRow> {
        self.rows.iter().find(|row| row.row_id == row_id)
    }
}

impl Validate for CompatibilityMatrix {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("compatibility_matrix.matrix_version", &self.matrix_version, 64)?;
        let mut seen = HashSet::new();
        for row in &self.rows {
            row.validate()?;
            if !seen.insert(row.row_id.as_str()) {
                return Err(ContractViolation::InvalidValue {
                    field: "compatibility_matrix.rows",
                    reason: "row_id must be unique",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: &str, max: Option<&str>) -> DriverVersionRange {
        DriverVersionRange {
            min: min.to_string(),
            max: max.map(ToString::to_string),
        }
    }

    #[test]
    fn at_matrix_01_dotted_version_parses_leading_numeric_part() {
        assert_eq!(
            DottedVersion::parse("535.104.05").unwrap().components(),
            &[535, 104, 5]
        );
        assert_eq!(DottedVersion::parse("12.4 (nvcc)").unwrap().major(), 12);
        assert_eq!(DottedVersion::parse("9.x").unwrap().components(), &[9]);
        assert!(DottedVersion::parse("unknown").is_none());
    }

    #[test]
    fn at_matrix_02_range_bounds_are_inclusive_at_declared_precision() {
        let r = range("535.104", Some("550"));
        assert!(r.contains(&DottedVersion::parse("535.104").unwrap()));
        assert!(r.contains(&DottedVersion::parse("550.54.14").unwrap()));
        assert!(!r.contains(&DottedVersion::parse("535.98").unwrap()));
        assert!(!r.contains(&DottedVersion::parse("551.0").unwrap()));
        assert!(range("470", None).contains(&DottedVersion::parse("999.1").unwrap()));
    }

    #[test]
    fn at_matrix_03_unknown_status_is_rejected_at_load() {
        let raw = r#"{"row_id":"r1","status":"retired","driver_version_range":{"min":"535"},"runtime_version_major":12}"#;
        assert!(serde_json::from_str::<CompatibilityRow>(raw).is_err());
    }

    #[test]
    fn at_matrix_04_duplicate_row_ids_fail_validation() {
        let row = CompatibilityRow {
            row_id: "r1".to_string(),
            status: RowStatus::Approved,
            driver_version_range: range("535", None),
            runtime_version_major: 12,
            required_providers: BTreeSet::new(),
        };
        let matrix = CompatibilityMatrix {
            matrix_version: "2024.1".to_string(),
            rows: vec![row.clone(), row],
        };
        assert!(matrix.validate().is_err());
    }

    #[test]
    fn at_matrix_05_inverted_range_fails_validation() {
        assert!(range("550", Some("535")).validate().is_err());
        assert!(range("535", Some("535.1")).validate().is_ok());
    }
}
