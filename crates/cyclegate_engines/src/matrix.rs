#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use cyclegate_contracts::matrix::{CompatibilityMatrix, DottedVersion};
use cyclegate_contracts::probe::{fact_names, ProbeFact};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMatch {
    pub active_row_id: Option<String>,
    pub notes: Vec<String>,
}

/// Facts the matcher reads, pulled out once so every row sees the same view.
struct MatchInputs {
    driver: Option<(String, DottedVersion)>,
    runtime_major: Option<u32>,
    providers: Option<BTreeSet<String>>,
}

impl MatchInputs {
    fn from_facts(facts: &[ProbeFact]) -> Self {
        let passed = |name: &str| facts.iter().find(|f| f.name == name && f.passed);

        let driver = passed(fact_names::DRIVER).and_then(|fact| {
            let raw = fact.version.as_deref()?;
            DottedVersion::parse(raw).map(|v| (raw.to_string(), v))
        });
        let runtime_major = passed(fact_names::RUNTIME)
            .and_then(|fact| fact.version.as_deref())
            .and_then(DottedVersion::parse)
            .map(|v| v.major());
        let providers: Option<BTreeSet<String>> = passed(fact_names::INFERENCE_RUNTIME)
            .map(|fact| fact.providers.clone().unwrap_or_default().into_iter().collect());

        Self {
            driver,
            runtime_major,
            providers,
        }
    }
}

/// Walks rows in declared order and returns the first one the facts satisfy.
pub fn match_active_row(matrix: &CompatibilityMatrix, facts: &[ProbeFact]) -> RowMatch {
    let inputs = MatchInputs::from_facts(facts);
    let mut notes = Vec::new();
    let mut first_miss: Option<String> = None;

    if matrix.rows.is_empty() {
        first_miss = Some("matrix has no rows".to_string());
    }

    for row in &matrix.rows {
        let miss = if !row.status.is_matchable() {
            Some(format!(
                "row {}: status {} is not matchable",
                row.row_id,
                row.status.as_str()
            ))
        } else if let Some((raw, version)) = &inputs.driver {
            if !row.driver_version_range.contains(version) {
                Some(format!(
                    "row {}: driver {} outside range {}..{}",
                    row.row_id,
                    raw,
                    row.driver_version_range.min,
                    row.driver_version_range.max.as_deref().unwrap_or("")
                ))
            } else {
                match (inputs.runtime_major, &inputs.providers) {
                    (None, _) => Some(format!(
                        "row {}: runtime fact absent or failed",
                        row.row_id
                    )),
                    (Some(major), _) if major != row.runtime_version_major => Some(format!(
                        "row {}: runtime major {} != {}",
                        row.row_id, major, row.runtime_version_major
                    )),
                    (Some(_), None) => Some(format!(
                        "row {}: inference provider fact absent or failed",
                        row.row_id
                    )),
                    (Some(_), Some(available)) => {
                        let missing: Vec<&str> = row
                            .required_providers
                            .iter()
                            .filter(|p| !available.contains(*p))
                            .map(String::as_str)
                            .collect();
                        if missing.is_empty() {
                            None
                        } else {
                            let note = format!(
                                "row {}: missing providers {{{}}}",
                                row.row_id,
                                missing.join(", ")
                            );
                            notes.push(note.clone());
                            Some(note)
                        }
                    }
                }
            }
        } else {
            Some("driver fact absent or failed; no row can be selected".to_string())
        };

        match miss {
            None => {
                notes.push(format!(
                    "selected row {} (status: {})",
                    row.row_id,
                    row.status.as_str()
                ));
                return RowMatch {
                    active_row_id: Some(row.row_id.clone()),
                    notes,
                };
            }
            Some(reason) => {
                if first_miss.is_none() {
                    first_miss = Some(reason);
                }
            }
        }
    }

    if let Some(reason) = first_miss {
        if !notes.contains(&reason) {
            notes.push(reason);
        }
    }
    notes.push("no compatible row found in matrix".to_string());
    RowMatch {
        active_row_id: None,
        notes,
    }
}
