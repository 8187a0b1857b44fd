#![forbid(unsafe_code)]

use std::fmt::Write as _;

use cyclegate_contracts::outcome::CycleLineage;
use cyclegate_contracts::unit::CandidateUnit;
use sha2::{Digest, Sha256};

pub const GOVERNANCE_NOT_FOUND: &str = "governance_not_found";
const GOVERNANCE_HASH_LEN: usize = 16;

/// Short content hash of the governing document, used for drift detection.
pub fn governance_hash(document: Option<&[u8]>) -> String {
    match document {
        Some(bytes) => {
            let digest = Sha256::digest(bytes);
            let mut hex = String::with_capacity(GOVERNANCE_HASH_LEN);
            for byte in digest.iter().take(GOVERNANCE_HASH_LEN / 2) {
                let _ = write!(hex, "{byte:02x}");
            }
            hex
        }
        None => GOVERNANCE_NOT_FOUND.to_string(),
    }
}

pub fn cycle_lineage(
    unit: &CandidateUnit,
    active_row_id: Option<&str>,
    governance_hash: &str,
    registry_version: &str,
) -> CycleLineage {
    CycleLineage {
        unit_id: unit.unit_id.clone(),
        matrix_row: active_row_id.map(str::to_string),
        governance_hash: governance_hash.to_string(),
        registry_version: registry_version.to_string(),
        scoring_profile: unit.scoring_profile.clone(),
    }
}
