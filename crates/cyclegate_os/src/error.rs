#![forbid(unsafe_code)]

use cyclegate_storage::StorageError;
use thiserror::Error;

use crate::summary::Summary;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const PARTIAL: i32 = 1;
    pub const HARD_FAILURE: i32 = 2;
    pub const MISSING_CONFIGURATION: i32 = 3;
    pub const PERSISTENCE_FAILURE: i32 = 4;
}

/// Failures that abort an invocation. Check and execution failures never
/// appear here; they are recorded as facts and outcome records instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("missing configuration ({document}): {source}")]
    MissingConfiguration {
        document: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("persistence failure: {0}")]
    Persistence(#[source] StorageError),

    #[error("unit not found in registry: {unit_id}")]
    UnitNotFound { unit_id: String },

    #[error("no eligible unit: {reason}")]
    NoEligibleUnit { reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A flow failed after it had already decided something. Carries what
    /// it had computed so the caller can still print it.
    #[error("{source}")]
    Interrupted {
        summary: Box<Summary>,
        #[source]
        source: Box<OrchestratorError>,
    },
}

impl OrchestratorError {
    pub fn missing(document: &'static str, source: StorageError) -> Self {
        Self::MissingConfiguration { document, source }
    }

    pub fn interrupted(summary: Summary, source: OrchestratorError) -> Self {
        Self::Interrupted {
            summary: Box::new(summary),
            source: Box::new(source),
        }
    }

    /// The summary computed before the failure, if any.
    pub fn partial_summary(&self) -> Option<&Summary> {
        match self {
            Self::Interrupted { summary, .. } => Some(summary),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted { source, .. } => source.exit_code(),
            Self::MissingConfiguration { .. } => exit_codes::MISSING_CONFIGURATION,
            Self::Persistence(_) => exit_codes::PERSISTENCE_FAILURE,
            Self::UnitNotFound { .. } | Self::NoEligibleUnit { .. } | Self::InvalidArgument(_) => {
                exit_codes::HARD_FAILURE
            }
        }
    }
}
