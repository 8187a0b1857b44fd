#![forbid(unsafe_code)]

use std::io;
use std::path::{Path, PathBuf};

use cyclegate_contracts::ContractViolation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("document not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed json in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("contract violation in {}: {violation}", path.display())]
    Contract {
        path: PathBuf,
        #[source]
        violation: ContractViolation,
    },

    #[error("timed out waiting for lock on {}", path.display())]
    LockTimeout { path: PathBuf },
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub(crate) fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn contract(path: &Path, violation: ContractViolation) -> Self {
        Self::Contract {
            path: path.to_path_buf(),
            violation,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when the document exists but cannot be trusted.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Json { .. } | Self::Contract { .. })
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound { path }
            | Self::Io { path, .. }
            | Self::Json { path, .. }
            | Self::Contract { path, .. }
            | Self::LockTimeout { path } => path,
        }
    }
}
