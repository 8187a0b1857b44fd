#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use cyclegate_contracts::probe::ProbeReport;
use cyclegate_contracts::Validate;
use tracing::{debug, warn};

use crate::documents::{atomic_write_json, read_validated};
use crate::StorageError;

pub const DEFAULT_PROBE_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Fresh(ProbeReport),
    Stale { age_secs: i64 },
    Missing,
    /// Present but unreadable; treated as a miss.
    Corrupt { detail: String },
}

impl CacheLookup {
    pub fn into_fresh(self) -> Option<ProbeReport> {
        match self {
            Self::Fresh(report) => Some(report),
            _ => None,
        }
    }
}

/// Probe report cached on disk, invalidated by age only.
#[derive(Debug, Clone)]
pub struct ProbeCache {
    path: PathBuf,
    ttl: Duration,
}

impl ProbeCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Never fails on content: a corrupt entry is reported, not raised. Only
    /// an I/O failure on an existing file is an error.
    pub fn lookup(&self, now: DateTime<Utc>) -> Result<CacheLookup, StorageError> {
        let report: ProbeReport = match read_validated(&self.path) {
            Ok(report) => report,
            Err(err) if err.is_not_found() => return Ok(CacheLookup::Missing),
            Err(err) if err.is_corrupt() => {
                warn!(path = %self.path.display(), error = %err, "probe cache corrupt; regenerating");
                return Ok(CacheLookup::Corrupt {
                    detail: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        };
        if report.is_stale(now, self.ttl) {
            let age_secs = report.age(now).num_seconds();
            debug!(age_secs, "probe cache stale");
            return Ok(CacheLookup::Stale { age_secs });
        }
        Ok(CacheLookup::Fresh(report))
    }

    pub fn store(&self, report: &ProbeReport) -> Result<(), StorageError> {
        report
            .validate()
            .map_err(|violation| StorageError::contract(&self.path, violation))?;
        atomic_write_json(&self.path, report)
    }
}
