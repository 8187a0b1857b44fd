#![forbid(unsafe_code)]

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use cyclegate_contracts::outcome::CycleRecord;
use cyclegate_contracts::Validate;
use tracing::{debug, warn};

use crate::documents::read_validated;
use crate::StorageError;

const RECORD_PREFIX: &str = "cycle_";
const RECORD_SUFFIX: &str = ".json";

/// Append-only directory of cycle records, one file per cycle.
#[derive(Debug, Clone)]
pub struct CycleLog {
    dir: PathBuf,
}

impl CycleLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, cycle_id: &str) -> PathBuf {
        self.dir
            .join(format!("{RECORD_PREFIX}{cycle_id}{RECORD_SUFFIX}"))
    }

    /// Timestamp based id, suffixed when a record with that id already exists.
    pub fn allocate_cycle_id(&self, now: DateTime<Utc>) -> String {
        let base = now.format("%Y%m%dT%H%M%S%3fZ").to_string();
        if !self.record_path(&base).exists() {
            return base;
        }
        (1u32..)
            .map(|n| format!("{base}-{n}"))
            .find(|id| !self.record_path(id).exists())
            .unwrap_or(base)
    }

    /// Writes a new record file. Existing records are never overwritten.
    pub fn append(&self, record: &CycleRecord) -> Result<PathBuf, StorageError> {
        let path = self.record_path(&record.cycle_id);
        record
            .validate()
            .map_err(|violation| StorageError::contract(&path, violation))?;
        fs::create_dir_all(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;
        let serialized =
            serde_json::to_vec_pretty(record).map_err(|e| StorageError::json(&path, e))?;
        let written = (|| {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)?;
            file.write_all(&serialized)?;
            file.write_all(b"\n")?;
            file.sync_all()
        })();
        written.map_err(|e| StorageError::io(&path, e))?;
        debug!(
            cycle_id = %record.cycle_id,
            unit_id = %record.outcome.unit_id,
            "cycle record appended"
        );
        Ok(path)
    }

    /// Records for one unit, most recent first, at most `limit`. Unreadable
    /// files are skipped with a warning.
    pub fn recent_for_unit(
        &self,
        unit_id: &str,
        limit: usize,
    ) -> Result<Vec<CycleRecord>, StorageError> {
        let mut records: Vec<CycleRecord> = self
            .load_all()?
            .into_iter()
            .filter(|record| record.outcome.unit_id == unit_id)
            .collect();
        records.sort_by(|a, b| {
            b.outcome
                .timestamp
                .cmp(&a.outcome.timestamp)
                .then_with(|| b.cycle_id.cmp(&a.cycle_id))
        });
        records.truncate(limit);
        Ok(records)
    }

    pub fn load_all(&self) -> Result<Vec<CycleRecord>, StorageError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.dir, e)),
        };
        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.dir, e))?;
            let path = entry.path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(RECORD_PREFIX) && n.ends_with(RECORD_SUFFIX));
            if !is_record {
                continue;
            }
            match read_validated::<CycleRecord>(&path) {
                Ok(record) => records.push(record),
                Err(err) if err.is_corrupt() => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable cycle record");
                }
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(records)
    }
}
