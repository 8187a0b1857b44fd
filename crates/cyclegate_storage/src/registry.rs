#![forbid(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use cyclegate_contracts::unit::UnitRegistry;
use cyclegate_contracts::Validate;
use fs4::fs_std::FileExt;
use tracing::{debug, info};

use crate::documents::{atomic_write_json, ensure_parent, read_validated};
use crate::StorageError;

pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(30);
const LOCK_POLL: Duration = Duration::from_millis(50);

/// The registry document on disk. Every mutation is load, change in memory,
/// write back once.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
    lock_wait: Duration,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    pub fn load(&self) -> Result<UnitRegistry, StorageError> {
        let registry: UnitRegistry = read_validated(&self.path)?;
        debug!(
            path = %self.path.display(),
            units = registry.units.len(),
            "registry loaded"
        );
        Ok(registry)
    }

    /// Stamps `last_updated`, validates, then replaces the document atomically.
    /// An invalid registry is never written.
    pub fn save(&self, registry: &mut UnitRegistry, now: DateTime<Utc>) -> Result<(), StorageError> {
        registry.last_updated = now;
        registry
            .validate()
            .map_err(|violation| StorageError::contract(&self.path, violation))?;
        atomic_write_json(&self.path, registry)?;
        info!(
            path = %self.path.display(),
            units = registry.units.len(),
            "registry written"
        );
        Ok(())
    }

    /// Takes the advisory writer lock, polling until `lock_wait` elapses.
    pub fn lock(&self) -> Result<RegistryLock, StorageError> {
        let lock_path = self.lock_path();
        ensure_parent(&lock_path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StorageError::io(&lock_path, e))?;

        let start = Instant::now();
        loop {
            if matches!(FileExt::try_lock_exclusive(&file), Ok(true)) {
                debug!(path = %lock_path.display(), "registry lock acquired");
                return Ok(RegistryLock { file });
            }
            if start.elapsed() >= self.lock_wait {
                return Err(StorageError::LockTimeout { path: lock_path });
            }
            thread::sleep(LOCK_POLL);
        }
    }
}

/// Exclusive registry lock. Unlocks on drop.
#[derive(Debug)]
pub struct RegistryLock {
    file: File,
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
