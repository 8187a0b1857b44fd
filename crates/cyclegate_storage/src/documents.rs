#![forbid(unsafe_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use cyclegate_contracts::Validate;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::StorageError;

/// Reads a JSON document and validates it before handing it out.
pub fn read_validated<T>(path: &Path) -> Result<T, StorageError>
where
    T: DeserializeOwned + Validate,
{
    let doc: T = read_json(path)?;
    doc.validate()
        .map_err(|violation| StorageError::contract(path, violation))?;
    Ok(doc)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let bytes = fs::read(path).map_err(|e| StorageError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| StorageError::json(path, e))
}

/// Reads an optional document; absence is `Ok(None)`.
pub fn read_optional_bytes(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

/// Writes the whole document to a sibling temp file, syncs it, then renames
/// it over the target. Readers see either the old or the new document.
pub fn atomic_write_json<T: Serialize>(path: &Path, doc: &T) -> Result<(), StorageError> {
    let serialized = serde_json::to_vec_pretty(doc).map_err(|e| StorageError::json(path, e))?;
    ensure_parent(path)?;
    let tmp = tmp_path(path);
    let written = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(&serialized)?;
        file.write_all(b"\n")?;
        file.sync_all()
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(StorageError::io(&tmp, e));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(StorageError::io(path, e));
    }
    Ok(())
}

pub(crate) fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))
        }
        _ => Ok(()),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
