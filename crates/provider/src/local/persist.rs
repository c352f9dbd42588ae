//! On-disk format of a local collection
//!
//! One `<collection>.json` file per collection in the data directory,
//! written atomically (temp + fsync + rename). A file that exists but does
//! not decode is reported as corruption so the recovery path can reset it.

use chrono::{DateTime, Utc};
use forest_core::{Record, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Current file format version
pub(crate) const FORMAT_VERSION: u32 = 1;

const FILE_EXTENSION: &str = "json";

/// Serialized collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CollectionFile {
    pub version: u32,
    pub id: Uuid,
    pub name: String,
    pub created: DateTime<Utc>,
    pub records: Vec<Record>,
}

/// Path of the file backing `collection`
pub(crate) fn collection_path(dir: &Path, collection: &str) -> PathBuf {
    dir.join(format!("{}.{}", collection, FILE_EXTENSION))
}

/// Write a collection file atomically.
pub(crate) fn write_collection(path: &Path, file: &CollectionFile) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;

    let payload = serde_json::to_vec(file)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("serialize error: {}", e)))?;

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut out = std::fs::File::create(&tmp_path)?;
        out.write_all(&payload)?;
        out.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a collection file; `Ok(None)` if it does not exist.
pub(crate) fn load_collection(path: &Path, operation: &str) -> StoreResult<Option<CollectionFile>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::Io(e)),
    };

    let file: CollectionFile = serde_json::from_slice(&bytes).map_err(|e| {
        StoreError::Corruption {
            operation: operation.to_string(),
            message: format!("corrupt collection file '{}': {}", path.display(), e),
        }
    })?;
    if file.version != FORMAT_VERSION {
        return Err(StoreError::Corruption {
            operation: operation.to_string(),
            message: format!(
                "unsupported collection file version {} in '{}'",
                file.version,
                path.display()
            ),
        });
    }
    Ok(Some(file))
}

/// Remove a collection file; a missing file is fine.
pub(crate) fn remove_collection(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Collection names with a file in `dir`
pub(crate) fn list_collection_files(dir: &Path) -> io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut names = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}
