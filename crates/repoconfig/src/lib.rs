//! IndexHub configuration document adapter.
//!
//! Implements the [`domain::ConfigMerger`] trait over the build tool's JSON
//! configuration file. The coordinator calls it before every partial build so
//! that the package being built is registered in the document.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File access and JSON encoding live here; the merge rules
//! themselves are in [`document`] and operate on an in-memory document.
//!
//! ## Durability
//!
//! The merged document is written to a temporary file in the same directory and
//! renamed over the original, so a failed write never leaves a truncated
//! configuration behind.

pub mod document;

use std::io::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use domain::{ConfigMergeError, ConfigMerger, PackageDescriptor};
use tempfile::NamedTempFile;
use tracing::debug;

/// Reads the document at `path`, merges `updates` into it, and writes it back.
///
/// Running this twice with the same `updates` yields the same document.
pub fn merge_and_persist(
    path: &Path,
    updates: &[PackageDescriptor],
) -> Result<(), ConfigMergeError> {
    let data = std::fs::read(path).map_err(|e| ConfigMergeError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut config = document::parse(&data)?;
    document::merge(&mut config, updates)?;
    let encoded = document::encode(&config)?;

    write_atomically(path, encoded.as_bytes())?;
    debug!(path = %path.display(), updates = updates.len(), "configuration document updated");
    Ok(())
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), ConfigMergeError> {
    let write_error = |message: String| ConfigMergeError::Write {
        path: path.to_path_buf(),
        message,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Keep the original file's permissions on the replacement.
    let permissions = std::fs::metadata(path).map(|m| m.permissions()).ok();

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| write_error(e.to_string()))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| write_error(e.to_string()))?;
    if let Some(permissions) = permissions {
        std::fs::set_permissions(tmp.path(), permissions)
            .map_err(|e| write_error(e.to_string()))?;
    }
    tmp.persist(path).map_err(|e| write_error(e.error.to_string()))?;
    Ok(())
}

/// [`ConfigMerger`] over a JSON file on the local file system.
///
/// File I/O runs on the blocking thread pool.
#[derive(Debug, Clone, Default)]
pub struct JsonFileMerger;

impl JsonFileMerger {
    /// Creates a new merger.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConfigMerger for JsonFileMerger {
    async fn merge(
        &self,
        path: &Path,
        updates: &[PackageDescriptor],
    ) -> Result<(), ConfigMergeError> {
        let path: PathBuf = path.to_path_buf();
        let updates = updates.to_vec();
        let task_path = path.clone();
        tokio::task::spawn_blocking(move || merge_and_persist(&task_path, &updates))
            .await
            .map_err(|e| ConfigMergeError::Write {
                path,
                message: format!("merge task failed: {e}"),
            })?
    }
}
