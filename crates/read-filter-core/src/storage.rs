//! Storage backend and path utilities.
//!
//! This module centralizes every filesystem interaction made by
//! `read-filter-core`. It maps an object root (a table or database
//! directory) to:
//!
//! - the `KIND` marker that identifies what lives at a path,
//! - the metadata file (`md/cur.json`),
//! - per-column storage (`col/<NAME>/`),
//! - member tables of a database (`tbl/<NAME>/`).
//!
//! Goals of this module include:
//!
//! - Keeping path conventions in one place ([`layout`]).
//! - Providing the atomic write primitives used by column and metadata
//!   commits (write-then-rename with a drop guard).
//! - Providing the verbatim directory copy used to move column storage
//!   between objects without decoding rows.
//!
//! All operations are synchronous and block the calling thread.

mod error;
pub mod io;
pub mod layout;
/// Streamed output files.
pub mod output;

pub use error::*;
pub use io::*;
pub use output::{OutputSink, open_output_sink};

use std::path::{Path, PathBuf};

use snafu::IntoError;

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Where a storage object lives.
///
/// Only local paths are supported; the enum keeps the door open for other
/// backends without changing callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageLocation {
    /// An object stored on the local filesystem at the given path.
    Local(PathBuf),
}

impl StorageLocation {
    /// Creates a new `StorageLocation` for a local filesystem path.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        StorageLocation::Local(root.into())
    }

    /// Parse a user-facing location string.
    pub fn parse(spec: &str) -> StorageResult<Self> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Err(OtherIoSnafu {
                path: "<empty location>".to_string(),
            }
            .into_error(BackendError::Local(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "location is empty",
            ))));
        }
        Ok(StorageLocation::Local(PathBuf::from(trimmed)))
    }

    /// Root path of this location.
    pub fn root(&self) -> &Path {
        match self {
            StorageLocation::Local(root) => root,
        }
    }

    /// A child location at `rel` below this one.
    pub fn join(&self, rel: impl AsRef<Path>) -> StorageLocation {
        StorageLocation::Local(join_local(self, rel.as_ref()))
    }

    /// Final path component, used when naming sibling paths.
    pub fn file_name(&self) -> Option<String> {
        self.root()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// Human-readable form used in error context.
    pub fn display(&self) -> String {
        self.root().display().to_string()
    }
}

/// Join a location with a relative path into an absolute local path.
pub(crate) fn join_local(location: &StorageLocation, rel: &Path) -> PathBuf {
    match location {
        StorageLocation::Local(root) if rel.as_os_str().is_empty() => root.clone(),
        StorageLocation::Local(root) => root.join(rel),
    }
}

pub(crate) fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    if let Some(parent) = abs.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| StorageError::from_io(parent.display().to_string(), e))?;
    }
    Ok(())
}

/// Guard that removes a temporary file on drop unless disarmed.
/// Used to ensure cleanup on error paths during atomic writes.
pub(crate) struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Disarm the guard so the file is NOT removed on drop.
    /// Call this after a successful rename.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // Best-effort; the caller is already returning an error.
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
