//! Staging area and the final swap.
//!
//! The staged object lives at `<parent>/.<name>.mrf.XXXXXX/out`, next to
//! the target so both renames of the swap stay on one filesystem.

use std::path::{Path, PathBuf};

use log::{error, info, warn};
use snafu::prelude::*;
use tempfile::TempDir;

use crate::rewrite::error::{CreateStagingSnafu, RewriteResult, SwapSnafu};
use crate::storage::{self, StorageLocation};

const STAGED_LEAF: &str = "out";
const DISPLACED_LEAF: &str = "old";

/// A staged object under a unique temporary directory.
#[derive(Debug)]
pub(crate) struct TempObject {
    dir: TempDir,
    staged: PathBuf,
}

impl TempObject {
    /// Reserve a staging directory next to `target`.
    pub(crate) fn create(target: &Path) -> RewriteResult<Self> {
        let display = target.display().to_string();
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let dir = tempfile::Builder::new()
            .prefix(&format!(".{name}.mrf."))
            .tempdir_in(&parent)
            .context(CreateStagingSnafu { path: &display })?;
        let staged = dir.path().join(STAGED_LEAF);
        Ok(Self { dir, staged })
    }

    /// Where the staged object is built.
    pub(crate) fn location(&self) -> StorageLocation {
        StorageLocation::local(&self.staged)
    }

    /// The temporary parent directory.
    pub(crate) fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the staging directory and everything in it.
    ///
    /// Failure is only logged.
    pub(crate) fn discard(self) {
        let path = self.dir.path().display().to_string();
        match self.dir.close() {
            Ok(()) => info!("removed staging directory {path}"),
            Err(e) => warn!("failed to remove staging directory {path}: {e}"),
        }
    }

    /// Replace `target` with the staged object.
    ///
    /// The original is first moved aside into the staging directory, then
    /// the staged object takes its place. If the second rename fails the
    /// original is moved back. The staging directory, now holding the
    /// original, is removed afterwards.
    pub(crate) fn swap_into(self, target: &Path) -> RewriteResult<()> {
        let display = target.display().to_string();
        let displaced = self.dir.path().join(DISPLACED_LEAF);

        storage::rename(target, &displaced).context(SwapSnafu { path: &display })?;

        if let Err(source) = storage::rename(&self.staged, target) {
            match storage::rename(&displaced, target) {
                Ok(()) => self.discard(),
                Err(e) => {
                    let kept = self.dir.keep();
                    error!(
                        "failed to restore {display} after a failed swap: {e}; original kept at {}",
                        kept.join(DISPLACED_LEAF).display()
                    );
                }
            }
            return Err(source).context(SwapSnafu { path: display });
        }

        info!("replaced {display}");
        self.discard();
        Ok(())
    }
}
