//! Blocking file and directory primitives for the local backend.

use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use crate::storage::{
    StorageError, StorageLocation, StorageResult, TempFileGuard, create_parent_dir, join_local,
};

/// What a path currently points at, without interpreting its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Nothing exists at the path.
    Missing,
    /// A regular file.
    File,
    /// A directory.
    Dir,
    /// Something else (socket, device, dangling link target, ...).
    Other,
}

/// Inspect `rel_path` under `location`.
pub fn probe(location: &StorageLocation, rel_path: &Path) -> StorageResult<Probe> {
    let abs = join_local(location, rel_path);
    match fs::metadata(&abs) {
        Ok(m) if m.is_dir() => Ok(Probe::Dir),
        Ok(m) if m.is_file() => Ok(Probe::File),
        Ok(_) => Ok(Probe::Other),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Probe::Missing),
        Err(e) => Err(StorageError::from_io(abs.display().to_string(), e)),
    }
}

/// Write `contents` to `rel_path` inside `location` using an atomic write.
///
/// Writes the payload to a temporary file next to the target path,
/// optionally syncs it, then renames it into place. A reader sees either
/// the previous file or the complete new one.
pub fn write_atomic(
    location: &StorageLocation,
    rel_path: &Path,
    contents: &[u8],
    sync: bool,
) -> StorageResult<()> {
    let abs = join_local(location, rel_path);
    create_parent_dir(&abs)?;

    let tmp_path = abs.with_extension("tmp");
    let mut guard = TempFileGuard::new(tmp_path.clone());
    let tmp_str = tmp_path.display().to_string();

    {
        let mut file =
            fs::File::create(&tmp_path).map_err(|e| StorageError::from_io(&tmp_str, e))?;
        file.write_all(contents)
            .map_err(|e| StorageError::from_io(&tmp_str, e))?;
        if sync {
            file.sync_all()
                .map_err(|e| StorageError::from_io(&tmp_str, e))?;
        }
    }

    fs::rename(&tmp_path, &abs).map_err(|e| StorageError::from_io(abs.display().to_string(), e))?;
    guard.disarm();
    Ok(())
}

/// Read the full contents of `rel_path` within `location`.
///
/// A missing file is reported as `StorageError::NotFound`.
pub fn read_all_bytes(location: &StorageLocation, rel_path: &Path) -> StorageResult<Vec<u8>> {
    let abs = join_local(location, rel_path);
    fs::read(&abs).map_err(|e| StorageError::from_io(abs.display().to_string(), e))
}

/// Read `rel_path` within `location` as UTF-8 text.
pub fn read_to_string(location: &StorageLocation, rel_path: &Path) -> StorageResult<String> {
    let abs = join_local(location, rel_path);
    fs::read_to_string(&abs).map_err(|e| StorageError::from_io(abs.display().to_string(), e))
}

/// Create `rel_path` (and parents) as a directory.
pub fn create_dir_all(location: &StorageLocation, rel_path: &Path) -> StorageResult<()> {
    let abs = join_local(location, rel_path);
    fs::create_dir_all(&abs).map_err(|e| StorageError::from_io(abs.display().to_string(), e))
}

/// Names of the immediate subdirectories of `rel_path`, sorted.
///
/// A missing directory yields an empty list.
pub fn list_dirs(location: &StorageLocation, rel_path: &Path) -> StorageResult<Vec<String>> {
    let abs = join_local(location, rel_path);
    let entries = match fs::read_dir(&abs) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::from_io(abs.display().to_string(), e)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::from_io(abs.display().to_string(), e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| StorageError::from_io(entry.path().display().to_string(), e))?;
        if file_type.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Recursively copy `rel_path` from `src` to the same relative path under
/// `dst`, byte for byte. Existing destination files are overwritten.
///
/// Returns the number of payload bytes copied.
pub fn copy_tree(
    src: &StorageLocation,
    dst: &StorageLocation,
    rel_path: &Path,
) -> StorageResult<u64> {
    let from = join_local(src, rel_path);
    let to = join_local(dst, rel_path);
    copy_tree_abs(&from, &to)
}

fn copy_tree_abs(from: &Path, to: &Path) -> StorageResult<u64> {
    let meta = fs::symlink_metadata(from)
        .map_err(|e| StorageError::from_io(from.display().to_string(), e))?;

    if meta.is_file() {
        create_parent_dir(to)?;
        return fs::copy(from, to).map_err(|e| StorageError::from_io(to.display().to_string(), e));
    }

    if !meta.is_dir() {
        return Err(StorageError::from_io(
            from.display().to_string(),
            io::Error::other("not a regular file or directory"),
        ));
    }

    fs::create_dir_all(to).map_err(|e| StorageError::from_io(to.display().to_string(), e))?;

    let entries =
        fs::read_dir(from).map_err(|e| StorageError::from_io(from.display().to_string(), e))?;
    let mut copied = 0u64;
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::from_io(from.display().to_string(), e))?;
        copied += copy_tree_abs(&entry.path(), &to.join(entry.file_name()))?;
    }
    Ok(copied)
}

/// Remove the file or directory tree at `rel_path`.
///
/// A missing path is reported as `StorageError::NotFound` so callers can
/// decide whether absence matters.
pub fn remove_tree(location: &StorageLocation, rel_path: &Path) -> StorageResult<()> {
    let abs = join_local(location, rel_path);
    let meta =
        fs::symlink_metadata(&abs).map_err(|e| StorageError::from_io(abs.display().to_string(), e))?;
    let result = if meta.is_dir() {
        fs::remove_dir_all(&abs)
    } else {
        fs::remove_file(&abs)
    };
    result.map_err(|e| StorageError::from_io(abs.display().to_string(), e))
}

/// Rename `from` to `to`. Both paths must be on the same filesystem for the
/// rename to be atomic.
pub fn rename(from: &Path, to: &Path) -> StorageResult<()> {
    fs::rename(from, to).map_err(|e| StorageError::from_io(to.display().to_string(), e))
}
