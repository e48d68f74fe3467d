use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::storage::{
    StorageError, StorageLocation, StorageResult, TempFileGuard, create_parent_dir, join_local,
};

/// Local filesystem sink that writes to a temp file and renames on finish.
struct LocalSink {
    tmp_path: PathBuf,
    final_path: PathBuf,
    writer: io::BufWriter<fs::File>,
    guard: TempFileGuard,
}

impl LocalSink {
    fn open(location: &StorageLocation, rel_path: &Path) -> StorageResult<Self> {
        let final_path = join_local(location, rel_path);
        create_parent_dir(&final_path)?;

        let tmp_path = final_path.with_extension("tmp");
        let file = fs::File::create(&tmp_path)
            .map_err(|e| StorageError::from_io(tmp_path.display().to_string(), e))?;

        let guard = TempFileGuard::new(tmp_path.clone());
        Ok(Self {
            tmp_path,
            final_path,
            writer: io::BufWriter::new(file),
            guard,
        })
    }

    fn write_all(&mut self, bytes: &[u8]) -> StorageResult<()> {
        self.writer
            .write_all(bytes)
            .map_err(|e| StorageError::from_io(self.tmp_path.display().to_string(), e))
    }

    fn finish(&mut self, sync: bool) -> StorageResult<()> {
        let tmp = self.tmp_path.display().to_string();
        self.writer
            .flush()
            .map_err(|e| StorageError::from_io(&tmp, e))?;

        if sync {
            self.writer
                .get_ref()
                .sync_all()
                .map_err(|e| StorageError::from_io(&tmp, e))?;
        }

        fs::rename(&self.tmp_path, &self.final_path)
            .map_err(|e| StorageError::from_io(self.final_path.display().to_string(), e))?;

        self.guard.disarm();
        Ok(())
    }
}

enum OutputSinkInner {
    Local(LocalSink),
}

/// A streaming output sink for writing bytes to a storage backend.
///
/// Bytes go to a temporary file; [`OutputSink::finish`] makes them visible
/// at the final path in one rename. Dropping an unfinished sink discards
/// the temporary file.
pub struct OutputSink {
    inner: OutputSinkInner,
}

impl OutputSink {
    /// Append `bytes` to the pending output.
    pub fn write_all(&mut self, bytes: &[u8]) -> StorageResult<()> {
        match &mut self.inner {
            OutputSinkInner::Local(s) => s.write_all(bytes),
        }
    }

    /// Flush, optionally fsync, and rename into the final location.
    pub fn finish(self, sync: bool) -> StorageResult<()> {
        match self.inner {
            OutputSinkInner::Local(mut s) => s.finish(sync),
        }
    }
}

/// Open a streaming output sink at `location` + `rel_path`.
pub fn open_output_sink(location: &StorageLocation, rel_path: &Path) -> StorageResult<OutputSink> {
    match location {
        StorageLocation::Local(_) => Ok(OutputSink {
            inner: OutputSinkInner::Local(LocalSink::open(location, rel_path)?),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn finish_makes_bytes_visible() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StorageLocation::local(tmp.path());

        let mut sink = open_output_sink(&location, Path::new("col/X/data"))?;
        sink.write_all(b"ab")?;
        sink.write_all(b"cd")?;
        assert!(!tmp.path().join("col/X/data").exists());
        sink.finish(false)?;

        assert_eq!(fs::read(tmp.path().join("col/X/data"))?, b"abcd");
        Ok(())
    }

    #[test]
    fn dropped_sink_leaves_nothing_behind() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StorageLocation::local(tmp.path());

        {
            let mut sink = open_output_sink(&location, Path::new("data"))?;
            sink.write_all(b"partial")?;
        }

        assert!(!tmp.path().join("data").exists());
        assert!(!tmp.path().join("data.tmp").exists());
        Ok(())
    }
}
