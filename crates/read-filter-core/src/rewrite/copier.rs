//! Verbatim copies of column storage and sibling tables.

use log::debug;
use snafu::prelude::*;

use crate::rewrite::error::{CopySnafu, OpenSnafu, RewriteResult};
use crate::storage::{self, StorageLocation, layout};
use crate::store::Database;

/// Copy each named column's storage from `src` to `dst` without decoding
/// rows. Returns the number of bytes copied.
pub(crate) fn copy_columns(
    src: &StorageLocation,
    dst: &StorageLocation,
    columns: &[String],
) -> RewriteResult<u64> {
    let mut bytes = 0;
    for column in columns {
        let copied = storage::copy_tree(src, dst, &layout::column_rel_dir(column)).context(
            CopySnafu {
                what: "column",
                name: column,
            },
        )?;
        debug!("copied column {column} ({copied} bytes)");
        bytes += copied;
    }
    Ok(bytes)
}

/// Copy every member table of `src` except `skip` into the database rooted
/// at `dst`. Returns the copied table names and byte count.
pub(crate) fn copy_sibling_tables(
    src: &Database,
    dst: &StorageLocation,
    skip: &str,
) -> RewriteResult<(Vec<String>, u64)> {
    let tables = src.tables().context(OpenSnafu {
        path: src.location().display(),
    })?;

    let mut copied = Vec::new();
    let mut bytes = 0;
    for table in tables.into_iter().filter(|t| t != skip) {
        bytes += storage::copy_tree(src.location(), dst, &layout::table_rel_dir(&table)).context(
            CopySnafu {
                what: "table",
                name: &table,
            },
        )?;
        debug!("copied table {table}");
        copied.push(table);
    }
    Ok((copied, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::error::{FaultCategory, RewriteError};
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn columns_are_copied_byte_for_byte() -> TestResult {
        let tmp = TempDir::new()?;
        let src = StorageLocation::local(tmp.path().join("src"));
        let dst = StorageLocation::local(tmp.path().join("dst"));
        std::fs::create_dir_all(tmp.path().join("src/col/READ"))?;
        std::fs::write(tmp.path().join("src/col/READ/data"), b"ACGT")?;
        std::fs::write(tmp.path().join("src/col/READ/idx"), [0u8; 12])?;

        let bytes = copy_columns(&src, &dst, &["READ".to_string()])?;
        assert_eq!(bytes, 16);
        assert_eq!(std::fs::read(tmp.path().join("dst/col/READ/data"))?, b"ACGT");
        Ok(())
    }

    #[test]
    fn missing_column_storage_is_a_copy_fault() -> TestResult {
        let tmp = TempDir::new()?;
        let src = StorageLocation::local(tmp.path().join("src"));
        let dst = StorageLocation::local(tmp.path().join("dst"));

        let err = copy_columns(&src, &dst, &["QUALITY".to_string()]).expect_err("missing");
        assert!(matches!(err, RewriteError::Copy { what: "column", .. }));
        assert_eq!(err.category(), FaultCategory::Copy);
        Ok(())
    }
}
