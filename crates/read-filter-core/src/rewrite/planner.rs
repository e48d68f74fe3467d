//! Split source columns into recomputed and physically copied sets, and
//! bind the cursors the row engine drives.

use log::debug;
use snafu::prelude::*;

use crate::rewrite::config::RewriteConfig;
use crate::rewrite::error::{
    AddColumnSnafu, FilterWidthSnafu, MissingCopyColumnSnafu, OpenCursorSnafu, RewriteResult,
    RowRangeSnafu,
};
use crate::store::{ColumnId, ColumnSpec, ReadCursor, Table, WriteCursor};

/// Which columns are recomputed and which are copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnPlan {
    /// Existing filter column, read row by row.
    pub filter_column: String,
    /// Column sizing each row's filter cell, read row by row.
    pub read_count_column: String,
    /// Recomputed column written to the output.
    pub output_column: String,
    /// Columns copied without decoding rows, sorted.
    pub copy: Vec<String>,
}

/// Decide the plan for `source` under `cfg`.
pub(crate) fn plan(source: &Table, cfg: &RewriteConfig) -> RewriteResult<ColumnPlan> {
    let table = source.location().display();
    let present = source
        .columns()
        .context(OpenCursorSnafu { table: &table })?;

    let mut copy = match &cfg.copy_columns {
        Some(explicit) => {
            for name in explicit {
                ensure!(
                    present.contains(name),
                    MissingCopyColumnSnafu {
                        table: &table,
                        column: name,
                    }
                );
            }
            explicit.clone()
        }
        None => present
            .iter()
            .filter(|c| **c != cfg.output_column)
            .cloned()
            .collect(),
    };
    // The recompute inputs are always carried into the output.
    for dep in [&cfg.read_count_column, &cfg.filter_column] {
        if *dep != cfg.output_column && present.contains(dep) {
            copy.push(dep.clone());
        }
    }
    copy.sort();
    copy.dedup();

    debug!(
        "recompute {} from {} and {}; copy {} column(s)",
        cfg.output_column,
        cfg.filter_column,
        cfg.read_count_column,
        copy.len()
    );
    Ok(ColumnPlan {
        filter_column: cfg.filter_column.clone(),
        read_count_column: cfg.read_count_column.clone(),
        output_column: cfg.output_column.clone(),
        copy,
    })
}

/// Source and destination cursors bound for the row engine.
pub(crate) struct BoundCursors {
    pub source: ReadCursor,
    pub filter: ColumnId,
    pub read_count: ColumnId,
    pub dest: WriteCursor,
    pub output: ColumnId,
    /// First source row id.
    pub first_row: i64,
    /// Number of source rows.
    pub rows: u64,
}

/// Open the read cursor on `source` and the write cursor on `dest`.
///
/// The output column takes the source filter column's type and the
/// source's first row id.
pub(crate) fn bind_cursors(
    plan: &ColumnPlan,
    source: &Table,
    dest: &mut Table,
) -> RewriteResult<BoundCursors> {
    let src_name = source.location().display();
    let filter_desc = source
        .column_desc(&plan.filter_column)
        .context(AddColumnSnafu {
            column: &plan.filter_column,
        })?;
    ensure!(
        filter_desc.elem_bits == 8,
        FilterWidthSnafu {
            column: &plan.filter_column,
            elem_bits: filter_desc.elem_bits,
        }
    );

    let mut reader = source
        .read_cursor()
        .context(OpenCursorSnafu { table: &src_name })?;
    let filter_spec = ColumnSpec::typed(&filter_desc.type_name, &plan.filter_column);
    let filter = reader
        .add_column(&filter_spec)
        .context(AddColumnSnafu {
            column: &filter_spec,
        })?;
    let read_count = reader
        .add_column(&plan.read_count_column)
        .context(AddColumnSnafu {
            column: &plan.read_count_column,
        })?;
    reader
        .open()
        .context(OpenCursorSnafu { table: &src_name })?;

    let (first_row, rows) = reader
        .id_range(filter)
        .context(OpenCursorSnafu { table: &src_name })?;
    let (count_first, count_rows) = reader
        .id_range(read_count)
        .context(OpenCursorSnafu { table: &src_name })?;
    ensure!(
        count_first == first_row && count_rows == rows,
        RowRangeSnafu {
            column: &plan.read_count_column,
            first: count_first,
            count: count_rows,
            filter_first: first_row,
            filter_count: rows,
        }
    );

    let dest_name = dest.location().display();
    let mut writer = dest
        .write_cursor()
        .context(OpenCursorSnafu { table: &dest_name })?;
    let output_spec = ColumnSpec::typed(&filter_desc.type_name, &plan.output_column);
    let output = writer
        .add_column(&output_spec)
        .context(AddColumnSnafu {
            column: &output_spec,
        })?;
    writer
        .set_first_row(first_row)
        .context(OpenCursorSnafu { table: &dest_name })?;
    writer
        .open()
        .context(OpenCursorSnafu { table: &dest_name })?;

    debug!("bound cursors over rows [{first_row}, {first_row}+{rows})");
    Ok(BoundCursors {
        source: reader,
        filter,
        read_count,
        dest: writer,
        output,
        first_row,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::error::{FaultCategory, RewriteError};
    use crate::schema::SchemaInfo;
    use crate::storage::StorageLocation;
    use crate::store::Manager;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const SCHEMA: &str =
        "table t:reads { column U8 READ_FILTER; column U32 READ_LEN; column ascii READ; column U16 WIDE; };";

    fn table_with(tmp: &TempDir, columns: &[&str]) -> Result<Table, Box<dyn std::error::Error>> {
        let loc = StorageLocation::local(tmp.path().join("t"));
        let mut table = Manager::new().with_sync(false).create_table(
            &loc,
            &SchemaInfo {
                type_name: "t:reads".to_string(),
                text: SCHEMA.to_string(),
            },
        )?;
        let mut w = table.write_cursor()?;
        let ids = columns
            .iter()
            .map(|c| w.add_column(c))
            .collect::<Result<Vec<_>, _>>()?;
        w.open()?;
        w.open_row()?;
        for (cid, name) in ids.iter().zip(columns) {
            match *name {
                "READ_LEN" => w.write(*cid, 32, &4u32.to_le_bytes(), 0, 1)?,
                "WIDE" => w.write(*cid, 16, &[0, 0], 0, 1)?,
                _ => w.write(*cid, 8, &[0], 0, 1)?,
            }
        }
        w.commit_row()?;
        w.close_row()?;
        w.commit()?;
        Ok(table)
    }

    #[test]
    fn default_plan_copies_everything_but_the_output() -> TestResult {
        let tmp = TempDir::new()?;
        let table = table_with(&tmp, &["READ_FILTER", "READ_LEN", "READ"])?;
        let p = plan(&table, &RewriteConfig::new(tmp.path()))?;
        assert_eq!(p.copy, vec!["READ".to_string(), "READ_LEN".to_string()]);
        Ok(())
    }

    #[test]
    fn explicit_copy_set_must_exist() -> TestResult {
        let tmp = TempDir::new()?;
        let table = table_with(&tmp, &["READ_FILTER", "READ_LEN"])?;
        let cfg = RewriteConfig::new(tmp.path()).with_copy_columns(["QUALITY"]);
        let err = plan(&table, &cfg).expect_err("missing");
        assert!(matches!(err, RewriteError::MissingCopyColumn { .. }));
        assert_eq!(err.category(), FaultCategory::Column);
        Ok(())
    }

    #[test]
    fn explicit_copy_set_keeps_recompute_inputs() -> TestResult {
        let tmp = TempDir::new()?;
        let table = table_with(&tmp, &["READ_FILTER", "READ_LEN", "READ"])?;

        let cfg = RewriteConfig::new(tmp.path()).with_copy_columns(["READ"]);
        let p = plan(&table, &cfg)?;
        assert_eq!(p.copy, vec!["READ".to_string(), "READ_LEN".to_string()]);

        let cfg = RewriteConfig::new(tmp.path())
            .with_output_column("RD_FILTER")
            .with_copy_columns(["READ"]);
        let p = plan(&table, &cfg)?;
        assert_eq!(
            p.copy,
            vec![
                "READ".to_string(),
                "READ_FILTER".to_string(),
                "READ_LEN".to_string()
            ]
        );
        Ok(())
    }

    #[test]
    fn missing_read_count_column_is_a_column_fault() -> TestResult {
        let tmp = TempDir::new()?;
        let table = table_with(&tmp, &["READ_FILTER", "READ"])?;
        let p = plan(&table, &RewriteConfig::new(tmp.path()))?;

        let out = TempDir::new()?;
        let mut dest = Manager::new().with_sync(false).create_table(
            &StorageLocation::local(out.path().join("o")),
            &table.schema_info()?,
        )?;
        let err = bind_cursors(&p, &table, &mut dest).err().ok_or("expected failure")?;
        assert!(matches!(err, RewriteError::AddColumn { .. }));
        assert_eq!(err.category(), FaultCategory::Column);
        Ok(())
    }

    #[test]
    fn wide_filter_column_is_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let table = table_with(&tmp, &["WIDE", "READ_LEN"])?;
        let mut cfg = RewriteConfig::new(tmp.path());
        cfg.filter_column = "WIDE".to_string();
        let p = plan(&table, &cfg)?;

        let out = TempDir::new()?;
        let mut dest = Manager::new().with_sync(false).create_table(
            &StorageLocation::local(out.path().join("o")),
            &table.schema_info()?,
        )?;
        let err = bind_cursors(&p, &table, &mut dest).err().ok_or("expected failure")?;
        assert!(matches!(err, RewriteError::FilterWidth { elem_bits: 16, .. }));
        Ok(())
    }
}
