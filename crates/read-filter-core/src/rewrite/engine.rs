//! Row-by-row recomputation of the filter column.

use log::{debug, info};
use snafu::prelude::*;

use crate::read_filter::{FilterPredicate, PASS};
use crate::rewrite::error::{
    AllocationSnafu, FilterLengthSnafu, MalformedCellSnafu, NonMonotonicSnafu, RewriteResult,
    RowSnafu,
};
use crate::rewrite::planner::BoundCursors;
use crate::store::{CellData, ColumnId, ReadCursor, RowOp};

const MIN_FILTER_CAPACITY: usize = 64;

/// Reusable per-row buffer holding one filter byte per read.
///
/// Capacity doubles on growth and is never released between rows.
#[derive(Debug, Default)]
pub(crate) struct FilterBuffer {
    bytes: Vec<u8>,
}

impl FilterBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Current capacity in bytes.
    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Resize to exactly `len` zeroed bytes and return them.
    pub(crate) fn resize(&mut self, len: usize) -> RewriteResult<&mut [u8]> {
        let cap = self.bytes.capacity();
        if len > cap {
            let mut target = cap.max(MIN_FILTER_CAPACITY);
            while target < len {
                target = target.checked_mul(2).unwrap_or(len);
            }
            self.bytes.clear();
            self.bytes
                .try_reserve_exact(target)
                .context(AllocationSnafu {
                    what: "filter buffer",
                    requested: target,
                })?;
        }
        self.bytes.clear();
        self.bytes.resize(len, 0);
        Ok(&mut self.bytes)
    }
}

/// Counters gathered while rewriting rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RowStats {
    pub rows: u64,
    pub reads: u64,
    pub changed: u64,
}

fn read_cell<'a>(
    cursor: &'a ReadCursor,
    row: i64,
    cid: ColumnId,
    column: &str,
) -> RewriteResult<CellData<'a>> {
    let cell = cursor.cell_data(row, cid).context(RowSnafu {
        op: RowOp::ReadCell,
        row,
        column,
    })?;
    ensure!(
        cell.is_byte_aligned(),
        MalformedCellSnafu {
            column,
            row,
            bit_offset: cell.bit_offset,
            elem_bits: cell.elem_bits,
        }
    );
    Ok(cell)
}

/// Recompute every row in ascending id order, then leave the destination
/// cursor ready for its final commit.
pub(crate) fn rewrite_rows(
    cursors: &mut BoundCursors,
    filter_column: &str,
    read_count_column: &str,
    output_column: &str,
    predicate: &dyn FilterPredicate,
) -> RewriteResult<RowStats> {
    let mut buffer = FilterBuffer::new();
    let mut stats = RowStats::default();

    let end = cursors.first_row + cursors.rows as i64;
    for row in cursors.first_row..end {
        let existing = read_cell(&cursors.source, row, cursors.filter, filter_column)?;
        let reads = read_cell(&cursors.source, row, cursors.read_count, read_count_column)?.count;
        ensure!(
            existing.count == reads,
            FilterLengthSnafu {
                row,
                reads,
                filter_len: existing.count,
            }
        );

        let before = existing.bytes();
        let out = buffer.resize(reads as usize)?;
        for (read, (slot, old)) in (0u32..).zip(out.iter_mut().zip(before)) {
            let new = predicate.recompute(row, read, *old);
            ensure!(
                !(*old != PASS && new == PASS),
                NonMonotonicSnafu {
                    row,
                    read,
                    before: *old,
                }
            );
            if new != *old {
                stats.changed += 1;
            }
            *slot = new;
        }

        let dest = &mut cursors.dest;
        let opened = dest.open_row().context(RowSnafu {
            op: RowOp::OpenRow,
            row,
            column: output_column,
        })?;
        debug_assert_eq!(opened, row);
        dest.write(cursors.output, 8, out, 0, reads)
            .context(RowSnafu {
                op: RowOp::Write,
                row,
                column: output_column,
            })?;
        dest.commit_row().context(RowSnafu {
            op: RowOp::CommitRow,
            row,
            column: output_column,
        })?;
        dest.close_row().context(RowSnafu {
            op: RowOp::CloseRow,
            row,
            column: output_column,
        })?;

        stats.rows += 1;
        stats.reads += u64::from(reads);
    }

    debug!("recomputed {} row(s)", stats.rows);
    info!(
        "{} rows, {} reads, {} reads changed",
        stats.rows, stats.reads, stats.changed
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_filter::{FilterPolicy, REJECT};
    use crate::rewrite::config::RewriteConfig;
    use crate::rewrite::error::{FaultCategory, RewriteError};
    use crate::rewrite::planner::{bind_cursors, plan};
    use crate::schema::SchemaInfo;
    use crate::storage::StorageLocation;
    use crate::store::{Manager, Table};
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const SCHEMA: &str =
        "table t:reads { column U8 READ_FILTER; column U32 READ_LEN; column B1 BITS; };";

    fn info() -> SchemaInfo {
        SchemaInfo {
            type_name: "t:reads".to_string(),
            text: SCHEMA.to_string(),
        }
    }

    /// Source table at `<tmp>/src` with one row per `(filters, reads)` pair.
    fn source(tmp: &TempDir, rows: &[(&[u8], u32)]) -> Result<Table, Box<dyn std::error::Error>> {
        let mgr = Manager::new().with_sync(false);
        let mut table = mgr.create_table(&StorageLocation::local(tmp.path().join("src")), &info())?;
        let mut w = table.write_cursor()?;
        let f = w.add_column("READ_FILTER")?;
        let n = w.add_column("READ_LEN")?;
        let b = w.add_column("BITS")?;
        w.open()?;
        for (filters, reads) in rows {
            w.open_row()?;
            w.write(f, 8, filters, 0, filters.len() as u32)?;
            let lens: Vec<u8> = (0..*reads).flat_map(|_| 10u32.to_le_bytes()).collect();
            w.write(n, 32, &lens, 0, *reads)?;
            w.write(b, 1, &[0xff], 0, 3)?;
            w.commit_row()?;
            w.close_row()?;
        }
        w.commit()?;
        Ok(table)
    }

    fn run(
        tmp: &TempDir,
        src: &Table,
        cfg: &RewriteConfig,
        predicate: &dyn FilterPredicate,
    ) -> RewriteResult<(RowStats, Table)> {
        let mgr = Manager::new().with_sync(false);
        let mut dest = mgr
            .create_table(&StorageLocation::local(tmp.path().join("dst")), &info())
            .map_err(|e| RewriteError::CreateOutput {
                path: "dst".to_string(),
                source: Box::new(e),
            })?;
        let p = plan(src, cfg)?;
        let mut cursors = bind_cursors(&p, src, &mut dest)?;
        let stats = rewrite_rows(
            &mut cursors,
            &p.filter_column,
            &p.read_count_column,
            &p.output_column,
            predicate,
        )?;
        cursors.dest.commit().map_err(|e| RewriteError::CommitCursor {
            column: p.output_column.clone(),
            source: Box::new(e),
        })?;
        Ok((stats, dest))
    }

    fn output_cells(table: &Table) -> Result<Vec<Vec<u8>>, Box<dyn std::error::Error>> {
        let mut r = table.read_cursor()?;
        let f = r.add_column("READ_FILTER")?;
        r.open()?;
        let (first, count) = r.id_range(f)?;
        let mut out = Vec::new();
        for row in first..first + count as i64 {
            out.push(r.cell_data(row, f)?.bytes().to_vec());
        }
        Ok(out)
    }

    #[test]
    fn filter_buffer_doubles_and_is_reused() -> TestResult {
        let mut buf = FilterBuffer::new();
        assert_eq!(buf.resize(3)?.len(), 3);
        let cap = buf.capacity();
        assert!(cap >= MIN_FILTER_CAPACITY);

        buf.resize(cap + 1)?;
        assert!(buf.capacity() >= cap * 2);
        let grown = buf.capacity();

        assert_eq!(buf.resize(0)?.len(), 0);
        assert_eq!(buf.capacity(), grown);
        assert!(buf.resize(5)?.iter().all(|b| *b == 0));
        Ok(())
    }

    #[test]
    fn rows_are_recomputed_in_order() -> TestResult {
        let tmp = TempDir::new()?;
        let src = source(&tmp, &[(&[0, 0], 2), (&[1], 1), (&[0, 0, 0], 3), (&[], 0)])?;
        let (stats, dest) = run(
            &tmp,
            &src,
            &RewriteConfig::new(tmp.path()),
            &FilterPolicy::RejectEven,
        )?;

        assert_eq!(
            stats,
            RowStats {
                rows: 4,
                reads: 6,
                changed: 3
            }
        );
        assert_eq!(
            output_cells(&dest)?,
            vec![vec![1, 0], vec![1], vec![1, 0, 1], vec![]]
        );
        Ok(())
    }

    #[test]
    fn relaxing_a_reject_aborts() -> TestResult {
        let tmp = TempDir::new()?;
        let src = source(&tmp, &[(&[0], 1), (&[REJECT, 0], 2)])?;
        let relax = |_: i64, _: u32, _: u8| PASS;
        let err = run(&tmp, &src, &RewriteConfig::new(tmp.path()), &relax)
            .err()
            .ok_or("expected failure")?;
        assert!(matches!(
            err,
            RewriteError::NonMonotonic {
                row: 2,
                read: 0,
                before: REJECT
            }
        ));
        assert_eq!(err.category(), FaultCategory::Config);
        Ok(())
    }

    #[test]
    fn filter_cell_must_match_read_count() -> TestResult {
        let tmp = TempDir::new()?;
        let src = source(&tmp, &[(&[0], 2)])?;
        let err = run(
            &tmp,
            &src,
            &RewriteConfig::new(tmp.path()),
            &FilterPolicy::Keep,
        )
        .err()
        .ok_or("expected failure")?;
        assert!(matches!(
            err,
            RewriteError::FilterLength {
                reads: 2,
                filter_len: 1,
                ..
            }
        ));
        assert_eq!(err.category(), FaultCategory::Row);
        Ok(())
    }

    #[test]
    fn bit_packed_read_count_cell_is_malformed() -> TestResult {
        let tmp = TempDir::new()?;
        let src = source(&tmp, &[(&[0, 0, 0], 3)])?;
        let mut cfg = RewriteConfig::new(tmp.path());
        cfg.read_count_column = "BITS".to_string();
        let err = run(&tmp, &src, &cfg, &FilterPolicy::Keep)
            .err()
            .ok_or("expected failure")?;
        assert!(matches!(
            err,
            RewriteError::MalformedCell { elem_bits: 1, .. }
        ));
        assert_eq!(err.category(), FaultCategory::Row);
        Ok(())
    }
}
