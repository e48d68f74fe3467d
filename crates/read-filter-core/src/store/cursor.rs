//! Row cursors over table columns.
//!
//! Cells are stored bit-packed, most significant bit first. A read cursor
//! loads each added column's index and payload when opened; a write cursor
//! streams committed rows into temporary files and publishes the column
//! descriptor only on the final [`WriteCursor::commit`].

use std::fmt;
use std::path::Path;

use snafu::prelude::*;

use crate::schema::Schema;
use crate::storage::{self, OutputSink, Probe, StorageLocation, layout};
use crate::store::column::{IndexRecord, cell_slice};
use crate::store::table::load_column_desc;
use crate::store::{
    CellData, ColumnDesc, ColumnExistsSnafu, ColumnId, ColumnSpec, CorruptColumnSnafu,
    CursorStateSnafu, ElementWidthSnafu, RowOutOfRangeSnafu, SchemaSnafu, ShortBufferSnafu,
    StorageSnafu, StoreResult, TypeMismatchSnafu, UndeclaredColumnSnafu, UnknownColumnIdSnafu,
};

/// The row-level cursor operation that was in progress, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOp {
    /// Reading a cell.
    ReadCell,
    /// Opening a destination row.
    OpenRow,
    /// Writing a cell.
    Write,
    /// Committing a destination row.
    CommitRow,
    /// Closing a destination row.
    CloseRow,
}

impl fmt::Display for RowOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RowOp::ReadCell => "read cell",
            RowOp::OpenRow => "open row",
            RowOp::Write => "write",
            RowOp::CommitRow => "commit row",
            RowOp::CloseRow => "close row",
        })
    }
}

/// Resolve the element width a requested type name implies.
fn type_bits(location: &StorageLocation, schema: &Schema, type_name: &str) -> StoreResult<u32> {
    let prim = schema.resolve_type(type_name).context(SchemaSnafu {
        path: location.display(),
    })?;
    Ok(prim.elem_bits())
}

struct ReadColumn {
    desc: ColumnDesc,
    index: Vec<IndexRecord>,
    data: Vec<u8>,
}

/// Row-by-row reader over a fixed set of columns.
pub struct ReadCursor {
    location: StorageLocation,
    schema: Schema,
    columns: Vec<ReadColumn>,
    opened: bool,
}

impl ReadCursor {
    pub(crate) fn new(location: StorageLocation, schema: Schema) -> Self {
        Self {
            location,
            schema,
            columns: Vec::new(),
            opened: false,
        }
    }

    /// Bind a column given as `NAME` or `(type)NAME`.
    ///
    /// A typed spec must match the stored type by name or by element width.
    pub fn add_column(&mut self, spec: &str) -> StoreResult<ColumnId> {
        ensure!(
            !self.opened,
            CursorStateSnafu {
                op: "add column",
                state: "open"
            }
        );
        let spec = ColumnSpec::parse(spec)?;
        let desc = load_column_desc(&self.location, &spec.name)?;

        if let Some(requested) = spec.type_name
            && requested != desc.type_name
        {
            let bits = type_bits(&self.location, &self.schema, &requested)?;
            ensure!(
                bits == desc.elem_bits,
                TypeMismatchSnafu {
                    column: &desc.name,
                    stored: &desc.type_name,
                    stored_bits: desc.elem_bits,
                    requested,
                }
            );
        }

        let cid = self.columns.len() as ColumnId;
        self.columns.push(ReadColumn {
            desc,
            index: Vec::new(),
            data: Vec::new(),
        });
        Ok(cid)
    }

    /// Load every bound column.
    pub fn open(&mut self) -> StoreResult<()> {
        ensure!(
            !self.opened,
            CursorStateSnafu {
                op: "open",
                state: "open"
            }
        );
        for col in &mut self.columns {
            let name = col.desc.name.as_str();
            let idx = storage::read_all_bytes(&self.location, &layout::column_index_rel_path(name))
                .context(StorageSnafu)?;
            col.index = IndexRecord::decode_all(name, &idx)?;
            col.data = storage::read_all_bytes(&self.location, &layout::column_data_rel_path(name))
                .context(StorageSnafu)?;
        }
        self.opened = true;
        Ok(())
    }

    fn column(&self, cid: ColumnId) -> StoreResult<&ReadColumn> {
        ensure!(
            self.opened,
            CursorStateSnafu {
                op: "read",
                state: "not open"
            }
        );
        self.columns
            .get(cid as usize)
            .context(UnknownColumnIdSnafu { cid })
    }

    /// Descriptor of a bound column.
    pub fn column_desc(&self, cid: ColumnId) -> StoreResult<&ColumnDesc> {
        self.columns
            .get(cid as usize)
            .map(|c| &c.desc)
            .context(UnknownColumnIdSnafu { cid })
    }

    /// Row id range of a column as `(first, count)`.
    pub fn id_range(&self, cid: ColumnId) -> StoreResult<(i64, u64)> {
        let col = self.column(cid)?;
        Ok((col.desc.first_row, col.index.len() as u64))
    }

    /// The cell of column `cid` at `row`.
    pub fn cell_data(&self, row: i64, cid: ColumnId) -> StoreResult<CellData<'_>> {
        let col = self.column(cid)?;
        let count = col.index.len() as u64;
        let pos = row
            .checked_sub(col.desc.first_row)
            .and_then(|p| u64::try_from(p).ok())
            .filter(|p| *p < count);
        let pos = pos.context(RowOutOfRangeSnafu {
            column: &col.desc.name,
            row,
            first: col.desc.first_row,
            count,
        })?;
        cell_slice(
            &col.desc.name,
            col.desc.elem_bits,
            col.index[pos as usize],
            &col.data,
        )
    }
}

/// Growable bit string, most significant bit first.
#[derive(Debug, Default)]
struct BitBuf {
    bytes: Vec<u8>,
    len: u64,
}

impl BitBuf {
    fn clear(&mut self) {
        self.bytes.clear();
        self.len = 0;
    }

    /// Append `nbits` bits of `src` starting at bit `offset`.
    fn push_bits(&mut self, src: &[u8], offset: u64, nbits: u64) {
        if self.len % 8 == 0 && offset % 8 == 0 {
            let start = (offset / 8) as usize;
            let whole = (nbits / 8) as usize;
            self.bytes.extend_from_slice(&src[start..start + whole]);
            self.len += (whole as u64) * 8;
            let rest = nbits % 8;
            if rest > 0 {
                let mask = 0xffu8 << (8 - rest);
                self.bytes.push(src[start + whole] & mask);
                self.len += rest;
            }
            return;
        }
        for i in 0..nbits {
            let pos = offset + i;
            let bit = (src[(pos / 8) as usize] >> (7 - pos % 8)) & 1;
            if self.len % 8 == 0 {
                self.bytes.push(0);
            }
            if bit == 1 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 0x80 >> (self.len % 8);
            }
            self.len += 1;
        }
    }
}

/// Streams bit-packed payload into a sink, carrying a partial byte between
/// cells.
struct BitWriter {
    sink: OutputSink,
    tail: BitBuf,
    written_bits: u64,
}

impl BitWriter {
    fn position(&self) -> u64 {
        self.written_bits + self.tail.len
    }

    fn append(&mut self, cell: &BitBuf) -> StoreResult<()> {
        self.tail.push_bits(&cell.bytes, 0, cell.len);
        let whole = (self.tail.len / 8) as usize;
        if whole > 0 {
            self.sink
                .write_all(&self.tail.bytes[..whole])
                .context(StorageSnafu)?;
            self.written_bits += (whole as u64) * 8;
            let rest = self.tail.len % 8;
            let carry = self.tail.bytes.get(whole).copied();
            self.tail.clear();
            if let Some(byte) = carry {
                self.tail.bytes.push(byte);
                self.tail.len = rest;
            }
        }
        Ok(())
    }

    fn finish(mut self, sync: bool) -> StoreResult<()> {
        if self.tail.len > 0 {
            self.sink
                .write_all(&self.tail.bytes)
                .context(StorageSnafu)?;
        }
        self.sink.finish(sync).context(StorageSnafu)
    }
}

struct WriteColumn {
    name: String,
    type_name: String,
    elem_bits: u32,
    pending: BitBuf,
    pending_count: u32,
    streams: Option<(BitWriter, OutputSink)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Adding,
    Ready,
    RowOpen { written: bool },
    RowCommitted,
    Committed,
}

impl WriteState {
    fn name(self) -> &'static str {
        match self {
            WriteState::Adding => "not open",
            WriteState::Ready => "no row is open",
            WriteState::RowOpen { written: false } => "a row is open",
            WriteState::RowOpen { written: true } => "a row has uncommitted writes",
            WriteState::RowCommitted => "the row is committed but not closed",
            WriteState::Committed => "committed",
        }
    }
}

/// Row-by-row writer creating new columns in a table.
///
/// Lifecycle: `add_column`* → `open` → (`open_row` → `write`* →
/// `commit_row` → `close_row`)* → `commit`. Dropping the cursor before
/// `commit` leaves no column behind.
pub struct WriteCursor {
    location: StorageLocation,
    schema: Schema,
    table_type: String,
    sync: bool,
    columns: Vec<WriteColumn>,
    first_row: i64,
    rows: u64,
    state: WriteState,
}

impl WriteCursor {
    pub(crate) fn new(
        location: StorageLocation,
        schema: Schema,
        table_type: String,
        sync: bool,
    ) -> Self {
        Self {
            location,
            schema,
            table_type,
            sync,
            columns: Vec::new(),
            first_row: 1,
            rows: 0,
            state: WriteState::Adding,
        }
    }

    fn check_state(&self, op: &'static str, ok: bool) -> StoreResult<()> {
        ensure!(
            ok,
            CursorStateSnafu {
                op,
                state: self.state.name()
            }
        );
        Ok(())
    }

    /// Declare a new column given as `NAME` or `(type)NAME`.
    ///
    /// Without an explicit type the table's schema must declare the column.
    pub fn add_column(&mut self, spec: &str) -> StoreResult<ColumnId> {
        self.check_state("add column", self.state == WriteState::Adding)?;
        let spec = ColumnSpec::parse(spec)?;
        let table = self.location.display();

        let exists = self.columns.iter().any(|c| c.name == spec.name)
            || storage::probe(&self.location, &layout::column_desc_rel_path(&spec.name))
                .context(StorageSnafu)?
                != Probe::Missing;
        ensure!(
            !exists,
            ColumnExistsSnafu {
                table: &table,
                column: &spec.name,
            }
        );

        let declared = self
            .schema
            .table(&self.table_type)
            .and_then(|t| t.column_type(&spec.name))
            .map(str::to_string);
        let type_name = match (spec.type_name, declared) {
            (Some(requested), Some(declared)) => {
                let want = type_bits(&self.location, &self.schema, &requested)?;
                let have = type_bits(&self.location, &self.schema, &declared)?;
                ensure!(
                    want == have,
                    TypeMismatchSnafu {
                        column: &spec.name,
                        stored: declared,
                        stored_bits: have,
                        requested,
                    }
                );
                requested
            }
            (Some(requested), None) => requested,
            (None, Some(declared)) => declared,
            (None, None) => {
                return UndeclaredColumnSnafu {
                    table,
                    column: spec.name,
                }
                .fail();
            }
        };
        let elem_bits = type_bits(&self.location, &self.schema, &type_name)?;

        let cid = self.columns.len() as ColumnId;
        self.columns.push(WriteColumn {
            name: spec.name,
            type_name,
            elem_bits,
            pending: BitBuf::default(),
            pending_count: 0,
            streams: None,
        });
        Ok(cid)
    }

    /// Set the id of the first row written. Defaults to 1.
    pub fn set_first_row(&mut self, first: i64) -> StoreResult<()> {
        self.check_state("set first row", self.state == WriteState::Adding)?;
        self.first_row = first;
        Ok(())
    }

    /// Open temporary storage for every declared column.
    pub fn open(&mut self) -> StoreResult<()> {
        self.check_state("open", self.state == WriteState::Adding)?;
        for col in &mut self.columns {
            let data = storage::open_output_sink(
                &self.location,
                &layout::column_data_rel_path(&col.name),
            )
            .context(StorageSnafu)?;
            let idx = storage::open_output_sink(
                &self.location,
                &layout::column_index_rel_path(&col.name),
            )
            .context(StorageSnafu)?;
            col.streams = Some((
                BitWriter {
                    sink: data,
                    tail: BitBuf::default(),
                    written_bits: 0,
                },
                idx,
            ));
        }
        self.state = WriteState::Ready;
        Ok(())
    }

    /// Begin the next row and return its id.
    pub fn open_row(&mut self) -> StoreResult<i64> {
        self.check_state("open row", self.state == WriteState::Ready)?;
        self.state = WriteState::RowOpen { written: false };
        Ok(self.first_row + self.rows as i64)
    }

    /// Append `count` elements of `elem_bits` bits each, starting at bit
    /// `bit_offset` of `data`, to column `cid` in the open row.
    pub fn write(
        &mut self,
        cid: ColumnId,
        elem_bits: u32,
        data: &[u8],
        bit_offset: u32,
        count: u32,
    ) -> StoreResult<()> {
        self.check_state("write", matches!(self.state, WriteState::RowOpen { .. }))?;
        let col = self
            .columns
            .get_mut(cid as usize)
            .context(UnknownColumnIdSnafu { cid })?;
        ensure!(
            elem_bits == col.elem_bits,
            ElementWidthSnafu {
                column: &col.name,
                expected: col.elem_bits,
                actual: elem_bits,
            }
        );
        let nbits = u64::from(count) * u64::from(elem_bits);
        let needed_bits = u64::from(bit_offset) + nbits;
        let available_bits = (data.len() as u64) * 8;
        ensure!(
            needed_bits <= available_bits,
            ShortBufferSnafu {
                column: &col.name,
                needed_bits,
                available_bits,
            }
        );
        ensure!(
            col.pending_count.checked_add(count).is_some(),
            CorruptColumnSnafu {
                column: &col.name,
                msg: "cell exceeds u32::MAX elements",
            }
        );

        col.pending.push_bits(data, u64::from(bit_offset), nbits);
        col.pending_count += count;
        self.state = WriteState::RowOpen { written: true };
        Ok(())
    }

    /// Make the open row's cells part of the column.
    ///
    /// Columns not written in this row get an empty cell.
    pub fn commit_row(&mut self) -> StoreResult<()> {
        self.check_state("commit row", matches!(self.state, WriteState::RowOpen { .. }))?;
        for col in &mut self.columns {
            let Some((data, idx)) = col.streams.as_mut() else {
                return CursorStateSnafu {
                    op: "commit row",
                    state: "not open",
                }
                .fail();
            };
            let rec = IndexRecord {
                bit_offset: data.position(),
                count: col.pending_count,
            };
            data.append(&col.pending)?;
            idx.write_all(&rec.encode()).context(StorageSnafu)?;
            col.pending.clear();
            col.pending_count = 0;
        }
        self.rows += 1;
        self.state = WriteState::RowCommitted;
        Ok(())
    }

    /// Finish the current row. An open row with no writes is discarded.
    pub fn close_row(&mut self) -> StoreResult<()> {
        self.check_state(
            "close row",
            matches!(
                self.state,
                WriteState::RowCommitted | WriteState::RowOpen { written: false }
            ),
        )?;
        self.state = WriteState::Ready;
        Ok(())
    }

    /// Number of committed rows.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Publish every column: payload and index first, descriptor last.
    pub fn commit(&mut self) -> StoreResult<()> {
        self.check_state("commit", self.state == WriteState::Ready)?;
        for col in &mut self.columns {
            let Some((data, idx)) = col.streams.take() else {
                continue;
            };
            data.finish(self.sync)?;
            idx.finish(self.sync).context(StorageSnafu)?;

            let desc = ColumnDesc {
                name: col.name.clone(),
                type_name: col.type_name.clone(),
                elem_bits: col.elem_bits,
                first_row: self.first_row,
            };
            let json = serde_json::to_vec_pretty(&desc).map_err(|e| {
                crate::store::StoreError::CorruptColumn {
                    column: col.name.clone(),
                    msg: format!("descriptor: {e}"),
                }
            })?;
            storage::write_atomic(
                &self.location,
                Path::new(&layout::column_desc_rel_path(&col.name)),
                &json,
                self.sync,
            )
            .context(StorageSnafu)?;
        }
        self.state = WriteState::Committed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaInfo;
    use crate::store::{Manager, StoreError, Table};
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const SCHEMA: &str = "\
typedef U8 flag;
table t:reads { column flag F; column U32 LEN; column B1 BITS; };
";

    fn new_table(tmp: &TempDir) -> StoreResult<Table> {
        Manager::new().with_sync(false).create_table(
            &StorageLocation::local(tmp.path().join("t")),
            &SchemaInfo {
                type_name: "t:reads".to_string(),
                text: SCHEMA.to_string(),
            },
        )
    }

    #[test]
    fn cells_round_trip_with_first_row() -> TestResult {
        let tmp = TempDir::new()?;
        let mut table = new_table(&tmp)?;

        let mut w = table.write_cursor()?;
        let f = w.add_column("F")?;
        let len = w.add_column("LEN")?;
        w.set_first_row(10)?;
        w.open()?;
        for (flags, n) in [(&[0u8, 1][..], 2u32), (&[][..], 0), (&[3], 1)] {
            assert_eq!(w.open_row()?, 10 + w.rows() as i64);
            w.write(f, 8, flags, 0, flags.len() as u32)?;
            w.write(len, 32, &n.to_le_bytes(), 0, 1)?;
            w.commit_row()?;
            w.close_row()?;
        }
        w.commit()?;

        let mut r = table.read_cursor()?;
        let f = r.add_column("(U8)F")?;
        r.open()?;
        assert_eq!(r.id_range(f)?, (10, 3));
        assert_eq!(r.cell_data(10, f)?.bytes(), &[0, 1]);
        assert_eq!(r.cell_data(11, f)?.count, 0);
        assert_eq!(r.cell_data(12, f)?.bytes(), &[3]);

        let err = r.cell_data(13, f).expect_err("past end");
        assert!(matches!(err, StoreError::RowOutOfRange { .. }));
        let err = r.cell_data(9, f).expect_err("before start");
        assert!(matches!(err, StoreError::RowOutOfRange { .. }));
        Ok(())
    }

    #[test]
    fn bit_columns_pack_across_rows() -> TestResult {
        let tmp = TempDir::new()?;
        let mut table = new_table(&tmp)?;

        let mut w = table.write_cursor()?;
        let b = w.add_column("BITS")?;
        w.open()?;
        for bits in [0b1010_0000u8, 0b1100_0000] {
            w.open_row()?;
            w.write(b, 1, &[bits], 0, 3)?;
            w.commit_row()?;
            w.close_row()?;
        }
        w.commit()?;

        let mut r = table.read_cursor()?;
        let b = r.add_column("BITS")?;
        r.open()?;
        let second = r.cell_data(2, b)?;
        assert_eq!(second.bit_offset, 3);
        assert!(!second.is_byte_aligned());
        assert_eq!(second.data, &[0b1011_1000]);
        Ok(())
    }

    #[test]
    fn lifecycle_violations_are_cursor_faults() -> TestResult {
        let tmp = TempDir::new()?;
        let mut table = new_table(&tmp)?;
        let mut w = table.write_cursor()?;
        let f = w.add_column("F")?;

        assert!(matches!(w.open_row(), Err(StoreError::CursorState { .. })));
        w.open()?;
        assert!(matches!(
            w.write(f, 8, &[0], 0, 1),
            Err(StoreError::CursorState { .. })
        ));

        w.open_row()?;
        w.write(f, 8, &[0], 0, 1)?;
        assert!(matches!(w.close_row(), Err(StoreError::CursorState { .. })));
        w.commit_row()?;
        assert!(matches!(w.commit_row(), Err(StoreError::CursorState { .. })));
        w.close_row()?;

        w.commit()?;
        assert!(matches!(w.commit(), Err(StoreError::CursorState { .. })));
        Ok(())
    }

    #[test]
    fn write_checks_width_and_buffer() -> TestResult {
        let tmp = TempDir::new()?;
        let mut table = new_table(&tmp)?;
        let mut w = table.write_cursor()?;
        let f = w.add_column("F")?;
        w.open()?;
        w.open_row()?;

        let err = w.write(f, 16, &[0, 0], 0, 1).expect_err("width");
        assert!(matches!(err, StoreError::ElementWidth { .. }));
        let err = w.write(f, 8, &[0], 0, 2).expect_err("short");
        assert!(matches!(err, StoreError::ShortBuffer { .. }));
        Ok(())
    }

    #[test]
    fn add_column_checks_declarations_and_existing_columns() -> TestResult {
        let tmp = TempDir::new()?;
        let mut table = new_table(&tmp)?;

        let mut w = table.write_cursor()?;
        assert!(matches!(
            w.add_column("OTHER"),
            Err(StoreError::UndeclaredColumn { .. })
        ));
        assert!(matches!(
            w.add_column("(U16)F"),
            Err(StoreError::TypeMismatch { .. })
        ));
        w.add_column("(U16)OTHER")?;
        let f = w.add_column("F")?;
        w.open()?;
        w.open_row()?;
        w.write(f, 8, &[1], 0, 1)?;
        w.commit_row()?;
        w.close_row()?;
        w.commit()?;

        let mut again = table.write_cursor()?;
        assert!(matches!(
            again.add_column("F"),
            Err(StoreError::ColumnExists { .. })
        ));

        let mut r = table.read_cursor()?;
        assert!(matches!(
            r.add_column("(U32)F"),
            Err(StoreError::TypeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn dropped_cursor_publishes_nothing() -> TestResult {
        let tmp = TempDir::new()?;
        let mut table = new_table(&tmp)?;
        {
            let mut w = table.write_cursor()?;
            let f = w.add_column("F")?;
            w.open()?;
            w.open_row()?;
            w.write(f, 8, &[1], 0, 1)?;
            w.commit_row()?;
        }
        assert!(table.columns()?.is_empty());
        Ok(())
    }
}
