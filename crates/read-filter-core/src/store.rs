//! Column store: tables, databases, columns, and cursors.
//!
//! A [`Manager`] is the session object every storage operation goes
//! through; it carries the options shared by the handles it opens (for
//! example whether commits fsync) and holds no process-wide state, so any
//! number of independent managers can coexist.
//!
//! - [`Table`]: ordered set of uniquely named columns addressed by row id.
//! - [`Database`]: container of named member tables plus its own metadata.
//! - [`ReadCursor`] / [`WriteCursor`]: row-by-row access with an explicit
//!   open → (open row, write, commit row, close row)* → commit lifecycle.

mod column;
mod cursor;
mod database;
mod manager;
mod table;

pub use column::{CellData, ColumnDesc, ColumnId, ColumnSpec};
pub use cursor::{ReadCursor, RowOp, WriteCursor};
pub use database::Database;
pub use manager::{Manager, PathType};
pub use table::Table;

use snafu::{Backtrace, prelude::*};

use crate::{metadata::MetadataError, schema::SchemaError, storage::StorageError};

/// Result alias for column store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the column store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// Storage failure underneath a store operation.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// Metadata failure underneath a store operation.
    #[snafu(display("Metadata error: {source}"))]
    Metadata {
        /// Underlying metadata error.
        #[snafu(backtrace)]
        source: MetadataError,
    },

    /// The object's schema text could not be used.
    #[snafu(display("Schema error at {path}: {source}"))]
    Schema {
        /// Object root carrying the schema.
        path: String,
        /// Underlying schema error.
        source: SchemaError,
    },

    /// The `schema` node value is not UTF-8 text.
    #[snafu(display("Schema text at {path} is not valid UTF-8"))]
    SchemaText {
        /// Object root carrying the schema.
        path: String,
        /// Underlying decode error.
        source: std::string::FromUtf8Error,
    },

    /// The path does not hold the expected kind of object.
    #[snafu(display("{path} is not a {expected} (found {found:?})"))]
    WrongKind {
        /// Inspected path.
        path: String,
        /// Kind the caller asked for.
        expected: &'static str,
        /// Kind actually found.
        found: PathType,
    },

    /// Creation was requested where something already exists.
    #[snafu(display("Object already exists at {path}"))]
    AlreadyExists {
        /// Occupied path.
        path: String,
    },

    /// A database has no member table with this name.
    #[snafu(display("Database {database} has no table {table}"))]
    TableNotFound {
        /// Database root.
        database: String,
        /// Requested table.
        table: String,
    },

    /// A table has no column with this name.
    #[snafu(display("Table {table} has no column {column}"))]
    ColumnNotFound {
        /// Table root.
        table: String,
        /// Requested column.
        column: String,
    },

    /// A column with this name already exists.
    #[snafu(display("Table {table} already has column {column}"))]
    ColumnExists {
        /// Table root.
        table: String,
        /// Existing column.
        column: String,
    },

    /// A table or column name cannot be used as a path component.
    #[snafu(display("Invalid object name {name:?}"))]
    InvalidName {
        /// Rejected name.
        name: String,
    },

    /// A column spec is not `NAME` or `(type)NAME`.
    #[snafu(display("Invalid column spec {spec:?}"))]
    InvalidColumnSpec {
        /// Rejected spec.
        spec: String,
    },

    /// The requested column type does not match the stored one.
    #[snafu(display("Column {column} has type {stored} ({stored_bits} bits), requested {requested}"))]
    TypeMismatch {
        /// Column name.
        column: String,
        /// Stored type name.
        stored: String,
        /// Stored element width.
        stored_bits: u32,
        /// Requested type name.
        requested: String,
    },

    /// A write named no type and the schema does not declare the column.
    #[snafu(display("Column {column} is not declared by the schema of {table}"))]
    UndeclaredColumn {
        /// Table root.
        table: String,
        /// Column name.
        column: String,
    },

    /// An update was attempted through a read-only handle.
    #[snafu(display("{path} is open read-only"))]
    ReadOnly {
        /// Object root.
        path: String,
    },

    /// A cursor operation was issued in the wrong lifecycle state.
    #[snafu(display("Cursor cannot {op} while {state}"))]
    CursorState {
        /// Attempted operation.
        op: &'static str,
        /// Current lifecycle state.
        state: &'static str,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A column id not returned by this cursor's `add_column`.
    #[snafu(display("Unknown column id {cid}"))]
    UnknownColumnId {
        /// Offending id.
        cid: ColumnId,
    },

    /// The row id lies outside the column's id range.
    #[snafu(display("Row {row} outside {column} id range [{first}, {first}+{count})"))]
    RowOutOfRange {
        /// Column name.
        column: String,
        /// Requested row.
        row: i64,
        /// First row id.
        first: i64,
        /// Number of rows.
        count: u64,
    },

    /// The written element width differs from the column's.
    #[snafu(display("Column {column} stores {expected}-bit elements, write used {actual}"))]
    ElementWidth {
        /// Column name.
        column: String,
        /// Column element width.
        expected: u32,
        /// Width passed to `write`.
        actual: u32,
    },

    /// The write buffer is shorter than the declared element count.
    #[snafu(display("Write to {column} needs {needed_bits} bits but buffer has {available_bits}"))]
    ShortBuffer {
        /// Column name.
        column: String,
        /// Bits the write covers.
        needed_bits: u64,
        /// Bits the buffer holds.
        available_bits: u64,
    },

    /// Column files are inconsistent with each other.
    #[snafu(display("Corrupt column {column}: {msg}"))]
    CorruptColumn {
        /// Column name.
        column: String,
        /// What is inconsistent.
        msg: String,
    },
}
