//! Error types and SNAFU context selectors for the rewrite engine.
//!
//! Every variant belongs to exactly one [`FaultCategory`]; front ends map
//! that category to a stable [`ExitStatus`] instead of matching variants.

use std::collections::TryReserveError;
use std::fmt;

use snafu::prelude::*;

use crate::metadata::MetadataError;
use crate::storage::StorageError;
use crate::store::{PathType, RowOp, StoreError};

/// Result alias for rewrite operations.
pub type RewriteResult<T> = Result<T, RewriteError>;

/// Class of a fatal rewrite failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultCategory {
    /// The target could not be opened as a table or database, or the
    /// staging area could not be set up.
    Setup,
    /// Schema text or metadata is missing, unparsable, or inconsistent.
    Schema,
    /// A required column or cursor could not be added or opened.
    Column,
    /// A cell read or write, or a row lifecycle step, failed.
    Row,
    /// Physical copy of storage or the final swap failed.
    Copy,
    /// Memory could not be allocated.
    Resource,
    /// The configuration or the injected predicate is defective.
    Config,
}

impl FaultCategory {
    /// Exit status a process should terminate with for this category.
    pub fn exit_status(self) -> ExitStatus {
        match self {
            FaultCategory::Setup | FaultCategory::Column => ExitStatus::InputData,
            FaultCategory::Schema | FaultCategory::Config => ExitStatus::Software,
            FaultCategory::Row | FaultCategory::Copy => ExitStatus::Io,
            FaultCategory::Resource => ExitStatus::Resource,
        }
    }
}

impl fmt::Display for FaultCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FaultCategory::Setup => "setup",
            FaultCategory::Schema => "schema",
            FaultCategory::Column => "column",
            FaultCategory::Row => "row",
            FaultCategory::Copy => "copy",
            FaultCategory::Resource => "resource",
            FaultCategory::Config => "config",
        })
    }
}

/// Stable process exit statuses (sysexits values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// The rewrite completed.
    Success,
    /// Bad or missing input data.
    InputData,
    /// Software or configuration defect.
    Software,
    /// Low-level I/O failure.
    Io,
    /// Resource exhaustion.
    Resource,
}

impl ExitStatus {
    /// Numeric process exit code.
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::InputData => 65,
            ExitStatus::Software => 70,
            ExitStatus::Io => 74,
            ExitStatus::Resource => 75,
        }
    }
}

/// Fatal errors raised while rewriting a filter column.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RewriteError {
    /// The target is neither a table nor a database.
    #[snafu(display("{path} is not a table or database (found {found:?})"))]
    UnsupportedPath {
        /// Target path.
        path: String,
        /// What the path holds.
        found: PathType,
    },

    /// Opening a table, database, or member table failed.
    #[snafu(display("Failed to open {path}: {source}"))]
    Open {
        /// Object being opened.
        path: String,
        /// Underlying store error.
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    /// The staging directory could not be created.
    #[snafu(display("Failed to create staging directory next to {path}: {source}"))]
    CreateStaging {
        /// Target path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The staged output object could not be created.
    #[snafu(display("Failed to create output object at {path}: {source}"))]
    CreateOutput {
        /// Staged object path.
        path: String,
        /// Underlying store error.
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    /// Schema text or type name could not be recovered or parsed.
    #[snafu(display("Failed to read schema of {path}: {source}"))]
    ReadSchema {
        /// Object carrying the schema.
        path: String,
        /// Underlying store error.
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    /// A metadata node could not be read or written.
    #[snafu(display("Metadata node {node} of {path}: {source}"))]
    MetadataNode {
        /// Object the node belongs to.
        path: String,
        /// Node path.
        node: String,
        /// Underlying metadata error.
        source: MetadataError,
    },

    /// The schema type name does not name an object of the expected kind.
    #[snafu(display("Schema of {path} declares no {kind} type {type_name}"))]
    SchemaKind {
        /// Object carrying the schema.
        path: String,
        /// `table` or `database`.
        kind: &'static str,
        /// Type name from the `name` attribute.
        type_name: String,
    },

    /// The staged object's schema differs from the source's.
    #[snafu(display("Output schema type {found} does not match input schema type {expected}"))]
    SchemaMismatch {
        /// Source schema type.
        expected: String,
        /// Staged schema type.
        found: String,
    },

    /// A column needed for recomputation is missing or unusable.
    #[snafu(display("Failed to add column {column}: {source}"))]
    AddColumn {
        /// Column spec.
        column: String,
        /// Underlying store error.
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    /// A cursor could not be created or opened.
    #[snafu(display("Failed to open cursor on {table}: {source}"))]
    OpenCursor {
        /// Table root.
        table: String,
        /// Underlying store error.
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    /// The existing filter column does not hold byte elements.
    #[snafu(display("Filter column {column} has {elem_bits}-bit elements, expected 8"))]
    FilterWidth {
        /// Column name.
        column: String,
        /// Element width found.
        elem_bits: u32,
    },

    /// A configured copy column does not exist in the source.
    #[snafu(display("Column {column} to copy does not exist in {table}"))]
    MissingCopyColumn {
        /// Table root.
        table: String,
        /// Column name.
        column: String,
    },

    /// A stale output column could not be dropped.
    #[snafu(display("Failed to drop column {column}: {source}"))]
    DropColumn {
        /// Column name.
        column: String,
        /// Underlying store error.
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    /// A cursor operation on one row failed.
    #[snafu(display("Row {row}: {op} on column {column} failed: {source}"))]
    Row {
        /// Operation in progress.
        op: RowOp,
        /// Row id.
        row: i64,
        /// Column name.
        column: String,
        /// Underlying store error.
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    /// A cell is not a byte-aligned run of whole-byte elements.
    #[snafu(display(
        "Row {row}: cell of column {column} is malformed (bit offset {bit_offset}, {elem_bits}-bit elements)"
    ))]
    MalformedCell {
        /// Column name.
        column: String,
        /// Row id.
        row: i64,
        /// Bit offset reported for the cell.
        bit_offset: u32,
        /// Element width reported for the cell.
        elem_bits: u32,
    },

    /// The existing filter cell does not hold one byte per read.
    #[snafu(display("Row {row}: filter cell has {filter_len} entries for {reads} reads"))]
    FilterLength {
        /// Row id.
        row: i64,
        /// Read count for the row.
        reads: u32,
        /// Entries in the existing filter cell.
        filter_len: u32,
    },

    /// The two source columns report different row id ranges.
    #[snafu(display(
        "Column {column} covers rows [{first}, {first}+{count}) but the filter column covers [{filter_first}, {filter_first}+{filter_count})"
    ))]
    RowRange {
        /// Column whose range disagrees.
        column: String,
        /// Its first row id.
        first: i64,
        /// Its row count.
        count: u64,
        /// First row id of the filter column.
        filter_first: i64,
        /// Row count of the filter column.
        filter_count: u64,
    },

    /// The final cursor commit failed.
    #[snafu(display("Failed to commit column {column}: {source}"))]
    CommitCursor {
        /// Column name.
        column: String,
        /// Underlying store error.
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    /// Committing migrated metadata failed.
    #[snafu(display("Failed to commit metadata of {path}: {source}"))]
    CommitMetadata {
        /// Object root.
        path: String,
        /// Underlying store error.
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    /// Physical copy of a column or member table failed.
    #[snafu(display("Failed to copy {what} {name}: {source}"))]
    Copy {
        /// `column` or `table`.
        what: &'static str,
        /// Name of the copied object.
        name: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// Replacing the target with the staged object failed.
    #[snafu(display("Failed to replace {path} with the staged output: {source}"))]
    Swap {
        /// Target path.
        path: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// A buffer could not be grown.
    #[snafu(display("Failed to allocate {requested} bytes for {what}: {source}"))]
    Allocation {
        /// Buffer being grown.
        what: &'static str,
        /// Requested size in bytes.
        requested: usize,
        /// Underlying allocation error.
        source: TryReserveError,
    },

    /// The configuration is inconsistent.
    #[snafu(display("Invalid configuration: {msg}"))]
    InvalidConfig {
        /// What is wrong.
        msg: String,
    },

    /// A JSON configuration could not be decoded.
    #[snafu(display("Failed to parse configuration: {source}"))]
    ParseConfig {
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The predicate relaxed a reject-class read back to pass.
    #[snafu(display(
        "Predicate is not monotonic: row {row} read {read} went from {before} to pass"
    ))]
    NonMonotonic {
        /// Row id.
        row: i64,
        /// Read index within the row.
        read: u32,
        /// Existing reject-class byte.
        before: u8,
    },
}

impl RewriteError {
    /// The fault category this error belongs to.
    pub fn category(&self) -> FaultCategory {
        match self {
            RewriteError::UnsupportedPath { .. }
            | RewriteError::Open { .. }
            | RewriteError::CreateStaging { .. }
            | RewriteError::CreateOutput { .. } => FaultCategory::Setup,

            RewriteError::ReadSchema { .. }
            | RewriteError::MetadataNode { .. }
            | RewriteError::SchemaKind { .. }
            | RewriteError::SchemaMismatch { .. } => FaultCategory::Schema,

            RewriteError::AddColumn { .. }
            | RewriteError::OpenCursor { .. }
            | RewriteError::FilterWidth { .. }
            | RewriteError::MissingCopyColumn { .. }
            | RewriteError::DropColumn { .. } => FaultCategory::Column,

            RewriteError::Row { .. }
            | RewriteError::MalformedCell { .. }
            | RewriteError::FilterLength { .. }
            | RewriteError::RowRange { .. }
            | RewriteError::CommitCursor { .. } => FaultCategory::Row,

            RewriteError::CommitMetadata { .. }
            | RewriteError::Copy { .. }
            | RewriteError::Swap { .. } => FaultCategory::Copy,

            RewriteError::Allocation { .. } => FaultCategory::Resource,

            RewriteError::InvalidConfig { .. }
            | RewriteError::ParseConfig { .. }
            | RewriteError::NonMonotonic { .. } => FaultCategory::Config,
        }
    }

    /// Shortcut for `self.category().exit_status()`.
    pub fn exit_status(&self) -> ExitStatus {
        self.category().exit_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_to_distinct_stable_codes() {
        assert_eq!(FaultCategory::Setup.exit_status().code(), 65);
        assert_eq!(FaultCategory::Column.exit_status().code(), 65);
        assert_eq!(FaultCategory::Schema.exit_status().code(), 70);
        assert_eq!(FaultCategory::Config.exit_status().code(), 70);
        assert_eq!(FaultCategory::Row.exit_status().code(), 74);
        assert_eq!(FaultCategory::Copy.exit_status().code(), 74);
        assert_eq!(FaultCategory::Resource.exit_status().code(), 75);
        assert_eq!(ExitStatus::Success.code(), 0);
    }

    #[test]
    fn allocation_failure_is_a_resource_fault() {
        let mut v: Vec<u8> = Vec::new();
        let source = v.try_reserve(usize::MAX).expect_err("cannot reserve usize::MAX");
        let err = RewriteError::Allocation {
            what: "filter buffer",
            requested: usize::MAX,
            source,
        };
        assert_eq!(err.category(), FaultCategory::Resource);
        assert_eq!(err.exit_status(), ExitStatus::Resource);
    }

    #[test]
    fn unsupported_path_is_an_input_data_fault() {
        let err = RewriteError::UnsupportedPath {
            path: "/x".to_string(),
            found: PathType::Directory,
        };
        assert_eq!(err.exit_status(), ExitStatus::InputData);
        assert!(err.to_string().contains("/x"));
    }
}
