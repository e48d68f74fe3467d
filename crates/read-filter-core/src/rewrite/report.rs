//! Summary of a completed rewrite.

use std::fmt;
use std::path::PathBuf;

use crate::rewrite::SourceKind;

/// What a successful rewrite did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteReport {
    /// Rewritten path.
    pub target: PathBuf,
    /// Whether the target is a table or a database.
    pub kind: SourceKind,
    /// Schema type name shared by input and output.
    pub schema_type: String,
    /// Rows written to the output column.
    pub rows: u64,
    /// Reads across all rows.
    pub reads: u64,
    /// Reads whose filter byte changed.
    pub changed_reads: u64,
    /// Columns copied verbatim.
    pub copied_columns: Vec<String>,
    /// Sibling tables copied verbatim (database targets only).
    pub copied_tables: Vec<String>,
    /// Bytes copied without decoding.
    pub copied_bytes: u64,
    /// Metadata nodes migrated.
    pub metadata_nodes: usize,
}

impl fmt::Display for RewriteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {}): {} rows, {} reads, {} changed; copied {} column(s)",
            self.target.display(),
            self.kind,
            self.schema_type,
            self.rows,
            self.reads,
            self.changed_reads,
            self.copied_columns.len()
        )?;
        if !self.copied_tables.is_empty() {
            write!(f, " and {} table(s)", self.copied_tables.len())?;
        }
        Ok(())
    }
}
