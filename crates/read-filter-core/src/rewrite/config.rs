//! Rewrite configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::rewrite::error::{InvalidConfigSnafu, ParseConfigSnafu, RewriteResult};
use crate::storage::layout::is_valid_object_name;

/// Canonical reads table inside a database.
pub const DEFAULT_READS_TABLE: &str = "SEQUENCE";
/// Existing filter column.
pub const DEFAULT_FILTER_COLUMN: &str = "READ_FILTER";
/// Column whose per-row element count is the row's read count.
pub const DEFAULT_READ_COUNT_COLUMN: &str = "READ_LEN";
/// Recomputed filter column.
pub const DEFAULT_OUTPUT_COLUMN: &str = "READ_FILTER";

fn default_reads_table() -> String {
    DEFAULT_READS_TABLE.to_string()
}

fn default_filter_column() -> String {
    DEFAULT_FILTER_COLUMN.to_string()
}

fn default_read_count_column() -> String {
    DEFAULT_READ_COUNT_COLUMN.to_string()
}

fn default_output_column() -> String {
    DEFAULT_OUTPUT_COLUMN.to_string()
}

fn default_fsync() -> bool {
    true
}

/// What to rewrite and how.
///
/// Deserialises from JSON; every field except `target` has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteConfig {
    /// Table or database to rewrite in place.
    pub target: PathBuf,

    /// Reads table inside a database target.
    #[serde(default = "default_reads_table")]
    pub reads_table: String,

    /// Existing filter column read from the source.
    #[serde(default = "default_filter_column")]
    pub filter_column: String,

    /// Column whose per-row element count is the row's read count.
    #[serde(default = "default_read_count_column")]
    pub read_count_column: String,

    /// Recomputed filter column written to the output.
    #[serde(default = "default_output_column")]
    pub output_column: String,

    /// Columns copied verbatim. `None` copies every source column except
    /// `output_column`. `read_count_column`, and `filter_column` when it is
    /// not the output, are copied either way.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_columns: Option<Vec<String>>,

    /// Top-level metadata nodes migrated to the output. `None` migrates
    /// every node except `schema`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_nodes: Option<Vec<String>>,

    /// Whether committed files are fsynced.
    #[serde(default = "default_fsync")]
    pub fsync: bool,
}

impl RewriteConfig {
    /// A configuration with every default applied.
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            reads_table: default_reads_table(),
            filter_column: default_filter_column(),
            read_count_column: default_read_count_column(),
            output_column: default_output_column(),
            copy_columns: None,
            metadata_nodes: None,
            fsync: default_fsync(),
        }
    }

    /// Decode a JSON configuration.
    pub fn from_json(text: &str) -> RewriteResult<Self> {
        serde_json::from_str(text).context(ParseConfigSnafu)
    }

    /// Set the output column.
    pub fn with_output_column(mut self, name: impl Into<String>) -> Self {
        self.output_column = name.into();
        self
    }

    /// Set an explicit copy set.
    pub fn with_copy_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.copy_columns = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Set an explicit list of metadata nodes to migrate.
    pub fn with_metadata_nodes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata_nodes = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Set whether commits fsync.
    pub fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    /// The target path.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Check that the configuration is internally consistent.
    pub fn validate(&self) -> RewriteResult<()> {
        ensure!(
            !self.target.as_os_str().is_empty(),
            InvalidConfigSnafu {
                msg: "target path is empty"
            }
        );
        ensure!(
            self.target.file_name().is_some(),
            InvalidConfigSnafu {
                msg: format!("target {} has no final path component", self.target.display())
            }
        );

        for (what, name) in [
            ("reads table", &self.reads_table),
            ("filter column", &self.filter_column),
            ("read count column", &self.read_count_column),
            ("output column", &self.output_column),
        ] {
            ensure!(
                is_valid_object_name(name),
                InvalidConfigSnafu {
                    msg: format!("{what} name {name:?} is not valid")
                }
            );
        }

        ensure!(
            self.read_count_column != self.output_column,
            InvalidConfigSnafu {
                msg: format!(
                    "read count column and output column are both {}",
                    self.output_column
                )
            }
        );

        if let Some(copy) = &self.copy_columns {
            for name in copy {
                ensure!(
                    is_valid_object_name(name),
                    InvalidConfigSnafu {
                        msg: format!("copy column name {name:?} is not valid")
                    }
                );
                ensure!(
                    *name != self.output_column,
                    InvalidConfigSnafu {
                        msg: format!("output column {name} cannot also be copied")
                    }
                );
            }
        }

        if let Some(nodes) = &self.metadata_nodes {
            for node in nodes {
                ensure!(
                    !node.is_empty() && !node.split('/').any(str::is_empty),
                    InvalidConfigSnafu {
                        msg: format!("metadata node path {node:?} is not valid")
                    }
                );
            }
        }
        Ok(())
    }
}
