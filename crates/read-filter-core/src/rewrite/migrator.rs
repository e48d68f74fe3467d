//! Metadata migration and destination cleanup.

use log::debug;
use snafu::prelude::*;

use crate::metadata::Metadata;
use crate::rewrite::error::{
    DropColumnSnafu, MetadataNodeSnafu, ReadSchemaSnafu, RewriteResult, SchemaMismatchSnafu,
};
use crate::schema::SchemaInfo;
use crate::storage::StorageLocation;
use crate::store::{StoreError, Table};

/// The metadata node holding schema text; never migrated by default.
const SCHEMA_NODE: &str = "schema";

/// Drop any pre-existing `column` in `dest`. Absence is not an error.
///
/// Returns whether a column was dropped.
pub(crate) fn drop_stale_column(dest: &mut Table, column: &str) -> RewriteResult<bool> {
    match dest.drop_column(column) {
        Ok(()) => {
            debug!("dropped stale column {column}");
            Ok(true)
        }
        Err(StoreError::ColumnNotFound { .. }) => Ok(false),
        Err(e) => Err(e).context(DropColumnSnafu { column }),
    }
}

/// Top-level nodes of `src` to migrate.
fn selected_nodes(src: &Metadata, explicit: Option<&[String]>) -> Vec<String> {
    match explicit {
        Some(nodes) => nodes.to_vec(),
        None => src
            .root()
            .children()
            .map(|(name, _)| name)
            .filter(|name| *name != SCHEMA_NODE)
            .map(str::to_string)
            .collect(),
    }
}

/// Copy metadata nodes node-for-node from `src` into `dst`.
///
/// With an explicit list every named node must exist in the source.
/// Returns the number of nodes written.
pub(crate) fn copy_metadata(
    src_location: &StorageLocation,
    src: &Metadata,
    dst: &mut Metadata,
    explicit: Option<&[String]>,
) -> RewriteResult<usize> {
    let path = src_location.display();
    let mut copied = 0;
    for node in selected_nodes(src, explicit) {
        let from = src.open_node(&node).context(MetadataNodeSnafu {
            path: &path,
            node: &node,
        })?;
        let to = dst.open_node_update(&node).context(MetadataNodeSnafu {
            path: &path,
            node: &node,
        })?;
        copied += to.copy_from(from);
        debug!("migrated metadata node {node}");
    }
    Ok(copied)
}

/// Check that the staged object carries the schema recovered from the
/// source.
pub(crate) fn validate_schema(
    location: &StorageLocation,
    staged: Result<SchemaInfo, StoreError>,
    expected: &SchemaInfo,
) -> RewriteResult<()> {
    let found = staged.context(ReadSchemaSnafu {
        path: location.display(),
    })?;
    ensure!(
        found.type_name == expected.type_name && found.text == expected.text,
        SchemaMismatchSnafu {
            expected: &expected.type_name,
            found: found.type_name,
        }
    );
    Ok(())
}
