//! Classify the target and recover its schema.

use std::fmt;

use log::{debug, info};
use snafu::prelude::*;

use crate::metadata::{MetaNode, Metadata, MetadataError};
use crate::rewrite::config::RewriteConfig;
use crate::rewrite::error::{
    AllocationSnafu, MetadataNodeSnafu, OpenSnafu, ReadSchemaSnafu, RewriteResult,
    SchemaKindSnafu, UnsupportedPathSnafu,
};
use crate::schema::{Schema, SchemaInfo};
use crate::storage::StorageLocation;
use crate::store::{Database, Manager, PathType, StoreError, Table};

/// What kind of object the target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A bare table.
    Table,
    /// A database holding the reads table.
    Database,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Table => "table",
            SourceKind::Database => "database",
        })
    }
}

/// The opened, read-only source.
#[derive(Debug)]
pub(crate) struct ResolvedSource {
    pub kind: SourceKind,
    /// The reads table (the target itself for a bare table).
    pub table: Table,
    /// The target database, when the target is one.
    pub database: Option<Database>,
    /// Schema of the target object.
    pub schema: SchemaInfo,
    /// The reads table's own schema node. Same as `schema` for a bare table.
    pub table_schema: SchemaInfo,
}

/// Open `location` read-only and recover its schema.
pub(crate) fn resolve(
    manager: &Manager,
    location: &StorageLocation,
    cfg: &RewriteConfig,
) -> RewriteResult<ResolvedSource> {
    let path = location.display();
    let found = manager.path_type(location).context(OpenSnafu { path: &path })?;

    let resolved = match found {
        PathType::Table => {
            let table = manager
                .open_table_read(location)
                .context(OpenSnafu { path: &path })?;
            let schema = read_schema(location, table.metadata())?;
            check_kind(location, &schema, SourceKind::Table)?;
            ResolvedSource {
                kind: SourceKind::Table,
                table,
                database: None,
                table_schema: schema.clone(),
                schema,
            }
        }
        PathType::Database => {
            let database = manager
                .open_database_read(location)
                .context(OpenSnafu { path: &path })?;
            let schema = read_schema(location, database.metadata())?;
            check_kind(location, &schema, SourceKind::Database)?;
            let table = database.open_table(&cfg.reads_table).context(OpenSnafu {
                path: database.table_location(&cfg.reads_table).display(),
            })?;
            let table_schema = read_schema(table.location(), table.metadata())?;
            ResolvedSource {
                kind: SourceKind::Database,
                table,
                database: Some(database),
                schema,
                table_schema,
            }
        }
        other => return UnsupportedPathSnafu { path, found: other }.fail(),
    };

    info!("Schema type is {}", resolved.schema.type_name);
    debug!("{path} is a {}", resolved.kind);
    Ok(resolved)
}

/// Recover `schema` node text and its `name` attribute.
fn read_schema(location: &StorageLocation, md: &Metadata) -> RewriteResult<SchemaInfo> {
    let path = location.display();
    let node = md.open_node("schema").context(MetadataNodeSnafu {
        path: &path,
        node: "schema",
    })?;

    let text = String::from_utf8(node.value().to_vec())
        .map_err(|source| StoreError::SchemaText {
            path: path.clone(),
            source,
        })
        .context(ReadSchemaSnafu { path: &path })?;
    Schema::parse(&text)
        .map_err(|source| StoreError::Schema {
            path: path.clone(),
            source,
        })
        .context(ReadSchemaSnafu { path: &path })?;

    let type_name = read_name_attr(&path, node)?;
    Ok(SchemaInfo { type_name, text })
}

/// Read the `name` attribute with a size probe followed by a sized read.
fn read_name_attr(path: &str, node: &MetaNode) -> RewriteResult<String> {
    let required = match node.read_attr("name", &mut []) {
        Ok(_) => 0,
        Err(MetadataError::BufferInsufficient { required }) => required,
        Err(source) => {
            return Err(source).context(MetadataNodeSnafu {
                path,
                node: "schema",
            });
        }
    };

    let mut buf = Vec::new();
    buf.try_reserve_exact(required).context(AllocationSnafu {
        what: "schema type name",
        requested: required,
    })?;
    buf.resize(required, 0);
    let len = node.read_attr("name", &mut buf).context(MetadataNodeSnafu {
        path,
        node: "schema",
    })?;
    buf.truncate(len);

    String::from_utf8(buf)
        .map_err(|source| StoreError::SchemaText {
            path: path.to_string(),
            source,
        })
        .context(ReadSchemaSnafu { path })
}

fn check_kind(
    location: &StorageLocation,
    info: &SchemaInfo,
    kind: SourceKind,
) -> RewriteResult<()> {
    let path = location.display();
    let schema = Schema::parse(&info.text)
        .map_err(|source| StoreError::Schema {
            path: path.clone(),
            source,
        })
        .context(ReadSchemaSnafu { path: &path })?;
    let declared = match kind {
        SourceKind::Table => schema.table(&info.type_name).is_some(),
        SourceKind::Database => schema.database(&info.type_name).is_some(),
    };
    ensure!(
        declared,
        SchemaKindSnafu {
            path,
            kind: match kind {
                SourceKind::Table => "table",
                SourceKind::Database => "database",
            },
            type_name: &info.type_name,
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::error::{FaultCategory, RewriteError};
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const SCHEMA: &str = "\
table t:reads { column U8 READ_FILTER; column U32 READ_LEN; };
database t:db { table t:reads SEQUENCE; };
";

    fn info(type_name: &str) -> SchemaInfo {
        SchemaInfo {
            type_name: type_name.to_string(),
            text: SCHEMA.to_string(),
        }
    }

    #[test]
    fn bare_table_resolves_with_its_own_schema() -> TestResult {
        let tmp = TempDir::new()?;
        let loc = StorageLocation::local(tmp.path().join("t"));
        let mgr = Manager::new().with_sync(false);
        mgr.create_table(&loc, &info("t:reads"))?;

        let src = resolve(&mgr, &loc, &RewriteConfig::new(loc.root()))?;
        assert_eq!(src.kind, SourceKind::Table);
        assert!(src.database.is_none());
        assert_eq!(src.schema, info("t:reads"));
        assert_eq!(src.table_schema, src.schema);
        Ok(())
    }

    #[test]
    fn database_resolves_to_its_reads_table() -> TestResult {
        let tmp = TempDir::new()?;
        let loc = StorageLocation::local(tmp.path().join("db"));
        let mgr = Manager::new().with_sync(false);
        let mut db = mgr.create_database(&loc, &info("t:db"))?;
        db.create_table("SEQUENCE", &info("t:reads"))?;

        let src = resolve(&mgr, &loc, &RewriteConfig::new(loc.root()))?;
        assert_eq!(src.kind, SourceKind::Database);
        assert_eq!(src.schema.type_name, "t:db");
        assert_eq!(src.table_schema.type_name, "t:reads");
        assert!(!src.table.is_writable());
        Ok(())
    }

    #[test]
    fn plain_directory_is_a_setup_fault() -> TestResult {
        let tmp = TempDir::new()?;
        let loc = StorageLocation::local(tmp.path());
        let err = resolve(&Manager::new(), &loc, &RewriteConfig::new(tmp.path()))
            .expect_err("not an object");
        assert!(matches!(
            err,
            RewriteError::UnsupportedPath {
                found: PathType::Directory,
                ..
            }
        ));
        assert_eq!(err.category(), FaultCategory::Setup);
        Ok(())
    }

    #[test]
    fn database_without_reads_table_is_a_setup_fault() -> TestResult {
        let tmp = TempDir::new()?;
        let loc = StorageLocation::local(tmp.path().join("db"));
        let mgr = Manager::new().with_sync(false);
        mgr.create_database(&loc, &info("t:db"))?;

        let err = resolve(&mgr, &loc, &RewriteConfig::new(loc.root())).expect_err("no SEQUENCE");
        assert_eq!(err.category(), FaultCategory::Setup);
        Ok(())
    }

    #[test]
    fn missing_name_attribute_is_a_schema_fault() -> TestResult {
        let tmp = TempDir::new()?;
        let loc = StorageLocation::local(tmp.path().join("t"));
        let mgr = Manager::new().with_sync(false);
        let mut table = mgr.create_table(&loc, &info("t:reads"))?;
        table
            .metadata_mut()?
            .open_node_update("schema")?
            .copy_from(&MetaNode::default());
        table.commit_metadata()?;

        let err = resolve(&mgr, &loc, &RewriteConfig::new(loc.root())).expect_err("no name");
        assert_eq!(err.category(), FaultCategory::Schema);
        Ok(())
    }

    #[test]
    fn schema_type_of_wrong_kind_is_a_schema_fault() -> TestResult {
        let tmp = TempDir::new()?;
        let loc = StorageLocation::local(tmp.path().join("t"));
        let mgr = Manager::new().with_sync(false);
        mgr.create_table(&loc, &info("t:db"))?;

        let err = resolve(&mgr, &loc, &RewriteConfig::new(loc.root())).expect_err("db type");
        assert!(matches!(err, RewriteError::SchemaKind { .. }));
        Ok(())
    }
}
