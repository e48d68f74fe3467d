use std::path::Path;

use log::debug;
use snafu::{IntoError, prelude::*};

use crate::metadata::Metadata;
use crate::schema::{Schema, SchemaError, SchemaInfo};
use crate::storage::{self, Probe, StorageLocation, layout};
use crate::store::{
    AlreadyExistsSnafu, Database, MetadataSnafu, SchemaSnafu, SchemaTextSnafu, StorageSnafu,
    StoreResult, Table, WrongKindSnafu,
};

/// What a path holds, as far as the store is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathType {
    /// Nothing exists at the path.
    NotFound,
    /// A table root.
    Table,
    /// A database root.
    Database,
    /// A directory without a recognised `KIND` marker.
    Directory,
    /// A plain file.
    File,
    /// A `KIND` marker with unrecognised contents, or a special file.
    Unknown,
}

/// Session object for the column store.
///
/// Every table and database handle is opened through a manager and inherits
/// its options.
#[derive(Debug, Clone)]
pub struct Manager {
    sync: bool,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    /// A manager whose commits fsync.
    pub fn new() -> Self {
        Self { sync: true }
    }

    /// Set whether commits fsync written files.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Whether commits fsync written files.
    pub fn sync(&self) -> bool {
        self.sync
    }

    /// Classify what lives at `location`.
    pub fn path_type(&self, location: &StorageLocation) -> StoreResult<PathType> {
        match storage::probe(location, Path::new("")).context(StorageSnafu)? {
            Probe::Missing => return Ok(PathType::NotFound),
            Probe::File => return Ok(PathType::File),
            Probe::Other => return Ok(PathType::Unknown),
            Probe::Dir => {}
        }

        let marker = match storage::read_to_string(location, &layout::kind_rel_path()) {
            Ok(s) => s,
            Err(e) if e.is_not_found() => return Ok(PathType::Directory),
            Err(source) => return Err(source).context(StorageSnafu),
        };

        Ok(match marker.trim() {
            layout::KIND_TABLE => PathType::Table,
            layout::KIND_DATABASE => PathType::Database,
            _ => PathType::Unknown,
        })
    }

    fn expect_kind(
        &self,
        location: &StorageLocation,
        wanted: PathType,
        expected: &'static str,
    ) -> StoreResult<()> {
        let found = self.path_type(location)?;
        ensure!(
            found == wanted,
            WrongKindSnafu {
                path: location.display(),
                expected,
                found,
            }
        );
        Ok(())
    }

    /// Open a bare table read-only.
    pub fn open_table_read(&self, location: &StorageLocation) -> StoreResult<Table> {
        self.expect_kind(location, PathType::Table, "table")?;
        Table::open(location.clone(), false, self.sync)
    }

    /// Open a bare table for update.
    pub fn open_table_update(&self, location: &StorageLocation) -> StoreResult<Table> {
        self.expect_kind(location, PathType::Table, "table")?;
        Table::open(location.clone(), true, self.sync)
    }

    /// Open a database read-only.
    pub fn open_database_read(&self, location: &StorageLocation) -> StoreResult<Database> {
        self.expect_kind(location, PathType::Database, "database")?;
        Database::open(location.clone(), false, self.sync)
    }

    /// Open a database for update.
    pub fn open_database_update(&self, location: &StorageLocation) -> StoreResult<Database> {
        self.expect_kind(location, PathType::Database, "database")?;
        Database::open(location.clone(), true, self.sync)
    }

    /// Create a new, empty table instantiating `schema`.
    pub fn create_table(&self, location: &StorageLocation, schema: &SchemaInfo) -> StoreResult<Table> {
        create_object(location, layout::KIND_TABLE, schema, self.sync)?;
        Table::open(location.clone(), true, self.sync)
    }

    /// Create a new, empty database instantiating `schema`.
    pub fn create_database(
        &self,
        location: &StorageLocation,
        schema: &SchemaInfo,
    ) -> StoreResult<Database> {
        create_object(location, layout::KIND_DATABASE, schema, self.sync)?;
        Database::open(location.clone(), true, self.sync)
    }
}

/// Lay down the root of a new object: `KIND` marker plus a metadata tree
/// whose `schema` node holds the text and names the instantiated type.
pub(crate) fn create_object(
    location: &StorageLocation,
    kind: &str,
    schema: &SchemaInfo,
    sync: bool,
) -> StoreResult<()> {
    let parsed = Schema::parse(&schema.text).context(SchemaSnafu {
        path: location.display(),
    })?;
    if !parsed.declares(&schema.type_name) {
        return Err(SchemaSnafu {
            path: location.display(),
        }
        .into_error(SchemaError::UnknownType {
            name: schema.type_name.clone(),
        }));
    }

    if storage::probe(location, Path::new("")).context(StorageSnafu)? != Probe::Missing {
        return AlreadyExistsSnafu {
            path: location.display(),
        }
        .fail();
    }
    storage::create_dir_all(location, Path::new("")).context(StorageSnafu)?;

    let mut md = Metadata::empty(location);
    {
        let node = md.open_node_update("schema").context(MetadataSnafu)?;
        node.set_value(schema.text.as_bytes().to_vec());
        node.set_attr("name", schema.type_name.clone());
    }
    md.commit(sync).context(MetadataSnafu)?;

    storage::write_atomic(
        location,
        &layout::kind_rel_path(),
        format!("{kind}\n").as_bytes(),
        sync,
    )
    .context(StorageSnafu)?;

    debug!("created {kind} at {}", location.display());
    Ok(())
}

/// Recover the schema text and type name held by an object's metadata.
pub(crate) fn read_schema_info(
    location: &StorageLocation,
    md: &Metadata,
) -> StoreResult<SchemaInfo> {
    let node = md.open_node("schema").context(MetadataSnafu)?;
    let text = String::from_utf8(node.value().to_vec()).context(SchemaTextSnafu {
        path: location.display(),
    })?;
    let type_name = node
        .attr("name")
        .context(crate::metadata::AttrNotFoundSnafu {
            node: "schema",
            attr: "name",
        })
        .context(MetadataSnafu)?
        .to_string();
    Ok(SchemaInfo { type_name, text })
}

/// Parse the schema text recovered by [`read_schema_info`].
pub(crate) fn parse_schema(location: &StorageLocation, info: &SchemaInfo) -> StoreResult<Schema> {
    Schema::parse(&info.text).context(SchemaSnafu {
        path: location.display(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const SCHEMA: &str = "table t:reads { column U8 F; }; database t:db { table t:reads R; };";

    fn info(type_name: &str) -> SchemaInfo {
        SchemaInfo {
            type_name: type_name.to_string(),
            text: SCHEMA.to_string(),
        }
    }

    #[test]
    fn path_type_classifies_every_kind() -> TestResult {
        let tmp = TempDir::new()?;
        let mgr = Manager::new().with_sync(false);
        let at = |name: &str| StorageLocation::local(tmp.path().join(name));

        assert_eq!(mgr.path_type(&at("missing"))?, PathType::NotFound);

        std::fs::write(tmp.path().join("file"), b"x")?;
        assert_eq!(mgr.path_type(&at("file"))?, PathType::File);

        std::fs::create_dir(tmp.path().join("plain"))?;
        assert_eq!(mgr.path_type(&at("plain"))?, PathType::Directory);

        std::fs::create_dir(tmp.path().join("odd"))?;
        std::fs::write(tmp.path().join("odd/KIND"), b"index\n")?;
        assert_eq!(mgr.path_type(&at("odd"))?, PathType::Unknown);

        mgr.create_table(&at("t"), &info("t:reads"))?;
        assert_eq!(mgr.path_type(&at("t"))?, PathType::Table);
        mgr.create_database(&at("db"), &info("t:db"))?;
        assert_eq!(mgr.path_type(&at("db"))?, PathType::Database);
        Ok(())
    }

    #[test]
    fn opening_the_wrong_kind_fails() -> TestResult {
        let tmp = TempDir::new()?;
        let mgr = Manager::new().with_sync(false);
        let loc = StorageLocation::local(tmp.path().join("t"));
        mgr.create_table(&loc, &info("t:reads"))?;

        let err = mgr.open_database_read(&loc).expect_err("a table");
        assert!(matches!(err, StoreError::WrongKind { .. }), "{err}");
        assert!(!mgr.open_table_read(&loc)?.is_writable());
        assert!(mgr.open_table_update(&loc)?.is_writable());
        Ok(())
    }

    #[test]
    fn create_rejects_existing_path_and_undeclared_type() -> TestResult {
        let tmp = TempDir::new()?;
        let mgr = Manager::new().with_sync(false);
        let loc = StorageLocation::local(tmp.path().join("t"));

        let err = mgr
            .create_table(&loc, &info("t:other"))
            .expect_err("undeclared");
        assert!(matches!(err, StoreError::Schema { .. }), "{err}");
        assert!(!tmp.path().join("t").exists());

        mgr.create_table(&loc, &info("t:reads"))?;
        let err = mgr
            .create_table(&loc, &info("t:reads"))
            .expect_err("exists");
        assert!(matches!(err, StoreError::AlreadyExists { .. }), "{err}");
        Ok(())
    }

    #[test]
    fn created_table_carries_its_schema() -> TestResult {
        let tmp = TempDir::new()?;
        let table = Manager::new()
            .with_sync(false)
            .create_table(&StorageLocation::local(tmp.path().join("t")), &info("t:reads"))?;
        assert_eq!(table.schema_info()?, info("t:reads"));
        Ok(())
    }
}
