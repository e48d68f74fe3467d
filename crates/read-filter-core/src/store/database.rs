use snafu::prelude::*;

use crate::metadata::Metadata;
use crate::schema::{Schema, SchemaInfo};
use crate::storage::{self, StorageLocation, layout};
use crate::store::manager::{create_object, parse_schema, read_schema_info};
use crate::store::{
    InvalidNameSnafu, MetadataSnafu, ReadOnlySnafu, StorageSnafu, StoreResult, Table,
    TableNotFoundSnafu,
};

/// Handle to a database: named member tables plus the database's own
/// metadata tree.
#[derive(Debug)]
pub struct Database {
    location: StorageLocation,
    writable: bool,
    sync: bool,
    metadata: Metadata,
}

impl Database {
    pub(crate) fn open(location: StorageLocation, writable: bool, sync: bool) -> StoreResult<Self> {
        let metadata = Metadata::load(&location, writable).context(MetadataSnafu)?;
        Ok(Self {
            location,
            writable,
            sync,
            metadata,
        })
    }

    /// Root of the database.
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Names of the member tables, sorted.
    pub fn tables(&self) -> StoreResult<Vec<String>> {
        let names =
            storage::list_dirs(&self.location, &layout::tables_rel_dir()).context(StorageSnafu)?;
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if self.has_table(&name)? {
                out.push(name);
            }
        }
        Ok(out)
    }

    /// Whether a member table called `name` exists.
    pub fn has_table(&self, name: &str) -> StoreResult<bool> {
        if !layout::is_valid_object_name(name) {
            return Ok(false);
        }
        let marker = match storage::read_to_string(
            &self.location,
            &layout::table_rel_dir(name).join(layout::KIND_FILE_NAME),
        ) {
            Ok(s) => s,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(source) => return Err(source).context(StorageSnafu),
        };
        Ok(marker.trim() == layout::KIND_TABLE)
    }

    /// Open member table `name` with this handle's access mode.
    pub fn open_table(&self, name: &str) -> StoreResult<Table> {
        ensure!(
            self.has_table(name)?,
            TableNotFoundSnafu {
                database: self.location.display(),
                table: name,
            }
        );
        Table::open(self.table_location(name), self.writable, self.sync)
    }

    /// Create member table `name` instantiating `schema`.
    pub fn create_table(&mut self, name: &str, schema: &SchemaInfo) -> StoreResult<Table> {
        self.ensure_writable()?;
        ensure!(
            layout::is_valid_object_name(name),
            InvalidNameSnafu { name }
        );
        let location = self.table_location(name);
        create_object(&location, layout::KIND_TABLE, schema, self.sync)?;
        Table::open(location, true, self.sync)
    }

    /// Location a member table called `name` occupies.
    pub fn table_location(&self, name: &str) -> StorageLocation {
        self.location.join(layout::table_rel_dir(name))
    }

    /// Metadata tree, read-only view.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Metadata tree for update.
    pub fn metadata_mut(&mut self) -> StoreResult<&mut Metadata> {
        self.ensure_writable()?;
        Ok(&mut self.metadata)
    }

    /// Persist metadata updates.
    pub fn commit_metadata(&self) -> StoreResult<()> {
        self.ensure_writable()?;
        self.metadata.commit(self.sync).context(MetadataSnafu)
    }

    /// Schema text and type name from the `schema` metadata node.
    pub fn schema_info(&self) -> StoreResult<SchemaInfo> {
        read_schema_info(&self.location, &self.metadata)
    }

    /// The parsed schema of this database.
    pub fn schema(&self) -> StoreResult<Schema> {
        parse_schema(&self.location, &self.schema_info()?)
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        ensure!(
            self.writable,
            ReadOnlySnafu {
                path: self.location.display()
            }
        );
        Ok(())
    }
}
