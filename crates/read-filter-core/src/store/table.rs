use std::path::Path;

use snafu::prelude::*;

use crate::metadata::Metadata;
use crate::schema::{Schema, SchemaInfo};
use crate::storage::{self, Probe, StorageLocation, layout};
use crate::store::manager::{parse_schema, read_schema_info};
use crate::store::{
    ColumnDesc, ColumnNotFoundSnafu, CorruptColumnSnafu, InvalidNameSnafu, MetadataSnafu,
    ReadCursor, ReadOnlySnafu, StorageSnafu, StoreError, StoreResult, WriteCursor,
};

/// Handle to one table: its columns plus its metadata tree.
///
/// The handle owns an in-memory copy of the metadata; updates become
/// visible on disk only after [`Table::commit_metadata`].
#[derive(Debug)]
pub struct Table {
    location: StorageLocation,
    writable: bool,
    sync: bool,
    metadata: Metadata,
}

impl Table {
    pub(crate) fn open(location: StorageLocation, writable: bool, sync: bool) -> StoreResult<Self> {
        let metadata = Metadata::load(&location, writable).context(MetadataSnafu)?;
        Ok(Self {
            location,
            writable,
            sync,
            metadata,
        })
    }

    /// Root of the table.
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Whether the handle was opened for update.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Names of the committed columns, sorted.
    ///
    /// A column directory without a descriptor (for example one left by an
    /// abandoned write cursor) is not a column.
    pub fn columns(&self) -> StoreResult<Vec<String>> {
        let names =
            storage::list_dirs(&self.location, &layout::columns_rel_dir()).context(StorageSnafu)?;
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if self.has_column(&name)? {
                out.push(name);
            }
        }
        Ok(out)
    }

    /// Whether a committed column called `name` exists.
    pub fn has_column(&self, name: &str) -> StoreResult<bool> {
        if !layout::is_valid_object_name(name) {
            return Ok(false);
        }
        let probe = storage::probe(&self.location, &layout::column_desc_rel_path(name))
            .context(StorageSnafu)?;
        Ok(probe == Probe::File)
    }

    /// Descriptor of column `name`.
    pub fn column_desc(&self, name: &str) -> StoreResult<ColumnDesc> {
        load_column_desc(&self.location, name)
    }

    /// Remove column `name` and all of its storage.
    ///
    /// Fails with [`StoreError::ColumnNotFound`] when there is nothing to
    /// drop, so callers can tell absence from real failures.
    pub fn drop_column(&mut self, name: &str) -> StoreResult<()> {
        self.ensure_writable()?;
        ensure!(
            layout::is_valid_object_name(name),
            InvalidNameSnafu { name }
        );
        match storage::remove_tree(&self.location, &layout::column_rel_dir(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => ColumnNotFoundSnafu {
                table: self.location.display(),
                column: name,
            }
            .fail(),
            Err(source) => Err(StoreError::Storage { source }),
        }
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

    /// The parsed schema of this table.
    pub fn schema(&self) -> StoreResult<Schema> {
        parse_schema(&self.location, &self.schema_info()?)
    }

    /// A new read cursor over this table.
    pub fn read_cursor(&self) -> StoreResult<ReadCursor> {
        Ok(ReadCursor::new(self.location.clone(), self.schema()?))
    }

    /// A new write cursor adding columns to this table.
    pub fn write_cursor(&mut self) -> StoreResult<WriteCursor> {
        self.ensure_writable()?;
        let info = self.schema_info()?;
        let schema = parse_schema(&self.location, &info)?;
        Ok(WriteCursor::new(
            self.location.clone(),
            schema,
            info.type_name,
            self.sync,
        ))
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

/// Load `col/<name>/desc.json` under a table root.
pub(crate) fn load_column_desc(location: &StorageLocation, name: &str) -> StoreResult<ColumnDesc> {
    ensure!(
        layout::is_valid_object_name(name),
        InvalidNameSnafu { name }
    );
    let rel = layout::column_desc_rel_path(name);
    let bytes = match storage::read_all_bytes(location, Path::new(&rel)) {
        Ok(b) => b,
        Err(e) if e.is_not_found() => {
            return ColumnNotFoundSnafu {
                table: location.display(),
                column: name,
            }
            .fail();
        }
        Err(source) => return Err(StoreError::Storage { source }),
    };
    let desc: ColumnDesc = serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptColumn {
        column: name.to_string(),
        msg: format!("descriptor: {e}"),
    })?;
    ensure!(
        desc.name == name,
        CorruptColumnSnafu {
            column: name,
            msg: format!("descriptor names column {}", desc.name),
        }
    );
    Ok(desc)
}
