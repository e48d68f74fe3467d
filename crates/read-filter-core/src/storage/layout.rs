//! On-disk layout helpers for tables and databases.
//!
//! The functions here return relative [`PathBuf`] values; callers join them
//! with an object root before doing IO.
//!
//! ```text
//! <table>/
//!   KIND                  "table\n"
//!   md/cur.json           metadata tree
//!   col/<NAME>/desc.json  column descriptor
//!   col/<NAME>/idx        per-row index records
//!   col/<NAME>/data       cell payload
//! <database>/
//!   KIND                  "database\n"
//!   md/cur.json
//!   tbl/<NAME>/           member tables
//! ```

use std::path::PathBuf;

/// File naming the object kind stored at a root.
pub const KIND_FILE_NAME: &str = "KIND";

/// Marker contents for a table root.
pub const KIND_TABLE: &str = "table";

/// Marker contents for a database root.
pub const KIND_DATABASE: &str = "database";

/// Directory holding the metadata tree.
pub const METADATA_DIR_NAME: &str = "md";

/// Current metadata tree file inside [`METADATA_DIR_NAME`].
pub const METADATA_FILE_NAME: &str = "cur.json";

/// Directory holding one subdirectory per column.
pub const COLUMN_DIR_NAME: &str = "col";

/// Directory holding one subdirectory per member table.
pub const TABLE_DIR_NAME: &str = "tbl";

/// Column descriptor file.
pub const COLUMN_DESC_FILE_NAME: &str = "desc.json";

/// Column row index file.
pub const COLUMN_INDEX_FILE_NAME: &str = "idx";

/// Column payload file.
pub const COLUMN_DATA_FILE_NAME: &str = "data";

/// Size of one row index record: u64 bit offset + u32 element count.
pub const INDEX_RECORD_LEN: usize = 12;

/// Relative path: `KIND`
pub fn kind_rel_path() -> PathBuf {
    PathBuf::from(KIND_FILE_NAME)
}

/// Relative path: `md/cur.json`
pub fn metadata_rel_path() -> PathBuf {
    PathBuf::from(METADATA_DIR_NAME).join(METADATA_FILE_NAME)
}

/// Relative path: `col/`
pub fn columns_rel_dir() -> PathBuf {
    PathBuf::from(COLUMN_DIR_NAME)
}

/// Relative path: `col/<name>/`
pub fn column_rel_dir(name: &str) -> PathBuf {
    columns_rel_dir().join(name)
}

/// Relative path: `col/<name>/desc.json`
pub fn column_desc_rel_path(name: &str) -> PathBuf {
    column_rel_dir(name).join(COLUMN_DESC_FILE_NAME)
}

/// Relative path: `col/<name>/idx`
pub fn column_index_rel_path(name: &str) -> PathBuf {
    column_rel_dir(name).join(COLUMN_INDEX_FILE_NAME)
}

/// Relative path: `col/<name>/data`
pub fn column_data_rel_path(name: &str) -> PathBuf {
    column_rel_dir(name).join(COLUMN_DATA_FILE_NAME)
}

/// Relative path: `tbl/`
pub fn tables_rel_dir() -> PathBuf {
    PathBuf::from(TABLE_DIR_NAME)
}

/// Relative path: `tbl/<name>/`
pub fn table_rel_dir(name: &str) -> PathBuf {
    tables_rel_dir().join(name)
}

/// A column or table name usable as a single path component.
pub fn is_valid_object_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}
