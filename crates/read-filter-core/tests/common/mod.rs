#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use read_filter_core::schema::SchemaInfo;
use read_filter_core::storage::StorageLocation;
use read_filter_core::store::{Manager, Table};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub const SCHEMA: &str = r#"
version 1;
typedef U8 INSDC:SRA:read_filter;
typedef U32 INSDC:coord:len;
typedef U8 INSDC:quality:phred;

table NCBI:SRA:tbl:reads #1 {
    column INSDC:SRA:read_filter READ_FILTER;
    column INSDC:coord:len READ_LEN;
    column ascii READ;
    column INSDC:quality:phred QUALITY;
};

table NCBI:SRA:tbl:refseq #1 {
    column ascii NAME;
};

database NCBI:SRA:db #1 {
    table NCBI:SRA:tbl:reads SEQUENCE;
    table NCBI:SRA:tbl:refseq REFERENCE;
};
"#;

pub const READS_TYPE: &str = "NCBI:SRA:tbl:reads";
pub const DB_TYPE: &str = "NCBI:SRA:db";

/// Length of every read written by the fixtures.
pub const READ_LEN: u32 = 4;

pub fn manager() -> Manager {
    Manager::new().with_sync(false)
}

pub fn reads_info() -> SchemaInfo {
    SchemaInfo {
        type_name: READS_TYPE.to_string(),
        text: SCHEMA.to_string(),
    }
}

pub fn db_info() -> SchemaInfo {
    SchemaInfo {
        type_name: DB_TYPE.to_string(),
        text: SCHEMA.to_string(),
    }
}

/// Fill a fresh reads table: one row per entry of `filters`, one read per
/// filter byte, each read `READ_LEN` bases long.
pub fn write_reads(table: &mut Table, filters: &[Vec<u8>]) -> TestResult {
    let mut w = table.write_cursor()?;
    let filter = w.add_column("READ_FILTER")?;
    let len = w.add_column("READ_LEN")?;
    let read = w.add_column("READ")?;
    let qual = w.add_column("QUALITY")?;
    w.open()?;

    for (row, cell) in filters.iter().enumerate() {
        let reads = cell.len() as u32;
        let bases = (reads * READ_LEN) as usize;

        w.open_row()?;
        w.write(filter, 8, cell, 0, reads)?;
        let lens: Vec<u8> = (0..reads).flat_map(|_| READ_LEN.to_le_bytes()).collect();
        w.write(len, 32, &lens, 0, reads)?;
        let seq: Vec<u8> = b"ACGT".iter().copied().cycle().skip(row).take(bases).collect();
        w.write(read, 8, &seq, 0, bases as u32)?;
        let quals: Vec<u8> = (0..bases).map(|i| 30 + (i % 10) as u8).collect();
        w.write(qual, 8, &quals, 0, bases as u32)?;
        w.commit_row()?;
        w.close_row()?;
    }
    w.commit()?;

    let md = table.metadata_mut()?;
    let loader = md.open_node_update("SOFTWARE/loader")?;
    loader.set_value(b"fastq-load".to_vec());
    loader.set_attr("vers", "2.11.0");
    table.commit_metadata()?;
    Ok(())
}

/// A bare reads table at `path`.
pub fn create_reads_table(path: &Path, filters: &[Vec<u8>]) -> TestResult {
    let mut table = manager().create_table(&StorageLocation::local(path), &reads_info())?;
    write_reads(&mut table, filters)
}

/// A database at `path` holding a `SEQUENCE` reads table and a
/// `REFERENCE` sibling.
pub fn create_database(path: &Path, filters: &[Vec<u8>]) -> TestResult {
    let mut db = manager().create_database(&StorageLocation::local(path), &db_info())?;
    let mut seq = db.create_table("SEQUENCE", &reads_info())?;
    write_reads(&mut seq, filters)?;

    let mut refs = db.create_table(
        "REFERENCE",
        &SchemaInfo {
            type_name: "NCBI:SRA:tbl:refseq".to_string(),
            text: SCHEMA.to_string(),
        },
    )?;
    let mut w = refs.write_cursor()?;
    let name = w.add_column("NAME")?;
    w.open()?;
    w.open_row()?;
    w.write(name, 8, b"chr1", 0, 4)?;
    w.commit_row()?;
    w.close_row()?;
    w.commit()?;

    db.metadata_mut()?
        .open_node_update("LOAD/timestamp")?
        .set_value(b"2024-01-01".to_vec());
    db.commit_metadata()?;
    Ok(())
}

/// Every cell of `column` in the table rooted at `path`.
pub fn column_cells(path: &Path, column: &str) -> TestResult<Vec<Vec<u8>>> {
    let table = manager().open_table_read(&StorageLocation::local(path))?;
    let mut r = table.read_cursor()?;
    let cid = r.add_column(column)?;
    r.open()?;
    let (first, count) = r.id_range(cid)?;
    let mut out = Vec::with_capacity(count as usize);
    for row in first..first + count as i64 {
        out.push(r.cell_data(row, cid)?.bytes().to_vec());
    }
    Ok(out)
}

/// Every file under `root` with its contents, keyed by relative path.
/// Symlinks are recorded by their target.
pub fn snapshot(root: &Path) -> TestResult<BTreeMap<PathBuf, Vec<u8>>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) -> TestResult {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let meta = std::fs::symlink_metadata(&path)?;
            if meta.is_dir() {
                walk(root, &path, out)?;
                continue;
            }
            let rel = path.strip_prefix(root)?.to_path_buf();
            let contents = if meta.file_type().is_symlink() {
                std::fs::read_link(&path)?
                    .to_string_lossy()
                    .into_owned()
                    .into_bytes()
            } else {
                std::fs::read(&path)?
            };
            out.insert(rel, contents);
        }
        Ok(())
    }

    let mut out = BTreeMap::new();
    walk(root, root, &mut out)?;
    Ok(out)
}

/// Names of the entries in `dir`, sorted.
pub fn dir_names(dir: &Path) -> TestResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Files under `root` whose relative path starts with `prefix`.
pub fn files_under(
    snap: &BTreeMap<PathBuf, Vec<u8>>,
    prefix: &str,
) -> BTreeMap<PathBuf, Vec<u8>> {
    snap.iter()
        .filter(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
