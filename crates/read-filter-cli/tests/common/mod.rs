#![allow(dead_code)]

use std::path::Path;

use read_filter_core::schema::SchemaInfo;
use read_filter_core::storage::StorageLocation;
use read_filter_core::store::Manager;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

const SCHEMA: &str = r#"
typedef U8 INSDC:SRA:read_filter;
table NCBI:SRA:tbl:reads #1 {
    column INSDC:SRA:read_filter READ_FILTER;
    column U32 READ_LEN;
    column ascii READ;
};
"#;

pub fn cli_bin() -> &'static str {
    env!("CARGO_BIN_EXE_make-read-filter")
}

/// A reads table with one row per entry of `filters`.
pub fn create_reads_table(path: &Path, filters: &[Vec<u8>]) -> TestResult {
    let mut table = Manager::new().with_sync(false).create_table(
        &StorageLocation::local(path),
        &SchemaInfo {
            type_name: "NCBI:SRA:tbl:reads".to_string(),
            text: SCHEMA.to_string(),
        },
    )?;
    let mut w = table.write_cursor()?;
    let filter = w.add_column("READ_FILTER")?;
    let len = w.add_column("READ_LEN")?;
    let read = w.add_column("READ")?;
    w.open()?;
    for cell in filters {
        let reads = cell.len() as u32;
        w.open_row()?;
        w.write(filter, 8, cell, 0, reads)?;
        let lens: Vec<u8> = (0..reads).flat_map(|_| 2u32.to_le_bytes()).collect();
        w.write(len, 32, &lens, 0, reads)?;
        let bases = b"AC".repeat(cell.len());
        w.write(read, 8, &bases, 0, bases.len() as u32)?;
        w.commit_row()?;
        w.close_row()?;
    }
    w.commit()?;
    Ok(())
}

pub fn filter_cells(path: &Path, column: &str) -> TestResult<Vec<Vec<u8>>> {
    let table = Manager::new().open_table_read(&StorageLocation::local(path))?;
    let mut r = table.read_cursor()?;
    let cid = r.add_column(column)?;
    r.open()?;
    let (first, count) = r.id_range(cid)?;
    let mut out = Vec::new();
    for row in first..first + count as i64 {
        out.push(r.cell_data(row, cid)?.bytes().to_vec());
    }
    Ok(out)
}

pub fn dir_names(dir: &Path) -> TestResult<Vec<String>> {
    let mut names = std::fs::read_dir(dir)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<Vec<_>, _>>()?;
    names.sort();
    Ok(names)
}
