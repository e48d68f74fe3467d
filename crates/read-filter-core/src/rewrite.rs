//! Atomic rewrite of a table's per-read filter column.
//!
//! A run goes through these stages, each failing fast with a categorized
//! [`RewriteError`]:
//!
//! 1. resolve the target (bare table or database holding the reads table)
//!    and recover its schema,
//! 2. plan which columns are recomputed and which are copied verbatim,
//! 3. stage a new object with the same schema under a temporary directory
//!    next to the target,
//! 4. copy excluded columns (and, for a database, sibling tables) without
//!    decoding rows, and migrate metadata,
//! 5. recompute the filter column row by row through the injected
//!    [`FilterPredicate`],
//! 6. commit, then swap the staged object into place.
//!
//! The target is never written before the swap. On any failure the staged
//! object is discarded and the target is left as it was.

mod copier;
mod engine;
mod error;
mod migrator;
mod planner;
mod report;
mod resolver;
mod staging;

pub mod config;

pub use config::RewriteConfig;
pub use error::{ExitStatus, FaultCategory, RewriteError, RewriteResult};
pub use report::RewriteReport;
pub use resolver::SourceKind;

use log::debug;
use snafu::prelude::*;

use crate::read_filter::FilterPredicate;
use crate::storage::StorageLocation;
use crate::store::{Manager, Table};

use self::error::{CommitCursorSnafu, CommitMetadataSnafu, CreateOutputSnafu};
use self::planner::ColumnPlan;
use self::resolver::ResolvedSource;
use self::staging::TempObject;

/// Recompute the filter column of `cfg.target` with `predicate` and
/// atomically replace the target with the result.
///
/// Handles are opened through `manager`; commits fsync only when both the
/// manager and `cfg.fsync` ask for it.
pub fn rewrite(
    manager: &Manager,
    cfg: &RewriteConfig,
    predicate: &dyn FilterPredicate,
) -> RewriteResult<RewriteReport> {
    cfg.validate()?;
    let manager = manager.clone().with_sync(manager.sync() && cfg.fsync);
    let target = StorageLocation::local(&cfg.target);

    let source = resolver::resolve(&manager, &target, cfg)?;
    let plan = planner::plan(&source.table, cfg)?;

    let staged = TempObject::create(&cfg.target)?;
    debug!("staging output in {}", staged.dir().display());

    let report = match build(&manager, cfg, predicate, &source, &plan, &staged) {
        Ok(report) => report,
        Err(e) => {
            debug!("discarding staged output after failure: {e}");
            staged.discard();
            return Err(e);
        }
    };

    drop(source);
    staged.swap_into(&cfg.target)?;
    Ok(report)
}

fn build(
    manager: &Manager,
    cfg: &RewriteConfig,
    predicate: &dyn FilterPredicate,
    source: &ResolvedSource,
    plan: &ColumnPlan,
    staged: &TempObject,
) -> RewriteResult<RewriteReport> {
    let out = staged.location();
    let out_path = out.display();

    let (mut dest_db, mut dest) = match source.kind {
        SourceKind::Table => {
            let table = manager
                .create_table(&out, &source.schema)
                .context(CreateOutputSnafu { path: &out_path })?;
            (None, table)
        }
        SourceKind::Database => {
            let mut db = manager
                .create_database(&out, &source.schema)
                .context(CreateOutputSnafu { path: &out_path })?;
            let table = db
                .create_table(&cfg.reads_table, &source.table_schema)
                .context(CreateOutputSnafu {
                    path: db.table_location(&cfg.reads_table).display(),
                })?;
            (Some(db), table)
        }
    };

    let mut copied_bytes =
        copier::copy_columns(source.table.location(), dest.location(), &plan.copy)?;
    let mut copied_tables = Vec::new();
    if let Some(src_db) = &source.database {
        let (tables, bytes) = copier::copy_sibling_tables(src_db, &out, &cfg.reads_table)?;
        copied_tables = tables;
        copied_bytes += bytes;
    }

    migrator::drop_stale_column(&mut dest, &plan.output_column)?;

    let explicit = cfg.metadata_nodes.as_deref();
    let metadata_nodes = match (&source.database, dest_db.as_mut()) {
        (Some(src_db), Some(db)) => {
            let db_path = db.location().display();
            let md = db
                .metadata_mut()
                .context(CommitMetadataSnafu { path: &db_path })?;
            let n = migrator::copy_metadata(src_db.location(), src_db.metadata(), md, explicit)?;
            db.commit_metadata()
                .context(CommitMetadataSnafu { path: &db_path })?;
            migrator::validate_schema(db.location(), db.schema_info(), &source.schema)?;

            n + migrate_table_metadata(source, &mut dest, None)?
        }
        _ => migrate_table_metadata(source, &mut dest, explicit)?,
    };
    migrator::validate_schema(dest.location(), dest.schema_info(), &source.table_schema)?;

    let mut cursors = planner::bind_cursors(plan, &source.table, &mut dest)?;
    let stats = engine::rewrite_rows(
        &mut cursors,
        &plan.filter_column,
        &plan.read_count_column,
        &plan.output_column,
        predicate,
    )?;
    cursors.dest.commit().context(CommitCursorSnafu {
        column: &plan.output_column,
    })?;
    debug!("committed column {}", plan.output_column);

    Ok(RewriteReport {
        target: cfg.target.clone(),
        kind: source.kind,
        schema_type: source.schema.type_name.clone(),
        rows: stats.rows,
        reads: stats.reads,
        changed_reads: stats.changed,
        copied_columns: plan.copy.clone(),
        copied_tables,
        copied_bytes,
        metadata_nodes,
    })
}

/// Migrate the reads table's own metadata into the staged reads table.
fn migrate_table_metadata(
    source: &ResolvedSource,
    dest: &mut Table,
    explicit: Option<&[String]>,
) -> RewriteResult<usize> {
    let path = dest.location().display();
    let md = dest
        .metadata_mut()
        .context(CommitMetadataSnafu { path: &path })?;
    let n = migrator::copy_metadata(
        source.table.location(),
        source.table.metadata(),
        md,
        explicit,
    )?;
    dest.commit_metadata()
        .context(CommitMetadataSnafu { path })?;
    Ok(n)
}
