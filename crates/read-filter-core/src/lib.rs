//! Core engine for rewriting per-read filter columns in columnar
//! sequencing-read tables.
//!
//! This crate provides:
//!
//! - A local column store: tables, databases, typed columns, and row
//!   cursors with an explicit open/commit lifecycle (`store` module).
//! - Hierarchical metadata trees attached to every object (`metadata`
//!   module) and the schema declaration language they carry (`schema`
//!   module).
//! - Filesystem primitives and on-disk layout conventions (`storage`
//!   module).
//! - Filter byte values and the recompute predicate abstraction
//!   (`read_filter` module).
//! - The rewrite engine itself, which stages a recomputed filter column
//!   next to verbatim copies of every other column and then atomically
//!   replaces the original object (`rewrite` module).
//!
//! Front ends such as the `make-read-filter` binary depend on this crate and
//! only map [`rewrite::RewriteError`] categories to exit statuses.
#![deny(missing_docs)]
pub mod metadata;
pub mod read_filter;
pub mod rewrite;
pub mod schema;
pub mod storage;
pub mod store;
