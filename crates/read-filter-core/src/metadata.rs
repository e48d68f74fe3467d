//! Hierarchical metadata attached to tables and databases.
//!
//! Every object root carries one metadata tree, separate from its row data.
//! A [`MetaNode`] holds a raw byte value, named string attributes, and named
//! children. Node paths use `/` separators (`"schema"`, `"SOFTWARE/loader"`).
//!
//! The tree persists as JSON at `md/cur.json` and is rewritten atomically on
//! [`Metadata::commit`].

mod node;

pub use node::MetaNode;

use std::path::Path;

use snafu::{Backtrace, prelude::*};

use crate::storage::{self, StorageError, StorageLocation, layout};

/// Result alias for metadata operations.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors raised while reading or writing metadata trees.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MetadataError {
    /// No node exists at the requested path.
    #[snafu(display("Metadata node not found: {path}"))]
    NodeNotFound {
        /// Requested node path.
        path: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// The node exists but carries no attribute with this name.
    #[snafu(display("Metadata node {node} has no attribute {attr}"))]
    AttrNotFound {
        /// Node the attribute was looked up on.
        node: String,
        /// Missing attribute name.
        attr: String,
    },

    /// The caller's buffer cannot hold the attribute value.
    ///
    /// Returned by [`MetaNode::read_attr`]; `required` is the exact size
    /// needed, so callers can allocate and read again.
    #[snafu(display("Buffer too small for attribute value: {required} bytes required"))]
    BufferInsufficient {
        /// Number of bytes the value occupies.
        required: usize,
    },

    /// A node path is empty or contains an empty component.
    #[snafu(display("Invalid metadata node path: {path:?}"))]
    InvalidPath {
        /// The rejected path.
        path: String,
    },

    /// An update was attempted on metadata opened read-only.
    #[snafu(display("Metadata at {path} is open read-only"))]
    ReadOnly {
        /// Object root whose metadata is read-only.
        path: String,
    },

    /// The persisted tree could not be decoded or encoded.
    #[snafu(display("Corrupt metadata at {path}: {source}"))]
    Corrupt {
        /// File holding the tree.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Storage failure while loading or committing the tree.
    #[snafu(display("Storage error while accessing metadata: {source}"))]
    Storage {
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },
}

/// Split a node path into its components, rejecting empty segments.
pub(crate) fn split_path(path: &str) -> MetadataResult<Vec<&str>> {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return InvalidPathSnafu { path }.fail();
    }
    Ok(parts)
}

/// The metadata tree of one object, bound to its storage location.
#[derive(Debug, Clone)]
pub struct Metadata {
    location: StorageLocation,
    root: MetaNode,
    writable: bool,
}

impl Metadata {
    /// Load the tree of the object rooted at `location`.
    ///
    /// An object without a metadata file has an empty tree.
    pub fn load(location: &StorageLocation, writable: bool) -> MetadataResult<Self> {
        let rel = layout::metadata_rel_path();
        let root = match storage::read_all_bytes(location, &rel) {
            Ok(bytes) => serde_json::from_slice(&bytes).context(CorruptSnafu {
                path: location.join(&rel).display(),
            })?,
            Err(e) if e.is_not_found() => MetaNode::default(),
            Err(source) => return Err(MetadataError::Storage { source }),
        };

        Ok(Self {
            location: location.clone(),
            root,
            writable,
        })
    }

    /// An empty, writable tree for a freshly created object.
    pub(crate) fn empty(location: &StorageLocation) -> Self {
        Self {
            location: location.clone(),
            root: MetaNode::default(),
            writable: true,
        }
    }

    /// Root node of the tree.
    pub fn root(&self) -> &MetaNode {
        &self.root
    }

    /// Open the node at `path` for reading.
    pub fn open_node(&self, path: &str) -> MetadataResult<&MetaNode> {
        self.root
            .node(path)?
            .context(NodeNotFoundSnafu { path })
    }

    /// Open the node at `path` for update, creating it and any missing
    /// parents.
    pub fn open_node_update(&mut self, path: &str) -> MetadataResult<&mut MetaNode> {
        ensure!(
            self.writable,
            ReadOnlySnafu {
                path: self.location.display()
            }
        );
        self.root.node_mut_or_create(path)
    }

    /// Remove the node at `path`, returning it if it existed.
    pub fn remove_node(&mut self, path: &str) -> MetadataResult<Option<MetaNode>> {
        ensure!(
            self.writable,
            ReadOnlySnafu {
                path: self.location.display()
            }
        );
        self.root.remove(path)
    }

    /// Persist the tree with an atomic write.
    pub fn commit(&self, sync: bool) -> MetadataResult<()> {
        ensure!(
            self.writable,
            ReadOnlySnafu {
                path: self.location.display()
            }
        );
        let rel = layout::metadata_rel_path();
        let json = serde_json::to_vec_pretty(&self.root).context(CorruptSnafu {
            path: self.location.join(&rel).display(),
        })?;
        storage::write_atomic(&self.location, Path::new(&rel), &json, sync)
            .context(StorageSnafu)
    }
}
