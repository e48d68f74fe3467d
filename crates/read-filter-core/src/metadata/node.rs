use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::metadata::{
    AttrNotFoundSnafu, BufferInsufficientSnafu, MetadataResult, NodeNotFoundSnafu, split_path,
};

/// One node of a metadata tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaNode {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    value: Vec<u8>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attrs: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    children: BTreeMap<String, MetaNode>,
}

impl MetaNode {
    /// Raw value bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Replace the value bytes.
    pub fn set_value(&mut self, value: Vec<u8>) {
        self.value = value;
    }

    /// Attribute value, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Set an attribute.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(name.into(), value.into());
    }

    /// Copy the attribute `name` into `buf`.
    ///
    /// Returns the number of bytes written. When `buf` is too small nothing
    /// is written and `BufferInsufficient { required }` reports the size to
    /// allocate, so callers can probe with an empty buffer first.
    pub fn read_attr(&self, name: &str, buf: &mut [u8]) -> MetadataResult<usize> {
        let value = self.attrs.get(name).context(AttrNotFoundSnafu {
            node: "<node>",
            attr: name,
        })?;
        let bytes = value.as_bytes();
        ensure!(
            bytes.len() <= buf.len(),
            BufferInsufficientSnafu {
                required: bytes.len()
            }
        );
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Named children in name order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &MetaNode)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Descendant at `path`, if present.
    pub fn node(&self, path: &str) -> MetadataResult<Option<&MetaNode>> {
        let mut cur = self;
        for part in split_path(path)? {
            match cur.children.get(part) {
                Some(next) => cur = next,
                None => return Ok(None),
            }
        }
        Ok(Some(cur))
    }

    /// Descendant at `path`, created along with any missing parents.
    pub fn node_mut_or_create(&mut self, path: &str) -> MetadataResult<&mut MetaNode> {
        let mut cur = self;
        for part in split_path(path)? {
            cur = cur.children.entry(part.to_string()).or_default();
        }
        Ok(cur)
    }

    /// Detach and return the descendant at `path`.
    pub fn remove(&mut self, path: &str) -> MetadataResult<Option<MetaNode>> {
        let parts = split_path(path)?;
        let (leaf, parents) = parts
            .split_last()
            .context(NodeNotFoundSnafu { path })?;

        let mut cur = self;
        for part in parents {
            match cur.children.get_mut(*part) {
                Some(next) => cur = next,
                None => return Ok(None),
            }
        }
        Ok(cur.children.remove(*leaf))
    }

    /// Overwrite this node with a node-for-node copy of `src`: value bytes,
    /// attributes, and every descendant. Returns the number of nodes copied.
    pub fn copy_from(&mut self, src: &MetaNode) -> usize {
        self.value.clear();
        self.value.extend_from_slice(&src.value);
        self.attrs.clone_from(&src.attrs);
        self.children.clear();

        let mut copied = 1;
        for (name, child) in &src.children {
            copied += self
                .children
                .entry(name.clone())
                .or_default()
                .copy_from(child);
        }
        copied
    }
}
