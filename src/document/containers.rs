//! Shared containers and their typed handles
//!
//! Handles are cheap path-addressed views: they hold a document reference and
//! a path, auto-allocate on first access, and route every mutation through the
//! document so transactions and observers see it.

use super::path::Path;
use super::Document;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The kinds of shared container a document can hold
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerKind {
    /// Ordered-key map (keys iterate sorted)
    Map,
    List,
    /// Text fragment
    Text,
}

/// Stored contents of one container
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub(crate) enum ContainerData {
    Map(BTreeMap<String, Value>),
    List(Vec<Value>),
    Text(String),
}

impl ContainerData {
    pub(crate) fn empty(kind: ContainerKind) -> Self {
        match kind {
            ContainerKind::Map => ContainerData::Map(BTreeMap::new()),
            ContainerKind::List => ContainerData::List(Vec::new()),
            ContainerKind::Text => ContainerData::Text(String::new()),
        }
    }
}

/// Handle to an ordered-key map container
#[derive(Clone)]
pub struct MapRef {
    pub(crate) doc: Document,
    pub(crate) path: Path,
}

impl MapRef {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.doc.with_map(&self.path, |m| m.get(key).cloned())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.doc.with_map(&self.path, |m| m.contains_key(key))
    }

    /// Keys in iteration order (sorted)
    pub fn keys(&self) -> Vec<String> {
        self.doc.with_map(&self.path, |m| m.keys().cloned().collect())
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.doc.with_map(&self.path, |m| {
            m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        })
    }

    pub fn len(&self) -> usize {
        self.doc.with_map(&self.path, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set a key; last writer wins
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.doc.map_insert(&self.path, &key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.doc.map_remove(&self.path, key);
    }
}

impl PartialEq for MapRef {
    fn eq(&self, other: &Self) -> bool {
        self.doc.ptr_eq(&other.doc) && self.path == other.path
    }
}

impl fmt::Debug for MapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MapRef").field(&self.path.to_string()).finish()
    }
}

/// Handle to a list container
#[derive(Clone)]
pub struct ListRef {
    pub(crate) doc: Document,
    pub(crate) path: Path,
}

impl ListRef {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.doc.with_list(&self.path, |l| l.get(index).cloned())
    }

    pub fn len(&self) -> usize {
        self.doc.with_list(&self.path, |l| l.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.doc.with_list(&self.path, |l| l.to_vec())
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.doc.list_push(&self.path, value.into());
    }

    /// Insert at an index, clamped to the current length
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        self.doc.list_insert(&self.path, index, value.into());
    }

    pub fn remove(&self, index: usize) -> Option<Value> {
        self.doc.list_remove(&self.path, index)
    }
}

impl PartialEq for ListRef {
    fn eq(&self, other: &Self) -> bool {
        self.doc.ptr_eq(&other.doc) && self.path == other.path
    }
}

impl fmt::Debug for ListRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ListRef").field(&self.path.to_string()).finish()
    }
}

/// Handle to a text fragment container
///
/// Offsets are byte offsets into the fragment.
#[derive(Clone)]
pub struct TextRef {
    pub(crate) doc: Document,
    pub(crate) path: Path,
}

impl TextRef {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.doc.with_text(&self.path, |t| t.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn content(&self) -> String {
        self.doc.with_text(&self.path, |t| t.to_string())
    }

    pub fn push_str(&self, text: &str) {
        self.doc.text_push(&self.path, text);
    }

    pub fn insert(&self, offset: usize, text: &str) {
        self.doc.text_insert(&self.path, offset, text);
    }

    /// Delete `len` bytes starting at `offset`, clamped to the fragment
    pub fn delete(&self, offset: usize, len: usize) {
        self.doc.text_delete(&self.path, offset, len);
    }
}

impl PartialEq for TextRef {
    fn eq(&self, other: &Self) -> bool {
        self.doc.ptr_eq(&other.doc) && self.path == other.path
    }
}

impl fmt::Debug for TextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextRef").field(&self.path.to_string()).finish()
    }
}
