//! The replicated document
//!
//! A `Document` owns a tree of shared containers addressed by dotted paths.
//! Everything above this module (tables, codecs, watchers) is a stateless
//! view over it.
//!
//! # Contract
//!
//! - Containers auto-allocate on first access through a typed handle.
//! - Mutations apply immediately; events coalesce to at most one per mutated
//!   container and are dispatched when the outermost transaction ends. A
//!   mutation outside `transact` is its own transaction.
//! - Shallow observers fire for their container only (map observers receive
//!   the key delta); deep observers fire once per transaction for any mutation
//!   at or under their path. Callbacks run synchronously after commit, in
//!   registration order, with no internal locks held.
//!
//! All access to one document is assumed to be funnelled through a single
//! cooperative execution context; the mutexes here guard nothing more than
//! handle aliasing.

mod containers;
mod event;
mod path;

pub use containers::{ContainerKind, ListRef, MapRef, TextRef};
pub use event::{ContainerEvent, MapDelta, ObserveDepth};
pub use path::Path;

use crate::error::TableError;
use crate::value::Value;
use containers::ContainerData;
use event::{KeyChange, Observer, PendingDelta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// A shared replicated document
#[derive(Clone)]
pub struct Document {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<DocState>,
    observers: Mutex<Vec<Observer>>,
}

#[derive(Default)]
struct DocState {
    containers: BTreeMap<Path, ContainerData>,
    txn_depth: u32,
    pending: BTreeMap<Path, PendingDelta>,
}

impl DocState {
    fn record_map(&mut self, path: &Path, key: &str, change: KeyChange) {
        self.pending
            .entry(path.clone())
            .or_insert_with(|| PendingDelta::Map(Default::default()))
            .record_key(key, change);
    }

    fn record_opaque(&mut self, path: &Path) {
        self.pending.entry(path.clone()).or_insert(PendingDelta::Opaque);
    }
}

/// Serialized form of a document's full container tree
#[derive(Serialize, Deserialize)]
struct Snapshot {
    containers: Vec<(Path, ContainerData)>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(DocState::default()),
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// True if both handles refer to the same document
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    // ------------------------------------------------------------------
    // Container handles
    // ------------------------------------------------------------------

    /// Ordered-key map container at `path`, allocated on first access
    pub fn map(&self, path: &Path) -> MapRef {
        self.alloc(path, ContainerKind::Map);
        MapRef {
            doc: self.clone(),
            path: path.clone(),
        }
    }

    /// List container at `path`, allocated on first access
    pub fn list(&self, path: &Path) -> ListRef {
        self.alloc(path, ContainerKind::List);
        ListRef {
            doc: self.clone(),
            path: path.clone(),
        }
    }

    /// Text container at `path`, allocated on first access
    pub fn text(&self, path: &Path) -> TextRef {
        self.alloc(path, ContainerKind::Text);
        TextRef {
            doc: self.clone(),
            path: path.clone(),
        }
    }

    fn alloc(&self, path: &Path, kind: ContainerKind) {
        let mut st = self.shared.state.lock().unwrap();
        st.containers
            .entry(path.clone())
            .or_insert_with(|| ContainerData::empty(kind));
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Run `f` under a transaction boundary. Nested calls join the outermost
    /// transaction; events flush when it ends.
    pub fn transact<R>(&self, f: impl FnOnce() -> R) -> R {
        {
            self.shared.state.lock().unwrap().txn_depth += 1;
        }
        let result = f();
        {
            self.shared.state.lock().unwrap().txn_depth -= 1;
        }
        self.flush();
        result
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Register an observer; returns its handle for `unobserve`
    pub fn observe(
        &self,
        path: &Path,
        depth: ObserveDepth,
        callback: impl Fn(&ContainerEvent) + Send + Sync + 'static,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.shared.observers.lock().unwrap().push(Observer {
            id,
            path: path.clone(),
            depth,
            callback: Arc::new(callback),
        });
        id
    }

    /// Remove an observer; unknown ids are ignored
    pub fn unobserve(&self, id: Uuid) {
        self.shared.observers.lock().unwrap().retain(|o| o.id != id);
    }

    /// Dispatch coalesced events if no transaction is open
    fn flush(&self) {
        let deltas: BTreeMap<Path, PendingDelta> = {
            let mut st = self.shared.state.lock().unwrap();
            if st.txn_depth != 0 || st.pending.is_empty() {
                return;
            }
            std::mem::take(&mut st.pending)
        };
        let deltas: BTreeMap<Path, PendingDelta> = deltas
            .into_iter()
            .filter(|(_, d)| !d.is_empty())
            .collect();
        if deltas.is_empty() {
            return;
        }

        // Snapshot the registry so callbacks may subscribe or unsubscribe
        // freely; newly registered observers do not see this transaction.
        let observers: Vec<Observer> = self.shared.observers.lock().unwrap().clone();
        let mut calls = Vec::new();
        for obs in observers {
            match obs.depth {
                ObserveDepth::Shallow => {
                    if let Some(delta) = deltas.get(&obs.path) {
                        calls.push((
                            obs.callback,
                            ContainerEvent {
                                path: obs.path,
                                delta: delta.to_map_delta(),
                            },
                        ));
                    }
                }
                ObserveDepth::Deep => {
                    if deltas.keys().any(|p| p.starts_with(&obs.path)) {
                        calls.push((
                            obs.callback,
                            ContainerEvent {
                                path: obs.path,
                                delta: None,
                            },
                        ));
                    }
                }
            }
        }
        for (callback, ev) in calls {
            callback(&ev);
        }
    }

    // ------------------------------------------------------------------
    // Container access (used by the typed handles)
    // ------------------------------------------------------------------

    pub(crate) fn with_map<R>(
        &self,
        path: &Path,
        f: impl FnOnce(&BTreeMap<String, Value>) -> R,
    ) -> R {
        let mut st = self.shared.state.lock().unwrap();
        let data = st
            .containers
            .entry(path.clone())
            .or_insert_with(|| ContainerData::empty(ContainerKind::Map));
        match data {
            ContainerData::Map(m) => f(m),
            _ => f(&BTreeMap::new()),
        }
    }

    pub(crate) fn map_insert(&self, path: &Path, key: &str, value: Value) {
        let fire = {
            let mut st = self.shared.state.lock().unwrap();
            let data = st
                .containers
                .entry(path.clone())
                .or_insert_with(|| ContainerData::empty(ContainerKind::Map));
            let change = match data {
                ContainerData::Map(m) => {
                    if m.insert(key.to_string(), value).is_some() {
                        KeyChange::Updated
                    } else {
                        KeyChange::Added
                    }
                }
                _ => return,
            };
            st.record_map(path, key, change);
            st.txn_depth == 0
        };
        if fire {
            self.flush();
        }
    }

    pub(crate) fn map_remove(&self, path: &Path, key: &str) {
        let fire = {
            let mut st = self.shared.state.lock().unwrap();
            let removed = match st.containers.get_mut(path) {
                Some(ContainerData::Map(m)) => m.remove(key).is_some(),
                _ => false,
            };
            if !removed {
                return;
            }
            st.record_map(path, key, KeyChange::Removed);
            st.txn_depth == 0
        };
        if fire {
            self.flush();
        }
    }

    pub(crate) fn with_list<R>(&self, path: &Path, f: impl FnOnce(&Vec<Value>) -> R) -> R {
        let mut st = self.shared.state.lock().unwrap();
        let data = st
            .containers
            .entry(path.clone())
            .or_insert_with(|| ContainerData::empty(ContainerKind::List));
        match data {
            ContainerData::List(l) => f(l),
            _ => f(&Vec::new()),
        }
    }

    pub(crate) fn list_push(&self, path: &Path, value: Value) {
        self.list_mutate(path, |l| {
            l.push(value);
            true
        });
    }

    pub(crate) fn list_insert(&self, path: &Path, index: usize, value: Value) {
        self.list_mutate(path, |l| {
            let index = index.min(l.len());
            l.insert(index, value);
            true
        });
    }

    pub(crate) fn list_remove(&self, path: &Path, index: usize) -> Option<Value> {
        let mut removed = None;
        self.list_mutate(path, |l| {
            if index < l.len() {
                removed = Some(l.remove(index));
                true
            } else {
                false
            }
        });
        removed
    }

    fn list_mutate(&self, path: &Path, f: impl FnOnce(&mut Vec<Value>) -> bool) {
        let fire = {
            let mut st = self.shared.state.lock().unwrap();
            let data = st
                .containers
                .entry(path.clone())
                .or_insert_with(|| ContainerData::empty(ContainerKind::List));
            let mutated = match data {
                ContainerData::List(l) => f(l),
                _ => return,
            };
            if !mutated {
                return;
            }
            st.record_opaque(path);
            st.txn_depth == 0
        };
        if fire {
            self.flush();
        }
    }

    pub(crate) fn with_text<R>(&self, path: &Path, f: impl FnOnce(&str) -> R) -> R {
        let mut st = self.shared.state.lock().unwrap();
        let data = st
            .containers
            .entry(path.clone())
            .or_insert_with(|| ContainerData::empty(ContainerKind::Text));
        match data {
            ContainerData::Text(t) => f(t),
            _ => f(""),
        }
    }

    pub(crate) fn text_push(&self, path: &Path, text: &str) {
        if text.is_empty() {
            return;
        }
        self.text_mutate(path, |t| {
            t.push_str(text);
            true
        });
    }

    pub(crate) fn text_insert(&self, path: &Path, offset: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        self.text_mutate(path, |t| {
            let mut offset = offset.min(t.len());
            while !t.is_char_boundary(offset) {
                offset -= 1;
            }
            t.insert_str(offset, text);
            true
        });
    }

    pub(crate) fn text_delete(&self, path: &Path, offset: usize, len: usize) {
        self.text_mutate(path, |t| {
            let mut start = offset.min(t.len());
            while !t.is_char_boundary(start) {
                start -= 1;
            }
            let mut end = offset.saturating_add(len).min(t.len());
            while !t.is_char_boundary(end) {
                end -= 1;
            }
            if end <= start {
                return false;
            }
            t.replace_range(start..end, "");
            true
        });
    }

    fn text_mutate(&self, path: &Path, f: impl FnOnce(&mut String) -> bool) {
        let fire = {
            let mut st = self.shared.state.lock().unwrap();
            let data = st
                .containers
                .entry(path.clone())
                .or_insert_with(|| ContainerData::empty(ContainerKind::Text));
            let mutated = match data {
                ContainerData::Text(t) => f(t),
                _ => return,
            };
            if !mutated {
                return;
            }
            st.record_opaque(path);
            st.txn_depth == 0
        };
        if fire {
            self.flush();
        }
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Serialize the full container tree
    pub fn to_json(&self) -> Result<serde_json::Value, TableError> {
        let snapshot = {
            let st = self.shared.state.lock().unwrap();
            Snapshot {
                containers: st
                    .containers
                    .iter()
                    .map(|(p, d)| (p.clone(), d.clone()))
                    .collect(),
            }
        };
        serde_json::to_value(&snapshot).map_err(|e| TableError::Snapshot(e.to_string()))
    }

    /// Rebuild a document from a snapshot; no events are emitted
    pub fn from_json(value: serde_json::Value) -> Result<Document, TableError> {
        let snapshot: Snapshot =
            serde_json::from_value(value).map_err(|e| TableError::Snapshot(e.to_string()))?;
        let doc = Document::new();
        {
            let mut st = doc.shared.state.lock().unwrap();
            st.containers = snapshot.containers.into_iter().collect();
        }
        Ok(doc)
    }

    /// Deterministic hash of the container tree, for convergence checks
    pub fn state_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let st = self.shared.state.lock().unwrap();
        let mut hasher = DefaultHasher::new();
        for (path, data) in &st.containers {
            path.to_string().hash(&mut hasher);
            match data {
                ContainerData::Map(m) => {
                    for (k, v) in m {
                        k.hash(&mut hasher);
                        format!("{:?}", v).hash(&mut hasher);
                    }
                }
                ContainerData::List(l) => {
                    for v in l {
                        format!("{:?}", v).hash(&mut hasher);
                    }
                }
                ContainerData::Text(t) => t.hash(&mut hasher),
            }
        }
        hasher.finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
