//! Mutation events and observer plumbing
//!
//! A transaction coalesces mutations into at most one event per container.
//! Shallow observers fire for mutations of their container only; deep
//! observers fire once per transaction for any mutation at or below theirs.

use super::path::Path;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// How far below its container an observer reacts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserveDepth {
    /// Mutations of the container itself only
    Shallow,
    /// Any mutation at or under the container
    Deep,
}

/// Key changes of one map container within one transaction
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MapDelta {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl MapDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Keys that appeared or were re-written (everything but removals)
    pub fn touched(&self) -> impl Iterator<Item = &String> {
        self.added.iter().chain(self.updated.iter())
    }
}

/// Event delivered to an observer
///
/// `delta` carries the key changes when a shallow observer watches a map
/// container; deep observers receive no delta and are expected to re-read.
#[derive(Clone, Debug)]
pub struct ContainerEvent {
    /// The observed path (not necessarily the mutated one, for deep observers)
    pub path: Path,
    pub delta: Option<MapDelta>,
}

/// Net effect on one map key within a transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum KeyChange {
    Added,
    Updated,
    Removed,
}

/// Pending per-container changes, coalesced until commit
#[derive(Clone, Debug)]
pub(crate) enum PendingDelta {
    Map(std::collections::BTreeMap<String, KeyChange>),
    /// List and text containers report mutation without detail
    Opaque,
}

impl PendingDelta {
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            PendingDelta::Map(keys) => keys.is_empty(),
            PendingDelta::Opaque => false,
        }
    }

    pub(crate) fn to_map_delta(&self) -> Option<MapDelta> {
        match self {
            PendingDelta::Map(keys) => {
                let mut delta = MapDelta::default();
                for (key, change) in keys {
                    match change {
                        KeyChange::Added => delta.added.push(key.clone()),
                        KeyChange::Updated => delta.updated.push(key.clone()),
                        KeyChange::Removed => delta.removed.push(key.clone()),
                    }
                }
                Some(delta)
            }
            PendingDelta::Opaque => None,
        }
    }

    /// Fold one more key change in, keeping the net effect
    pub(crate) fn record_key(&mut self, key: &str, change: KeyChange) {
        let PendingDelta::Map(keys) = self else {
            return;
        };
        use KeyChange::*;
        let next = match (keys.get(key).copied(), change) {
            (None, c) => Some(c),
            // Added within this transaction, removed again: net no-op
            (Some(Added), Removed) => None,
            (Some(Added), _) => Some(Added),
            (Some(Updated), Removed) => Some(Removed),
            (Some(Updated), _) => Some(Updated),
            (Some(Removed), Added | Updated) => Some(Updated),
            (Some(Removed), Removed) => Some(Removed),
        };
        match next {
            Some(c) => {
                keys.insert(key.to_string(), c);
            }
            None => {
                keys.remove(key);
            }
        }
    }
}

/// One registered observer
#[derive(Clone)]
pub(crate) struct Observer {
    pub(crate) id: Uuid,
    pub(crate) path: Path,
    pub(crate) depth: ObserveDepth,
    pub(crate) callback: Arc<dyn Fn(&ContainerEvent) + Send + Sync>,
}
