//! Live filtered subscriptions
//!
//! A watcher maintains, for one filter over one table, the set of visible
//! rows (live, filter-matching, schema-valid) and notifies its callback
//! with added/removed/changed deltas as the document mutates, locally or by
//! remote merge.
//!
//! Rows may replicate field by field, so a logically-present row can fail
//! validation for a while. Admission is deferred: such a row gets a deep
//! "waiter" observer that retries on every mutation beneath it and promotes
//! the row to visible once it first reads valid. Visible rows get a row
//! observer matched to the subscription level: none for `Keys`, shallow for
//! `Content`, deep for `Deep`.
//!
//! One asymmetry is deliberate: a visible row that stops matching the filter
//! is removed, but a non-visible row that starts matching through a plain
//! field change is not noticed, because non-visible rows carry no observer.
//! Re-admission happens on the next index event for that key.

use crate::codec;
use crate::document::{ContainerEvent, Document, MapDelta, ObserveDepth};
use crate::filter::Filter;
use crate::row::Row;
use crate::table::Table;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// What a subscription reacts to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchLevel {
    /// Index add/remove only; `changed` never fires
    Keys,
    /// Index events plus inline-field mutations of the row container
    Content,
    /// Index events plus any mutation under the row container
    Deep,
}

/// One notification to a subscriber
///
/// The three groups are disjoint. `visible` is a snapshot of the full
/// key-to-row mapping after this delta was applied.
#[derive(Clone, Debug)]
pub struct WatchEvent {
    pub added: Vec<Row>,
    pub removed: Vec<Row>,
    pub changed: Vec<Row>,
    pub visible: BTreeMap<String, Row>,
}

/// Subscription handle. Dropping it unsubscribes.
pub struct WatchHandle {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl WatchHandle {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Detach all observers. Idempotent; emits nothing.
    pub fn unsubscribe(&self) {
        if let Some(cancel) = self.cancel.lock().unwrap().take() {
            cancel();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

type Callback = Box<dyn Fn(&WatchEvent) + Send + Sync>;

/// Observer wiring for one key
enum Wire {
    /// Level-graded observer on a visible row
    Observer(Uuid),
    /// Deep wait-until-valid observer on a pending row
    Waiter(Uuid),
}

impl Wire {
    fn id(&self) -> Uuid {
        match self {
            Wire::Observer(id) | Wire::Waiter(id) => *id,
        }
    }
}

struct WatchState {
    doc: Document,
    table: Table,
    filter: Filter,
    level: WatchLevel,
    callback: Callback,
    visible: Mutex<BTreeMap<String, Row>>,
    wires: Mutex<HashMap<String, Wire>>,
    index_sub: Mutex<Option<Uuid>>,
}

enum Admit {
    Visible(Row),
    Pending,
    FilteredOut,
}

pub(crate) fn subscribe(
    table: Table,
    doc: Document,
    filter: Filter,
    level: WatchLevel,
    callback: Callback,
) -> WatchHandle {
    let state = Arc::new(WatchState {
        doc: doc.clone(),
        table: table.clone(),
        filter,
        level,
        callback,
        visible: Mutex::new(BTreeMap::new()),
        wires: Mutex::new(HashMap::new()),
        index_sub: Mutex::new(None),
    });

    let weak = Arc::downgrade(&state);
    let sub = doc.observe(&table.index_path(), ObserveDepth::Shallow, move |ev| {
        if let (Some(st), Some(delta)) = (weak.upgrade(), &ev.delta) {
            on_index_event(&st, delta);
        }
    });
    *state.index_sub.lock().unwrap() = Some(sub);

    // Seed synchronously: every currently-live key is admitted the same way
    // an index add would admit it, then delivered as one initial call.
    let mut added = Vec::new();
    for key in doc.map(&table.index_path()).keys() {
        if let Admit::Visible(row) = try_admit(&state, &key) {
            added.push(row);
        }
    }
    if !added.is_empty() {
        emit(&state, added, Vec::new(), Vec::new());
    }

    let teardown_state = state.clone();
    WatchHandle::new(move || teardown(&teardown_state))
}

/// Evaluate one key that is not currently visible or pending
fn try_admit(state: &Arc<WatchState>, key: &str) -> Admit {
    if !state.filter.eval(&state.table.row_container(&state.doc, key)) {
        return Admit::FilteredOut;
    }
    let path = state.table.row_path(key);
    match codec::read_row(&state.doc, state.table.fields(), &path) {
        Some(row) => {
            attach_row_observer(state, key);
            state
                .visible
                .lock()
                .unwrap()
                .insert(key.to_string(), row.clone());
            Admit::Visible(row)
        }
        None => {
            // Partial row: wait for it to become readable.
            let weak = Arc::downgrade(state);
            let wkey = key.to_string();
            let id = state
                .doc
                .observe(&path, ObserveDepth::Deep, move |_: &ContainerEvent| {
                    if let Some(st) = weak.upgrade() {
                        on_waiter_fire(&st, &wkey);
                    }
                });
            state
                .wires
                .lock()
                .unwrap()
                .insert(key.to_string(), Wire::Waiter(id));
            Admit::Pending
        }
    }
}

fn attach_row_observer(state: &Arc<WatchState>, key: &str) {
    let depth = match state.level {
        WatchLevel::Keys => return,
        WatchLevel::Content => ObserveDepth::Shallow,
        WatchLevel::Deep => ObserveDepth::Deep,
    };
    let weak = Arc::downgrade(state);
    let wkey = key.to_string();
    let id = state
        .doc
        .observe(&state.table.row_path(key), depth, move |_: &ContainerEvent| {
            if let Some(st) = weak.upgrade() {
                on_row_fire(&st, &wkey);
            }
        });
    state
        .wires
        .lock()
        .unwrap()
        .insert(key.to_string(), Wire::Observer(id));
}

fn unwire(state: &WatchState, key: &str) {
    let wire = state.wires.lock().unwrap().remove(key);
    if let Some(wire) = wire {
        state.doc.unobserve(wire.id());
    }
}

/// Index add/remove/update for the table. Admissions and removals caused by
/// the same transaction are batched into one emission.
fn on_index_event(state: &Arc<WatchState>, delta: &MapDelta) {
    let mut added = Vec::new();
    let mut removed = Vec::new();

    for key in &delta.removed {
        unwire(state, key);
        if let Some(row) = state.visible.lock().unwrap().remove(key) {
            removed.push(row);
        }
        // Keys that were filtered out or still pending disappear silently.
    }

    for key in delta.touched() {
        let is_visible = state.visible.lock().unwrap().contains_key(key);
        if is_visible {
            // The same transaction may have rewritten fields; a visible row
            // that no longer matches leaves in this emission.
            if !state.filter.eval(&state.table.row_container(&state.doc, key)) {
                unwire(state, key);
                if let Some(row) = state.visible.lock().unwrap().remove(key) {
                    removed.push(row);
                }
            }
            // Still matching: content changes are the row observer's job.
        } else if state.wires.lock().unwrap().contains_key(key) {
            // Already pending; its waiter retries on row mutations.
        } else if let Admit::Visible(row) = try_admit(state, key) {
            added.push(row);
        }
    }

    emit(state, added, removed, Vec::new());
}

/// A visible row's observer fired at the subscription level
fn on_row_fire(state: &Arc<WatchState>, key: &str) {
    // Stale guard: the wire may have been torn down earlier in this dispatch.
    if !matches!(
        state.wires.lock().unwrap().get(key),
        Some(Wire::Observer(_))
    ) {
        return;
    }

    if !state.filter.eval(&state.table.row_container(&state.doc, key)) {
        unwire(state, key);
        let row = state.visible.lock().unwrap().remove(key);
        if let Some(row) = row {
            emit(state, Vec::new(), vec![row], Vec::new());
        }
        return;
    }

    match codec::read_row(&state.doc, state.table.fields(), &state.table.row_path(key)) {
        Some(row) => {
            state
                .visible
                .lock()
                .unwrap()
                .insert(key.to_string(), row.clone());
            emit(state, Vec::new(), Vec::new(), vec![row]);
        }
        // Another partial-replication window; the next fire retries.
        None => {}
    }
}

/// A pending row mutated; retry admission
fn on_waiter_fire(state: &Arc<WatchState>, key: &str) {
    if !matches!(state.wires.lock().unwrap().get(key), Some(Wire::Waiter(_))) {
        return;
    }
    if !state.filter.eval(&state.table.row_container(&state.doc, key)) {
        // Not matching yet; fields may still be arriving. Keep waiting.
        return;
    }
    match codec::read_row(&state.doc, state.table.fields(), &state.table.row_path(key)) {
        Some(row) => {
            unwire(state, key);
            attach_row_observer(state, key);
            state
                .visible
                .lock()
                .unwrap()
                .insert(key.to_string(), row.clone());
            emit(state, vec![row], Vec::new(), Vec::new());
        }
        None => {}
    }
}

/// Deliver one notification; zero-delta calls are suppressed
fn emit(state: &WatchState, added: Vec<Row>, removed: Vec<Row>, changed: Vec<Row>) {
    if added.is_empty() && removed.is_empty() && changed.is_empty() {
        return;
    }
    let visible = state.visible.lock().unwrap().clone();
    let event = WatchEvent {
        added,
        removed,
        changed,
        visible,
    };
    (state.callback)(&event);
}

fn teardown(state: &WatchState) {
    let sub = state.index_sub.lock().unwrap().take();
    let Some(sub) = sub else {
        return;
    };
    state.doc.unobserve(sub);
    let wires: Vec<Wire> = state
        .wires
        .lock()
        .unwrap()
        .drain()
        .map(|(_, wire)| wire)
        .collect();
    for wire in wires {
        state.doc.unobserve(wire.id());
    }
    state.visible.lock().unwrap().clear();
}
