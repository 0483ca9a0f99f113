//! Single-row subscriptions
//!
//! The single-key form of [`crate::watch`]: the callback receives the current
//! validated row or `None`, immediately on subscribe and then on appear, on
//! disappear, and on content changes at the requested level. Partial states
//! are swallowed; a row that is present but not yet valid reports `None`
//! until it first reads whole.

use crate::codec;
use crate::document::{ContainerEvent, Document, MapDelta, ObserveDepth};
use crate::row::Row;
use crate::table::Table;
use crate::watch::{WatchHandle, WatchLevel};
use std::sync::{Arc, Mutex, Weak};
use uuid::Uuid;

type Callback = Box<dyn Fn(Option<&Row>) + Send + Sync>;

enum Wire {
    Observer(Uuid),
    Waiter(Uuid),
}

impl Wire {
    fn id(&self) -> Uuid {
        match self {
            Wire::Observer(id) | Wire::Waiter(id) => *id,
        }
    }
}

struct KeyWatchState {
    doc: Document,
    table: Table,
    key: String,
    level: WatchLevel,
    callback: Callback,
    wire: Mutex<Option<Wire>>,
    index_sub: Mutex<Option<Uuid>>,
}

pub(crate) fn subscribe(
    table: Table,
    doc: Document,
    key: String,
    level: WatchLevel,
    callback: Callback,
) -> WatchHandle {
    let state = Arc::new(KeyWatchState {
        doc: doc.clone(),
        table: table.clone(),
        key,
        level,
        callback,
        wire: Mutex::new(None),
        index_sub: Mutex::new(None),
    });

    let weak = Arc::downgrade(&state);
    let sub = doc.observe(&table.index_path(), ObserveDepth::Shallow, move |ev| {
        if let (Some(st), Some(delta)) = (weak.upgrade(), &ev.delta) {
            on_index_event(&st, delta);
        }
    });
    *state.index_sub.lock().unwrap() = Some(sub);

    // Immediate delivery of the current state.
    if doc.map(&table.index_path()).contains_key(&state.key) {
        match read(&state) {
            Some(row) => {
                attach_observer(&state);
                (state.callback)(Some(&row));
            }
            None => {
                attach_waiter(&state);
                (state.callback)(None);
            }
        }
    } else {
        (state.callback)(None);
    }

    let teardown_state = state.clone();
    WatchHandle::new(move || teardown(&teardown_state))
}

fn read(state: &KeyWatchState) -> Option<Row> {
    codec::read_row(
        &state.doc,
        state.table.fields(),
        &state.table.row_path(&state.key),
    )
}

fn attach_observer(state: &Arc<KeyWatchState>) {
    let depth = match state.level {
        WatchLevel::Keys => return,
        WatchLevel::Content => ObserveDepth::Shallow,
        WatchLevel::Deep => ObserveDepth::Deep,
    };
    let weak = Arc::downgrade(state);
    let id = state.doc.observe(
        &state.table.row_path(&state.key),
        depth,
        move |_: &ContainerEvent| {
            if let Some(st) = weak.upgrade() {
                on_row_fire(&st);
            }
        },
    );
    *state.wire.lock().unwrap() = Some(Wire::Observer(id));
}

fn attach_waiter(state: &Arc<KeyWatchState>) {
    let weak: Weak<KeyWatchState> = Arc::downgrade(state);
    let id = state.doc.observe(
        &state.table.row_path(&state.key),
        ObserveDepth::Deep,
        move |_: &ContainerEvent| {
            if let Some(st) = weak.upgrade() {
                on_waiter_fire(&st);
            }
        },
    );
    *state.wire.lock().unwrap() = Some(Wire::Waiter(id));
}

fn unwire(state: &KeyWatchState) {
    let wire = state.wire.lock().unwrap().take();
    if let Some(wire) = wire {
        state.doc.unobserve(wire.id());
    }
}

fn on_index_event(state: &Arc<KeyWatchState>, delta: &MapDelta) {
    if delta.removed.iter().any(|k| k == &state.key) {
        unwire(state);
        (state.callback)(None);
        return;
    }
    // Appearances only: a rewritten index sentinel for a live row is not an
    // appear, and content changes belong to the row observer.
    if delta.added.iter().any(|k| k == &state.key) {
        if state.wire.lock().unwrap().is_some() {
            return;
        }
        match read(state) {
            Some(row) => {
                attach_observer(state);
                (state.callback)(Some(&row));
            }
            None => attach_waiter(state),
        }
    }
}

fn on_row_fire(state: &Arc<KeyWatchState>) {
    if !matches!(*state.wire.lock().unwrap(), Some(Wire::Observer(_))) {
        return;
    }
    // Partial states are swallowed; only whole rows are reported.
    if let Some(row) = read(state) {
        (state.callback)(Some(&row));
    }
}

fn on_waiter_fire(state: &Arc<KeyWatchState>) {
    if !matches!(*state.wire.lock().unwrap(), Some(Wire::Waiter(_))) {
        return;
    }
    if let Some(row) = read(state) {
        unwire(state);
        attach_observer(state);
        (state.callback)(Some(&row));
    }
}

fn teardown(state: &KeyWatchState) {
    let sub = state.index_sub.lock().unwrap().take();
    let Some(sub) = sub else {
        return;
    };
    state.doc.unobserve(sub);
    unwire(state);
}
