//! Tessera - Typed Reactive Tables over a Replicated Document
//!
//! Tessera offers the illusion of tables of strongly-typed rows on top of a
//! shared replicated document. Callers declare tables with a declarative
//! schema; the library handles how each row decomposes into the document's
//! containers, how rows are validated on read, how they are queried, and how
//! live subscriptions stay consistent while rows replicate out of order and
//! arrive field by field.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │   Table API: upsert / update / remove / get / select      │
//! │   Watchers: watch (filtered set) / watch_key (single row) │
//! └──────────────────────────────┬────────────────────────────┘
//!                                │ schema-driven row codec
//!                                ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │   Document: path-addressed containers (map, list, text),  │
//! │   transactions, shallow/deep observation                  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # On-document layout
//!
//! For a table `T` and a row with key `K`: the index container at `T` maps
//! live keys to `true`; the row container at `T.K` holds inline fields;
//! nested records, unions, and raw containers live at `T.K.F`. Presence and
//! content are separate: `remove` only deletes the index entry, so row
//! content survives as a soft tombstone and a later upsert revives it.
//!
//! # Module Organization
//!
//! - [`document`]: the replicated document and its containers
//! - [`schema`]: declarative row schemas and storage decisions
//! - [`row`]: typed row views and write payloads
//! - [`table`]: table declaration, mutations, and one-shot reads
//! - [`filter`]: composable row predicates
//! - [`watch`]: live filtered subscriptions
//! - [`watch_key`]: single-row subscriptions
//! - [`error`]: error types

pub mod document;
pub mod error;
pub mod filter;
pub mod row;
pub mod schema;
pub mod table;
pub mod value;
pub mod watch;
pub mod watch_key;

mod codec;

pub use document::{ContainerKind, Document, ListRef, MapRef, Path, TextRef};
pub use error::TableError;
pub use filter::{and, any, eq, not, or, Filter};
pub use row::{Cell, Fields, Row, RowInput};
pub use schema::{FieldSchema, RecordSchema, UnionSchema};
pub use table::Table;
pub use value::Value;
pub use watch::{WatchEvent, WatchHandle, WatchLevel};
