//! Tables of typed rows
//!
//! A table is a named, schema-typed view over a document. Its index container
//! (at the table name) holds the live row keys; each row's fields live under
//! `name.key`. Tables own nothing: two handles with the same name and schema
//! see the same rows.
//!
//! Row presence and row content are separate: `remove` only deletes the index
//! key, leaving the row's containers behind as a soft tombstone. A later
//! upsert of the same key revives them.

use crate::codec;
use crate::document::{Document, MapRef, Path};
use crate::error::TableError;
use crate::filter::Filter;
use crate::row::{Row, RowInput};
use crate::schema::{validate_value, RecordSchema, SchemaKind, StorageKind};
use crate::value::Value;
use crate::watch::{self, WatchEvent, WatchHandle, WatchLevel};
use crate::watch_key;
use std::sync::Arc;

/// A declared table
#[derive(Clone)]
pub struct Table {
    name: String,
    fields: Arc<RecordSchema>,
}

impl Table {
    /// Declare a table. The schema must carry a required inline string field
    /// named `key`; it identifies rows and is never stored.
    ///
    /// Table names must be unique within a document; redeclaring a name with
    /// a different schema is the caller's bug.
    pub fn new(name: impl Into<String>, mut schema: RecordSchema) -> Result<Self, TableError> {
        let name = name.into();
        match schema.remove_field("key") {
            Some(key_field)
                if matches!(key_field.kind, SchemaKind::String)
                    && !key_field.optional
                    && key_field.storage_kind() == StorageKind::Inline => {}
            _ => return Err(TableError::BadKeySchema(name)),
        }
        Ok(Self {
            name,
            fields: Arc::new(schema),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The row schema, minus the synthesised key field
    pub(crate) fn fields(&self) -> &RecordSchema {
        &self.fields
    }

    pub(crate) fn index_path(&self) -> Path {
        Path::root(self.name.clone())
    }

    pub(crate) fn row_path(&self, key: &str) -> Path {
        self.index_path().child(key)
    }

    /// The shallow row container for `key`
    pub(crate) fn row_container(&self, doc: &Document, key: &str) -> MapRef {
        doc.map(&self.row_path(key))
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Write a full row and mark it live.
    ///
    /// The row is validated first; an invalid row performs no mutations.
    /// Within the transaction the index entry is set last, so the row becomes
    /// logically present only after its fields are in place.
    pub fn upsert(&self, doc: &Document, row: &RowInput) -> Result<(), TableError> {
        if row.key().is_empty() {
            return Err(TableError::MissingKey);
        }
        crate::schema::validate_record(self.fields(), row.fields())?;

        let path = self.row_path(row.key());
        doc.transact(|| {
            codec::write_record(doc, self.fields(), &path, row.fields());
            doc.map(&self.index_path()).insert(row.key(), Value::Bool(true));
        });
        Ok(())
    }

    /// Merge a partial row into its containers without touching the index.
    ///
    /// Inline declared fields are validated individually; a type error fails
    /// the whole update before any write. Unknown fields are written as-is.
    /// If the row is not live, the writes are retained for a later revival.
    pub fn update(&self, doc: &Document, row: &RowInput) -> Result<(), TableError> {
        if row.key().is_empty() {
            return Err(TableError::MissingKey);
        }
        for (name, value) in row.fields() {
            if let Some(field) = self.fields().field(name) {
                if field.storage_kind() == StorageKind::Inline {
                    validate_value(field, value).map_err(|e| match e {
                        TableError::InvalidField { reason, .. } => TableError::InvalidField {
                            field: name.clone(),
                            reason,
                        },
                        other => other,
                    })?;
                }
            }
        }

        let path = self.row_path(row.key());
        doc.transact(|| codec::write_record(doc, self.fields(), &path, row.fields()));
        Ok(())
    }

    /// Soft-delete: remove the key from the index, leave the row containers
    pub fn remove(&self, doc: &Document, key: &str) {
        doc.map(&self.index_path()).remove(key);
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The validated row for `key`, or `None` if absent or not yet valid
    pub fn get(&self, doc: &Document, key: &str) -> Option<Row> {
        if doc.map(&self.index_path()).get(key).is_none() {
            return None;
        }
        codec::read_row(doc, self.fields(), &self.row_path(key))
    }

    /// All live rows matching `filter`, in index order.
    ///
    /// Rows that are logically present but fail validation are skipped; they
    /// are in transit, not errors.
    pub fn select(&self, doc: &Document, filter: &Filter) -> Vec<Row> {
        let mut rows = Vec::new();
        for key in doc.map(&self.index_path()).keys() {
            if !filter.eval(&self.row_container(doc, &key)) {
                continue;
            }
            if let Some(row) = codec::read_row(doc, self.fields(), &self.row_path(&key)) {
                rows.push(row);
            }
        }
        rows
    }

    // ------------------------------------------------------------------
    // Watchers
    // ------------------------------------------------------------------

    /// Subscribe to the live filtered row set. See [`crate::watch`].
    pub fn watch(
        &self,
        doc: &Document,
        filter: Filter,
        level: WatchLevel,
        callback: impl Fn(&WatchEvent) + Send + Sync + 'static,
    ) -> WatchHandle {
        watch::subscribe(self.clone(), doc.clone(), filter, level, Box::new(callback))
    }

    /// Subscribe to a single row. See [`crate::watch_key`].
    pub fn watch_key(
        &self,
        doc: &Document,
        key: impl Into<String>,
        level: WatchLevel,
        callback: impl Fn(Option<&Row>) + Send + Sync + 'static,
    ) -> WatchHandle {
        watch_key::subscribe(self.clone(), doc.clone(), key.into(), level, Box::new(callback))
    }
}
