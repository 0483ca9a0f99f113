//! Typed row views and write payloads
//!
//! A `Row` is the validated read-side view of one table row: plain values for
//! inline fields, decoded field sets for nested records and unions, and live
//! container handles for raw fields. Writes go through `RowInput`, a plain
//! key-plus-values payload.

use crate::document::{ListRef, MapRef, TextRef};
use crate::value::Value;
use std::collections::BTreeMap;

/// One decoded field of a row
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    /// An inline value
    Value(Value),
    /// A decoded sub-container record or union
    Record(Fields),
    /// Raw map container handle
    Map(MapRef),
    /// Raw list container handle
    List(ListRef),
    /// Raw text container handle
    Text(TextRef),
}

/// A decoded set of named cells
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fields {
    cells: BTreeMap<String, Cell>,
}

impl Fields {
    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.cells.get(name)
    }

    /// The inline value of a field, if it is one
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.cells.get(name) {
            Some(Cell::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// The decoded fields of a nested record or union
    pub fn record(&self, name: &str) -> Option<&Fields> {
        match self.cells.get(name) {
            Some(Cell::Record(f)) => Some(f),
            _ => None,
        }
    }

    pub fn map(&self, name: &str) -> Option<&MapRef> {
        match self.cells.get(name) {
            Some(Cell::Map(m)) => Some(m),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&ListRef> {
        match self.cells.get(name) {
            Some(Cell::List(l)) => Some(l),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&TextRef> {
        match self.cells.get(name) {
            Some(Cell::Text(t)) => Some(t),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Cell)> {
        self.cells.iter()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, cell: Cell) {
        self.cells.insert(name.into(), cell);
    }
}

/// A validated, visible row
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    key: String,
    fields: Fields,
}

impl Row {
    pub(crate) fn new(key: String, fields: Fields) -> Self {
        Self { key, fields }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.fields.value(name)
    }

    pub fn record(&self, name: &str) -> Option<&Fields> {
        self.fields.record(name)
    }

    pub fn map(&self, name: &str) -> Option<&MapRef> {
        self.fields.map(name)
    }

    pub fn list(&self, name: &str) -> Option<&ListRef> {
        self.fields.list(name)
    }

    pub fn text(&self, name: &str) -> Option<&TextRef> {
        self.fields.text(name)
    }
}

/// Write payload for `upsert` and `update`
#[derive(Clone, Debug, Default)]
pub struct RowInput {
    key: String,
    fields: BTreeMap<String, Value>,
}

impl RowInput {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add one field value; omitted fields are left untouched by writes
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }
}
