//! Declarative row schemas
//!
//! A schema is a closed tree of node descriptors. Each field carries its node
//! kind plus the recognised storage options: `sync_as` forces sub-container
//! storage of a named kind, `shallow` opts a record or union back into inline
//! storage, `optional` relaxes presence. Storage choice is a pure function of
//! the field schema, so writers and readers derive it identically.

use crate::document::ContainerKind;
use crate::error::TableError;
use crate::value::Value;
use std::collections::BTreeMap;

/// Node kinds a field schema can take
#[derive(Clone, Debug)]
pub enum SchemaKind {
    String,
    Number,
    Boolean,
    /// Nested record, stored as its own map container unless shallow
    Record(RecordSchema),
    /// Tagged union discriminated by one field of its variants
    Union(UnionSchema),
    /// Raw shared container, mutated through its own handle
    Container(ContainerKind),
}

/// Where a field's value lives relative to its parent container
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageKind {
    /// A plain value inside the parent map container
    Inline,
    /// An own container at `parent_path.field`
    Container(ContainerKind),
}

/// One field of a record schema
#[derive(Clone, Debug)]
pub struct FieldSchema {
    pub kind: SchemaKind,
    pub sync_as: Option<ContainerKind>,
    pub shallow: bool,
    pub optional: bool,
}

impl FieldSchema {
    fn of(kind: SchemaKind) -> Self {
        Self {
            kind,
            sync_as: None,
            shallow: false,
            optional: false,
        }
    }

    pub fn string() -> Self {
        Self::of(SchemaKind::String)
    }

    pub fn number() -> Self {
        Self::of(SchemaKind::Number)
    }

    pub fn boolean() -> Self {
        Self::of(SchemaKind::Boolean)
    }

    pub fn record(schema: RecordSchema) -> Self {
        Self::of(SchemaKind::Record(schema))
    }

    pub fn union(schema: UnionSchema) -> Self {
        Self::of(SchemaKind::Union(schema))
    }

    /// Raw ordered-key map container
    pub fn map() -> Self {
        let mut f = Self::of(SchemaKind::Container(ContainerKind::Map));
        f.sync_as = Some(ContainerKind::Map);
        f
    }

    /// Raw list container
    pub fn list() -> Self {
        let mut f = Self::of(SchemaKind::Container(ContainerKind::List));
        f.sync_as = Some(ContainerKind::List);
        f
    }

    /// Raw text fragment container
    pub fn text() -> Self {
        let mut f = Self::of(SchemaKind::Container(ContainerKind::Text));
        f.sync_as = Some(ContainerKind::Text);
        f
    }

    /// Store this record or union inline in its parent container
    pub fn shallow(mut self) -> Self {
        self.shallow = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Force sub-container storage of the given kind
    pub fn sync_as(mut self, kind: ContainerKind) -> Self {
        self.sync_as = Some(kind);
        self
    }

    /// The storage decision for this field
    pub fn storage_kind(&self) -> StorageKind {
        if let Some(kind) = self.sync_as {
            return StorageKind::Container(kind);
        }
        if !self.shallow && matches!(self.kind, SchemaKind::Record(_) | SchemaKind::Union(_)) {
            return StorageKind::Container(ContainerKind::Map);
        }
        StorageKind::Inline
    }

    fn kind_name(&self) -> &'static str {
        match self.kind {
            SchemaKind::String => "string",
            SchemaKind::Number => "number",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Record(_) => "record",
            SchemaKind::Union(_) => "union",
            SchemaKind::Container(_) => "container",
        }
    }
}

/// An ordered set of named fields
#[derive(Clone, Debug, Default)]
pub struct RecordSchema {
    fields: BTreeMap<String, FieldSchema>,
}

impl RecordSchema {
    pub fn new<K: Into<String>>(fields: impl IntoIterator<Item = (K, FieldSchema)>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, field)| (name.into(), field))
                .collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldSchema)> {
        self.fields.iter()
    }

    pub(crate) fn remove_field(&mut self, name: &str) -> Option<FieldSchema> {
        self.fields.remove(name)
    }
}

/// A tagged union: the discriminator field's value selects the variant schema
#[derive(Clone, Debug)]
pub struct UnionSchema {
    tag: String,
    variants: BTreeMap<String, RecordSchema>,
}

impl UnionSchema {
    pub fn new<K: Into<String>>(
        tag: impl Into<String>,
        variants: impl IntoIterator<Item = (K, RecordSchema)>,
    ) -> Self {
        Self {
            tag: tag.into(),
            variants: variants
                .into_iter()
                .map(|(name, schema)| (name.into(), schema))
                .collect(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn variant(&self, name: &str) -> Option<&RecordSchema> {
        self.variants.get(name)
    }

    /// Select the variant for a write or decoded payload, by discriminator
    pub fn match_value(&self, value: &BTreeMap<String, Value>) -> Option<(&str, &RecordSchema)> {
        let tag = value.get(&self.tag)?.as_str()?;
        self.variants
            .get_key_value(tag)
            .map(|(name, schema)| (name.as_str(), schema))
    }
}

/// Check a plain value against a field schema
pub fn validate_value(field: &FieldSchema, value: &Value) -> Result<(), TableError> {
    match &field.kind {
        SchemaKind::String => match value {
            Value::String(_) => Ok(()),
            other => Err(mismatch(field, other)),
        },
        SchemaKind::Number => match value {
            Value::Int(_) | Value::Float(_) => Ok(()),
            other => Err(mismatch(field, other)),
        },
        SchemaKind::Boolean => match value {
            Value::Bool(_) => Ok(()),
            other => Err(mismatch(field, other)),
        },
        // Raw containers are not carried in row values
        SchemaKind::Container(_) => Ok(()),
        SchemaKind::Record(record) => match value {
            Value::Map(m) => validate_record(record, m),
            other => Err(mismatch(field, other)),
        },
        SchemaKind::Union(union) => match value {
            Value::Map(m) => match union.match_value(m) {
                Some((_, variant)) => validate_record(variant, m),
                None => Err(TableError::invalid(
                    union.tag.clone(),
                    "no union variant matches the discriminator",
                )),
            },
            other => Err(mismatch(field, other)),
        },
    }
}

/// Check a plain map against a record schema: every required field present
/// and valid. Unknown entries are permitted and left to the caller.
pub fn validate_record(
    schema: &RecordSchema,
    value: &BTreeMap<String, Value>,
) -> Result<(), TableError> {
    for (name, field) in schema.fields() {
        if matches!(field.kind, SchemaKind::Container(_)) {
            continue;
        }
        match value.get(name) {
            Some(v) => validate_value(field, v)
                .map_err(|e| nest(name, e))?,
            None if field.optional => {}
            None => return Err(TableError::MissingField(name.clone())),
        }
    }
    Ok(())
}

fn mismatch(field: &FieldSchema, value: &Value) -> TableError {
    TableError::invalid(
        String::new(),
        format!("expected {}, got {:?}", field.kind_name(), value),
    )
}

fn nest(name: &str, err: TableError) -> TableError {
    let join = |inner: String| {
        if inner.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", name, inner)
        }
    };
    match err {
        TableError::InvalidField { field, reason } => TableError::InvalidField {
            field: join(field),
            reason,
        },
        TableError::MissingField(field) => TableError::MissingField(join(field)),
        other => other,
    }
}
