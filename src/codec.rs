//! Row decomposition
//!
//! Writes break a row payload into container mutations; reads assemble and
//! validate a row from its containers. Storage choice comes from the schema,
//! so both directions agree on where every field lives.
//!
//! Reads return `None` for anything partial or invalid. Mid-replication a row
//! may hold any subset of its fields; an unreadable row is treated as not yet
//! visible, never as an error.

use crate::document::{ContainerKind, Document, Path};
use crate::row::{Cell, Fields, Row};
use crate::schema::{validate_value, RecordSchema, SchemaKind, StorageKind};
use crate::value::Value;
use std::collections::BTreeMap;

/// Merge a record payload into the containers under `path`.
///
/// Only the fields present in `values` are touched. Unknown fields are
/// written inline as-is. Raw containers are never overwritten: their content
/// belongs to their own handles.
pub(crate) fn write_record(
    doc: &Document,
    schema: &RecordSchema,
    path: &Path,
    values: &BTreeMap<String, Value>,
) {
    let map = doc.map(path);
    for (name, value) in values {
        let Some(field) = schema.field(name) else {
            map.insert(name.clone(), value.clone());
            continue;
        };
        match field.storage_kind() {
            StorageKind::Inline => map.insert(name.clone(), value.clone()),
            StorageKind::Container(_) => match (&field.kind, value) {
                (SchemaKind::Record(record), Value::Map(m)) => {
                    write_record(doc, record, &path.child(name.clone()), m);
                }
                (SchemaKind::Union(union), Value::Map(m)) => match union.match_value(m) {
                    // The discriminator itself is unknown to the variant
                    // schema, so it lands inline in the sub-container.
                    Some((_, variant)) => {
                        write_record(doc, variant, &path.child(name.clone()), m);
                    }
                    None => {
                        log::debug!("dropping write for union field '{}': unmatched variant", name);
                    }
                },
                // Raw container, or a malformed composite payload
                _ => {}
            },
        }
    }
}

/// Assemble the fields under `path` according to `schema`.
///
/// Returns `None` if any required field is missing or fails validation.
pub(crate) fn read_record(doc: &Document, schema: &RecordSchema, path: &Path) -> Option<Fields> {
    let map = doc.map(path);
    let mut out = Fields::default();
    for (name, field) in schema.fields() {
        match (&field.kind, field.storage_kind()) {
            (SchemaKind::Record(record), StorageKind::Container(_)) => {
                let fields = read_record(doc, record, &path.child(name.clone()))?;
                out.insert(name.clone(), Cell::Record(fields));
            }
            (SchemaKind::Union(union), StorageKind::Container(_)) => {
                let child = path.child(name.clone());
                let tag = doc.map(&child).get(union.tag())?;
                let variant = union.variant(tag.as_str()?)?;
                let mut fields = read_record(doc, variant, &child)?;
                fields.insert(union.tag(), Cell::Value(tag));
                out.insert(name.clone(), Cell::Record(fields));
            }
            (&SchemaKind::Container(kind), _) | (_, StorageKind::Container(kind)) => {
                let child = path.child(name.clone());
                let cell = match kind {
                    ContainerKind::Map => Cell::Map(doc.map(&child)),
                    ContainerKind::List => Cell::List(doc.list(&child)),
                    ContainerKind::Text => Cell::Text(doc.text(&child)),
                };
                out.insert(name.clone(), cell);
            }
            _ => match map.get(name) {
                Some(value) => {
                    validate_value(field, &value).ok()?;
                    out.insert(name.clone(), Cell::Value(value));
                }
                None if field.optional => {}
                None => return None,
            },
        }
    }
    Some(out)
}

/// Read the row at `path` without consulting the table index.
///
/// The key is synthesised from the final path segment; it is never stored.
pub(crate) fn read_row(doc: &Document, schema: &RecordSchema, path: &Path) -> Option<Row> {
    let fields = read_record(doc, schema, path)?;
    let key = path.leaf()?.to_string();
    Some(Row::new(key, fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSchema, UnionSchema};

    fn doc_schema() -> RecordSchema {
        RecordSchema::new([
            ("title", FieldSchema::string()),
            ("done", FieldSchema::boolean()),
            (
                "meta",
                FieldSchema::record(RecordSchema::new([("rank", FieldSchema::number())])),
            ),
            (
                "origin",
                FieldSchema::record(RecordSchema::new([("host", FieldSchema::string())])).shallow(),
            ),
            ("body", FieldSchema::text()),
        ])
    }

    fn write_full(doc: &Document, path: &Path) {
        let values = BTreeMap::from([
            ("title".to_string(), Value::string("first")),
            ("done".to_string(), Value::Bool(false)),
            ("meta".to_string(), Value::map([("rank", 3i64)])),
            (
                "origin".to_string(),
                Value::map([("host", Value::string("local"))]),
            ),
        ]);
        doc.transact(|| write_record(doc, &doc_schema(), path, &values));
    }

    #[test]
    fn test_write_read_round_trip() {
        let doc = Document::new();
        let path = Path::root("notes").child("n1");
        write_full(&doc, &path);

        let row = read_row(&doc, &doc_schema(), &path).unwrap();
        assert_eq!(row.key(), "n1");
        assert_eq!(row.value("title"), Some(&Value::string("first")));
        assert_eq!(
            row.record("meta").and_then(|m| m.value("rank")),
            Some(&Value::Int(3))
        );
        // shallow record comes back as one inline value
        assert_eq!(
            row.value("origin"),
            Some(&Value::map([("host", Value::string("local"))]))
        );
        // raw text container handle is live
        row.text("body").unwrap().push_str("hello");
        assert_eq!(doc.text(&path.child("body")).content(), "hello");
    }

    #[test]
    fn test_nested_record_is_own_container() {
        let doc = Document::new();
        let path = Path::root("notes").child("n1");
        write_full(&doc, &path);

        // the inline row container has no 'meta' entry
        assert_eq!(doc.map(&path).get("meta"), None);
        assert_eq!(
            doc.map(&path.child("meta")).get("rank"),
            Some(Value::Int(3))
        );
    }

    #[test]
    fn test_partial_row_reads_as_none() {
        let doc = Document::new();
        let path = Path::root("notes").child("n1");
        let values = BTreeMap::from([("title".to_string(), Value::string("only"))]);
        doc.transact(|| write_record(&doc, &doc_schema(), &path, &values));

        assert!(read_row(&doc, &doc_schema(), &path).is_none());
    }

    #[test]
    fn test_type_error_reads_as_none() {
        let doc = Document::new();
        let path = Path::root("notes").child("n1");
        write_full(&doc, &path);
        doc.map(&path).insert("done", Value::string("not a bool"));

        assert!(read_row(&doc, &doc_schema(), &path).is_none());
    }

    #[test]
    fn test_union_write_and_read() {
        let union = UnionSchema::new(
            "type",
            [
                (
                    "text",
                    RecordSchema::new([("content", FieldSchema::string())]),
                ),
                (
                    "number",
                    RecordSchema::new([("value", FieldSchema::number())]),
                ),
            ],
        );
        let schema = RecordSchema::new([("variant", FieldSchema::union(union))]);
        let doc = Document::new();
        let path = Path::root("v").child("k1");

        let values = BTreeMap::from([(
            "variant".to_string(),
            Value::map([("type", Value::string("text")), ("content", Value::string("hello"))]),
        )]);
        doc.transact(|| write_record(&doc, &schema, &path, &values));

        let row = read_row(&doc, &schema, &path).unwrap();
        let variant = row.record("variant").unwrap();
        assert_eq!(variant.value("type"), Some(&Value::string("text")));
        assert_eq!(variant.value("content"), Some(&Value::string("hello")));

        // switch variants; stale fields of the old variant are ignored
        let values = BTreeMap::from([(
            "variant".to_string(),
            Value::map([("type", Value::string("number")), ("value", Value::Int(42))]),
        )]);
        doc.transact(|| write_record(&doc, &schema, &path, &values));

        let row = read_row(&doc, &schema, &path).unwrap();
        let variant = row.record("variant").unwrap();
        assert_eq!(variant.value("type"), Some(&Value::string("number")));
        assert_eq!(variant.value("value"), Some(&Value::Int(42)));
        assert_eq!(variant.value("content"), None);
    }

    #[test]
    fn test_unknown_variant_write_is_dropped() {
        let union = UnionSchema::new(
            "type",
            [(
                "text",
                RecordSchema::new([("content", FieldSchema::string())]),
            )],
        );
        let schema = RecordSchema::new([("variant", FieldSchema::union(union))]);
        let doc = Document::new();
        let path = Path::root("v").child("k1");

        let values = BTreeMap::from([(
            "variant".to_string(),
            Value::map([("type", Value::string("mystery"))]),
        )]);
        doc.transact(|| write_record(&doc, &schema, &path, &values));

        assert!(doc.map(&path.child("variant")).is_empty());
    }

    #[test]
    fn test_raw_container_never_overwritten() {
        let doc = Document::new();
        let path = Path::root("notes").child("n1");
        write_full(&doc, &path);
        doc.text(&path.child("body")).push_str("kept");

        // a second write naming the raw field leaves its content alone
        let values = BTreeMap::from([("body".to_string(), Value::string("clobber"))]);
        doc.transact(|| write_record(&doc, &doc_schema(), &path, &values));

        assert_eq!(doc.text(&path.child("body")).content(), "kept");
        assert_eq!(doc.map(&path).get("body"), None);
    }
}
