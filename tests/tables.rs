//! Table lifecycle integration tests
//!
//! Covers declaration, upsert/update/remove, point reads, select with
//! composed filters, soft-delete semantics, and tagged-union round trips.

use std::collections::BTreeSet;

use tessera::{
    and, any, eq, not, or, Document, FieldSchema, Filter, RecordSchema, Row, RowInput, Table,
    UnionSchema, Value,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `{key: string, foo: boolean, bar: string}`
fn task_table() -> Table {
    Table::new(
        "tasks",
        RecordSchema::new([
            ("key", FieldSchema::string()),
            ("foo", FieldSchema::boolean()),
            ("bar", FieldSchema::string()),
        ]),
    )
    .unwrap()
}

fn keys(rows: &[Row]) -> BTreeSet<String> {
    rows.iter().map(|r| r.key().to_string()).collect()
}

fn select_keys(table: &Table, doc: &Document, filter: &Filter) -> BTreeSet<String> {
    keys(&table.select(doc, filter))
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

#[test]
fn test_simple_crud() {
    let doc = Document::new();
    let table = task_table();

    table
        .upsert(&doc, &RowInput::new("first").field("foo", true).field("bar", "baz"))
        .unwrap();
    table
        .upsert(&doc, &RowInput::new("second").field("foo", false).field("bar", "test"))
        .unwrap();

    let row = table.get(&doc, "first").unwrap();
    assert_eq!(row.key(), "first");
    assert_eq!(row.value("foo"), Some(&Value::Bool(true)));
    assert_eq!(row.value("bar"), Some(&Value::string("baz")));

    let matching = table.select(&doc, &eq("foo", true));
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].key(), "first");

    let either = table.select(&doc, &or([eq("foo", false), eq("bar", "baz")]));
    assert_eq!(either.len(), 2);

    // every upserted row is in the unfiltered selection
    assert_eq!(
        select_keys(&table, &doc, &any()),
        BTreeSet::from(["first".to_string(), "second".to_string()])
    );
}

#[test]
fn test_noop_update_leaves_row_unchanged() {
    let doc = Document::new();
    let table = task_table();

    table
        .upsert(&doc, &RowInput::new("first").field("foo", true).field("bar", "baz"))
        .unwrap();
    let before = table.get(&doc, "first").unwrap();

    table.update(&doc, &RowInput::new("first")).unwrap();
    assert_eq!(table.get(&doc, "first").unwrap(), before);
}

#[test]
fn test_partial_update_merges() {
    let doc = Document::new();
    let table = Table::new(
        "nums",
        RecordSchema::new([
            ("key", FieldSchema::string()),
            ("a", FieldSchema::number()),
            ("b", FieldSchema::number()),
        ]),
    )
    .unwrap();

    table
        .upsert(&doc, &RowInput::new("k").field("a", 1i64).field("b", 2i64))
        .unwrap();
    table.update(&doc, &RowInput::new("k").field("a", 9i64)).unwrap();

    let row = table.get(&doc, "k").unwrap();
    assert_eq!(row.value("a"), Some(&Value::Int(9)));
    assert_eq!(row.value("b"), Some(&Value::Int(2)));
}

#[test]
fn test_update_retained_before_row_is_live() {
    let doc = Document::new();
    let table = task_table();

    // update of a row that is not logically present: writes are retained
    table
        .update(&doc, &RowInput::new("ghost").field("bar", "early"))
        .unwrap();
    assert!(table.get(&doc, "ghost").is_none());

    table
        .upsert(&doc, &RowInput::new("ghost").field("foo", true).field("bar", "late"))
        .unwrap();
    let row = table.get(&doc, "ghost").unwrap();
    assert_eq!(row.value("bar"), Some(&Value::string("late")));
}

// ---------------------------------------------------------------------------
// Soft deletion
// ---------------------------------------------------------------------------

#[test]
fn test_soft_delete_hides_but_preserves_containers() {
    let doc = Document::new();
    let table = Table::new(
        "notes",
        RecordSchema::new([
            ("key", FieldSchema::string()),
            ("title", FieldSchema::string()),
            ("body", FieldSchema::text()),
        ]),
    )
    .unwrap();

    table
        .upsert(&doc, &RowInput::new("n1").field("title", "kept"))
        .unwrap();
    table.get(&doc, "n1").unwrap().text("body").unwrap().push_str("content");

    table.remove(&doc, "n1");
    assert!(table.get(&doc, "n1").is_none());
    assert!(select_keys(&table, &doc, &any()).is_empty());

    // the raw container behind the tombstone is still there
    let body = tessera::Path::root("notes").child("n1").child("body");
    assert_eq!(doc.text(&body).content(), "content");
}

#[test]
fn test_upsert_after_remove_revives() {
    let doc = Document::new();
    let table = Table::new(
        "notes",
        RecordSchema::new([
            ("key", FieldSchema::string()),
            ("title", FieldSchema::string()),
            ("body", FieldSchema::text()),
        ]),
    )
    .unwrap();

    table
        .upsert(&doc, &RowInput::new("n1").field("title", "old"))
        .unwrap();
    table.get(&doc, "n1").unwrap().text("body").unwrap().push_str("survives");
    table.remove(&doc, "n1");

    table
        .upsert(&doc, &RowInput::new("n1").field("title", "new"))
        .unwrap();
    let row = table.get(&doc, "n1").unwrap();
    assert_eq!(row.value("title"), Some(&Value::string("new")));
    assert_eq!(row.text("body").unwrap().content(), "survives");
}

#[test]
fn test_remove_unknown_key_is_silent() {
    let doc = Document::new();
    let table = task_table();
    table.remove(&doc, "never-existed");
    assert!(table.get(&doc, "never-existed").is_none());
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

#[test]
fn test_filter_join_matches_set_algebra() {
    let doc = Document::new();
    let table = task_table();

    for (key, foo, bar) in [
        ("a", true, "x"),
        ("b", true, "y"),
        ("c", false, "x"),
        ("d", false, "y"),
    ] {
        table
            .upsert(&doc, &RowInput::new(key).field("foo", foo).field("bar", bar))
            .unwrap();
    }

    let f = eq("foo", true);
    let g = eq("bar", "x");

    let f_keys = select_keys(&table, &doc, &f);
    let g_keys = select_keys(&table, &doc, &g);

    let intersection: BTreeSet<String> = f_keys.intersection(&g_keys).cloned().collect();
    let union: BTreeSet<String> = f_keys.union(&g_keys).cloned().collect();

    assert_eq!(select_keys(&table, &doc, &and([f.clone(), g.clone()])), intersection);
    assert_eq!(select_keys(&table, &doc, &or([f.clone(), g.clone()])), union);
    assert_eq!(
        select_keys(&table, &doc, &not(f)),
        BTreeSet::from(["c".to_string(), "d".to_string()])
    );
}

#[test]
fn test_select_order_follows_index_order() {
    let doc = Document::new();
    let table = task_table();

    for key in ["zebra", "apple", "mango"] {
        table
            .upsert(&doc, &RowInput::new(key).field("foo", true).field("bar", ""))
            .unwrap();
    }

    let rows = table.select(&doc, &any());
    let order: Vec<&str> = rows.iter().map(|r| r.key()).collect();
    assert_eq!(order, vec!["apple", "mango", "zebra"]);
}

// ---------------------------------------------------------------------------
// Raw containers
// ---------------------------------------------------------------------------

#[test]
fn test_raw_map_survives_re_reads() {
    let doc = Document::new();
    let table = Table::new(
        "u",
        RecordSchema::new([("key", FieldSchema::string()), ("m", FieldSchema::map())]),
    )
    .unwrap();

    table.upsert(&doc, &RowInput::new("r")).unwrap();

    let row = table.get(&doc, "r").unwrap();
    row.map("m").unwrap().insert("k", "v");

    let again = table.get(&doc, "r").unwrap();
    assert_eq!(again.map("m").unwrap().get("k"), Some(Value::string("v")));
}

// ---------------------------------------------------------------------------
// Tagged unions
// ---------------------------------------------------------------------------

fn variant_table() -> Table {
    Table::new(
        "v",
        RecordSchema::new([
            ("key", FieldSchema::string()),
            (
                "variant",
                FieldSchema::union(UnionSchema::new(
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
                )),
            ),
        ]),
    )
    .unwrap()
}

#[test]
fn test_tagged_union_round_trip() {
    let doc = Document::new();
    let table = variant_table();

    table
        .upsert(
            &doc,
            &RowInput::new("k1").field(
                "variant",
                Value::map([
                    ("type", Value::string("text")),
                    ("content", Value::string("hello")),
                ]),
            ),
        )
        .unwrap();

    let variant = table.get(&doc, "k1").unwrap();
    let variant = variant.record("variant").unwrap();
    assert_eq!(variant.value("type"), Some(&Value::string("text")));
    assert_eq!(variant.value("content"), Some(&Value::string("hello")));

    table
        .update(
            &doc,
            &RowInput::new("k1").field(
                "variant",
                Value::map([("type", Value::string("number")), ("value", Value::Int(42))]),
            ),
        )
        .unwrap();

    let row = table.get(&doc, "k1").unwrap();
    let variant = row.record("variant").unwrap();
    assert_eq!(variant.value("type"), Some(&Value::string("number")));
    assert_eq!(variant.value("value"), Some(&Value::Int(42)));
}

#[test]
fn test_unknown_variant_update_is_dropped() {
    let doc = Document::new();
    let table = variant_table();

    table
        .upsert(
            &doc,
            &RowInput::new("k1").field(
                "variant",
                Value::map([
                    ("type", Value::string("text")),
                    ("content", Value::string("hello")),
                ]),
            ),
        )
        .unwrap();

    // the unmatched variant write is dropped; the row keeps its old shape
    table
        .update(
            &doc,
            &RowInput::new("k1").field("variant", Value::map([("type", Value::string("mystery"))])),
        )
        .unwrap();

    let row = table.get(&doc, "k1").unwrap();
    let variant = row.record("variant").unwrap();
    assert_eq!(variant.value("type"), Some(&Value::string("text")));
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn test_invalid_upsert_is_rejected_up_front() {
    let doc = Document::new();
    let table = task_table();

    // missing required field
    assert!(table.upsert(&doc, &RowInput::new("r").field("foo", true)).is_err());
    // wrong type
    assert!(table
        .upsert(&doc, &RowInput::new("r").field("foo", "yes").field("bar", "b"))
        .is_err());
    // nothing was written
    assert!(table.get(&doc, "r").is_none());
    assert!(select_keys(&table, &doc, &any()).is_empty());
}

#[test]
fn test_update_validates_inline_fields() {
    let doc = Document::new();
    let table = task_table();
    table
        .upsert(&doc, &RowInput::new("r").field("foo", true).field("bar", "b"))
        .unwrap();

    assert!(table.update(&doc, &RowInput::new("r").field("foo", "oops")).is_err());
    // the failed update wrote nothing
    assert_eq!(
        table.get(&doc, "r").unwrap().value("foo"),
        Some(&Value::Bool(true))
    );
}
