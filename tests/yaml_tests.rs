//! YAML front-end: parse a document and compile the resulting views.

mod fixtures;

use featplan_builder::{parse_yaml_views, TableBuilder};
use featplan_core::prelude::*;
use featplan_engine::{MemEngine, MemRegistry};
use fixtures::{f64_column, purchases_rows};

const DOC: &str = r#"
sources:
  - name: purchases
    keys: [user_id]
    timestamp: { field: ts, format: epoch }
    schema:
      - { name: user_id, type: i64 }
      - { name: spend,   type: f64 }
      - { name: ts,      type: i64 }
views:
  - name: user_spend
    source: purchases
    timestamp: { field: ts, format: epoch }
    features:
      - name: running_spend
        type: f64
        over_window: { agg: sum, column: spend, partition_by: [user_id] }
  - name: user_spend_10s
    kind: sliding
    source: purchases
    timestamp: { field: ts, format: epoch }
    features:
      - name: spend_10s
        type: f64
        sliding_window: { agg: sum, column: spend, group_by: [user_id], window: 10s, step: 5s }
"#;

#[test]
fn declared_views_compile_end_to_end() {
    let descriptors = parse_yaml_views(DOC).expect("parse");
    assert_eq!(descriptors.len(), 3);

    let mut engine = MemEngine::new();
    engine.register_source("purchases", purchases_rows());
    let mut registry = MemRegistry::new();
    for descriptor in &descriptors {
        registry.register(descriptor.clone());
    }

    let mut builder = TableBuilder::new(&engine, &registry);

    let derived = builder
        .build(&descriptors[1], None, None, None)
        .expect("derived view");
    assert_eq!(
        f64_column(&derived, "running_spend"),
        vec![Some(10.0), Some(15.0), Some(7.0)]
    );

    let sliding = builder
        .build(&descriptors[2], None, None, None)
        .expect("sliding view");
    assert_eq!(
        f64_column(&sliding, "spend_10s"),
        vec![Some(10.0), Some(15.0), Some(5.0), Some(7.0), Some(7.0)]
    );
}

#[test]
fn descriptors_survive_json_persistence() {
    // Registries are commonly persisted; the whole descriptor graph must
    // come back structurally equal or the session cache would flag
    // spurious conflicts.
    let descriptors = parse_yaml_views(DOC).expect("parse");
    let json = serde_json::to_string(&descriptors).expect("serialize");
    let restored: Vec<TableDescriptor> = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(descriptors, restored);
}

#[test]
fn bad_documents_are_definition_errors() {
    let unknown_source = "views:\n  - name: v\n    source: nope\n    features: []\n";
    assert!(matches!(
        parse_yaml_views(unknown_source),
        Err(Error::Definition(_))
    ));

    let bad_type = r#"
sources:
  - name: s
    schema: [{ name: a, type: decimal }]
"#;
    assert!(matches!(
        parse_yaml_views(bad_type),
        Err(Error::Definition(_))
    ));
}
