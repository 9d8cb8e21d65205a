//! Compilation-session tests: caching, conflict and cycle detection,
//! batching, and the build-time key/range filters.

mod fixtures;

use std::cell::Cell;
use std::collections::BTreeMap;
use std::time::Duration;

use featplan_builder::{KeySet, TableBuilder};
use featplan_core::prelude::*;
use featplan_engine::{MemEngine, MemRegistry, TableEngine};
use fixtures::{f64_column, i64_column, purchases_rows, purchases_source};

/// Engine wrapper that counts calls per operation, to observe how many
/// physical operations a compilation actually issued.
struct CountingEngine {
    inner: MemEngine,
    scans: Cell<usize>,
    over_windows: Cell<usize>,
    sliding_windows: Cell<usize>,
    as_of_joins: Cell<usize>,
}

impl CountingEngine {
    fn new(inner: MemEngine) -> Self {
        Self {
            inner,
            scans: Cell::new(0),
            over_windows: Cell::new(0),
            sliding_windows: Cell::new(0),
            as_of_joins: Cell::new(0),
        }
    }
}

impl TableEngine for CountingEngine {
    fn scan_source(&self, source: &SourceTable) -> Result<Table> {
        self.scans.set(self.scans.get() + 1);
        self.inner.scan_source(source)
    }

    fn evaluate_expression(
        &self,
        table: &Table,
        expr: &str,
        result_name: &str,
        result_type: &DataType,
    ) -> Result<Table> {
        self.inner
            .evaluate_expression(table, expr, result_name, result_type)
    }

    fn evaluate_over_window(
        &self,
        table: &Table,
        window: &OverWindowDescriptor,
        aggs: &[AggregationFieldDescriptor],
    ) -> Result<Table> {
        self.over_windows.set(self.over_windows.get() + 1);
        self.inner.evaluate_over_window(table, window, aggs)
    }

    fn evaluate_sliding_window(
        &self,
        table: &Table,
        window: &SlidingWindowDescriptor,
        aggs: &[AggregationFieldDescriptor],
    ) -> Result<Table> {
        self.sliding_windows.set(self.sliding_windows.get() + 1);
        self.inner.evaluate_sliding_window(table, window, aggs)
    }

    fn equality_join(&self, left: &Table, right: &Table, keys: &[String]) -> Result<Table> {
        self.inner.equality_join(left, right, keys)
    }

    fn as_of_join(
        &self,
        left: &Table,
        right: &Table,
        keys: &[String],
        fields: &BTreeMap<String, JoinFieldDescriptor>,
    ) -> Result<Table> {
        self.as_of_joins.set(self.as_of_joins.get() + 1);
        self.inner.as_of_join(left, right, keys, fields)
    }

    fn full_outer_join_with_defaults(
        &self,
        left: &Table,
        right: &Table,
        keys: &[String],
        defaults: &BTreeMap<String, Scalar>,
    ) -> Result<Table> {
        self.inner
            .full_outer_join_with_defaults(left, right, keys, defaults)
    }
}

fn engine_with_purchases() -> MemEngine {
    let mut engine = MemEngine::new();
    engine.register_source("purchases", purchases_rows());
    engine
}

fn over_sum(name: &str) -> Feature {
    Feature::new(
        name,
        DataType::Float64,
        Transform::OverWindow {
            agg: Aggregation::Sum("spend".into()),
            partition_keys: vec!["user_id".into()],
            order_key: EVENT_TIME_COLUMN.into(),
        },
    )
}

fn spend_view(name: &str, features: Vec<Feature>) -> TableDescriptor {
    TableDescriptor::Derived(DerivedFeatureView {
        name: name.into(),
        source: Box::new(TableDescriptor::Source(purchases_source())),
        features: features.into_iter().map(FeatureDecl::Feature).collect(),
        timestamp_field: Some("ts".into()),
        timestamp_format: TimestampFormat::EpochSeconds,
    })
}

#[test]
fn running_sum_per_user() {
    let engine = engine_with_purchases();
    let registry = MemRegistry::new();
    let mut builder = TableBuilder::new(&engine, &registry);

    let view = spend_view("user_spend", vec![over_sum("running_spend")]);
    let table = builder.build(&view, None, None, None).expect("build");

    assert_eq!(
        table.field_names(),
        vec!["user_id", "spend", "ts", "running_spend"]
    );
    assert_eq!(
        f64_column(&table, "running_spend"),
        vec![Some(10.0), Some(15.0), Some(7.0)]
    );
}

#[test]
fn shared_window_shape_compiles_to_one_aggregation() {
    let engine = CountingEngine::new(engine_with_purchases());
    let registry = MemRegistry::new();
    let mut builder = TableBuilder::new(&engine, &registry);

    let count = Feature::new(
        "purchase_count",
        DataType::Int64,
        Transform::OverWindow {
            agg: Aggregation::Count,
            partition_keys: vec!["user_id".into()],
            order_key: EVENT_TIME_COLUMN.into(),
        },
    );
    let view = spend_view("user_spend", vec![over_sum("running_spend"), count]);
    let table = builder.build(&view, None, None, None).expect("build");

    assert_eq!(engine.over_windows.get(), 1);
    assert_eq!(
        i64_column(&table, "purchase_count"),
        vec![Some(1), Some(2), Some(1)]
    );
}

#[test]
fn shared_join_target_compiles_to_one_as_of_join() {
    let mut inner = engine_with_purchases();
    inner.register_source(
        "profiles",
        Table::new(vec![
            Column::new("user_id", vec![Scalar::I64(1), Scalar::I64(2)]),
            Column::new("age", vec![Scalar::I64(30), Scalar::I64(40)]),
            Column::new("city", vec![Scalar::Str("ams".into()), Scalar::Str("ber".into())]),
            Column::new("ts", vec![Scalar::I64(0), Scalar::I64(0)]),
        ]),
    );
    let engine = CountingEngine::new(inner);

    let profiles = TableDescriptor::Source(SourceTable {
        name: "profiles".into(),
        schema: Schema::new(vec![
            Field::new("user_id", DataType::Int64, false),
            Field::new("age", DataType::Int64, true),
            Field::new("city", DataType::Utf8, true),
            Field::new("ts", DataType::Int64, false),
        ]),
        keys: vec!["user_id".into()],
        timestamp_field: Some("ts".into()),
        timestamp_format: TimestampFormat::EpochSeconds,
    });
    let mut registry = MemRegistry::new();
    registry.register(profiles);

    let join_feature = |name: &str, data_type: DataType| {
        Feature::new(
            name,
            data_type,
            Transform::Join {
                table_name: "profiles".into(),
                feature_name: name.into(),
            },
        )
        .with_keys(vec!["user_id".into()])
    };
    let view = spend_view(
        "user_spend",
        vec![
            join_feature("age", DataType::Int64),
            join_feature("city", DataType::Utf8),
        ],
    );

    let mut builder = TableBuilder::new(&engine, &registry);
    let table = builder.build(&view, None, None, None).expect("build");

    // Two pulled fields, same target and keys: one physical join.
    assert_eq!(engine.as_of_joins.get(), 1);
    assert_eq!(i64_column(&table, "age"), vec![Some(30), Some(30), Some(40)]);
    assert_eq!(
        table.column("city").unwrap().values,
        vec![
            Scalar::Str("ams".into()),
            Scalar::Str("ams".into()),
            Scalar::Str("ber".into())
        ]
    );
}

#[test]
fn session_cache_compiles_each_name_once() {
    let engine = CountingEngine::new(engine_with_purchases());
    let registry = MemRegistry::new();
    let mut builder = TableBuilder::new(&engine, &registry);

    let view_a = spend_view("view_a", vec![over_sum("running_spend")]);
    let view_b = spend_view("view_b", vec![over_sum("running_spend")]);

    let first = builder.build(&view_a, None, None, None).expect("view_a");
    let again = builder.build(&view_a, None, None, None).expect("view_a bis");
    builder.build(&view_b, None, None, None).expect("view_b");

    // Both views scan the same underlying source; one session reads it once.
    assert_eq!(engine.scans.get(), 1);
    // view_a itself was compiled once and replayed from the cache.
    assert_eq!(engine.over_windows.get(), 2);
    assert_eq!(
        f64_column(&first, "running_spend"),
        f64_column(&again, "running_spend")
    );
}

#[test]
fn same_name_different_definition_is_a_conflict() {
    let engine = engine_with_purchases();
    let registry = MemRegistry::new();
    let mut builder = TableBuilder::new(&engine, &registry);

    let view = spend_view("user_spend", vec![over_sum("running_spend")]);
    builder.build(&view, None, None, None).expect("first build");

    let imposter = spend_view("user_spend", vec![over_sum("another_name")]);
    assert!(matches!(
        builder.build(&imposter, None, None, None),
        Err(Error::Conflict(_))
    ));
}

#[test]
fn self_referencing_join_is_a_cycle() {
    let engine = engine_with_purchases();
    let mut registry = MemRegistry::new();

    let looped = spend_view(
        "looped",
        vec![Feature::new(
            "pulled",
            DataType::Float64,
            Transform::Join {
                table_name: "looped".into(),
                feature_name: "pulled".into(),
            },
        )
        .with_keys(vec!["user_id".into()])],
    );
    registry.register(looped.clone());

    let mut builder = TableBuilder::new(&engine, &registry);
    assert!(matches!(
        builder.build(&looped, None, None, None),
        Err(Error::Cycle(_))
    ));
}

#[test]
fn sliding_feature_in_derived_view_is_unsupported() {
    let engine = engine_with_purchases();
    let registry = MemRegistry::new();
    let mut builder = TableBuilder::new(&engine, &registry);

    let misplaced = Feature::new(
        "spend_10s",
        DataType::Float64,
        Transform::SlidingWindow {
            agg: Aggregation::Sum("spend".into()),
            group_by_keys: vec!["user_id".into()],
            window_size: Duration::from_secs(10),
            step_size: Duration::from_secs(5),
        },
    );
    let view = spend_view("user_spend", vec![misplaced]);
    assert!(matches!(
        builder.build(&view, None, None, None),
        Err(Error::UnsupportedTransform(_))
    ));
}

#[test]
fn windowed_and_join_features_in_sliding_view_are_unsupported() {
    let engine = engine_with_purchases();
    let registry = MemRegistry::new();
    let mut builder = TableBuilder::new(&engine, &registry);

    let sliding_with = |name: &str, feature: Feature| {
        TableDescriptor::Sliding(SlidingFeatureView {
            name: name.into(),
            source: Box::new(TableDescriptor::Source(purchases_source())),
            features: vec![FeatureDecl::Feature(feature)],
            timestamp_field: Some("ts".into()),
            timestamp_format: TimestampFormat::EpochSeconds,
        })
    };

    let over = sliding_with("over_in_sliding", over_sum("running_spend"));
    assert!(matches!(
        builder.build(&over, None, None, None),
        Err(Error::UnsupportedTransform(_))
    ));

    let join = sliding_with(
        "join_in_sliding",
        Feature::new(
            "age",
            DataType::Int64,
            Transform::Join {
                table_name: "profiles".into(),
                feature_name: "age".into(),
            },
        )
        .with_keys(vec!["user_id".into()]),
    );
    assert!(matches!(
        builder.build(&join, None, None, None),
        Err(Error::UnsupportedTransform(_))
    ));
}

#[test]
fn join_feature_without_keys_is_schema_error() {
    let engine = engine_with_purchases();
    let registry = MemRegistry::new();
    let mut builder = TableBuilder::new(&engine, &registry);

    let keyless = Feature::new(
        "age",
        DataType::Int64,
        Transform::Join {
            table_name: "profiles".into(),
            feature_name: "age".into(),
        },
    );
    let view = spend_view("user_spend", vec![keyless]);
    assert!(matches!(
        builder.build(&view, None, None, None),
        Err(Error::Schema(_))
    ));
}

#[test]
fn join_target_without_timestamp_is_schema_error() {
    let mut engine = engine_with_purchases();
    engine.register_source(
        "profiles",
        Table::new(vec![
            Column::new("user_id", vec![Scalar::I64(1)]),
            Column::new("age", vec![Scalar::I64(30)]),
        ]),
    );
    let mut registry = MemRegistry::new();
    registry.register(TableDescriptor::Source(SourceTable {
        name: "profiles".into(),
        schema: Schema::new(vec![
            Field::new("user_id", DataType::Int64, false),
            Field::new("age", DataType::Int64, true),
        ]),
        keys: vec!["user_id".into()],
        timestamp_field: None,
        timestamp_format: TimestampFormat::EpochMillis,
    }));
    let mut builder = TableBuilder::new(&engine, &registry);

    let view = spend_view(
        "user_spend",
        vec![Feature::new(
            "age",
            DataType::Int64,
            Transform::Join {
                table_name: "profiles".into(),
                feature_name: "age".into(),
            },
        )
        .with_keys(vec!["user_id".into()])],
    );
    assert!(matches!(
        builder.build(&view, None, None, None),
        Err(Error::Schema(_))
    ));
}

#[test]
fn unresolved_view_cannot_be_built() {
    let engine = engine_with_purchases();
    let registry = MemRegistry::new();
    let mut builder = TableBuilder::new(&engine, &registry);

    let view = TableDescriptor::Derived(DerivedFeatureView {
        name: "incomplete".into(),
        source: Box::new(TableDescriptor::Source(purchases_source())),
        features: vec![FeatureDecl::Name("someone_elses_feature".into())],
        timestamp_field: None,
        timestamp_format: TimestampFormat::EpochMillis,
    });
    assert!(matches!(
        builder.build(&view, None, None, None),
        Err(Error::Definition(_))
    ));
}

#[test]
fn key_set_semi_filters_the_output() {
    let engine = engine_with_purchases();
    let registry = MemRegistry::new();
    let mut builder = TableBuilder::new(&engine, &registry);

    let keys = KeySet::Rows(Table::new(vec![Column::new(
        "user_id",
        vec![Scalar::I64(1)],
    )]));
    let table = builder
        .build(
            &TableDescriptor::Source(purchases_source()),
            Some(&keys),
            None,
            None,
        )
        .expect("build");

    assert_eq!(i64_column(&table, "user_id"), vec![Some(1), Some(1)]);
}

#[test]
fn key_set_can_come_from_another_descriptor() {
    let mut engine = engine_with_purchases();
    engine.register_source(
        "vips",
        Table::new(vec![Column::new("user_id", vec![Scalar::I64(2)])]),
    );
    let registry = MemRegistry::new();
    let mut builder = TableBuilder::new(&engine, &registry);

    let vips = TableDescriptor::Source(SourceTable {
        name: "vips".into(),
        schema: Schema::new(vec![Field::new("user_id", DataType::Int64, false)]),
        keys: vec!["user_id".into()],
        timestamp_field: None,
        timestamp_format: TimestampFormat::EpochMillis,
    });
    let table = builder
        .build(
            &TableDescriptor::Source(purchases_source()),
            Some(&KeySet::Descriptor(vips)),
            None,
            None,
        )
        .expect("build");

    assert_eq!(i64_column(&table, "user_id"), vec![Some(2)]);
}

#[test]
fn unknown_key_field_is_a_schema_error() {
    let engine = engine_with_purchases();
    let registry = MemRegistry::new();
    let mut builder = TableBuilder::new(&engine, &registry);

    let keys = KeySet::Rows(Table::new(vec![Column::new(
        "no_such_key",
        vec![Scalar::I64(1)],
    )]));
    assert!(matches!(
        builder.build(
            &TableDescriptor::Source(purchases_source()),
            Some(&keys),
            None,
            None,
        ),
        Err(Error::Schema(_))
    ));
}

#[test]
fn time_range_is_half_open_over_event_time() {
    let engine = engine_with_purchases();
    let registry = MemRegistry::new();
    let mut builder = TableBuilder::new(&engine, &registry);

    // [3s, 5s) keeps only user 2's purchase at t=3s.
    let table = builder
        .build(
            &TableDescriptor::Source(purchases_source()),
            None,
            Some(3_000),
            Some(5_000),
        )
        .expect("build");

    assert_eq!(i64_column(&table, "user_id"), vec![Some(2)]);
    assert!(!table.has_field(EVENT_TIME_COLUMN));
}

#[test]
fn time_range_needs_a_timestamp_field() {
    let mut engine = MemEngine::new();
    engine.register_source(
        "untimed",
        Table::new(vec![Column::new("user_id", vec![Scalar::I64(1)])]),
    );
    let registry = MemRegistry::new();
    let mut builder = TableBuilder::new(&engine, &registry);

    let source = TableDescriptor::Source(SourceTable {
        name: "untimed".into(),
        schema: Schema::new(vec![Field::new("user_id", DataType::Int64, false)]),
        keys: vec!["user_id".into()],
        timestamp_field: None,
        timestamp_format: TimestampFormat::EpochMillis,
    });
    assert!(matches!(
        builder.build(&source, None, Some(0), None),
        Err(Error::Schema(_))
    ));
}

#[test]
fn input_features_are_derived_but_not_projected() {
    let engine = engine_with_purchases();
    let registry = MemRegistry::new();
    let mut builder = TableBuilder::new(&engine, &registry);

    let doubled = Feature::new(
        "doubled_spend",
        DataType::Float64,
        Transform::Expression {
            expr: "spend * 2".into(),
        },
    );
    let shifted = Feature::new(
        "shifted_spend",
        DataType::Float64,
        Transform::Expression {
            expr: "doubled_spend + 1".into(),
        },
    )
    .with_inputs(vec![doubled]);

    let view = spend_view("user_spend", vec![shifted]);
    let table = builder.build(&view, None, None, None).expect("build");

    assert_eq!(
        f64_column(&table, "shifted_spend"),
        vec![Some(21.0), Some(11.0), Some(15.0)]
    );
    assert!(!table.has_field("doubled_spend"));
}

#[test]
fn keep_event_time_config_preserves_the_internal_column() {
    let engine = engine_with_purchases();
    let registry = MemRegistry::new();
    let config = featplan_builder::BuilderConfig {
        keep_event_time: true,
    };
    let mut builder = TableBuilder::with_config(&engine, &registry, config);

    let table = builder
        .build(&TableDescriptor::Source(purchases_source()), None, None, None)
        .expect("build");
    assert_eq!(
        i64_column(&table, EVENT_TIME_COLUMN),
        vec![Some(0), Some(5_000), Some(3_000)]
    );
}
