//! Shared fixtures for the integration tests.
#![allow(dead_code)] // not every test file uses every helper

use featplan_core::prelude::*;

/// Purchases: user 1 spends 10.0 at t=0s and 5.0 at t=5s, user 2 spends
/// 7.0 at t=3s. Timestamps are epoch seconds.
pub fn purchases_rows() -> Table {
    Table::new(vec![
        Column::new(
            "user_id",
            vec![Scalar::I64(1), Scalar::I64(1), Scalar::I64(2)],
        ),
        Column::new(
            "spend",
            vec![Scalar::F64(10.0), Scalar::F64(5.0), Scalar::F64(7.0)],
        ),
        Column::new("ts", vec![Scalar::I64(0), Scalar::I64(5), Scalar::I64(3)]),
    ])
}

pub fn purchases_source() -> SourceTable {
    SourceTable {
        name: "purchases".into(),
        schema: Schema::new(vec![
            Field::new("user_id", DataType::Int64, false),
            Field::new("spend", DataType::Float64, false),
            Field::new("ts", DataType::Int64, false),
        ]),
        keys: vec!["user_id".into()],
        timestamp_field: Some("ts".into()),
        timestamp_format: TimestampFormat::EpochSeconds,
    }
}

pub fn i64_column(table: &Table, name: &str) -> Vec<Option<i64>> {
    table
        .column(name)
        .unwrap_or_else(|| panic!("missing column '{}'", name))
        .values
        .iter()
        .map(|v| v.as_i64())
        .collect()
}

pub fn f64_column(table: &Table, name: &str) -> Vec<Option<f64>> {
    table
        .column(name)
        .unwrap_or_else(|| panic!("missing column '{}'", name))
        .values
        .iter()
        .map(|v| v.as_f64())
        .collect()
}
