//! In-memory reference engine and registry.
//!
//! Tables are registered under source names; every operation is eager and
//! deterministic. This is the engine the compiler's tests run against.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use featplan_core::prelude::*;

use crate::{expr, join, sliding, traits::Registry, traits::TableEngine, window};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemEngine {
    sources: HashMap<String, Table>,
}

impl MemEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the physical rows behind a source name.
    pub fn register_source(&mut self, name: impl Into<String>, table: Table) {
        self.sources.insert(name.into(), table);
    }
}

impl TableEngine for MemEngine {
    fn scan_source(&self, source: &SourceTable) -> Result<Table> {
        let table = self.sources.get(&source.name).ok_or_else(|| {
            Error::Definition(format!("source table '{}' has no registered data", source.name))
        })?;
        for field in &source.schema.fields {
            let column = table.column(&field.name).ok_or_else(|| {
                Error::Schema(format!(
                    "source '{}' data is missing declared field '{}'",
                    source.name, field.name
                ))
            })?;
            for value in &column.values {
                if value.is_null() {
                    if !field.nullable {
                        return Err(Error::Schema(format!(
                            "source '{}' field '{}' is not nullable but holds a null",
                            source.name, field.name
                        )));
                    }
                    continue;
                }
                if !type_matches(&field.data_type, value) {
                    return Err(Error::Schema(format!(
                        "source '{}' field '{}' is declared {:?} but holds {:?}",
                        source.name,
                        field.name,
                        field.data_type,
                        value.data_type()
                    )));
                }
            }
        }

        let Some(ts_field) = &source.timestamp_field else {
            return Ok(table.clone());
        };
        if source.schema.index_of(ts_field).is_none() {
            return Err(Error::Schema(format!(
                "timestamp field '{}' of source '{}' not in declared fields {:?}",
                ts_field,
                source.name,
                source.schema.field_names()
            )));
        }
        let ts_column = table.require_column(ts_field)?;
        let values = ts_column
            .values
            .iter()
            .map(|v| Ok(Scalar::I64(source.timestamp_format.parse_millis(v)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(table.with_column(Column::new(EVENT_TIME_COLUMN, values)))
    }

    fn evaluate_expression(
        &self,
        table: &Table,
        expr: &str,
        result_name: &str,
        result_type: &DataType,
    ) -> Result<Table> {
        expr::evaluate(table, expr, result_name, result_type)
    }

    fn evaluate_over_window(
        &self,
        table: &Table,
        window: &OverWindowDescriptor,
        aggs: &[AggregationFieldDescriptor],
    ) -> Result<Table> {
        window::evaluate_over_window(table, window, aggs)
    }

    fn evaluate_sliding_window(
        &self,
        table: &Table,
        window: &SlidingWindowDescriptor,
        aggs: &[AggregationFieldDescriptor],
    ) -> Result<Table> {
        sliding::evaluate_sliding_window(table, window, aggs)
    }

    fn equality_join(&self, left: &Table, right: &Table, keys: &[String]) -> Result<Table> {
        join::equality_join(left, right, keys)
    }

    fn as_of_join(
        &self,
        left: &Table,
        right: &Table,
        keys: &[String],
        fields: &BTreeMap<String, JoinFieldDescriptor>,
    ) -> Result<Table> {
        join::as_of_join(left, right, keys, fields)
    }

    fn full_outer_join_with_defaults(
        &self,
        left: &Table,
        right: &Table,
        keys: &[String],
        defaults: &BTreeMap<String, Scalar>,
    ) -> Result<Table> {
        join::full_outer_join_with_defaults(left, right, keys, defaults)
    }
}

// Timestamp columns hold epoch-millis I64 values per the core contract.
fn type_matches(declared: &DataType, value: &Scalar) -> bool {
    match declared {
        DataType::Timestamp => matches!(value, Scalar::I64(_)),
        other => value.data_type() == *other,
    }
}

/// Name → descriptor map used to resolve temporal-join targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemRegistry {
    tables: HashMap<String, TableDescriptor>,
}

impl MemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: TableDescriptor) {
        self.tables
            .insert(descriptor.name().to_string(), descriptor);
    }
}

impl Registry for MemRegistry {
    fn resolve_by_name(&self, name: &str) -> Result<TableDescriptor> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Definition(format!("table '{}' is not registered", name)))
    }
}
