//! Collaborator contracts the plan compiler depends on.
//!
//! Invariants:
//! - Every operation is a pure function of its inputs; implementations
//!   must be deterministic.
//! - Tables handed in and out carry the internal event-time column
//!   wherever temporal semantics apply; the engine never strips it.

use std::collections::BTreeMap;

use featplan_core::prelude::*;

/// Engine-agnostic table operations. Object safe on purpose: the builder
/// holds a `&dyn TableEngine`.
pub trait TableEngine {
    /// Physical read of a source table. Materializes the internal
    /// event-time column from the source's declared timestamp field.
    fn scan_source(&self, source: &SourceTable) -> Result<Table>;

    /// Add or replace one column by evaluating `expr` per row, casting the
    /// result to `result_type` afterwards.
    fn evaluate_expression(
        &self,
        table: &Table,
        expr: &str,
        result_name: &str,
        result_type: &DataType,
    ) -> Result<Table>;

    /// Add one unbounded-preceding running-aggregate column per
    /// descriptor, partitioned and ordered per the window shape. Each
    /// input row keeps its own output row.
    fn evaluate_over_window(
        &self,
        table: &Table,
        window: &OverWindowDescriptor,
        aggs: &[AggregationFieldDescriptor],
    ) -> Result<Table>;

    /// Aggregate onto the sliding-window grid: one output row per
    /// `(group keys, window end)` for every non-empty window, the window
    /// end becoming the row's event time.
    fn evaluate_sliding_window(
        &self,
        table: &Table,
        window: &SlidingWindowDescriptor,
        aggs: &[AggregationFieldDescriptor],
    ) -> Result<Table>;

    /// Key semi-join: rows of `right` whose key tuple appears in `left`.
    fn equality_join(&self, left: &Table, right: &Table, keys: &[String]) -> Result<Table>;

    /// As-of join: each left row at event time `t` matches the right row
    /// with equal keys and the greatest event time `<= t`. A pulled field
    /// whose match is older than its valid time, or that has no match,
    /// resolves to its declared default.
    fn as_of_join(
        &self,
        left: &Table,
        right: &Table,
        keys: &[String],
        fields: &BTreeMap<String, JoinFieldDescriptor>,
    ) -> Result<Table>;

    /// Full outer join on `keys`, filling fields absent on one side with
    /// `defaults` (falling back to null for fields without a default).
    fn full_outer_join_with_defaults(
        &self,
        left: &Table,
        right: &Table,
        keys: &[String],
        defaults: &BTreeMap<String, Scalar>,
    ) -> Result<Table>;
}

/// Name-to-descriptor lookup for temporal-join targets.
pub trait Registry {
    fn resolve_by_name(&self, name: &str) -> Result<TableDescriptor>;
}
