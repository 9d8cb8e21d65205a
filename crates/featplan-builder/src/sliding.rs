//! Compilation of sliding feature views: batching per window shape, grid
//! reconciliation with typed defaults, and timestamp-field derivation.

use std::collections::BTreeMap;

use tracing::trace;

use featplan_core::prelude::*;

use crate::builder::{resolve_decls, TableBuilder};
use crate::deps::dependent_features;

impl<'a> TableBuilder<'a> {
    pub(crate) fn build_sliding_view(&mut self, view: &SlidingFeatureView) -> Result<Table> {
        let source_table = self.get_table(view.source.as_ref())?;
        let features = resolve_decls(&view.features, &view.name)?;
        let dependent = dependent_features(&features);

        let mut table = source_table;
        let mut window_aggs: BTreeMap<SlidingWindowDescriptor, Vec<AggregationFieldDescriptor>> =
            BTreeMap::new();

        for feature in &dependent {
            if table.has_field(&feature.name) {
                continue;
            }
            match &feature.transform {
                Transform::Expression { expr } => {
                    table = self.engine.evaluate_expression(
                        &table,
                        expr,
                        &feature.name,
                        &feature.data_type,
                    )?;
                }
                Transform::SlidingWindow {
                    group_by_keys,
                    window_size,
                    step_size,
                    ..
                } => {
                    if view.timestamp_field.is_none() {
                        return Err(Error::Schema(format!(
                            "view '{}' must declare a timestamp field for sliding-window \
                             feature '{}'",
                            view.name, feature.name
                        )));
                    }
                    let descriptor = SlidingWindowDescriptor::new(
                        group_by_keys.clone(),
                        *window_size,
                        *step_size,
                    );
                    if let Some(agg) = feature.aggregation_descriptor() {
                        window_aggs.entry(descriptor).or_default().push(agg);
                    }
                }
                Transform::OverWindow { .. } | Transform::Join { .. } => {
                    return Err(Error::UnsupportedTransform(format!(
                        "feature '{}' of sliding view '{}' must be an expression or a \
                         sliding-window aggregate",
                        feature.name, view.name
                    )));
                }
            }
        }

        // Each window shape yields its own grid; reconcile them with
        // chained full outer joins, filling the other grid's fields with
        // their typed defaults.
        let mut agg_table: Option<Table> = None;
        let mut defaults: BTreeMap<String, Scalar> = BTreeMap::new();
        for (descriptor, aggs) in &window_aggs {
            for agg in aggs {
                defaults.insert(agg.field_name.clone(), agg.default_value());
            }
            trace!(
                view = %view.name,
                fields = aggs.len(),
                "applying sliding-window batch"
            );
            let grid = self
                .engine
                .evaluate_sliding_window(&table, descriptor, aggs)?;
            agg_table = Some(match agg_table {
                None => grid,
                Some(merged) => {
                    let mut join_keys = descriptor.group_by_keys.clone();
                    join_keys.push(EVENT_TIME_COLUMN.to_string());
                    self.engine
                        .full_outer_join_with_defaults(&merged, &grid, &join_keys, &defaults)?
                }
            });
        }
        if let Some(merged) = agg_table {
            table = merged;
        }

        // Derive the declared timestamp field back from the window time.
        if let Some(timestamp_field) = &view.timestamp_field {
            let (expr, data_type) = match &view.timestamp_format {
                TimestampFormat::EpochSeconds => (
                    format!("unix_timestamp({})", EVENT_TIME_COLUMN),
                    DataType::Int64,
                ),
                TimestampFormat::EpochMillis => (EVENT_TIME_COLUMN.to_string(), DataType::Int64),
                TimestampFormat::Pattern(pattern) => (
                    format!(
                        "format_time({}, '{}')",
                        EVENT_TIME_COLUMN,
                        pattern.replace('\'', "''")
                    ),
                    DataType::Utf8,
                ),
            };
            table = self
                .engine
                .evaluate_expression(&table, &expr, timestamp_field, &data_type)?;
        }

        let mut output_fields: Vec<String> = Vec::new();
        for (descriptor, _) in &window_aggs {
            for key in &descriptor.group_by_keys {
                if !output_fields.contains(key) {
                    output_fields.push(key.clone());
                }
            }
        }
        for (_, aggs) in &window_aggs {
            for agg in aggs {
                if !output_fields.contains(&agg.field_name) {
                    output_fields.push(agg.field_name.clone());
                }
            }
        }
        if let Some(timestamp_field) = &view.timestamp_field {
            if !output_fields.contains(timestamp_field) {
                output_fields.push(timestamp_field.clone());
            }
        }
        if !output_fields.contains(&EVENT_TIME_COLUMN.to_string()) {
            output_fields.push(EVENT_TIME_COLUMN.to_string());
        }
        table.select(&output_fields)
    }
}
