//! Compilation of derived feature views: expression dispatch, over-window
//! batching, and temporal-join assembly.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tracing::trace;

use featplan_core::prelude::*;

use crate::builder::{resolve_decls, TableBuilder};
use crate::deps::dependent_features;

impl<'a> TableBuilder<'a> {
    pub(crate) fn build_derived_view(&mut self, view: &DerivedFeatureView) -> Result<Table> {
        let source_table = self.get_table(view.source.as_ref())?;
        let source_fields = source_table.field_names();
        let features = resolve_decls(&view.features, &view.name)?;
        let dependent = dependent_features(&features);

        let mut table = source_table;
        let mut window_aggs: BTreeMap<OverWindowDescriptor, Vec<AggregationFieldDescriptor>> =
            BTreeMap::new();
        // Per (right table, join keys): the projected right fields and
        // their roles in the batched as-of join.
        let mut join_batches: BTreeMap<(String, Vec<String>), BTreeMap<String, JoinFieldDescriptor>> =
            BTreeMap::new();
        let mut right_descriptors: BTreeMap<String, TableDescriptor> = BTreeMap::new();
        let mut right_tables: BTreeMap<String, Table> = BTreeMap::new();

        for feature in &dependent {
            // Already a column on the accumulating table (e.g. a source
            // field): nothing to derive.
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
                Transform::OverWindow {
                    partition_keys,
                    order_key,
                    ..
                } => {
                    if view.timestamp_field.is_none() {
                        return Err(Error::Schema(format!(
                            "view '{}' must declare a timestamp field for over-window feature '{}'",
                            view.name, feature.name
                        )));
                    }
                    let descriptor =
                        OverWindowDescriptor::new(partition_keys.clone(), order_key.clone());
                    if let Some(agg) = feature.aggregation_descriptor() {
                        window_aggs.entry(descriptor).or_default().push(agg);
                    }
                }
                Transform::Join {
                    table_name,
                    feature_name,
                } => {
                    let keys = match &feature.keys {
                        Some(keys) if !keys.is_empty() => keys.clone(),
                        _ => {
                            return Err(Error::Schema(format!(
                                "cannot join feature '{}' without keys",
                                feature.name
                            )))
                        }
                    };
                    for key in &keys {
                        if !table.has_field(key) {
                            return Err(Error::Schema(format!(
                                "left table fields {:?} do not contain join key '{}'",
                                table.field_names(),
                                key
                            )));
                        }
                    }

                    let right_descriptor = match right_descriptors.entry(table_name.clone()) {
                        Entry::Occupied(entry) => entry.into_mut(),
                        Entry::Vacant(entry) => {
                            let descriptor = self.registry.resolve_by_name(table_name)?;
                            let right_table = self.get_table(&descriptor)?;
                            right_tables.insert(table_name.clone(), right_table);
                            entry.insert(descriptor)
                        }
                    };
                    let right_timestamp =
                        right_descriptor.timestamp_field().ok_or_else(|| {
                            Error::Schema(format!(
                                "cannot join with '{}': it has no timestamp field",
                                table_name
                            ))
                        })?;

                    let batch = join_batches
                        .entry((table_name.clone(), keys.clone()))
                        .or_default();
                    for key in &keys {
                        batch.insert(key.clone(), JoinFieldDescriptor::Passthrough);
                    }
                    batch.insert(right_timestamp.to_string(), JoinFieldDescriptor::Passthrough);
                    batch.insert(
                        EVENT_TIME_COLUMN.to_string(),
                        JoinFieldDescriptor::Passthrough,
                    );
                    batch.insert(
                        feature_name.clone(),
                        pulled_descriptor(right_descriptor, feature_name),
                    );
                }
                Transform::SlidingWindow { .. } => {
                    return Err(Error::UnsupportedTransform(format!(
                        "sliding-window feature '{}' belongs in a sliding feature view, \
                         not derived view '{}'",
                        feature.name, view.name
                    )));
                }
            }
        }

        for (descriptor, aggs) in &window_aggs {
            trace!(
                view = %view.name,
                fields = aggs.len(),
                "applying over-window batch"
            );
            table = self.engine.evaluate_over_window(&table, descriptor, aggs)?;
        }

        for ((table_name, keys), fields) in &join_batches {
            let right_table = right_tables.get(table_name).ok_or_else(|| {
                Error::Definition(format!("join target '{}' was never compiled", table_name))
            })?;
            let projected = right_table.select(&fields.keys().cloned().collect::<Vec<_>>())?;
            trace!(
                view = %view.name,
                right = %table_name,
                fields = fields.len(),
                "applying as-of join batch"
            );
            table = self.engine.as_of_join(&table, &projected, keys, fields)?;
        }

        let mut output_fields = source_fields;
        for feature in &features {
            if !output_fields.contains(&feature.name) {
                output_fields.push(feature.name.clone());
            }
        }
        if table.has_field(EVENT_TIME_COLUMN)
            && !output_fields.contains(&EVENT_TIME_COLUMN.to_string())
        {
            output_fields.push(EVENT_TIME_COLUMN.to_string());
        }
        table.select(&output_fields)
    }
}

/// Role of the pulled value field in a join batch. A sliding-window
/// feature on the right side carries its aggregation default and uses its
/// step size as the staleness bound; anything else defaults to null with
/// no bound.
fn pulled_descriptor(right: &TableDescriptor, feature_name: &str) -> JoinFieldDescriptor {
    match right.feature(feature_name) {
        Some(feature) => match &feature.transform {
            Transform::SlidingWindow { agg, step_size, .. } => JoinFieldDescriptor::Pulled {
                default: agg.default_value(&feature.data_type),
                valid_time: Some(*step_size),
            },
            _ => JoinFieldDescriptor::Pulled {
                default: Scalar::Null,
                valid_time: None,
            },
        },
        None => JoinFieldDescriptor::Pulled {
            default: Scalar::Null,
            valid_time: None,
        },
    }
}
