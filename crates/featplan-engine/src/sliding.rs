//! Sliding-window aggregation onto the step grid.
//!
//! Windows start at multiples of the step and span the window size; a row
//! at event time `t` lands in every window `[k*step, k*step + size)`
//! containing `t`. One output row is emitted per `(group keys, window
//! end)` for non-empty windows, the window end becoming the row's event
//! time. This periodic emission is what distinguishes the sliding grid
//! from the per-input-row over window.

use std::collections::BTreeMap;

use featplan_core::prelude::*;

use crate::agg::{source_index, AggState};

pub fn evaluate_sliding_window(
    table: &Table,
    window: &SlidingWindowDescriptor,
    aggs: &[AggregationFieldDescriptor],
) -> Result<Table> {
    let size_ms = window.window_size.as_millis() as i64;
    let step_ms = window.step_size.as_millis() as i64;
    if size_ms <= 0 || step_ms <= 0 {
        return Err(Error::Schema(format!(
            "sliding window requires positive size and step, got {:?}/{:?}",
            window.window_size, window.step_size
        )));
    }

    let group_indices: Vec<usize> = window
        .group_by_keys
        .iter()
        .map(|k| {
            table
                .index_of(k)
                .ok_or_else(|| Error::Schema(format!("group key column '{}' not found", k)))
        })
        .collect::<Result<Vec<_>>>()?;
    let time_idx = table
        .index_of(EVENT_TIME_COLUMN)
        .ok_or_else(|| Error::Schema("sliding window requires the event-time column".into()))?;
    let source_indices: Vec<Option<usize>> = aggs
        .iter()
        .map(|d| source_index(table, d))
        .collect::<Result<Vec<_>>>()?;

    let mut sort_keys = window.group_by_keys.clone();
    sort_keys.push(EVENT_TIME_COLUMN.to_string());
    let order = table.sorted_indices(&sort_keys)?;

    // Rows per (group tuple, window end), keyed in sorted row order so the
    // output stays deterministic.
    let mut groups: Vec<(Vec<Scalar>, BTreeMap<i64, Vec<usize>>)> = Vec::new();
    for row_idx in order {
        let key: Vec<Scalar> = group_indices
            .iter()
            .map(|&col| table.columns[col].values[row_idx].clone())
            .collect();
        let t = match table.columns[time_idx].values[row_idx].as_i64() {
            Some(t) => t,
            None => {
                return Err(Error::Schema(format!(
                    "event-time value {:?} is not an instant",
                    table.columns[time_idx].values[row_idx]
                )))
            }
        };

        if groups.last().map(|(k, _)| k != &key).unwrap_or(true) {
            groups.push((key, BTreeMap::new()));
        }
        let windows = match groups.last_mut() {
            Some((_, w)) => w,
            None => continue,
        };
        let k_min = (t - size_ms).div_euclid(step_ms) + 1;
        let k_max = t.div_euclid(step_ms);
        for k in k_min..=k_max {
            windows.entry(k * step_ms + size_ms).or_default().push(row_idx);
        }
    }

    let mut key_columns: Vec<Column> = window
        .group_by_keys
        .iter()
        .map(|name| Column::new(name.clone(), Vec::new()))
        .collect();
    let mut time_column = Column::new(EVENT_TIME_COLUMN, Vec::new());
    let mut agg_columns: Vec<Column> = aggs
        .iter()
        .map(|d| Column::new(d.field_name.clone(), Vec::new()))
        .collect();

    for (key, windows) in groups {
        for (end, rows) in windows {
            for (col, value) in key_columns.iter_mut().zip(key.iter()) {
                col.values.push(value.clone());
            }
            time_column.values.push(Scalar::I64(end));
            for (agg_idx, descriptor) in aggs.iter().enumerate() {
                let mut state = AggState::default();
                for &row_idx in &rows {
                    let value =
                        source_indices[agg_idx].map(|col| &table.columns[col].values[row_idx]);
                    state.update(value)?;
                }
                agg_columns[agg_idx].values.push(state.result(descriptor)?);
            }
        }
    }

    let mut columns = key_columns;
    columns.push(time_column);
    columns.extend(agg_columns);
    Ok(Table::new(columns))
}
