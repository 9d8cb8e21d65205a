//! Unbounded-preceding over-window aggregation.
//!
//! One output row per input row: each row sees every prior row of its
//! partition (order-key ascending) plus itself. Original row order is
//! preserved; the aggregate columns are written back by original index.

use featplan_core::prelude::*;

use crate::agg::{source_index, AggState};

pub fn evaluate_over_window(
    table: &Table,
    window: &OverWindowDescriptor,
    aggs: &[AggregationFieldDescriptor],
) -> Result<Table> {
    for key in &window.partition_keys {
        table.require_column(key)?;
    }
    table.require_column(&window.order_key)?;

    let mut sort_keys = window.partition_keys.clone();
    sort_keys.push(window.order_key.clone());
    let order = table.sorted_indices(&sort_keys)?;

    let partition_indices: Vec<usize> = window
        .partition_keys
        .iter()
        .filter_map(|k| table.index_of(k))
        .collect();
    let source_indices: Vec<Option<usize>> = aggs
        .iter()
        .map(|d| source_index(table, d))
        .collect::<Result<Vec<_>>>()?;

    let num_rows = table.num_rows();
    let mut computed: Vec<Vec<Scalar>> = aggs.iter().map(|_| vec![Scalar::Null; num_rows]).collect();

    let mut current_partition: Vec<Scalar> = Vec::new();
    let mut partition_started = false;
    let mut states: Vec<AggState> = vec![AggState::default(); aggs.len()];

    for row_idx in order {
        let partition: Vec<Scalar> = partition_indices
            .iter()
            .map(|&col| table.columns[col].values[row_idx].clone())
            .collect();
        if !partition_started || partition != current_partition {
            partition_started = true;
            current_partition = partition;
            states = vec![AggState::default(); aggs.len()];
        }

        for (agg_idx, descriptor) in aggs.iter().enumerate() {
            let value = source_indices[agg_idx].map(|col| &table.columns[col].values[row_idx]);
            states[agg_idx].update(value)?;
            computed[agg_idx][row_idx] = states[agg_idx].result(descriptor)?;
        }
    }

    let mut out = table.clone();
    for (descriptor, values) in aggs.iter().zip(computed) {
        out = out.with_column(Column::new(descriptor.field_name.clone(), values));
    }
    Ok(out)
}
