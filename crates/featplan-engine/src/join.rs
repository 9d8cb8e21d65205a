//! Join operators: key semi-join, as-of join, and full outer join with
//! typed defaults.
//!
//! Key tuples are compared through blake3 hashes of their scalar values;
//! scalars contain floats and cannot be map keys directly.

use std::collections::{HashMap, HashSet};

use featplan_core::prelude::*;

type KeyHash = [u8; 32];

fn key_indices(table: &Table, keys: &[String]) -> Result<Vec<usize>> {
    keys.iter()
        .map(|key| {
            table.index_of(key).ok_or_else(|| {
                Error::Schema(format!(
                    "join key '{}' not in table fields {:?}",
                    key,
                    table.field_names()
                ))
            })
        })
        .collect()
}

/// Rows of `right` whose key tuple appears in `left`. `left` is typically
/// a small literal key set.
pub fn equality_join(left: &Table, right: &Table, keys: &[String]) -> Result<Table> {
    let left_idx = key_indices(left, keys)?;
    let right_idx = key_indices(right, keys)?;

    let mut wanted: HashSet<KeyHash> = HashSet::new();
    for row in 0..left.num_rows() {
        wanted.insert(left.row_key_hash(&left_idx, row));
    }

    let keep: Vec<bool> = (0..right.num_rows())
        .map(|row| wanted.contains(&right.row_key_hash(&right_idx, row)))
        .collect();
    Ok(right.filter_rows(&keep))
}

/// As-of join per the temporal-join contract: each left row at event time
/// `t` matches the right row with equal keys and the greatest event time
/// `<= t`. Pulled fields fall back to their declared default when there is
/// no match or the match is older than the field's valid time.
pub fn as_of_join(
    left: &Table,
    right: &Table,
    keys: &[String],
    fields: &std::collections::BTreeMap<String, JoinFieldDescriptor>,
) -> Result<Table> {
    let left_idx = key_indices(left, keys)?;
    let right_idx = key_indices(right, keys)?;
    let left_time = left
        .index_of(EVENT_TIME_COLUMN)
        .ok_or_else(|| Error::Schema("as-of join: left table has no event time".into()))?;
    let right_time = right
        .index_of(EVENT_TIME_COLUMN)
        .ok_or_else(|| Error::Schema("as-of join: right table has no event time".into()))?;

    // Versions per key, sorted by event time ascending.
    let mut versions: HashMap<KeyHash, Vec<(i64, usize)>> = HashMap::new();
    for row in 0..right.num_rows() {
        let t = match right.columns[right_time].values[row].as_i64() {
            Some(t) => t,
            None => {
                return Err(Error::Schema(format!(
                    "event-time value {:?} is not an instant",
                    right.columns[right_time].values[row]
                )))
            }
        };
        versions
            .entry(right.row_key_hash(&right_idx, row))
            .or_default()
            .push((t, row));
    }
    for entries in versions.values_mut() {
        entries.sort_by_key(|(t, _)| *t);
    }

    // Output columns pulled from the right side: everything in the field
    // map that the left table does not already carry.
    let pulled: Vec<(&String, &JoinFieldDescriptor, usize)> = fields
        .iter()
        .filter(|(name, _)| !left.has_field(name))
        .map(|(name, desc)| {
            let idx = right
                .index_of(name)
                .ok_or_else(|| Error::Schema(format!("join field '{}' not on right table", name)))?;
            Ok((name, desc, idx))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut new_columns: Vec<Column> = pulled
        .iter()
        .map(|(name, _, _)| Column::new((*name).clone(), Vec::new()))
        .collect();

    for row in 0..left.num_rows() {
        let t = match left.columns[left_time].values[row].as_i64() {
            Some(t) => t,
            None => {
                return Err(Error::Schema(format!(
                    "event-time value {:?} is not an instant",
                    left.columns[left_time].values[row]
                )))
            }
        };
        let hash = left.row_key_hash(&left_idx, row);
        // Greatest right version not newer than t.
        let matched: Option<(i64, usize)> = versions.get(&hash).and_then(|entries| {
            let pos = entries.partition_point(|(vt, _)| *vt <= t);
            (pos > 0).then(|| entries[pos - 1])
        });

        for ((_, desc, right_col), out) in pulled.iter().zip(new_columns.iter_mut()) {
            let value = match (desc, matched) {
                (JoinFieldDescriptor::Passthrough, Some((_, right_row))) => {
                    right.columns[*right_col].values[right_row].clone()
                }
                (JoinFieldDescriptor::Passthrough, None) => Scalar::Null,
                (JoinFieldDescriptor::Pulled { default, valid_time }, matched) => {
                    let fresh = matched.filter(|(vt, _)| match valid_time {
                        Some(bound) => t - vt <= bound.as_millis() as i64,
                        None => true,
                    });
                    match fresh {
                        Some((_, right_row)) => right.columns[*right_col].values[right_row].clone(),
                        None => default.clone(),
                    }
                }
            };
            out.values.push(value);
        }
    }

    let mut out = left.clone();
    for column in new_columns {
        out = out.with_column(column);
    }
    Ok(out)
}

/// Full outer join on `keys`. Fields present on only one side are filled
/// from `defaults` on the other (null when no default is declared). The
/// result is sorted by the key columns.
pub fn full_outer_join_with_defaults(
    left: &Table,
    right: &Table,
    keys: &[String],
    defaults: &std::collections::BTreeMap<String, Scalar>,
) -> Result<Table> {
    let left_idx = key_indices(left, keys)?;
    let right_idx = key_indices(right, keys)?;

    let mut right_rows: HashMap<KeyHash, usize> = HashMap::new();
    for row in 0..right.num_rows() {
        right_rows.insert(right.row_key_hash(&right_idx, row), row);
    }

    let right_only: Vec<&Column> = right
        .columns
        .iter()
        .filter(|c| !left.has_field(&c.name))
        .collect();

    let mut columns: Vec<Column> = left
        .columns
        .iter()
        .map(|c| Column::new(c.name.clone(), Vec::new()))
        .collect();
    columns.extend(
        right_only
            .iter()
            .map(|c| Column::new(c.name.clone(), Vec::new())),
    );
    let left_width = left.columns.len();

    let fill = |name: &str| -> Scalar { defaults.get(name).cloned().unwrap_or(Scalar::Null) };

    let mut matched_right: HashSet<usize> = HashSet::new();
    for row in 0..left.num_rows() {
        let hash = left.row_key_hash(&left_idx, row);
        let right_row = right_rows.get(&hash).copied();
        if let Some(r) = right_row {
            matched_right.insert(r);
        }
        for (col_idx, col) in left.columns.iter().enumerate() {
            columns[col_idx].values.push(col.values[row].clone());
        }
        for (offset, col) in right_only.iter().enumerate() {
            let value = match right_row {
                Some(r) => col.values[r].clone(),
                None => fill(&col.name),
            };
            columns[left_width + offset].values.push(value);
        }
    }

    // Rows present only on the right: keys come from the right table, left
    // value fields fall back to their defaults.
    for row in 0..right.num_rows() {
        if matched_right.contains(&row) {
            continue;
        }
        for (col_idx, col) in left.columns.iter().enumerate() {
            let value = match keys.contains(&col.name) {
                true => match right.column(&col.name) {
                    Some(rc) => rc.values[row].clone(),
                    None => Scalar::Null,
                },
                false => fill(&col.name),
            };
            columns[col_idx].values.push(value);
        }
        for (offset, col) in right_only.iter().enumerate() {
            columns[left_width + offset].values.push(col.values[row].clone());
        }
    }

    Table::new(columns).sort_by_columns(keys)
}
