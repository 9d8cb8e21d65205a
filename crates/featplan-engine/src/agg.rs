//! Shared aggregation accumulator for the over-window and sliding-window
//! operators.

use featplan_core::prelude::*;
use featplan_core::types::scalar_cmp;

/// Running state for one aggregation field. Null inputs are skipped for
/// sum/avg/min/max; `Count` counts every row in the window.
#[derive(Debug, Clone, Default)]
pub(crate) struct AggState {
    rows: i64,
    non_null: i64,
    sum: f64,
    min: Option<Scalar>,
    max: Option<Scalar>,
}

impl AggState {
    pub fn update(&mut self, value: Option<&Scalar>) -> Result<()> {
        self.rows += 1;
        let Some(value) = value else { return Ok(()) };
        if value.is_null() {
            return Ok(());
        }
        self.non_null += 1;
        if let Some(v) = value.as_f64() {
            self.sum += v;
        }
        let replace_min = match &self.min {
            Some(cur) => scalar_cmp(value, cur) == std::cmp::Ordering::Less,
            None => true,
        };
        if replace_min {
            self.min = Some(value.clone());
        }
        let replace_max = match &self.max {
            Some(cur) => scalar_cmp(value, cur) == std::cmp::Ordering::Greater,
            None => true,
        };
        if replace_max {
            self.max = Some(value.clone());
        }
        Ok(())
    }

    /// Current aggregate value, cast to the descriptor's declared type.
    pub fn result(&self, descriptor: &AggregationFieldDescriptor) -> Result<Scalar> {
        let raw = match &descriptor.agg {
            Aggregation::Count => Scalar::I64(self.rows),
            Aggregation::Sum(_) => Scalar::F64(self.sum),
            Aggregation::Avg(_) => {
                if self.non_null == 0 {
                    Scalar::Null
                } else {
                    Scalar::F64(self.sum / self.non_null as f64)
                }
            }
            Aggregation::Min(_) => self.min.clone().unwrap_or(Scalar::Null),
            Aggregation::Max(_) => self.max.clone().unwrap_or(Scalar::Null),
        };
        raw.cast(&descriptor.data_type)
    }
}

/// Input column index for a descriptor's aggregation, if it reads one.
pub(crate) fn source_index(
    table: &Table,
    descriptor: &AggregationFieldDescriptor,
) -> Result<Option<usize>> {
    match descriptor.agg.source_column() {
        None => Ok(None),
        Some(col) => {
            let idx = table.index_of(col).ok_or_else(|| {
                Error::Schema(format!(
                    "aggregation input column '{}' not in table fields {:?}",
                    col,
                    table.field_names()
                ))
            })?;
            Ok(Some(idx))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(agg: Aggregation, data_type: DataType) -> AggregationFieldDescriptor {
        AggregationFieldDescriptor {
            field_name: "out".into(),
            data_type,
            agg,
        }
    }

    #[test]
    fn count_includes_nulls_sum_skips_them() {
        let mut state = AggState::default();
        state.update(Some(&Scalar::F64(2.0))).unwrap();
        state.update(Some(&Scalar::Null)).unwrap();
        state.update(Some(&Scalar::F64(3.0))).unwrap();

        let count = descriptor(Aggregation::Count, DataType::Int64);
        assert_eq!(state.result(&count).unwrap(), Scalar::I64(3));

        let sum = descriptor(Aggregation::Sum("x".into()), DataType::Float64);
        assert_eq!(state.result(&sum).unwrap(), Scalar::F64(5.0));

        let avg = descriptor(Aggregation::Avg("x".into()), DataType::Float64);
        assert_eq!(state.result(&avg).unwrap(), Scalar::F64(2.5));
    }

    #[test]
    fn min_max_track_extremes() {
        let mut state = AggState::default();
        for v in [5, 1, 9] {
            state.update(Some(&Scalar::I64(v))).unwrap();
        }
        let min = descriptor(Aggregation::Min("x".into()), DataType::Int64);
        let max = descriptor(Aggregation::Max("x".into()), DataType::Int64);
        assert_eq!(state.result(&min).unwrap(), Scalar::I64(1));
        assert_eq!(state.result(&max).unwrap(), Scalar::I64(9));
    }

    #[test]
    fn sum_result_is_cast_to_declared_type() {
        let mut state = AggState::default();
        state.update(Some(&Scalar::I64(4))).unwrap();
        let sum = descriptor(Aggregation::Sum("x".into()), DataType::Int64);
        assert_eq!(state.result(&sum).unwrap(), Scalar::I64(4));
    }
}
