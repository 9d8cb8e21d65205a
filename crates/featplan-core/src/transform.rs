//! Feature transforms and the value-equality descriptor keys derived from
//! them.
//!
//! The descriptor keys (`OverWindowDescriptor`, `SlidingWindowDescriptor`)
//! capture only a window's *shape*, so features sharing a shape collapse
//! into one aggregation call. They are `Ord` on purpose: batches are kept
//! in `BTreeMap`s to make plan construction deterministic.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::schema::DataType;
use crate::types::Scalar;

/// Aggregation functions usable in window transforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Aggregation {
    /// Number of rows in the window.
    Count,
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
}

impl Aggregation {
    /// The input column this aggregation reads, if any.
    pub fn source_column(&self) -> Option<&str> {
        match self {
            Aggregation::Count => None,
            Aggregation::Sum(col)
            | Aggregation::Avg(col)
            | Aggregation::Min(col)
            | Aggregation::Max(col) => Some(col),
        }
    }

    /// The typed value an absent window resolves to. Count and sum have a
    /// zero; the others have no meaningful default and stay null.
    pub fn default_value(&self, data_type: &DataType) -> Scalar {
        match self {
            Aggregation::Count | Aggregation::Sum(_) => match data_type {
                DataType::Int32 => Scalar::I32(0),
                DataType::Int64 | DataType::Timestamp => Scalar::I64(0),
                DataType::Float32 => Scalar::F32(0.0),
                DataType::Float64 => Scalar::F64(0.0),
                _ => Scalar::Null,
            },
            Aggregation::Avg(_) | Aggregation::Min(_) | Aggregation::Max(_) => Scalar::Null,
        }
    }
}

/// The computation rule attached to a feature. Closed set; the dispatcher
/// matches exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transform {
    /// Uninterpreted expression text handed to the engine's expression
    /// evaluator. The compiler never parses it.
    Expression { expr: String },

    /// Unbounded-preceding running aggregate: one output row per input
    /// row, reflecting all prior rows in the partition up to and including
    /// itself. `order_key` is normally the internal event-time column.
    OverWindow {
        agg: Aggregation,
        partition_keys: Vec<String>,
        order_key: String,
    },

    /// Periodic aggregation emitting at grid points determined by
    /// `window_size` and `step_size`.
    SlidingWindow {
        agg: Aggregation,
        group_by_keys: Vec<String>,
        window_size: Duration,
        step_size: Duration,
    },

    /// Pull `feature_name` from the table registered under `table_name`,
    /// as of each left row's event time. Join keys live on the feature.
    Join {
        table_name: String,
        feature_name: String,
    },
}

/// Shape key for batching over-window features.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OverWindowDescriptor {
    pub partition_keys: Vec<String>,
    pub order_key: String,
}

impl OverWindowDescriptor {
    pub fn new(partition_keys: Vec<String>, order_key: impl Into<String>) -> Self {
        Self {
            partition_keys,
            order_key: order_key.into(),
        }
    }
}

/// Shape key for batching sliding-window features.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlidingWindowDescriptor {
    pub group_by_keys: Vec<String>,
    pub window_size: Duration,
    pub step_size: Duration,
}

impl SlidingWindowDescriptor {
    pub fn new(group_by_keys: Vec<String>, window_size: Duration, step_size: Duration) -> Self {
        Self {
            group_by_keys,
            window_size,
            step_size,
        }
    }
}

/// One output field of a batched window aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationFieldDescriptor {
    pub field_name: String,
    pub data_type: DataType,
    pub agg: Aggregation,
}

impl AggregationFieldDescriptor {
    /// The typed default used when a grid point has no window for this
    /// field.
    pub fn default_value(&self) -> Scalar {
        self.agg.default_value(&self.data_type)
    }
}

/// Per-field role inside a temporal-join batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JoinFieldDescriptor {
    /// Key, timestamp, or event-time column kept on the projected right
    /// table purely so the join can run.
    Passthrough,
    /// A value pulled onto the left table. `valid_time` is the staleness
    /// bound after which a matched value counts as not found.
    Pulled {
        default: Scalar,
        valid_time: Option<Duration>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_defaults() {
        assert_eq!(
            Aggregation::Count.default_value(&DataType::Int64),
            Scalar::I64(0)
        );
        assert_eq!(
            Aggregation::Sum("x".into()).default_value(&DataType::Float64),
            Scalar::F64(0.0)
        );
        assert_eq!(
            Aggregation::Max("x".into()).default_value(&DataType::Float64),
            Scalar::Null
        );
    }

    #[test]
    fn window_descriptors_group_by_shape() {
        let a = OverWindowDescriptor::new(vec!["user".into()], "__event_time");
        let b = OverWindowDescriptor::new(vec!["user".into()], "__event_time");
        let c = OverWindowDescriptor::new(vec!["item".into()], "__event_time");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
