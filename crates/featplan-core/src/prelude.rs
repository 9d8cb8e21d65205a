//! Convenient re-exports for downstream crates.

pub use crate::error::{Error, Result};
pub use crate::feature::{Feature, FeatureDecl};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::time::{EventTime, TimestampFormat, EVENT_TIME_COLUMN};
pub use crate::transform::{
    Aggregation, AggregationFieldDescriptor, JoinFieldDescriptor, OverWindowDescriptor,
    SlidingWindowDescriptor, Transform,
};
pub use crate::types::{Column, Scalar, Table};
pub use crate::view::{DerivedFeatureView, SlidingFeatureView, SourceTable, TableDescriptor};
