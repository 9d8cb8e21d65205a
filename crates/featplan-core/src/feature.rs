//! Features: named, typed derived columns with a transform and declared
//! inputs. Structural equality and hashing are what make cache-conflict
//! detection and dependency dedup work.

use serde::{Deserialize, Serialize};

use crate::schema::DataType;
use crate::transform::{AggregationFieldDescriptor, Transform};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub data_type: DataType,
    pub transform: Transform,
    /// Join keys. Required for `Transform::Join` features.
    pub keys: Option<Vec<String>>,
    /// Features this feature reads; the resolver places them first.
    pub input_features: Vec<Feature>,
}

impl Feature {
    pub fn new(
        name: impl Into<String>,
        data_type: DataType,
        transform: Transform,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            transform,
            keys: None,
            input_features: Vec::new(),
        }
    }

    pub fn with_keys(mut self, keys: Vec<String>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<Feature>) -> Self {
        self.input_features = inputs;
        self
    }

    /// The aggregation field this feature contributes to a window batch,
    /// if its transform is windowed.
    pub fn aggregation_descriptor(&self) -> Option<AggregationFieldDescriptor> {
        match &self.transform {
            Transform::OverWindow { agg, .. } | Transform::SlidingWindow { agg, .. } => {
                Some(AggregationFieldDescriptor {
                    field_name: self.name.clone(),
                    data_type: self.data_type.clone(),
                    agg: agg.clone(),
                })
            }
            _ => None,
        }
    }
}

/// A declared feature inside a view: either resolved to a full definition
/// or still a bare name waiting for registry resolution. A view containing
/// any `Name` entry is unresolved and cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureDecl {
    Name(String),
    Feature(Feature),
}
