//! Table descriptors: sources and feature views.
//!
//! A descriptor's identity is its name; equality is structural over every
//! field, which is what the session cache uses to detect two different
//! definitions smuggled in under one name.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::feature::{Feature, FeatureDecl};
use crate::schema::Schema;
use crate::time::TimestampFormat;

/// A physical table the engine can scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceTable {
    pub name: String,
    pub schema: Schema,
    pub keys: Vec<String>,
    pub timestamp_field: Option<String>,
    pub timestamp_format: TimestampFormat,
}

/// Derived columns over a source: expressions, over-window aggregates, and
/// temporal joins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivedFeatureView {
    pub name: String,
    pub source: Box<TableDescriptor>,
    pub features: Vec<FeatureDecl>,
    pub timestamp_field: Option<String>,
    pub timestamp_format: TimestampFormat,
}

/// Periodic aggregates over a source. Its windowed features must all be
/// sliding-window transforms; the emitted rows live on the step grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlidingFeatureView {
    pub name: String,
    pub source: Box<TableDescriptor>,
    pub features: Vec<FeatureDecl>,
    pub timestamp_field: Option<String>,
    pub timestamp_format: TimestampFormat,
}

/// Named logical table. At most one compiled table exists per name per
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableDescriptor {
    Source(SourceTable),
    Derived(DerivedFeatureView),
    Sliding(SlidingFeatureView),
}

impl TableDescriptor {
    pub fn name(&self) -> &str {
        match self {
            TableDescriptor::Source(s) => &s.name,
            TableDescriptor::Derived(v) => &v.name,
            TableDescriptor::Sliding(v) => &v.name,
        }
    }

    pub fn timestamp_field(&self) -> Option<&str> {
        match self {
            TableDescriptor::Source(s) => s.timestamp_field.as_deref(),
            TableDescriptor::Derived(v) => v.timestamp_field.as_deref(),
            TableDescriptor::Sliding(v) => v.timestamp_field.as_deref(),
        }
    }

    pub fn timestamp_format(&self) -> &TimestampFormat {
        match self {
            TableDescriptor::Source(s) => &s.timestamp_format,
            TableDescriptor::Derived(v) => &v.timestamp_format,
            TableDescriptor::Sliding(v) => &v.timestamp_format,
        }
    }

    fn feature_decls(&self) -> &[FeatureDecl] {
        match self {
            TableDescriptor::Source(_) => &[],
            TableDescriptor::Derived(v) => &v.features,
            TableDescriptor::Sliding(v) => &v.features,
        }
    }

    /// A view with any by-name feature declaration cannot be compiled yet.
    pub fn is_unresolved(&self) -> bool {
        self.feature_decls()
            .iter()
            .any(|decl| matches!(decl, FeatureDecl::Name(_)))
    }

    /// Declared features, failing if any is still a bare name.
    pub fn resolved_features(&self) -> Result<Vec<Feature>> {
        self.feature_decls()
            .iter()
            .map(|decl| match decl {
                FeatureDecl::Feature(f) => Ok(f.clone()),
                FeatureDecl::Name(n) => Err(Error::Definition(format!(
                    "feature '{}' of view '{}' is unresolved",
                    n,
                    self.name()
                ))),
            })
            .collect()
    }

    /// Look up a declared feature by name, ignoring unresolved entries.
    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.feature_decls().iter().find_map(|decl| match decl {
            FeatureDecl::Feature(f) if f.name == name => Some(f),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, Field};
    use crate::transform::Transform;

    fn source() -> TableDescriptor {
        TableDescriptor::Source(SourceTable {
            name: "events".into(),
            schema: Schema::new(vec![Field::new("user_id", DataType::Int64, false)]),
            keys: vec!["user_id".into()],
            timestamp_field: None,
            timestamp_format: TimestampFormat::EpochMillis,
        })
    }

    #[test]
    fn unresolved_view_is_flagged() {
        let view = TableDescriptor::Derived(DerivedFeatureView {
            name: "v".into(),
            source: Box::new(source()),
            features: vec![FeatureDecl::Name("someone_elses_feature".into())],
            timestamp_field: None,
            timestamp_format: TimestampFormat::EpochMillis,
        });
        assert!(view.is_unresolved());
        assert!(view.resolved_features().is_err());
    }

    #[test]
    fn structural_equality_over_all_fields() {
        let a = source();
        let mut b = a.clone();
        assert_eq!(a, b);
        if let TableDescriptor::Source(s) = &mut b {
            s.keys.clear();
        }
        assert_ne!(a, b);
    }

    #[test]
    fn feature_lookup_by_name() {
        let f = Feature::new(
            "f",
            DataType::Int64,
            Transform::Expression { expr: "1".into() },
        );
        let view = TableDescriptor::Derived(DerivedFeatureView {
            name: "v".into(),
            source: Box::new(source()),
            features: vec![FeatureDecl::Feature(f.clone())],
            timestamp_field: None,
            timestamp_format: TimestampFormat::EpochMillis,
        });
        assert_eq!(view.feature("f"), Some(&f));
        assert_eq!(view.feature("g"), None);
    }
}
