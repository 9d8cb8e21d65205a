//! Minimal YAML → `TableDescriptor` parser.
//!
//! Example:
//! ```yaml
//! sources:
//!   - name: purchases
//!     keys: [user_id]
//!     timestamp: { field: ts, format: epoch }
//!     schema:
//!       - { name: user_id, type: i64 }
//!       - { name: spend,   type: f64 }
//!       - { name: ts,      type: i64 }
//! views:
//!   - name: user_spend
//!     source: purchases
//!     timestamp: { field: ts, format: epoch }
//!     features:
//!       - name: running_spend
//!         type: f64
//!         over_window: { agg: sum, column: spend, partition_by: [user_id] }
//! ```
//!
//! Views may stack on earlier sources/views by name; join targets stay
//! name-only and are resolved through the registry at build time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use featplan_core::prelude::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub sources: Vec<SourceDef>,
    #[serde(default)]
    pub views: Vec<ViewDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDef {
    pub name: String,
    #[serde(default)]
    pub keys: Vec<String>,
    pub schema: Vec<FieldDef>,
    #[serde(default)]
    pub timestamp: Option<TimestampDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampDef {
    pub field: String,
    /// "epoch", "epoch_millis", or a strftime pattern.
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDef {
    pub name: String,
    /// "derived" (default) or "sliding".
    #[serde(default)]
    pub kind: Option<String>,
    pub source: String,
    #[serde(default)]
    pub timestamp: Option<TimestampDef>,
    pub features: Vec<FeatureDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub keys: Option<Vec<String>>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub over_window: Option<OverWindowDef>,
    #[serde(default)]
    pub sliding_window: Option<SlidingWindowDef>,
    #[serde(default)]
    pub join: Option<JoinDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverWindowDef {
    pub agg: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub partition_by: Vec<String>,
    #[serde(default)]
    pub order_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindowDef {
    pub agg: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub group_by: Vec<String>,
    pub window: String,
    pub step: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinDef {
    pub table: String,
    pub field: String,
}

/// Parse a YAML document into descriptors, in declaration order.
pub fn parse_yaml_views(yaml_src: &str) -> Result<Vec<TableDescriptor>> {
    let doc: Document = serde_yaml::from_str(yaml_src)
        .map_err(|e| Error::Definition(format!("invalid view document: {}", e)))?;

    let mut by_name: BTreeMap<String, TableDescriptor> = BTreeMap::new();
    let mut out = Vec::new();

    for source in &doc.sources {
        let descriptor = TableDescriptor::Source(SourceTable {
            name: source.name.clone(),
            schema: to_schema(&source.schema)?,
            keys: source.keys.clone(),
            timestamp_field: source.timestamp.as_ref().map(|t| t.field.clone()),
            timestamp_format: timestamp_format(source.timestamp.as_ref()),
        });
        by_name.insert(source.name.clone(), descriptor.clone());
        out.push(descriptor);
    }

    for view in &doc.views {
        let source = by_name.get(&view.source).cloned().ok_or_else(|| {
            Error::Definition(format!(
                "view '{}' stacks on unknown table '{}'",
                view.name, view.source
            ))
        })?;
        let features = view
            .features
            .iter()
            .map(to_feature)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .map(FeatureDecl::Feature)
            .collect();

        let kind = view.kind.as_deref().unwrap_or("derived");
        let descriptor = match kind {
            "derived" => TableDescriptor::Derived(DerivedFeatureView {
                name: view.name.clone(),
                source: Box::new(source),
                features,
                timestamp_field: view.timestamp.as_ref().map(|t| t.field.clone()),
                timestamp_format: timestamp_format(view.timestamp.as_ref()),
            }),
            "sliding" => TableDescriptor::Sliding(SlidingFeatureView {
                name: view.name.clone(),
                source: Box::new(source),
                features,
                timestamp_field: view.timestamp.as_ref().map(|t| t.field.clone()),
                timestamp_format: timestamp_format(view.timestamp.as_ref()),
            }),
            other => {
                return Err(Error::Definition(format!(
                    "view '{}' has unknown kind '{}'",
                    view.name, other
                )))
            }
        };
        by_name.insert(view.name.clone(), descriptor.clone());
        out.push(descriptor);
    }

    Ok(out)
}

fn timestamp_format(def: Option<&TimestampDef>) -> TimestampFormat {
    match def.and_then(|t| t.format.as_deref()) {
        None | Some("epoch_millis") => TimestampFormat::EpochMillis,
        Some("epoch") => TimestampFormat::EpochSeconds,
        Some(pattern) => TimestampFormat::Pattern(pattern.to_string()),
    }
}

fn parse_dtype(s: &str) -> Result<DataType> {
    Ok(match s {
        "Boolean" | "bool" => DataType::Boolean,
        "Int32" | "i32" => DataType::Int32,
        "Int64" | "i64" => DataType::Int64,
        "Float32" | "f32" => DataType::Float32,
        "Float64" | "f64" => DataType::Float64,
        "Utf8" | "string" => DataType::Utf8,
        "Binary" | "bytes" => DataType::Binary,
        "Timestamp" | "timestamp" => DataType::Timestamp,
        other => return Err(Error::Definition(format!("unknown data type '{}'", other))),
    })
}

fn to_schema(fields: &[FieldDef]) -> Result<Schema> {
    Ok(Schema::new(
        fields
            .iter()
            .map(|f| {
                Ok(Field {
                    name: f.name.clone(),
                    data_type: parse_dtype(&f.data_type)?,
                    nullable: f.nullable,
                })
            })
            .collect::<Result<Vec<_>>>()?,
    ))
}

fn parse_agg(name: &str, column: Option<&str>, feature: &str) -> Result<Aggregation> {
    let require_column = || {
        column.map(str::to_string).ok_or_else(|| {
            Error::Definition(format!(
                "aggregation '{}' of feature '{}' needs a column",
                name, feature
            ))
        })
    };
    Ok(match name {
        "count" => Aggregation::Count,
        "sum" => Aggregation::Sum(require_column()?),
        "avg" => Aggregation::Avg(require_column()?),
        "min" => Aggregation::Min(require_column()?),
        "max" => Aggregation::Max(require_column()?),
        other => {
            return Err(Error::Definition(format!(
                "unknown aggregation '{}' for feature '{}'",
                other, feature
            )))
        }
    })
}

/// Parse durations like "500ms", "30s", "10m", "2h". A bare integer is
/// seconds.
fn parse_duration(text: &str, feature: &str) -> Result<Duration> {
    let bad = || {
        Error::Definition(format!(
            "bad duration '{}' for feature '{}'",
            text, feature
        ))
    };
    let (digits, unit): (String, String) = text.chars().partition(|c| c.is_ascii_digit());
    let value: u64 = digits.parse().map_err(|_| bad())?;
    Ok(match unit.as_str() {
        "ms" => Duration::from_millis(value),
        "" | "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 3600),
        _ => return Err(bad()),
    })
}

fn to_feature(def: &FeatureDef) -> Result<Feature> {
    let data_type = parse_dtype(&def.data_type)?;
    let transforms = usize::from(def.expression.is_some())
        + usize::from(def.over_window.is_some())
        + usize::from(def.sliding_window.is_some())
        + usize::from(def.join.is_some());
    if transforms != 1 {
        return Err(Error::Definition(format!(
            "feature '{}' must declare exactly one transform, found {}",
            def.name, transforms
        )));
    }

    let transform = if let Some(expr) = &def.expression {
        Transform::Expression { expr: expr.clone() }
    } else if let Some(window) = &def.over_window {
        Transform::OverWindow {
            agg: parse_agg(&window.agg, window.column.as_deref(), &def.name)?,
            partition_keys: window.partition_by.clone(),
            order_key: window
                .order_by
                .clone()
                .unwrap_or_else(|| EVENT_TIME_COLUMN.to_string()),
        }
    } else if let Some(window) = &def.sliding_window {
        Transform::SlidingWindow {
            agg: parse_agg(&window.agg, window.column.as_deref(), &def.name)?,
            group_by_keys: window.group_by.clone(),
            window_size: parse_duration(&window.window, &def.name)?,
            step_size: parse_duration(&window.step, &def.name)?,
        }
    } else if let Some(join) = &def.join {
        Transform::Join {
            table_name: join.table.clone(),
            feature_name: join.field.clone(),
        }
    } else {
        // Unreachable given the count check above.
        return Err(Error::Definition(format!(
            "feature '{}' has no transform",
            def.name
        )));
    };

    let mut feature = Feature::new(def.name.clone(), data_type, transform);
    if let Some(keys) = &def.keys {
        feature = feature.with_keys(keys.clone());
    }
    Ok(feature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
sources:
  - name: purchases
    keys: [user_id]
    timestamp: { field: ts, format: epoch }
    schema:
      - { name: user_id, type: i64 }
      - { name: spend,   type: f64 }
      - { name: ts,      type: i64 }
views:
  - name: user_spend
    source: purchases
    timestamp: { field: ts, format: epoch }
    features:
      - name: running_spend
        type: f64
        over_window: { agg: sum, column: spend, partition_by: [user_id] }
  - name: user_spend_10m
    kind: sliding
    source: purchases
    timestamp: { field: ts, format: epoch }
    features:
      - name: spend_10m
        type: f64
        sliding_window: { agg: sum, column: spend, group_by: [user_id], window: 10m, step: 5m }
"#;

    #[test]
    fn parses_sources_and_views() {
        let descriptors = parse_yaml_views(DOC).unwrap();
        assert_eq!(descriptors.len(), 3);
        assert!(matches!(descriptors[0], TableDescriptor::Source(_)));
        assert!(matches!(descriptors[1], TableDescriptor::Derived(_)));
        assert!(matches!(descriptors[2], TableDescriptor::Sliding(_)));

        let TableDescriptor::Sliding(view) = &descriptors[2] else {
            panic!("expected sliding view");
        };
        let feature = view
            .features
            .iter()
            .find_map(|decl| match decl {
                FeatureDecl::Feature(f) if f.name == "spend_10m" => Some(f),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            feature.transform,
            Transform::SlidingWindow {
                agg: Aggregation::Sum("spend".into()),
                group_by_keys: vec!["user_id".into()],
                window_size: Duration::from_secs(600),
                step_size: Duration::from_secs(300),
            }
        );
    }

    #[test]
    fn unknown_stack_target_is_definition_error() {
        let err = parse_yaml_views(
            "views:\n  - name: v\n    source: nope\n    features: []\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Definition(_)));
    }

    #[test]
    fn feature_needs_exactly_one_transform() {
        let doc = r#"
sources:
  - name: s
    schema: [{ name: a, type: i64 }]
views:
  - name: v
    source: s
    features:
      - { name: f, type: i64 }
"#;
        assert!(matches!(
            parse_yaml_views(doc),
            Err(Error::Definition(_))
        ));
    }
}
