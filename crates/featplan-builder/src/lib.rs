#![forbid(unsafe_code)]
//! featplan-builder: compiles a graph of feature-view descriptors into one
//! table.
//!
//! Design:
//! - `TableBuilder` is one compilation session: a per-session cache maps
//!   each descriptor name to its compiled table exactly once, and a
//!   cycle guard rejects descriptor graphs that loop through named
//!   lookups.
//! - Compilation is a pure, synchronous dispatch over the closed
//!   `Transform` sum type; all data work is delegated to the
//!   `TableEngine` collaborator.
//! - Features sharing a window shape collapse into one aggregation call;
//!   join features sharing `(table, keys)` collapse into one as-of join;
//!   sliding grids with different cadences are reconciled by outer joins
//!   with typed defaults.
//!
//! The YAML front-end in `dsl` is a convenience for declaring sources and
//! views; the builder itself only ever sees `TableDescriptor` values.

pub mod builder;
pub mod config;
pub mod deps;
pub mod dsl;

mod derived;
mod sliding;

pub use builder::{KeySet, TableBuilder};
pub use config::BuilderConfig;
pub use deps::dependent_features;
pub use dsl::yaml::parse_yaml_views;
