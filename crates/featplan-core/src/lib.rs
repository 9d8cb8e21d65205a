#![forbid(unsafe_code)]
//! featplan-core: pure definition and value types for the feature-plan
//! compiler.
//!
//! Everything here is immutable data with structural equality: schemas,
//! in-memory tables, table descriptors (sources and feature views),
//! features and their transforms, and the descriptor keys used to batch
//! window aggregations and temporal joins. No I/O and no execution live in
//! this crate.

pub mod error;
pub mod feature;
pub mod prelude;
pub mod schema;
pub mod time;
pub mod transform;
pub mod types;
pub mod view;
