#![forbid(unsafe_code)]
//! featplan-engine: the seam between the plan compiler and whatever
//! actually executes tables.
//!
//! The builder only ever talks to the [`TableEngine`] and [`Registry`]
//! traits. This crate also ships `MemEngine`/`MemRegistry`, an in-memory
//! reference implementation: eager, single-threaded, and deterministic,
//! which is exactly what the compiler's tests need.

mod agg;

pub mod expr;
pub mod join;
pub mod mem;
pub mod sliding;
pub mod traits;
pub mod window;

pub use mem::{MemEngine, MemRegistry};
pub use traits::{Registry, TableEngine};
