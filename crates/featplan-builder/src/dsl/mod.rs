//! Declarative front-ends for feature views.

pub mod yaml;
