use thiserror::Error;

/// Canonical result for the whole workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Plan-construction errors. All of these are synchronous and
/// non-retryable without changing the definitions that caused them.
#[derive(Debug, Error)]
pub enum Error {
    /// An unresolved feature view (or an unknown table name) reached the
    /// builder.
    #[error("Definition error: {0}")]
    Definition(String),

    /// A required key/timestamp field is missing, or a requested field is
    /// absent from a table's schema.
    #[error("Schema error: {0}")]
    Schema(String),

    /// The same descriptor name maps to two structurally different
    /// descriptors within one session. A caller bug, not retryable.
    #[error("Conflict error: {0}")]
    Conflict(String),

    /// A feature carries a transform kind its view cannot evaluate.
    #[error("Unsupported transform: {0}")]
    UnsupportedTransform(String),

    /// Descriptor references form a cycle through named lookups.
    #[error("Cycle detected: {0}")]
    Cycle(String),

    /// An embedded expression failed to parse or evaluate. Expressions are
    /// opaque to the compiler, so these surface at evaluation time.
    #[error("Expression error: {0}")]
    Expression(String),
}
