use thiserror::Error;

/// Errors produced while interpreting collection metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The tag is not declared in the collection schema.
    #[error("tag '{0}' not found in system tags")]
    TagNotFound(String),

    /// A record lacks tags the collection declares mandatory.
    #[error("missing mandatory tags: {}", .0.join(", "))]
    MissingMandatory(Vec<String>),

    /// A metadata document did not have the expected shape.
    #[error("malformed document: {0}")]
    Malformed(String),
}
