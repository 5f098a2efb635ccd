use std::fmt;
use thiserror::Error;

/// A single field-level validation failure.
///
/// Validation never stops at the first offending field; the validator
/// collects one of these per defect so the operator sees the complete
/// list in a single round trip.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    /// Dotted path of the offending property (`address.city`, `tags[2]`).
    pub field: String,
    /// Human-readable reason, rendered next to the field.
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Error type for the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The schema document is not valid JSON or violates the document
    /// invariants (root `type: "object"` with a `properties` mapping)
    #[error("Malformed schema: {0}")]
    MalformedSchema(String),

    /// One or more fields of a candidate record failed validation
    #[error("Validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    /// Network or store failure; carries the backend-provided detail
    /// verbatim when present, else a generic category message
    #[error("Backend error: {0}")]
    Backend(String),

    /// A referenced uuid is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller misuse of the engine API
    #[error("Client error: {0}")]
    Client(String),

    /// Errors related to serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|error| error.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Conversion from reqwest::Error to EngineError
impl From<reqwest::Error> for EngineError {
    fn from(error: reqwest::Error) -> Self {
        EngineError::Backend(error.to_string())
    }
}

/// Result type alias for operations that can result in an EngineError
pub type EngineResult<T> = Result<T, EngineError>;
