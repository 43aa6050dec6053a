//! Error types for the document graph.

use crate::id::EntityId;
use thiserror::Error;

/// Errors that can occur while reading or mutating the graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Entity already exists: {0}")]
    AlreadyExists(EntityId),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Type mismatch on field '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("Field '{0}' is reserved")]
    ReservedField(String),

    #[error("Invalid index: {index} (length: {length})")]
    IndexOutOfBounds { index: usize, length: usize },

    #[error("No action is open")]
    NoOpenAction,

    #[error("Action '{0}' is still open")]
    ActionAlreadyOpen(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GraphError {
    pub(crate) fn violation(message: impl Into<String>) -> Self {
        GraphError::InvariantViolation(message.into())
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
