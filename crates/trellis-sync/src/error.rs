//! Error types for replication.

use crate::network::NetworkError;
use thiserror::Error;
use trellis_graph::GraphError;

/// Errors that can occur while replicating a document.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown room: {0}")]
    UnknownRoom(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<NetworkError> for SyncError {
    fn from(err: NetworkError) -> Self {
        SyncError::Network(err.to_string())
    }
}

/// Result type for replication operations.
pub type Result<T> = std::result::Result<T, SyncError>;
