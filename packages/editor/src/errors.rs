//! Error types for the editor

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("No capability registered for node type: {0}")]
    CapabilityNotFound(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Capability registered twice for node type: {0}")]
    DuplicateCapability(String),

    #[error("Invalid edge: {0}")]
    InvalidEdge(String),

    #[error("Remote document service error: {0}")]
    Remote(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("No {0} configured")]
    ServiceUnavailable(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the editor
pub type EditorResult<T> = Result<T, EditorError>;
