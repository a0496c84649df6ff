//! Error types for event knowledge graph construction

use crate::graph::GraphError;
use thiserror::Error;

/// Errors that can occur while loading a semantic header or building a graph
#[derive(Error, Debug)]
pub enum EkgError {
    /// The semantic header or configuration is inconsistent. Raised before
    /// any statement reaches the store.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The graph store rejected or failed a statement
    #[error("Store execution error: {0}")]
    StoreExecution(String),

    /// A post-condition of a construction phase does not hold
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// HTTP transport error (remote gateway)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<GraphError> for EkgError {
    fn from(err: GraphError) -> Self {
        EkgError::StoreExecution(err.to_string())
    }
}

impl EkgError {
    pub fn config(msg: impl Into<String>) -> Self {
        EkgError::Configuration(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        EkgError::StoreExecution(msg.into())
    }

    /// True for failures reported by the store or its transport
    pub fn is_store_error(&self) -> bool {
        matches!(self, EkgError::StoreExecution(_) | EkgError::Http(_))
    }
}

pub type EkgResult<T> = Result<T, EkgError>;
