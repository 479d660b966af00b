//! Error types for bound queries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;

/// A single error entry reported by the query-execution layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphError {
    /// Human-readable description of the failure.
    pub message: String,
    /// Optional machine-readable error name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl GraphError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: None,
        }
    }

    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: Some(name.into()),
        }
    }
}

/// Main error type for bound queries.
///
/// Transport and execution failures only ever surface inside the `errors`
/// field of the affected key's snapshot; they never cross the render
/// boundary as a panic. Late deliveries are not errors at all: a result
/// arriving for a disposed or superseded request is dropped silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The transport failed before producing a structured result.
    #[error("transport error: {0}")]
    Transport(String),

    /// The query executed but reported per-request errors.
    #[error("query returned {} error(s)", .0.len())]
    Execution(Vec<GraphError>),

    /// `map_queries` produced a malformed entry for a key.
    #[error("invalid query descriptor for `{key}`: {reason}")]
    Descriptor { key: String, reason: String },
}

impl QueryError {
    /// The execution errors carried by this error, if any.
    pub fn graph_errors(&self) -> &[GraphError] {
        match self {
            QueryError::Execution(errors) => errors,
            _ => &[],
        }
    }
}
