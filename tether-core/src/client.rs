//! Query documents, payloads, and the transport seam.
//!
//! The query-execution client is a collaborator, not part of the core: the
//! core hands it a [`QueryRequest`] and receives a [`Deferred`] payload. A
//! rejected deferred is a transport failure; execution errors ride inside a
//! resolved [`QueryPayload`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GraphError;
use crate::runtime::Deferred;

/// Variables attached to a query request. Compared by deep value equality.
pub type Variables = serde_json::Map<String, Value>;

/// Build a variable map from a `json!` object literal. Non-objects yield an
/// empty map.
pub fn variables(value: Value) -> Variables {
    match value {
        Value::Object(map) => map,
        _ => Variables::new(),
    }
}

/// An immutable query document.
///
/// Documents compare by identity, not by source text: two separately
/// constructed documents with identical source are different queries, while
/// clones share one identity. Reconciliation treats a document change as a
/// change of query identity.
#[derive(Clone)]
pub struct QueryDocument {
    source: Arc<str>,
}

impl QueryDocument {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: Arc::from(source.into()),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Identity comparison.
    pub fn same_document(&self, other: &QueryDocument) -> bool {
        Arc::ptr_eq(&self.source, &other.source)
    }
}

impl PartialEq for QueryDocument {
    fn eq(&self, other: &Self) -> bool {
        self.same_document(other)
    }
}

impl Eq for QueryDocument {}

impl fmt::Debug for QueryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first_line = self.source.lines().find(|line| !line.trim().is_empty());
        write!(f, "QueryDocument({})", first_line.unwrap_or("").trim())
    }
}

/// One request handed to the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryRequest {
    pub document: QueryDocument,
    pub variables: Variables,
}

/// The structured result of executing one request.
///
/// `data` and `errors` may both be present: a partially failed execution
/// renders what it can.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphError>,
}

impl QueryPayload {
    pub fn data(value: Value) -> Self {
        Self {
            data: Some(value),
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<GraphError>) -> Self {
        Self {
            data: None,
            errors,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// The query-execution collaborator.
pub trait QueryTransport: Send + Sync {
    /// Issue one request. The returned deferred settles at most once.
    fn execute(&self, request: &QueryRequest) -> Deferred<QueryPayload>;
}
