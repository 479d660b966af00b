//! Shared fixtures for the integration suite: a scriptable transport, a
//! render-recording component, and a small counter store.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tether_core::{
    Component, Deferred, MemoryStore, Props, Provider, QueryError, QueryPayload, QueryRequest,
    QueryTransport, Scheduler, Store, Variables,
};

/// Initialize test logging once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// Transport that records every request and lets the test settle each one
/// explicitly.
pub struct MockTransport {
    requests: Mutex<Vec<(QueryRequest, Deferred<QueryPayload>)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn variables_of(&self, index: usize) -> Variables {
        self.requests.lock()[index].0.variables.clone()
    }

    pub fn document_source_of(&self, index: usize) -> String {
        self.requests.lock()[index].0.document.source().to_string()
    }

    pub fn resolve(&self, index: usize, data: Value) {
        self.settle(index, Ok(QueryPayload::data(data)));
    }

    pub fn resolve_payload(&self, index: usize, payload: QueryPayload) {
        self.settle(index, Ok(payload));
    }

    pub fn reject(&self, index: usize, error: QueryError) {
        self.settle(index, Err(error));
    }

    fn settle(&self, index: usize, outcome: Result<QueryPayload, QueryError>) {
        let deferred = self.requests.lock()[index].1.clone();
        deferred.settle(outcome);
    }
}

impl QueryTransport for MockTransport {
    fn execute(&self, request: &QueryRequest) -> Deferred<QueryPayload> {
        let deferred = Deferred::new();
        self.requests
            .lock()
            .push((request.clone(), deferred.clone()));
        deferred
    }
}

/// Component that records every prop map it renders.
pub struct RenderLog {
    renders: Arc<Mutex<Vec<Props>>>,
}

impl RenderLog {
    pub fn new() -> (Self, Arc<Mutex<Vec<Props>>>) {
        let renders = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                renders: Arc::clone(&renders),
            },
            renders,
        )
    }
}

impl Component for RenderLog {
    fn render(&mut self, props: &Props) {
        self.renders.lock().push(props.clone());
    }
}

/// Store with a `counter` incremented by `INCREMENT` and set by
/// `SET { value }`.
pub fn counter_store() -> Arc<MemoryStore> {
    MemoryStore::new(json!({ "counter": 1 }), |state, action| {
        let mut next = state.clone();
        match action["type"].as_str() {
            Some("INCREMENT") => {
                next["counter"] = json!(next["counter"].as_i64().unwrap_or(0) + 1);
            }
            Some("SET") => {
                next["counter"] = action["value"].clone();
            }
            _ => {}
        }
        next
    })
}

/// Provider over the mock transport, the counter store, and a fresh
/// scheduler.
pub fn provider(transport: &Arc<MockTransport>) -> Provider {
    Provider::new(
        Arc::clone(transport) as Arc<dyn QueryTransport>,
        counter_store() as Arc<dyn Store>,
        Scheduler::new(),
    )
}
