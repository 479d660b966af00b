//! # tether-core
//!
//! A reactive query-to-props binding core. `tether` keeps a component's
//! rendered properties synchronized with a set of named remote-query
//! bindings that are themselves derived from the component's own props and
//! from an externally owned state container — reconciling subscriptions as
//! inputs change, tracking loading/error/data per binding, and exposing
//! imperative controls (refetch, incremental fetch, polling) while
//! suppressing redundant requests and redundant renders.
//!
//! ## Architecture
//!
//! - [`runtime`]: the deterministic single-threaded scheduler and
//!   promise-style deferred values everything asynchronous is built on.
//! - [`client`]: query documents, payloads, and the [`QueryTransport`]
//!   collaborator trait.
//! - [`store`]: the external state-container seam and its dispatcher.
//! - [`connect`]: the binding core — descriptors, adapters, the reconcile
//!   diff, prop projection, and the connector state machine.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use tether_core::{
//!     bind, variables, BindConfig, MemoryStore, OwnProps, Props, Component,
//!     Provider, QueryDocument, QuerySpec, Scheduler, SpecMap, Store,
//! };
//! # use tether_core::{Deferred, QueryPayload, QueryRequest, QueryTransport};
//! # struct NullTransport;
//! # impl QueryTransport for NullTransport {
//! #     fn execute(&self, _request: &QueryRequest) -> Deferred<QueryPayload> {
//! #         Deferred::new()
//! #     }
//! # }
//!
//! struct PeopleList;
//!
//! impl Component for PeopleList {
//!     fn render(&mut self, props: &Props) {
//!         let people = props["people"].as_query().unwrap();
//!         if people.loading() {
//!             println!("loading…");
//!         }
//!     }
//! }
//!
//! let scheduler = Scheduler::new();
//! let provider = Provider::new(
//!     Arc::new(NullTransport),
//!     MemoryStore::fixed(json!({})) as Arc<dyn Store>,
//!     scheduler.clone(),
//! );
//!
//! let document = QueryDocument::new("query people { allPeople { name } }");
//! let connector = bind(BindConfig::new().queries(move |ctx| {
//!     let mut specs = SpecMap::new();
//!     specs.insert(
//!         "people".into(),
//!         QuerySpec::query(document.clone())
//!             .with_variables(variables(json!({ "first": ctx.own_props["count"] }))),
//!     );
//!     specs
//! }))
//! .component(PeopleList)
//! .mount(&provider, {
//!     let mut own = OwnProps::new();
//!     own.insert("count".into(), json!(10));
//!     own
//! });
//!
//! scheduler.run_until_idle();
//! connector.unmount();
//! ```

pub mod client;
pub mod connect;
pub mod error;
pub mod runtime;
pub mod store;

pub use client::{
    variables, QueryDocument, QueryPayload, QueryRequest, QueryTransport, Variables,
};
pub use connect::{
    bind, ActionHandler, BindConfig, Binder, Bound, Component, Connector, DispatchProps,
    FetchMoreOptions, OwnProps, PropValue, Props, Provider, QueryContext, QueryHandle,
    QuerySnapshot, QuerySpec, SpecMap, StateProps,
};
pub use error::{GraphError, QueryError, Result};
pub use runtime::{Deferred, Scheduler, TimerHandle};
pub use store::{Dispatcher, MemoryStore, Store, StoreSubscription};
