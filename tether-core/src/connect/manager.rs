//! Query binding lifecycle.
//!
//! The manager owns the set of live bindings for one connected component and
//! reconciles it against each freshly validated descriptor map:
//!
//! - a key with an equivalent descriptor is left untouched,
//! - the same query with a new poll interval retunes polling in place,
//! - the same document with new variables revalidates in the background,
//! - a new document replaces the binding and resets its data,
//! - a vanished key disposes its binding,
//! - a descriptor error replaces the binding with a failed placeholder
//!   scoped to that key alone.
//!
//! Key order follows the descriptor map, so projected props enumerate in
//! declaration order.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::client::{QueryPayload, QueryTransport};
use crate::connect::adapter::{
    Disposer, FetchMoreOptions, QuerySnapshot, SubscriptionAdapter,
};
use crate::connect::descriptor::{DescriptorMap, QueryDescriptor};
use crate::error::QueryError;
use crate::runtime::{Deferred, Scheduler};

/// Change listener shared by every binding of one connector.
pub type BindingListener = Arc<dyn Fn() + Send + Sync>;

struct Binding {
    descriptor: QueryDescriptor,
    adapter: SubscriptionAdapter,
    _listener: Disposer,
}

enum BindingState {
    Live(Binding),
    /// The descriptor for this key failed validation; other keys are
    /// unaffected.
    Failed(QueryError),
}

/// Owns and reconciles the bindings of one connected component.
pub struct QueryBindingManager {
    transport: Arc<dyn QueryTransport>,
    scheduler: Scheduler,
    bindings: IndexMap<String, BindingState>,
}

impl QueryBindingManager {
    pub fn new(transport: Arc<dyn QueryTransport>, scheduler: Scheduler) -> Self {
        Self {
            transport,
            scheduler,
            bindings: IndexMap::new(),
        }
    }

    /// Bring the binding set in line with `descriptors`. Every live binding
    /// created here reports changes through `on_change`.
    pub fn reconcile(&mut self, descriptors: DescriptorMap, on_change: &BindingListener) {
        let mut next: IndexMap<String, BindingState> = IndexMap::with_capacity(descriptors.len());

        for (key, validated) in descriptors {
            let previous = self.bindings.shift_remove(&key);
            let state = match validated {
                Err(error) => {
                    if let Some(BindingState::Live(binding)) = previous {
                        debug!(key = %key, "binding replaced by descriptor error");
                        binding.adapter.dispose();
                    }
                    BindingState::Failed(error)
                }
                Ok(descriptor) => match previous {
                    Some(BindingState::Live(binding)) => {
                        self.carry_over(&key, binding, descriptor, on_change)
                    }
                    Some(BindingState::Failed(_)) | None => {
                        debug!(key = %key, "opening query binding");
                        BindingState::Live(self.open(descriptor, on_change))
                    }
                },
            };
            next.insert(key, state);
        }

        for (key, state) in self.bindings.drain(..) {
            if let BindingState::Live(binding) = state {
                debug!(key = %key, "closing vanished query binding");
                binding.adapter.dispose();
            }
        }
        self.bindings = next;
    }

    /// Keep, retune, revalidate, or replace one existing live binding.
    fn carry_over(
        &self,
        key: &str,
        binding: Binding,
        descriptor: QueryDescriptor,
        on_change: &BindingListener,
    ) -> BindingState {
        if binding.descriptor.equivalent(&descriptor) {
            trace!(key, "binding unchanged");
            return BindingState::Live(binding);
        }
        if !binding
            .descriptor
            .document
            .same_document(&descriptor.document)
        {
            // A different document is a different query: start over.
            debug!(key, "query document changed, replacing binding");
            binding.adapter.dispose();
            return BindingState::Live(self.open(descriptor, on_change));
        }

        if binding.descriptor.variables != descriptor.variables {
            trace!(key, "query variables changed");
            binding.adapter.update_variables(descriptor.variables.clone());
        }
        if binding.descriptor.poll_interval_ms != descriptor.poll_interval_ms {
            trace!(key, "poll interval changed");
            binding
                .adapter
                .set_poll_interval(descriptor.poll_interval_ms);
        }
        BindingState::Live(Binding {
            descriptor,
            adapter: binding.adapter,
            _listener: binding._listener,
        })
    }

    fn open(&self, descriptor: QueryDescriptor, on_change: &BindingListener) -> Binding {
        let adapter = SubscriptionAdapter::new(
            Arc::clone(&self.transport),
            self.scheduler.clone(),
            descriptor.document.clone(),
            descriptor.variables.clone(),
            descriptor.poll_interval_ms,
        );
        let notify = Arc::clone(on_change);
        let listener = adapter.subscribe(move || notify());
        Binding {
            descriptor,
            adapter,
            _listener: listener,
        }
    }

    /// Per-key handles carrying the current snapshots, in binding order.
    pub fn handles(&self) -> IndexMap<String, QueryHandle> {
        self.bindings
            .iter()
            .map(|(key, state)| {
                let handle = match state {
                    BindingState::Live(binding) => QueryHandle::live(&binding.adapter),
                    BindingState::Failed(error) => QueryHandle::failed(error.clone()),
                };
                (key.clone(), handle)
            })
            .collect()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Dispose every live binding. Late results and poll ticks for them
    /// become inert.
    pub fn dispose_all(&mut self) {
        for (key, state) in self.bindings.drain(..) {
            if let BindingState::Live(binding) = state {
                trace!(key = %key, "disposing binding");
                binding.adapter.dispose();
            }
        }
    }
}

impl fmt::Debug for QueryBindingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBindingManager")
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

/// Per-key view handed to the component: the snapshot plus the control
/// surface of the underlying binding.
///
/// A handle for a key whose descriptor failed validation carries the error
/// with `loading = false` and rejects every control call.
#[derive(Clone)]
pub struct QueryHandle {
    snapshot: QuerySnapshot,
    adapter: Option<SubscriptionAdapter>,
}

impl QueryHandle {
    fn live(adapter: &SubscriptionAdapter) -> Self {
        Self {
            snapshot: adapter.snapshot(),
            adapter: Some(adapter.clone()),
        }
    }

    fn failed(error: QueryError) -> Self {
        Self {
            snapshot: QuerySnapshot {
                loading: false,
                data: None,
                errors: Some(error),
            },
            adapter: None,
        }
    }

    pub fn loading(&self) -> bool {
        self.snapshot.loading
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        self.snapshot.data.as_ref()
    }

    pub fn errors(&self) -> Option<&QueryError> {
        self.snapshot.errors.as_ref()
    }

    pub fn snapshot(&self) -> &QuerySnapshot {
        &self.snapshot
    }

    /// Re-issue the query, flipping `loading` until the result applies.
    pub fn refetch(&self, variables: Option<crate::client::Variables>) -> Deferred<QueryPayload> {
        match &self.adapter {
            Some(adapter) => adapter.refetch(variables),
            None => Deferred::rejected(self.failed_error()),
        }
    }

    /// Fetch an additional page and merge it into held data.
    pub fn fetch_more(&self, options: FetchMoreOptions) -> Deferred<()> {
        match &self.adapter {
            Some(adapter) => adapter.fetch_more(options),
            None => Deferred::rejected(self.failed_error()),
        }
    }

    pub fn start_polling(&self, interval_ms: u64) {
        if let Some(adapter) = &self.adapter {
            adapter.start_polling(interval_ms);
        }
    }

    pub fn stop_polling(&self) {
        if let Some(adapter) = &self.adapter {
            adapter.stop_polling();
        }
    }

    fn failed_error(&self) -> QueryError {
        self.snapshot
            .errors
            .clone()
            .unwrap_or_else(|| QueryError::Transport("query binding unavailable".into()))
    }
}

impl PartialEq for QueryHandle {
    /// Snapshot comparison only; the control surface has no bearing on
    /// whether a re-render is needed.
    fn eq(&self, other: &Self) -> bool {
        self.snapshot == other.snapshot
    }
}

impl fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("loading", &self.snapshot.loading)
            .field("data", &self.snapshot.data)
            .field("errors", &self.snapshot.errors)
            .finish()
    }
}
