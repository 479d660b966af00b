//! Subscription adapter.
//!
//! One adapter wraps the transport traffic for one live binding and owns its
//! render-visible state: the loading flag, the last applied data, the last
//! error, and the polling timer.
//!
//! # Loading policy
//!
//! `loading` is true exactly while no result has ever been delivered for
//! this binding or an explicit `refetch` is outstanding. A variable change
//! revalidates in the background: it issues a new authoritative request and
//! keeps stale data without flipping `loading`. Polling ticks and
//! `fetch_more` never touch the flag.
//!
//! # Ordering
//!
//! Every authoritative request (initial fetch, variable change, refetch,
//! poll tick) carries a generation number. A result is applied to render
//! state only if its generation is still the newest one issued; older
//! results are dropped, so out-of-order completions can never roll the
//! rendered data backwards. `fetch_more` runs outside the generation
//! sequence: its page is always merged through the caller's combiner.
//!
//! Results are never applied inline from the transport callback; each
//! completion becomes one discrete task on the scheduler.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::client::{QueryDocument, QueryPayload, QueryRequest, QueryTransport, Variables};
use crate::error::QueryError;
use crate::runtime::{Deferred, Scheduler, TimerHandle};

/// Render-visible state of one bound query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuerySnapshot {
    pub loading: bool,
    pub data: Option<Value>,
    pub errors: Option<QueryError>,
}

/// Merges an incremental page into the currently held data.
pub type PageCombiner = Arc<dyn Fn(Option<&Value>, &Value) -> Value + Send + Sync>;

/// Options for [`SubscriptionAdapter::fetch_more`].
#[derive(Clone)]
pub struct FetchMoreOptions {
    /// Variable overrides merged into the binding's current variables for
    /// this request only.
    pub variables: Variables,
    /// Combiner applied to the fresh page.
    pub combine: PageCombiner,
}

impl FetchMoreOptions {
    pub fn new(
        variables: Variables,
        combine: impl Fn(Option<&Value>, &Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            variables,
            combine: Arc::new(combine),
        }
    }
}

type ChangeListener = Arc<dyn Fn() + Send + Sync>;

struct AdapterState {
    document: QueryDocument,
    variables: Variables,
    /// Newest authoritative request issued.
    generation: u64,
    /// Whether any authoritative result has ever been applied.
    delivered: bool,
    /// Whether an explicit refetch is outstanding.
    refetch_outstanding: bool,
    data: Option<Value>,
    errors: Option<QueryError>,
    poll_interval_ms: Option<u64>,
    poll_timer: Option<TimerHandle>,
    listener: Option<ChangeListener>,
    disposed: bool,
}

struct AdapterShared {
    transport: Arc<dyn QueryTransport>,
    scheduler: Scheduler,
    state: Mutex<AdapterState>,
}

/// The core's wrapper around one observable query.
pub struct SubscriptionAdapter {
    shared: Arc<AdapterShared>,
}

impl Clone for SubscriptionAdapter {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl SubscriptionAdapter {
    /// Create the adapter and issue the initial request. The initial
    /// snapshot is `loading = true`, `data = None`.
    pub fn new(
        transport: Arc<dyn QueryTransport>,
        scheduler: Scheduler,
        document: QueryDocument,
        variables: Variables,
        poll_interval_ms: Option<u64>,
    ) -> Self {
        let adapter = Self {
            shared: Arc::new(AdapterShared {
                transport,
                scheduler,
                state: Mutex::new(AdapterState {
                    document,
                    variables,
                    generation: 0,
                    delivered: false,
                    refetch_outstanding: false,
                    data: None,
                    errors: None,
                    poll_interval_ms: None,
                    poll_timer: None,
                    listener: None,
                    disposed: false,
                }),
            }),
        };
        adapter.issue_authoritative();
        adapter.set_poll_interval(poll_interval_ms);
        adapter
    }

    /// Install the change listener. The returned disposer is idempotent:
    /// disposing twice, or after the adapter itself is gone, is a no-op.
    pub fn subscribe(&self, on_change: impl Fn() + Send + Sync + 'static) -> Disposer {
        self.shared.state.lock().listener = Some(Arc::new(on_change));
        Disposer {
            shared: Arc::downgrade(&self.shared),
            released: AtomicBool::new(false),
        }
    }

    /// Current render-visible state.
    pub fn snapshot(&self) -> QuerySnapshot {
        let state = self.shared.state.lock();
        QuerySnapshot {
            loading: !state.delivered || state.refetch_outstanding,
            data: state.data.clone(),
            errors: state.errors.clone(),
        }
    }

    /// Adopt new variables, revalidating in the background. Returns whether
    /// the effective request changed.
    pub fn update_variables(&self, variables: Variables) -> bool {
        {
            let mut state = self.shared.state.lock();
            if state.disposed || state.variables == variables {
                return false;
            }
            state.variables = variables;
        }
        trace!("variables changed, revalidating");
        self.issue_authoritative();
        true
    }

    /// Re-issue the query. Flips `loading` until this (or a newer
    /// authoritative) result is applied. The returned deferred settles with
    /// this request's own outcome even if a newer request supersedes it for
    /// rendering.
    pub fn refetch(&self, override_variables: Option<Variables>) -> Deferred<QueryPayload> {
        let result = Deferred::new();
        {
            let mut state = self.shared.state.lock();
            if state.disposed {
                drop(state);
                result.reject(QueryError::Transport("query binding disposed".into()));
                return result;
            }
            if let Some(overrides) = override_variables {
                for (key, value) in overrides {
                    state.variables.insert(key, value);
                }
            }
            state.refetch_outstanding = true;
        }
        self.notify();

        let transport_deferred = self.issue_authoritative();
        let caller = result.clone();
        let scheduler = self.shared.scheduler.clone();
        transport_deferred.on_settle(move |outcome| {
            let outcome = outcome.clone();
            // Runs after the state-application task queued above, so the
            // caller observes the refreshed props at the same logical step.
            scheduler.enqueue(move || match outcome {
                Ok(payload) => {
                    if payload.has_errors() && payload.data.is_none() {
                        caller.reject(QueryError::Execution(payload.errors));
                    } else {
                        caller.resolve(payload);
                    }
                }
                Err(error) => caller.reject(error),
            });
        });
        result
    }

    /// Fetch an additional page and merge it through the combiner. Never
    /// touches `loading`; a failure rejects the deferred without corrupting
    /// held data.
    pub fn fetch_more(&self, options: FetchMoreOptions) -> Deferred<()> {
        let done = Deferred::new();
        let request = {
            let state = self.shared.state.lock();
            if state.disposed {
                drop(state);
                done.reject(QueryError::Transport("query binding disposed".into()));
                return done;
            }
            let mut variables = state.variables.clone();
            for (key, value) in options.variables.clone() {
                variables.insert(key, value);
            }
            QueryRequest {
                document: state.document.clone(),
                variables,
            }
        };

        trace!("issuing fetch_more request");
        let deferred = self.shared.transport.execute(&request);
        let weak = Arc::downgrade(&self.shared);
        let scheduler = self.shared.scheduler.clone();
        let combine = options.combine;
        let caller = done.clone();
        deferred.on_settle(move |outcome| {
            let outcome = outcome.clone();
            let weak = weak.clone();
            let combine = Arc::clone(&combine);
            let caller = caller.clone();
            scheduler.enqueue(move || {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                match outcome {
                    Ok(payload) => {
                        if payload.has_errors() && payload.data.is_none() {
                            caller.reject(QueryError::Execution(payload.errors));
                            return;
                        }
                        let Some(page) = payload.data else {
                            caller.resolve(());
                            return;
                        };
                        let listener = {
                            let mut state = shared.state.lock();
                            if state.disposed {
                                trace!("dropping fetch_more page for disposed binding");
                                return;
                            }
                            state.data = Some(combine(state.data.as_ref(), &page));
                            state.listener.clone()
                        };
                        if let Some(listener) = listener {
                            listener();
                        }
                        caller.resolve(());
                    }
                    Err(error) => caller.reject(error),
                }
            });
        });
        done
    }

    /// Start polling at the given interval. Never touches `loading`.
    pub fn start_polling(&self, interval_ms: u64) {
        self.set_poll_interval(Some(interval_ms));
    }

    /// Stop polling. The timer is cancelled synchronously; no tick fires
    /// after this returns.
    pub fn stop_polling(&self) {
        self.set_poll_interval(None);
    }

    /// Start, stop, or retune polling to match a reconciled descriptor.
    pub fn set_poll_interval(&self, interval_ms: Option<u64>) {
        let retired = {
            let mut state = self.shared.state.lock();
            if state.disposed || state.poll_interval_ms == interval_ms {
                return;
            }
            state.poll_interval_ms = interval_ms;
            let retired = state.poll_timer.take();
            if let Some(period) = interval_ms {
                let weak = Arc::downgrade(&self.shared);
                let handle = self.shared.scheduler.set_interval(period, move || {
                    if let Some(shared) = weak.upgrade() {
                        poll_tick(&shared);
                    }
                });
                state.poll_timer = Some(handle);
            }
            retired
        };
        drop(retired);
    }

    /// Tear down: cancel polling, drop the listener, and make any late
    /// result delivery inert. Safe to call more than once.
    pub fn dispose(&self) {
        let timer = {
            let mut state = self.shared.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.listener = None;
            state.poll_timer.take()
        };
        drop(timer);
        debug!("subscription adapter disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().disposed
    }

    /// Issue an authoritative request with the current variables.
    fn issue_authoritative(&self) -> Deferred<QueryPayload> {
        let (generation, request) = {
            let mut state = self.shared.state.lock();
            state.generation += 1;
            (
                state.generation,
                QueryRequest {
                    document: state.document.clone(),
                    variables: state.variables.clone(),
                },
            )
        };
        dispatch_request(&self.shared, generation, request)
    }

    fn notify(&self) {
        let listener = self.shared.state.lock().listener.clone();
        if let Some(listener) = listener {
            listener();
        }
    }
}

impl fmt::Debug for SubscriptionAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SubscriptionAdapter")
            .field("generation", &state.generation)
            .field("delivered", &state.delivered)
            .field("disposed", &state.disposed)
            .finish()
    }
}

/// Execute one authoritative request and schedule its application.
fn dispatch_request(
    shared: &Arc<AdapterShared>,
    generation: u64,
    request: QueryRequest,
) -> Deferred<QueryPayload> {
    trace!(generation, "issuing query request");
    let deferred = shared.transport.execute(&request);
    let weak = Arc::downgrade(shared);
    let scheduler = shared.scheduler.clone();
    deferred.on_settle(move |outcome| {
        let outcome = outcome.clone();
        scheduler.enqueue(move || {
            if let Some(shared) = weak.upgrade() {
                apply_authoritative(&shared, generation, outcome);
            }
        });
    });
    deferred
}

/// Issue one polling request. Authoritative, but never flips `loading`.
fn poll_tick(shared: &Arc<AdapterShared>) {
    let (generation, request) = {
        let mut state = shared.state.lock();
        if state.disposed {
            return;
        }
        state.generation += 1;
        (
            state.generation,
            QueryRequest {
                document: state.document.clone(),
                variables: state.variables.clone(),
            },
        )
    };
    trace!(generation, "poll tick");
    dispatch_request(shared, generation, request);
}

/// Apply one authoritative result if its generation is still current.
fn apply_authoritative(
    shared: &Arc<AdapterShared>,
    generation: u64,
    outcome: Result<QueryPayload, QueryError>,
) {
    let listener = {
        let mut state = shared.state.lock();
        if state.disposed {
            trace!(generation, "dropping result for disposed binding");
            return;
        }
        if generation < state.generation {
            trace!(
                generation,
                current = state.generation,
                "dropping superseded result"
            );
            return;
        }
        state.delivered = true;
        state.refetch_outstanding = false;
        match outcome {
            Ok(payload) => {
                state.errors = if payload.errors.is_empty() {
                    None
                } else {
                    Some(QueryError::Execution(payload.errors))
                };
                if let Some(data) = payload.data {
                    state.data = Some(data);
                }
            }
            Err(error) => {
                // Stale data is retained alongside the fresh error.
                state.errors = Some(error);
            }
        }
        state.listener.clone()
    };
    if let Some(listener) = listener {
        listener();
    }
}

/// Idempotent handle releasing an adapter's change listener.
pub struct Disposer {
    shared: Weak<AdapterShared>,
    released: AtomicBool,
}

impl Disposer {
    pub fn dispose(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.state.lock().listener = None;
        }
    }
}
