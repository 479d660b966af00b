//! The connector: binds a component to the store and its query bindings.
//!
//! `bind(config)` yields a [`Binder`]; attaching a [`Component`] yields a
//! [`Bound`] factory; mounting it against a [`Provider`] yields the live
//! [`Connector`]. From then on the connector reacts to three inputs — own
//! props from the host, store changes, and query results — by recomputing
//! descriptors, reconciling bindings, projecting props, and rendering the
//! component only when the projected map actually changed.
//!
//! # Re-entrancy
//!
//! A component may dispatch during `render`, which fires the store listener
//! synchronously. The connector never recurses into itself: a sync requested
//! while one is running is queued as a scheduler task and runs on the next
//! drain. Locks are never held across `render`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::client::QueryTransport;
use crate::connect::descriptor::{validate_specs, SpecMap};
use crate::connect::manager::{BindingListener, QueryBindingManager, QueryHandle};
use crate::connect::projector::{
    project, DispatchProps, OwnProps, PropValue, Props, StateProps,
};
use crate::runtime::Scheduler;
use crate::store::{Dispatcher, Store, StoreSubscription};

/// Inputs available when descriptors are rebuilt.
pub struct QueryContext<'a> {
    pub own_props: &'a OwnProps,
    pub state: &'a Value,
}

/// Rebuilds the descriptor map from own props and store state.
pub type MapQueries = Arc<dyn Fn(&QueryContext<'_>) -> SpecMap + Send + Sync>;

/// Derives state props from the store snapshot and own props.
pub type MapState = Arc<dyn Fn(&Value, &OwnProps) -> StateProps + Send + Sync>;

/// Builds dispatch-bound props. Absent, the connector exposes the raw
/// dispatcher under the `"dispatch"` key.
pub type MapDispatch = Arc<dyn Fn(&Dispatcher, &OwnProps) -> DispatchProps + Send + Sync>;

/// What a connector derives and how.
#[derive(Clone, Default)]
pub struct BindConfig {
    map_queries: Option<MapQueries>,
    map_state: Option<MapState>,
    map_dispatch: Option<MapDispatch>,
}

impl BindConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queries(
        mut self,
        map: impl Fn(&QueryContext<'_>) -> SpecMap + Send + Sync + 'static,
    ) -> Self {
        self.map_queries = Some(Arc::new(map));
        self
    }

    pub fn state(
        mut self,
        map: impl Fn(&Value, &OwnProps) -> StateProps + Send + Sync + 'static,
    ) -> Self {
        self.map_state = Some(Arc::new(map));
        self
    }

    pub fn dispatch(
        mut self,
        map: impl Fn(&Dispatcher, &OwnProps) -> DispatchProps + Send + Sync + 'static,
    ) -> Self {
        self.map_dispatch = Some(Arc::new(map));
        self
    }
}

/// Start building a connected component.
pub fn bind(config: BindConfig) -> Binder {
    Binder { config }
}

/// Intermediate builder holding the config.
pub struct Binder {
    config: BindConfig,
}

impl Binder {
    /// Attach the component to connect.
    pub fn component<C: Component + 'static>(self, component: C) -> Bound<C> {
        Bound {
            config: self.config,
            component: Arc::new(Mutex::new(component)),
        }
    }
}

/// The rendering side of a connected component.
pub trait Component: Send {
    fn render(&mut self, props: &Props);
}

/// A configured component, ready to mount.
pub struct Bound<C: Component> {
    config: BindConfig,
    component: Arc<Mutex<C>>,
}

impl<C: Component + 'static> Bound<C> {
    /// Shared handle to the component, usable to inspect it after mount.
    pub fn component_handle(&self) -> Arc<Mutex<C>> {
        Arc::clone(&self.component)
    }

    /// Mount against the provider: reconcile from empty, subscribe to the
    /// store, and render the initial props.
    pub fn mount(self, provider: &Provider, own_props: OwnProps) -> Connector {
        Connector::mount(
            self.config,
            self.component as Arc<Mutex<dyn Component>>,
            provider,
            own_props,
        )
    }
}

/// The mount environment: transport, store, and scheduler.
#[derive(Clone)]
pub struct Provider {
    transport: Arc<dyn QueryTransport>,
    store: Arc<dyn Store>,
    scheduler: Scheduler,
}

impl Provider {
    pub fn new(
        transport: Arc<dyn QueryTransport>,
        store: Arc<dyn Store>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            transport,
            store,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.store))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Initializing,
    Active,
    Unmounted,
}

struct ConnectorState {
    phase: Phase,
    own_props: OwnProps,
    manager: QueryBindingManager,
    /// Rebuilt only when own props change, so handler identity is stable
    /// across unrelated syncs.
    dispatch_props: DispatchProps,
    dispatch_props_stale: bool,
    last_props: Option<Props>,
    binding_listener: BindingListener,
    store_subscription: Option<StoreSubscription>,
}

struct ConnectorShared {
    config: BindConfig,
    component: Arc<Mutex<dyn Component>>,
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
    scheduler: Scheduler,
    /// True while a sync (including its render) is running.
    updating: AtomicBool,
    state: Mutex<ConnectorState>,
}

/// Live handle for one mounted component.
#[derive(Clone)]
pub struct Connector {
    shared: Arc<ConnectorShared>,
}

impl Connector {
    fn mount(
        config: BindConfig,
        component: Arc<Mutex<dyn Component>>,
        provider: &Provider,
        own_props: OwnProps,
    ) -> Self {
        let shared = Arc::new(ConnectorShared {
            config,
            component,
            store: Arc::clone(&provider.store),
            dispatcher: provider.dispatcher(),
            scheduler: provider.scheduler.clone(),
            updating: AtomicBool::new(false),
            state: Mutex::new(ConnectorState {
                phase: Phase::Initializing,
                own_props,
                manager: QueryBindingManager::new(
                    Arc::clone(&provider.transport),
                    provider.scheduler.clone(),
                ),
                dispatch_props: DispatchProps::new(),
                dispatch_props_stale: true,
                last_props: None,
                binding_listener: Arc::new(|| {}),
                store_subscription: None,
            }),
        });

        {
            let weak = Arc::downgrade(&shared);
            shared.state.lock().binding_listener = Arc::new(move || {
                if let Some(shared) = weak.upgrade() {
                    Self::sync(&shared);
                }
            });
        }
        {
            let weak = Arc::downgrade(&shared);
            let subscription = provider.store.subscribe(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    Self::sync(&shared);
                }
            }));
            shared.state.lock().store_subscription = Some(subscription);
        }

        debug!("connector mounted");
        Self::sync(&shared);
        Self { shared }
    }

    /// Adopt new own props from the host and resynchronize.
    pub fn set_props(&self, next: OwnProps) {
        {
            let mut state = self.shared.state.lock();
            if state.phase == Phase::Unmounted {
                return;
            }
            if state.own_props != next {
                state.own_props = next;
                state.dispatch_props_stale = true;
            }
        }
        Self::sync(&self.shared);
    }

    /// The most recently projected props, if any sync has completed.
    pub fn props(&self) -> Option<Props> {
        self.shared.state.lock().last_props.clone()
    }

    /// The current handle for one query key.
    pub fn query(&self, key: &str) -> Option<QueryHandle> {
        self.shared.state.lock().manager.handles().get(key).cloned()
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.shared.dispatcher.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.state.lock().phase != Phase::Unmounted
    }

    /// Tear down: dispose every binding and release the store subscription.
    /// No callback into this instance fires afterwards. Idempotent.
    pub fn unmount(&self) {
        let subscription = {
            let mut state = self.shared.state.lock();
            if state.phase == Phase::Unmounted {
                return;
            }
            state.phase = Phase::Unmounted;
            state.manager.dispose_all();
            state.store_subscription.take()
        };
        // Listener release may lock the store registry; do it outside our
        // own lock.
        drop(subscription);
        debug!("connector unmounted");
    }

    /// Recompute descriptors, reconcile, project, and render on change.
    ///
    /// Requested re-entrantly (a dispatch during render), the sync is queued
    /// on the scheduler instead of recursing.
    fn sync(shared: &Arc<ConnectorShared>) {
        if shared.updating.swap(true, Ordering::Acquire) {
            trace!("re-entrant sync deferred");
            let weak = Arc::downgrade(shared);
            shared.scheduler.enqueue(move || {
                if let Some(shared) = weak.upgrade() {
                    Self::sync(&shared);
                }
            });
            return;
        }

        let rendered = Self::sync_locked(shared);
        if let Some(props) = rendered {
            shared.component.lock().render(&props);
        }
        shared.updating.store(false, Ordering::Release);
    }

    /// The lock-holding half of a sync. Returns the props to render, or
    /// `None` when projection is unchanged (or the connector is unmounted).
    fn sync_locked(shared: &Arc<ConnectorShared>) -> Option<Props> {
        let mut state = shared.state.lock();
        if state.phase == Phase::Unmounted {
            return None;
        }
        let store_state = shared.store.state();

        if let Some(map_queries) = &shared.config.map_queries {
            let specs = map_queries(&QueryContext {
                own_props: &state.own_props,
                state: &store_state,
            });
            let descriptors = validate_specs(&specs);
            let listener = Arc::clone(&state.binding_listener);
            state.manager.reconcile(descriptors, &listener);
        }

        let state_props = match &shared.config.map_state {
            Some(map_state) => map_state(&store_state, &state.own_props),
            None => StateProps::new(),
        };
        if state.dispatch_props_stale {
            state.dispatch_props = match &shared.config.map_dispatch {
                Some(map_dispatch) => map_dispatch(&shared.dispatcher, &state.own_props),
                None => {
                    let mut props = DispatchProps::new();
                    props.insert(
                        "dispatch".into(),
                        PropValue::Dispatch(shared.dispatcher.clone()),
                    );
                    props
                }
            };
            state.dispatch_props_stale = false;
        }

        let handles = state.manager.handles();
        let props = project(
            &state.own_props,
            &state_props,
            &handles,
            &state.dispatch_props,
        );

        if state.last_props.as_ref() == Some(&props) {
            trace!("projection unchanged, render suppressed");
            return None;
        }
        state.last_props = Some(props.clone());
        state.phase = Phase::Active;
        Some(props)
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Connector")
            .field("phase", &state.phase)
            .field("bindings", &state.manager.binding_count())
            .finish()
    }
}
