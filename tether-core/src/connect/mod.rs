//! Query-to-Props Binding
//!
//! The reconciliation core, in four layers:
//!
//! - [`descriptor`]: validated query descriptors and their equivalence rules.
//! - [`adapter`]: one subscription adapter per live binding, owning its
//!   loading/data/error state, request ordering, and polling.
//! - [`manager`]: the per-component binding set and its reconcile diff.
//! - [`projector`]: assembly of the flat prop map handed to the component.
//! - [`connector`]: the mount/update/unmount state machine tying the layers
//!   to a store and a component.

pub mod adapter;
pub mod connector;
pub mod descriptor;
pub mod manager;
pub mod projector;

pub use adapter::{Disposer, FetchMoreOptions, PageCombiner, QuerySnapshot, SubscriptionAdapter};
pub use connector::{
    bind, BindConfig, Binder, Bound, Component, Connector, MapDispatch, MapQueries, MapState,
    Provider, QueryContext,
};
pub use descriptor::{DescriptorMap, QueryDescriptor, QuerySpec, SpecMap};
pub use manager::{BindingListener, QueryBindingManager, QueryHandle};
pub use projector::{
    project, ActionHandler, DispatchProps, OwnProps, PropValue, Props, StateProps,
};
