//! Prop projection.
//!
//! A connected component sees one flat prop map assembled from four sources,
//! later sources overriding earlier ones on key collision:
//!
//! 1. own props passed by the host,
//! 2. state props derived from the store snapshot,
//! 3. query handles, one per binding key,
//! 4. dispatch props bound to the store's dispatcher, applied last so no
//!    query key can shadow them.
//!
//! Projection is pure and the result is comparable: the connector renders
//! only when the projected map differs from the one it rendered last.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::connect::manager::QueryHandle;
use crate::store::Dispatcher;

/// Props supplied by the host component.
pub type OwnProps = IndexMap<String, Value>;

/// State-derived prop entries.
pub type StateProps = IndexMap<String, Value>;

/// Dispatch-bound prop entries: either bound action callbacks or the raw
/// dispatcher itself.
pub type DispatchProps = IndexMap<String, PropValue>;

/// A prop callback that feeds an action into the store.
///
/// Handlers compare by identity: the connector builds them once per
/// own-props change, so an unchanged handler never invalidates projection
/// equality.
#[derive(Clone)]
pub struct ActionHandler {
    handler: Arc<dyn Fn(Value) -> Value + Send + Sync>,
}

impl ActionHandler {
    pub fn new(handler: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    pub fn invoke(&self, payload: Value) -> Value {
        (self.handler)(payload)
    }
}

impl PartialEq for ActionHandler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handler, &other.handler)
    }
}

impl fmt::Debug for ActionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionHandler")
    }
}

/// One entry of the projected prop map.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    /// Plain data: an own prop or a state prop.
    Data(Value),
    /// A dispatch-bound callback.
    Action(ActionHandler),
    /// The raw dispatch handle.
    Dispatch(Dispatcher),
    /// A query binding's snapshot and control surface.
    Query(QueryHandle),
}

impl PropValue {
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            PropValue::Data(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_action(&self) -> Option<&ActionHandler> {
        match self {
            PropValue::Action(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn as_dispatcher(&self) -> Option<&Dispatcher> {
        match self {
            PropValue::Dispatch(dispatcher) => Some(dispatcher),
            _ => None,
        }
    }

    pub fn as_query(&self) -> Option<&QueryHandle> {
        match self {
            PropValue::Query(handle) => Some(handle),
            _ => None,
        }
    }
}

/// The flat prop map handed to the component.
pub type Props = IndexMap<String, PropValue>;

/// Assemble the projected prop map.
pub fn project(
    own_props: &OwnProps,
    state_props: &StateProps,
    queries: &IndexMap<String, QueryHandle>,
    dispatch_props: &DispatchProps,
) -> Props {
    let mut props = Props::with_capacity(
        own_props.len() + state_props.len() + queries.len() + dispatch_props.len(),
    );
    for (key, value) in own_props {
        props.insert(key.clone(), PropValue::Data(value.clone()));
    }
    for (key, value) in state_props {
        props.insert(key.clone(), PropValue::Data(value.clone()));
    }
    for (key, handle) in queries {
        props.insert(key.clone(), PropValue::Query(handle.clone()));
    }
    for (key, value) in dispatch_props {
        props.insert(key.clone(), value.clone());
    }
    props
}
