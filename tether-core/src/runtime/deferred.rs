//! Deferred values.
//!
//! A `Deferred<T>` is a settle-once container for the outcome of an
//! asynchronous query operation. The transport returns one per request;
//! `refetch` and `fetch_more` hand one back to the caller.
//!
//! Settlement is final: the first `resolve` or `reject` wins and every later
//! attempt is ignored. Callbacks registered before settlement run when the
//! value settles, in registration order; callbacks registered afterwards run
//! immediately.

use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::QueryError;

/// Outcome of a settled deferred.
pub type Settled<T> = Result<T, QueryError>;

type SettleFn<T> = Box<dyn FnOnce(&Settled<T>) + Send>;

enum State<T> {
    Pending(SmallVec<[SettleFn<T>; 2]>),
    Settled(Settled<T>),
}

/// A settle-once asynchronous value.
pub struct Deferred<T> {
    inner: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Create an unsettled deferred.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(State::Pending(SmallVec::new()))),
        }
    }

    /// Create a deferred that is already resolved.
    pub fn resolved(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(State::Settled(Ok(value)))),
        }
    }

    /// Create a deferred that is already rejected.
    pub fn rejected(error: QueryError) -> Self {
        Self {
            inner: Arc::new(Mutex::new(State::Settled(Err(error)))),
        }
    }

    /// Settle with a successful value. Ignored if already settled.
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    /// Settle with an error. Ignored if already settled.
    pub fn reject(&self, error: QueryError) {
        self.settle(Err(error));
    }

    /// Settle with the given outcome. Callbacks run after the lock is
    /// released, in registration order.
    pub fn settle(&self, outcome: Settled<T>) {
        let callbacks = {
            let mut state = self.inner.lock();
            match &mut *state {
                State::Settled(_) => return,
                State::Pending(pending) => {
                    let callbacks = std::mem::take(pending);
                    *state = State::Settled(outcome.clone());
                    callbacks
                }
            }
        };
        for callback in callbacks {
            callback(&outcome);
        }
    }

    /// Run `callback` with the outcome once it is available.
    pub fn on_settle<F>(&self, callback: F)
    where
        F: FnOnce(&Settled<T>) + Send + 'static,
    {
        let settled = {
            let mut state = self.inner.lock();
            match &mut *state {
                State::Pending(pending) => {
                    pending.push(Box::new(callback));
                    return;
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };
        callback(&settled);
    }

    /// Whether the deferred has settled.
    pub fn is_settled(&self) -> bool {
        matches!(&*self.inner.lock(), State::Settled(_))
    }

    /// The outcome, if settled.
    pub fn try_outcome(&self) -> Option<Settled<T>> {
        match &*self.inner.lock() {
            State::Settled(outcome) => Some(outcome.clone()),
            State::Pending(_) => None,
        }
    }
}

impl<T: Clone + Send + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}
