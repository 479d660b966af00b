//! Execution Primitives
//!
//! Everything asynchronous in the core is expressed with two small pieces:
//!
//! - [`Scheduler`]: a single-threaded event loop with a virtual clock.
//!   Result deliveries and polling ticks are discrete tasks on it, which
//!   makes every interleaving reproducible in tests.
//! - [`Deferred`]: a settle-once value for request outcomes. The core never
//!   blocks on one; it renders the interim state and applies the outcome
//!   when the deferred settles.

mod deferred;
mod scheduler;

pub use deferred::{Deferred, Settled};
pub use scheduler::{Scheduler, TimerHandle};
