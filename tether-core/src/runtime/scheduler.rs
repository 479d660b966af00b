//! Cooperative task scheduler.
//!
//! Store notifications, polling ticks, and query-result callbacks are all
//! delivered as discrete tasks on one logical event loop; nothing in the
//! core runs in parallel. The scheduler is deterministic and test-driven:
//! `run_until_idle` drains the task queue, `advance` moves a virtual
//! millisecond clock and fires due interval timers.
//!
//! Timer cancellation is synchronous: once `TimerHandle::cancel` returns (or
//! the handle is dropped), no further tick fires.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

type Task = Box<dyn FnOnce() + Send>;
type Tick = Arc<dyn Fn() + Send + Sync>;

struct Timer {
    id: u64,
    period_ms: u64,
    next_fire_ms: u64,
    tick: Tick,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<Task>,
    timers: Vec<Timer>,
    now_ms: u64,
    next_timer_id: u64,
}

/// Shared handle to the event loop.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Arc<Mutex<Inner>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.inner.lock().now_ms
    }

    /// Number of tasks waiting in the queue.
    pub fn pending_tasks(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Queue a task for the next drain.
    pub fn enqueue(&self, task: impl FnOnce() + Send + 'static) {
        self.inner.lock().queue.push_back(Box::new(task));
    }

    /// Run queued tasks until the queue drains. Tasks may queue more tasks;
    /// those run in the same pass. The queue lock is never held while a task
    /// runs.
    pub fn run_until_idle(&self) {
        loop {
            let task = self.inner.lock().queue.pop_front();
            match task {
                Some(task) => task(),
                None => break,
            }
        }
    }

    /// Register a repeating timer. The first tick fires one period from now.
    pub fn set_interval(&self, period_ms: u64, tick: impl Fn() + Send + Sync + 'static) -> TimerHandle {
        let period_ms = period_ms.max(1);
        let mut inner = self.inner.lock();
        let id = inner.next_timer_id;
        inner.next_timer_id += 1;
        let next_fire_ms = inner.now_ms + period_ms;
        inner.timers.push(Timer {
            id,
            period_ms,
            next_fire_ms,
            tick: Arc::new(tick),
        });
        trace!(timer = id, period_ms, "interval registered");
        TimerHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Advance the virtual clock by `ms`, firing due ticks in time order and
    /// draining the task queue after each tick.
    pub fn advance(&self, ms: u64) {
        let target = self.now_ms() + ms;
        loop {
            let ticks = {
                let mut inner = self.inner.lock();
                let due_at = inner
                    .timers
                    .iter()
                    .map(|timer| timer.next_fire_ms)
                    .min()
                    .filter(|at| *at <= target);
                match due_at {
                    Some(at) => {
                        inner.now_ms = at;
                        let mut due: Vec<Tick> = Vec::new();
                        for timer in inner.timers.iter_mut() {
                            if timer.next_fire_ms == at {
                                timer.next_fire_ms = at + timer.period_ms;
                                due.push(Arc::clone(&timer.tick));
                            }
                        }
                        due
                    }
                    None => break,
                }
            };
            for tick in ticks {
                tick();
            }
            self.run_until_idle();
        }
        self.inner.lock().now_ms = target;
        self.run_until_idle();
    }
}

/// Owning handle for one interval timer.
///
/// Cancelling (explicitly or by dropping) synchronously removes the timer;
/// no tick fires afterwards.
pub struct TimerHandle {
    id: u64,
    inner: Weak<Mutex<Inner>>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.lock().timers.retain(|timer| timer.id != self.id);
            trace!(timer = self.id, "interval cancelled");
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
