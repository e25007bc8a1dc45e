//! Deferred execution - microtask queue, local executor, and timers.
//!
//! Everything runs on one thread. Three kinds of deferred work exist:
//!
//! - **Microtasks** - boxed closures queued with [`queue_microtask`]. Scope
//!   cleanups are delivered this way.
//! - **Local futures** - spawned with [`spawn_local`] onto a thread-local
//!   `LocalPool`. Streaming regions pump their sources here.
//! - **Timers** - keyed on a virtual clock that only moves when the host calls
//!   [`advance`].
//!
//! The host drives the queue:
//!
//! ```ignore
//! loop {
//!     handle_input();
//!     scheduler::advance(frame_time); // fires due timers, then ticks
//! }
//! ```
//!
//! [`tick`] drains microtasks and polls local futures until both are idle.
//! It is not re-entrant: a `tick()` issued from inside a running task returns
//! immediately and the outer drain picks up whatever was queued.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use futures::executor::{LocalPool, LocalSpawner};
use futures::future::{AbortHandle, abortable};
use futures::task::LocalSpawnExt;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Shortest interval period; a zero period would never let the clock advance.
const MIN_PERIOD: Duration = Duration::from_millis(1);

struct Timer {
    deadline: Duration,
    period: Option<Duration>,
    callback: Rc<dyn Fn()>,
}

thread_local! {
    static MICROTASKS: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());

    static POOL: RefCell<LocalPool> = RefCell::new(LocalPool::new());

    /// Kept apart from POOL so tasks can spawn while the pool is running.
    static SPAWNER: RefCell<LocalSpawner> = POOL.with(|pool| RefCell::new(pool.borrow().spawner()));

    static DRAINING: Cell<bool> = const { Cell::new(false) };

    static CLOCK: Cell<Duration> = const { Cell::new(Duration::ZERO) };

    static TIMERS: RefCell<HashMap<u64, Timer>> = RefCell::new(HashMap::new());

    static NEXT_TIMER: Cell<u64> = const { Cell::new(0) };
}

// =============================================================================
// Microtasks
// =============================================================================

/// Queue `task` to run on the next [`tick`], after already-queued tasks.
pub fn queue_microtask(task: impl FnOnce() + 'static) {
    MICROTASKS.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
}

/// Number of queued microtasks.
pub fn pending_microtasks() -> usize {
    MICROTASKS.with(|queue| queue.borrow().len())
}

fn pop_microtask() -> Option<Task> {
    MICROTASKS.with(|queue| queue.borrow_mut().pop_front())
}

// =============================================================================
// Local Futures
// =============================================================================

/// Spawn a future on the thread-local executor.
///
/// The returned handle aborts the future; dropping it leaves the future
/// running.
pub fn spawn_local(future: impl Future<Output = ()> + 'static) -> AbortHandle {
    let (task, handle) = abortable(future);
    let spawned = SPAWNER.with(|spawner| {
        spawner.borrow().spawn_local(async move {
            let _ = task.await;
        })
    });
    if let Err(error) = spawned {
        tracing::error!(%error, "failed to spawn local task");
        handle.abort();
    }
    handle
}

// =============================================================================
// Draining
// =============================================================================

struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        DRAINING.with(|d| d.set(false));
    }
}

/// Run all deferred work until nothing is runnable.
pub fn tick() {
    if DRAINING.with(|d| d.replace(true)) {
        return;
    }
    let _guard = DrainGuard;

    loop {
        while let Some(task) = pop_microtask() {
            task();
        }
        POOL.with(|pool| pool.borrow_mut().run_until_stalled());
        if pending_microtasks() == 0 {
            break;
        }
    }
}

// =============================================================================
// Timers
// =============================================================================

/// Current virtual time.
pub fn now() -> Duration {
    CLOCK.with(|c| c.get())
}

/// Schedule `callback` after `delay`, repeating every `period` if given.
pub fn set_timer(delay: Duration, period: Option<Duration>, callback: impl Fn() + 'static) -> TimerId {
    let id = NEXT_TIMER.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    });
    let timer = Timer {
        deadline: now() + delay,
        period: period.map(|p| p.max(MIN_PERIOD)),
        callback: Rc::new(callback),
    };
    TIMERS.with(|timers| timers.borrow_mut().insert(id, timer));
    TimerId(id)
}

/// Cancel a timer. Unknown or already-fired ids are ignored.
pub fn clear_timer(id: TimerId) {
    TIMERS.with(|timers| timers.borrow_mut().remove(&id.0));
}

/// Number of live timers.
pub fn active_timers() -> usize {
    TIMERS.with(|timers| timers.borrow().len())
}

fn next_due(limit: Duration) -> Option<(u64, Duration)> {
    TIMERS.with(|timers| {
        timers
            .borrow()
            .iter()
            .filter(|(_, timer)| timer.deadline <= limit)
            .min_by_key(|(id, timer)| (timer.deadline, **id))
            .map(|(id, timer)| (*id, timer.deadline))
    })
}

/// Take the callback of a due timer, rescheduling intervals.
fn fire(id: u64) -> Option<Rc<dyn Fn()>> {
    TIMERS.with(|timers| {
        let mut timers = timers.borrow_mut();
        let timer = timers.get_mut(&id)?;
        let callback = timer.callback.clone();
        match timer.period {
            Some(period) => timer.deadline += period,
            None => {
                timers.remove(&id);
            }
        }
        Some(callback)
    })
}

/// Move the virtual clock forward, firing due timers in deadline order.
///
/// Deferred work is drained after every timer callback and once more at the
/// end.
pub fn advance(by: Duration) {
    let target = now() + by;
    while let Some((id, deadline)) = next_due(target) {
        CLOCK.with(|c| c.set(deadline));
        if let Some(callback) = fire(id) {
            callback();
            tick();
        }
    }
    CLOCK.with(|c| c.set(target));
    tick();
}

// =============================================================================
// Reset
// =============================================================================

/// Drop all queued work, timers, and spawned futures (for testing).
pub fn reset_scheduler() {
    MICROTASKS.with(|queue| queue.borrow_mut().clear());
    TIMERS.with(|timers| timers.borrow_mut().clear());
    CLOCK.with(|c| c.set(Duration::ZERO));
    let pool = LocalPool::new();
    let spawner = pool.spawner();
    POOL.with(|p| *p.borrow_mut() = pool);
    SPAWNER.with(|s| *s.borrow_mut() = spawner);
}
