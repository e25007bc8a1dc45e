//! Hooks - owner-relative helpers for component code.
//!
//! Everything here resolves its owner from the ambient scope, so hooks are
//! meant to be called from inside a render function (or any [`run_with`]
//! block). Called with no ambient scope, a hook still does its work but has
//! nothing to attach its teardown to; a warning naming the call site is logged.
//!
//! ```ignore
//! View::component(move || {
//!     let ticks = create_signal(0);
//!     set_interval({
//!         let ticks = ticks.clone();
//!         move || {
//!             ticks.set(ticks.get() + 1);
//!         }
//!     }, Duration::from_secs(1));
//!
//!     create_effect({
//!         let ticks = ticks.clone();
//!         move || tracing::info!(ticks = ticks.get(), "tick")
//!     });
//!
//!     View::from(ticks)
//! })
//! ```

use std::panic::Location;
use std::time::Duration;

use spark_signals::{effect_sync, untrack};

use crate::error::RenderError;
use crate::scheduler::{self, TimerId};
use crate::scope::{self, Rethrow, Scope, current, run_with};

pub use crate::reactive::{create_computed, create_computed_with, create_signal};

// =============================================================================
// Ownership
// =============================================================================

/// Register `cleanup` on the ambient scope.
///
/// Cleanups run deferred, after the scope is re-rendered or disposed.
#[track_caller]
pub fn on_cleanup(cleanup: impl FnOnce() + 'static) {
    scope::record_cleanup(cleanup);
}

/// Install an error interceptor on the ambient scope.
///
/// The handler receives the error and a [`Rethrow`]; forwarding it passes the
/// error on to the parent scope, dropping it swallows the error.
#[track_caller]
pub fn on_catch(handler: impl Fn(RenderError, Rethrow) + 'static) {
    match current() {
        Some(scope) => scope.set_interceptor(handler),
        None => {
            let location = Location::caller();
            tracing::warn!(%location, "on_catch called outside of any scope; ignoring it");
        }
    }
}

/// The ambient scope, if any.
pub fn get_active_scope() -> Option<Scope> {
    current()
}

// =============================================================================
// Effects
// =============================================================================

/// Run `f` now and again whenever a signal it read changes.
///
/// Each run happens in a child scope of the ambient scope; cleanups a run
/// registered are drained before the next run. The effect stops when the
/// ambient scope is cleaned up.
#[track_caller]
pub fn create_effect(mut f: impl FnMut() + 'static) {
    let owned = Scope::new();
    let inner = owned.clone();
    let stop = effect_sync(move || {
        if inner.is_cancelled() {
            return;
        }
        untrack(|| inner.cleanup());
        run_with(&inner, &mut f);
    });
    scope::record_cleanup(move || {
        stop();
        owned.dispose();
    });
}

/// [`create_effect`] threading a value from one run to the next.
#[track_caller]
pub fn create_effect_with<T: 'static>(initial: T, mut f: impl FnMut(T) -> T + 'static) {
    let mut value = Some(initial);
    create_effect(move || {
        if let Some(previous) = value.take() {
            value = Some(f(previous));
        }
    });
}

// =============================================================================
// Timers
// =============================================================================

/// Run `callback` once after `delay`, unless the ambient scope goes away first.
#[track_caller]
pub fn set_timeout(callback: impl Fn() + 'static, delay: Duration) -> TimerId {
    schedule(callback, delay, None)
}

/// Run `callback` every `period` until the ambient scope goes away.
#[track_caller]
pub fn set_interval(callback: impl Fn() + 'static, period: Duration) -> TimerId {
    schedule(callback, period, Some(period))
}

/// Cancel a timer created with [`set_timeout`] or [`set_interval`].
pub fn clear_timer(id: TimerId) {
    scheduler::clear_timer(id);
}

#[track_caller]
fn schedule(callback: impl Fn() + 'static, delay: Duration, period: Option<Duration>) -> TimerId {
    let owner = current();
    let bound = move || match &owner {
        Some(owner) if owner.is_cancelled() => {}
        Some(owner) => run_with(owner, &callback),
        None => callback(),
    };
    let id = scheduler::set_timer(delay, period, bound);
    scope::record_cleanup(move || scheduler::clear_timer(id));
    id
}
