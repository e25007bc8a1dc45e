//! Ownership scopes - lifetimes, cleanup, cancellation, and error bubbling.
//!
//! Every piece of live render state belongs to a [`Scope`]. Scopes form a tree:
//! a scope's parent is whichever scope was *ambient* when it was created.
//!
//! # Ambient scope
//!
//! Owner-relative operations ([`on_cleanup`](crate::on_cleanup),
//! [`provide`](crate::provide), [`on_catch`](crate::on_catch)) target the
//! ambient scope. [`run_with`] pushes a scope for the duration of a call and
//! pops it on exit, unwinding included:
//!
//! ```ignore
//! let scope = Scope::new();
//! run_with(&scope, || {
//!     on_cleanup(|| println!("released"));
//! });
//! scope.dispose();
//! tick(); // "released"
//! ```
//!
//! The register is a thread-local stack. It is correct under single-threaded
//! cooperative scheduling only; nothing here is `Send`.
//!
//! # Lifecycle
//!
//! - `cleanup()` drains the cleanup list into the microtask queue. Cleanups run
//!   on the next [`tick`](crate::scheduler::tick), in registration order.
//! - `cancel()` flips the cancelled flag on the scope and every live
//!   descendant, immediately.
//! - `dispose()` = cancel + cleanup, once.
//!
//! # Errors
//!
//! [`Scope::raise`] hands the error to the scope's interceptor, or to the
//! parent when there is none. With no interceptor anywhere the error reaches the
//! unhandled-error channel ([`on_unhandled_error`]), which panics by default.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use futures::Stream;

use crate::context::KeyId;
use crate::error::RenderError;
use crate::scheduler;
use crate::types::Cleanup;

bitflags::bitflags! {
    /// Lifecycle flags of a scope.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ScopeFlags: u8 {
        const CANCELLED = 1 << 0;
        const DISPOSED = 1 << 1;
        /// The scope backs a dynamic region.
        const REGION = 1 << 2;
    }
}

/// Error interceptor installed with [`on_catch`](crate::on_catch).
pub type Interceptor = Rc<dyn Fn(RenderError, Rethrow)>;

type UnhandledHandler = Rc<dyn Fn(RenderError)>;

thread_local! {
    /// Ambient scope stack. The top is the active owner.
    static SCOPE_STACK: RefCell<Vec<Scope>> = RefCell::new(Vec::new());

    static NEXT_SCOPE_ID: Cell<u64> = const { Cell::new(0) };

    static UNHANDLED: RefCell<Option<UnhandledHandler>> = RefCell::new(None);
}

// =============================================================================
// Scope
// =============================================================================

struct ScopeInner {
    id: u64,
    parent: Option<Scope>,
    children: RefCell<Vec<Weak<ScopeInner>>>,
    flags: Cell<ScopeFlags>,
    cleanups: RefCell<Vec<Cleanup>>,
    interceptor: RefCell<Option<Interceptor>>,
    context: RefCell<HashMap<KeyId, Rc<dyn Any>>>,
}

/// Handle to an ownership scope. Cloning shares the scope.
#[derive(Clone)]
pub struct Scope(Rc<ScopeInner>);

impl Scope {
    /// Create a scope owned by the ambient scope (a root if there is none).
    pub fn new() -> Self {
        Self::with_flags(current(), ScopeFlags::empty())
    }

    /// Create a detached root scope.
    pub fn root() -> Self {
        Self::with_flags(None, ScopeFlags::empty())
    }

    /// Create a scope owned by `parent`.
    pub fn child_of(parent: &Scope) -> Self {
        Self::with_flags(Some(parent.clone()), ScopeFlags::empty())
    }

    pub(crate) fn new_region() -> Self {
        Self::with_flags(current(), ScopeFlags::REGION)
    }

    fn with_flags(parent: Option<Scope>, mut flags: ScopeFlags) -> Self {
        let id = NEXT_SCOPE_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        if parent.as_ref().is_some_and(Scope::is_cancelled) {
            flags |= ScopeFlags::CANCELLED;
        }
        let scope = Scope(Rc::new(ScopeInner {
            id,
            parent: parent.clone(),
            children: RefCell::new(Vec::new()),
            flags: Cell::new(flags),
            cleanups: RefCell::new(Vec::new()),
            interceptor: RefCell::new(None),
            context: RefCell::new(HashMap::new()),
        }));
        if let Some(parent) = parent {
            let mut children = parent.0.children.borrow_mut();
            children.retain(|child| child.strong_count() > 0);
            children.push(Rc::downgrade(&scope.0));
        }
        scope
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn parent(&self) -> Option<Scope> {
        self.0.parent.clone()
    }

    pub fn flags(&self) -> ScopeFlags {
        self.0.flags.get()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags().contains(ScopeFlags::CANCELLED)
    }

    pub fn is_disposed(&self) -> bool {
        self.flags().contains(ScopeFlags::DISPOSED)
    }

    pub fn is_region(&self) -> bool {
        self.flags().contains(ScopeFlags::REGION)
    }

    fn insert_flags(&self, flags: ScopeFlags) {
        self.0.flags.set(self.flags() | flags);
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Nearest region scope, starting with this one.
    pub fn nearest_region(&self) -> Option<Scope> {
        let mut cursor = Some(self.clone());
        while let Some(scope) = cursor {
            if scope.is_region() {
                return Some(scope);
            }
            cursor = scope.parent();
        }
        None
    }

    // -------------------------------------------------------------------------
    // Cleanup
    // -------------------------------------------------------------------------

    /// Append a cleanup. On a disposed scope it is queued right away.
    pub fn add_cleanup(&self, cleanup: impl FnOnce() + 'static) {
        if self.is_disposed() {
            scheduler::queue_microtask(cleanup);
            return;
        }
        self.0.cleanups.borrow_mut().push(Box::new(cleanup));
    }

    pub(crate) fn extend_cleanups(&self, cleanups: Vec<Cleanup>) {
        for cleanup in cleanups {
            self.add_cleanup(cleanup);
        }
    }

    /// Number of cleanups waiting for the next drain.
    pub fn pending_cleanups(&self) -> usize {
        self.0.cleanups.borrow().len()
    }

    /// Drain the cleanup list into the microtask queue.
    ///
    /// Each cleanup is queued exactly once; calling this again only drains
    /// cleanups added since.
    pub fn cleanup(&self) {
        let drained = std::mem::take(&mut *self.0.cleanups.borrow_mut());
        for cleanup in drained {
            scheduler::queue_microtask(cleanup);
        }
    }

    /// Cancel this scope and all live descendants. Monotonic.
    pub fn cancel(&self) {
        if self.is_cancelled() {
            return;
        }
        self.insert_flags(ScopeFlags::CANCELLED);
        let children: Vec<Scope> = self
            .0
            .children
            .borrow()
            .iter()
            .filter_map(|child| child.upgrade().map(Scope))
            .collect();
        for child in children {
            child.cancel();
        }
    }

    /// Cancel and drain cleanups. Second and later calls do nothing.
    pub fn dispose(&self) {
        if self.is_disposed() {
            return;
        }
        self.insert_flags(ScopeFlags::DISPOSED);
        self.cancel();
        self.cleanup();
    }

    // -------------------------------------------------------------------------
    // Errors
    // -------------------------------------------------------------------------

    /// Install the interceptor, replacing any previous one.
    pub fn set_interceptor(&self, interceptor: impl Fn(RenderError, Rethrow) + 'static) {
        *self.0.interceptor.borrow_mut() = Some(Rc::new(interceptor));
    }

    pub fn has_interceptor(&self) -> bool {
        self.0.interceptor.borrow().is_some()
    }

    /// Deliver `error` to this scope's interceptor, or bubble to the parent.
    pub fn raise(&self, error: RenderError) {
        let interceptor = self.0.interceptor.borrow().clone();
        match interceptor {
            Some(interceptor) => {
                let rethrow = Rethrow {
                    target: self.parent(),
                    error: error.clone(),
                };
                interceptor(error, rethrow);
            }
            None => escalate(self.parent(), error),
        }
    }

    // -------------------------------------------------------------------------
    // Context
    // -------------------------------------------------------------------------

    pub(crate) fn set_context(&self, key: KeyId, value: Rc<dyn Any>) {
        self.0.context.borrow_mut().insert(key, value);
    }

    pub(crate) fn context(&self, key: &KeyId) -> Option<Rc<dyn Any>> {
        self.0.context.borrow().get(key).cloned()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.0.id)
            .field("parent", &self.0.parent.as_ref().map(Scope::id))
            .field("flags", &self.flags())
            .field("cleanups", &self.pending_cleanups())
            .finish()
    }
}

// =============================================================================
// Rethrow
// =============================================================================

/// Passed to interceptors. Forwarding re-raises on the intercepting scope's
/// parent; dropping it swallows the error.
pub struct Rethrow {
    target: Option<Scope>,
    error: RenderError,
}

impl Rethrow {
    /// Re-raise the intercepted error one level up.
    pub fn forward(self) {
        escalate(self.target, self.error);
    }

    /// Raise a different error one level up.
    pub fn forward_with(self, error: RenderError) {
        escalate(self.target, error);
    }

    /// The intercepted error.
    pub fn error(&self) -> &RenderError {
        &self.error
    }
}

fn escalate(target: Option<Scope>, error: RenderError) {
    match target {
        Some(scope) => scope.raise(error),
        None => raise_unhandled(error),
    }
}

/// Install the unhandled-error channel for this thread.
///
/// Without one, an error that escapes every interceptor panics.
pub fn on_unhandled_error(handler: impl Fn(RenderError) + 'static) {
    UNHANDLED.with(|h| *h.borrow_mut() = Some(Rc::new(handler)));
}

/// Remove the unhandled-error channel.
pub fn clear_unhandled_error_handler() {
    UNHANDLED.with(|h| *h.borrow_mut() = None);
}

fn raise_unhandled(error: RenderError) {
    tracing::error!(%error, "unhandled render fault");
    let handler = UNHANDLED.with(|h| h.borrow().clone());
    match handler {
        Some(handler) => handler(error),
        None => panic!("unhandled render fault: {error}"),
    }
}

/// Raise on the ambient scope, or the unhandled channel when there is none.
pub fn raise_current(error: RenderError) {
    match current() {
        Some(scope) => scope.raise(error),
        None => raise_unhandled(error),
    }
}

// =============================================================================
// Ambient Scope Stack
// =============================================================================

/// The ambient scope, if any.
pub fn current() -> Option<Scope> {
    SCOPE_STACK.with(|stack| stack.borrow().last().cloned())
}

struct PopGuard;

impl Drop for PopGuard {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Run `f` with `scope` as the ambient scope.
pub fn run_with<T>(scope: &Scope, f: impl FnOnce() -> T) -> T {
    SCOPE_STACK.with(|stack| stack.borrow_mut().push(scope.clone()));
    let _guard = PopGuard;
    f()
}

/// Append `cleanup` to the ambient scope.
///
/// With no ambient scope the cleanup is dropped and a warning naming the call
/// site is logged. Returns whether the cleanup was recorded.
#[track_caller]
pub fn record_cleanup(cleanup: impl FnOnce() + 'static) -> bool {
    match current() {
        Some(scope) => {
            scope.add_cleanup(cleanup);
            true
        }
        None => {
            let location = Location::caller();
            tracing::warn!(%location, "cleanup recorded outside of any scope; dropping it");
            false
        }
    }
}

/// Depth of the ambient stack (for diagnostics and tests).
pub fn scope_depth() -> usize {
    SCOPE_STACK.with(|stack| stack.borrow().len())
}

/// Clear the ambient stack and the unhandled channel (for testing).
pub fn reset_scope_state() {
    SCOPE_STACK.with(|stack| stack.borrow_mut().clear());
    clear_unhandled_error_handler();
}

// =============================================================================
// Scope-bound futures and streams
// =============================================================================

/// Future or stream adapter that makes `scope` ambient during every poll.
#[pin_project::pin_project]
pub struct InScope<F> {
    scope: Scope,
    #[pin]
    inner: F,
}

/// Bind `inner` to `scope` for each poll.
pub fn in_scope<F>(scope: Scope, inner: F) -> InScope<F> {
    InScope { scope, inner }
}

impl<F: Future> Future for InScope<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let inner = this.inner;
        run_with(this.scope, || inner.poll(cx))
    }
}

impl<S: Stream> Stream for InScope<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let inner = this.inner;
        run_with(this.scope, || inner.poll_next(cx))
    }
}

// =============================================================================
// Tests
// =============================================================================
