//! Context - values inherited down the ownership tree.
//!
//! [`provide`] stores a value on the nearest region enclosing the ambient scope
//! (or in a thread-wide fallback store outside any region). [`inject`] walks
//! from the ambient scope up through its ancestors and returns the first match,
//! then falls back to the global store.
//!
//! A descendant's `provide` only ever writes to its own region, so it shadows
//! an ancestor's value without overwriting it:
//!
//! ```ignore
//! let theme = ContextKey::<&'static str>::new("theme");
//!
//! render(View::component(move || {
//!     provide(&theme, "dark");
//!     let theme = theme.clone();
//!     View::component(move || inject_or(&theme, "light")) // "dark"
//! }));
//! ```
//!
//! # Keys
//!
//! - [`ContextKey::new`] - unique key; two keys never collide, even with the
//!   same name.
//! - [`ContextKey::named`] - string key; keys with equal names address the same
//!   slot.

use std::any::Any;
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::scope;

static NEXT_KEY: AtomicU64 = AtomicU64::new(0);

/// Storage identity of a context key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyId {
    Unique(u64),
    Named(Cow<'static, str>),
}

/// Typed context key.
pub struct ContextKey<T> {
    id: KeyId,
    name: Cow<'static, str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    /// A key distinct from every other key.
    pub fn new(name: &'static str) -> Self {
        Self {
            id: KeyId::Unique(NEXT_KEY.fetch_add(1, Ordering::Relaxed)),
            name: Cow::Borrowed(name),
            _marker: PhantomData,
        }
    }

    /// A key identified by its name.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        Self {
            id: KeyId::Named(name.clone()),
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextKey")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

thread_local! {
    /// Fallback store for provisioning outside any region.
    static GLOBAL_CONTEXT: RefCell<HashMap<KeyId, Rc<dyn Any>>> = RefCell::new(HashMap::new());
}

// =============================================================================
// Provide / Inject
// =============================================================================

/// Provide `value` under `key` on the nearest enclosing region.
pub fn provide<T: 'static>(key: &ContextKey<T>, value: T) {
    let value: Rc<dyn Any> = Rc::new(value);
    match scope::current().and_then(|s| s.nearest_region()) {
        Some(region) => region.set_context(key.id.clone(), value),
        None => GLOBAL_CONTEXT.with(|global| {
            global.borrow_mut().insert(key.id.clone(), value);
        }),
    }
}

/// Provide `value` directly on `scope`, region or not.
pub fn provide_in<T: 'static>(scope: &scope::Scope, key: &ContextKey<T>, value: T) {
    scope.set_context(key.id.clone(), Rc::new(value));
}

fn lookup(id: &KeyId) -> Option<Rc<dyn Any>> {
    let mut cursor = scope::current();
    while let Some(scope) = cursor {
        if let Some(value) = scope.context(id) {
            return Some(value);
        }
        cursor = scope.parent();
    }
    GLOBAL_CONTEXT.with(|global| global.borrow().get(id).cloned())
}

/// Look up `key` from the ambient scope outward, then in the global store.
pub fn inject<T: Clone + 'static>(key: &ContextKey<T>) -> Option<T> {
    let value = lookup(&key.id)?;
    match value.downcast_ref::<T>() {
        Some(value) => Some(value.clone()),
        None => {
            tracing::warn!(key = %key.name, "context value has a different type than the key");
            None
        }
    }
}

/// [`inject`] with a fallback value.
pub fn inject_or<T: Clone + 'static>(key: &ContextKey<T>, default: T) -> T {
    inject(key).unwrap_or(default)
}

/// [`inject`] with a fallback factory, called only on a miss.
pub fn inject_or_else<T: Clone + 'static>(key: &ContextKey<T>, factory: impl FnOnce() -> T) -> T {
    inject(key).unwrap_or_else(factory)
}

/// Clear the global store (for testing).
pub fn reset_global_context() {
    GLOBAL_CONTEXT.with(|global| global.borrow_mut().clear());
}
