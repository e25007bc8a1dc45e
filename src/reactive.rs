//! Reactive adapters over spark-signals.
//!
//! spark-signals owns dependency tracking. This module adds the shapes the
//! render runtime needs on top of it:
//!
//! - [`Computed`] - a cloneable handle to a memoized derived value
//! - [`Probe`] - a getter/setter pair usable as a value
//! - [`Observable`] - anything that reads as text and tracks while doing so

use std::cell::RefCell;
use std::fmt::{self, Display};
use std::rc::Rc;

use spark_signals::{Signal, derived, signal, untrack};

use crate::error::{RenderError, Result};

// =============================================================================
// Signals
// =============================================================================

/// Create a state cell.
pub fn create_signal<T: Clone + PartialEq + 'static>(value: T) -> Signal<T> {
    signal(value)
}

// =============================================================================
// Computed
// =============================================================================

/// Memoized derived value. Reading it inside an effect tracks it.
pub struct Computed<T> {
    read: Rc<dyn Fn() -> T>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            read: self.read.clone(),
        }
    }
}

impl<T: 'static> Computed<T> {
    pub fn get(&self) -> T {
        (self.read)()
    }

    /// Read without establishing a dependency.
    pub fn get_untracked(&self) -> T {
        untrack(|| (self.read)())
    }
}

impl<T> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Computed(..)")
    }
}

/// Create a memoized computation, recomputed lazily when dependencies change.
pub fn create_computed<T, F>(compute: F) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    let memo = derived(compute);
    Computed {
        read: Rc::new(move || memo.get()),
    }
}

/// Like [`create_computed`], but `compute` receives the previous value
/// (`initial` on the first run).
pub fn create_computed_with<T, F>(initial: T, compute: F) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn(T) -> T + 'static,
{
    let previous = Rc::new(RefCell::new(initial));
    create_computed(move || {
        let prev = previous.borrow().clone();
        let next = compute(prev);
        *previous.borrow_mut() = next.clone();
        next
    })
}

// =============================================================================
// Observable
// =============================================================================

/// A tracked value rendered as text.
pub trait Observable {
    /// Current value as text. Establishes a dependency when called in an effect.
    fn read_text(&self) -> String;
}

impl<T> Observable for Signal<T>
where
    T: Display + Clone + PartialEq + 'static,
{
    fn read_text(&self) -> String {
        self.get().to_string()
    }
}

impl<T: Display + 'static> Observable for Computed<T> {
    fn read_text(&self) -> String {
        self.get().to_string()
    }
}

/// Observable backed by a closure.
pub struct ObserveFn<F>(pub F);

impl<F: Fn() -> String> Observable for ObserveFn<F> {
    fn read_text(&self) -> String {
        (self.0)()
    }
}

// =============================================================================
// Probe
// =============================================================================

/// Callable getter/setter pair over an observable value.
///
/// Rendering a probe creates a region that re-renders whenever the value read
/// through the getter changes.
pub struct Probe<T> {
    getter: Rc<dyn Fn() -> T>,
    setter: Rc<dyn Fn(T) -> Result<()>>,
}

impl<T> Clone for Probe<T> {
    fn clone(&self) -> Self {
        Self {
            getter: self.getter.clone(),
            setter: self.setter.clone(),
        }
    }
}

impl<T: 'static> Probe<T> {
    pub fn new(getter: impl Fn() -> T + 'static, setter: impl Fn(T) -> Result<()> + 'static) -> Self {
        Self {
            getter: Rc::new(getter),
            setter: Rc::new(setter),
        }
    }

    /// Probe over a state cell.
    pub fn from_signal(cell: &Signal<T>) -> Self
    where
        T: Clone + PartialEq,
    {
        let read = cell.clone();
        let write = cell.clone();
        Self::new(
            move || read.get(),
            move |value| {
                write.set(value);
                Ok(())
            },
        )
    }

    /// Read-only probe over a computed value.
    pub fn from_computed(computed: &Computed<T>) -> Self {
        let read = computed.clone();
        Self::new(move || read.get(), |_| Err(RenderError::ReadOnlyProbe))
    }

    /// Probe delegating to another probe.
    pub fn from_probe(other: &Probe<T>) -> Self {
        let read = other.clone();
        let write = other.clone();
        Self::new(move || read.get(), move |value| write.set(value).map(|_| ()))
    }

    /// Tracked read.
    pub fn get(&self) -> T {
        (self.getter)()
    }

    pub fn get_untracked(&self) -> T {
        untrack(|| (self.getter)())
    }

    /// Write `value`, returning the value read back (untracked).
    pub fn set(&self, value: T) -> Result<T> {
        (self.setter)(value)?;
        Ok(self.get_untracked())
    }

    /// Write `update(previous)`; the previous value is read untracked.
    pub fn update(&self, update: impl FnOnce(T) -> T) -> Result<T> {
        let previous = self.get_untracked();
        self.set(update(previous))
    }
}

impl<T> fmt::Debug for Probe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Probe(..)")
    }
}

/// Probe over a new state cell holding `value`.
pub fn sig<T: Clone + PartialEq + 'static>(value: T) -> Probe<T> {
    Probe::from_signal(&signal(value))
}

/// Read-only probe over a memoized computation.
pub fn sig_fn<T, F>(compute: F) -> Probe<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    Probe::from_computed(&create_computed(compute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use spark_signals::effect;

    #[test]
    fn test_probe_get_set_update() {
        let probe = sig(1);
        assert_eq!(probe.get(), 1);
        assert_eq!(probe.set(2).unwrap(), 2);
        assert_eq!(probe.update(|v| v * 10).unwrap(), 20);
    }

    #[test]
    fn test_probe_from_signal_shares_state() {
        let cell = create_signal("a".to_string());
        let probe = Probe::from_signal(&cell);
        probe.set("b".to_string()).unwrap();
        assert_eq!(cell.get(), "b");

        let alias = Probe::from_probe(&probe);
        alias.set("c".to_string()).unwrap();
        assert_eq!(probe.get(), "c");
    }

    #[test]
    fn test_computed_probe_is_read_only() {
        let base = create_signal(2);
        let b = base.clone();
        let doubled = sig_fn(move || b.get() * 2);

        assert_eq!(doubled.get(), 4);
        assert!(matches!(doubled.set(9), Err(RenderError::ReadOnlyProbe)));

        base.set(5);
        assert_eq!(doubled.get(), 10);
    }

    #[test]
    fn test_computed_with_previous_value() {
        let tick = create_signal(1);
        let t = tick.clone();
        let total = create_computed_with(0, move |prev| prev + t.get());

        assert_eq!(total.get(), 1);
        tick.set(2);
        assert_eq!(total.get(), 3);
    }

    #[test]
    fn test_untracked_read_does_not_subscribe() {
        let cell = create_signal(0);
        let probe = Probe::from_signal(&cell);
        let runs = Rc::new(Cell::new(0));

        let r = runs.clone();
        let p = probe.clone();
        let _stop = effect(move || {
            let _ = p.get_untracked();
            r.set(r.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        cell.set(1);
        assert_eq!(runs.get(), 1, "untracked read must not re-run the effect");
    }

    #[test]
    fn test_observable_text() {
        let cell = create_signal(7);
        assert_eq!(cell.read_text(), "7");
        let c = cell.clone();
        let label = create_computed(move || format!("n={}", c.get()));
        assert_eq!(label.read_text(), "n=7");
    }
}
