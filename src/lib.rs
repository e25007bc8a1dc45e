//! # spark-render
//!
//! Fine-grained reactive rendering runtime for Rust.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for
//! dependency tracking. spark-render adds what a component layer needs on top
//! of signals: ownership scopes, dynamically re-rendered regions of a host
//! tree, a render dispatcher, context, and scope-bound hooks.
//!
//! ## Architecture
//!
//! ```text
//! View → render() → static node            (text, node, empty)
//!                 → text node + effect     (signal, computed)
//!                 → Region                 (component, probe, list, stream)
//!                      └─ effect → render fn → collect → patch before anchor
//! ```
//!
//! Every region owns a [`Scope`]. Scopes nest along the ambient stack, carry
//! cleanups and context, and bubble render faults toward the nearest
//! interceptor.
//!
//! ## Example
//!
//! ```ignore
//! use spark_render::*;
//!
//! let root = Node::element("app");
//! let count = create_signal(0);
//!
//! let handle = mount(View::component({
//!     let count = count.clone();
//!     move || vec![View::from("count: "), View::from(count.clone())]
//! }), &root)?;
//!
//! count.set(1);
//! assert_eq!(root.text_content(), "count: 1");
//!
//! handle.unmount();
//! tick();
//! ```
//!
//! ## Modules
//!
//! - [`host`] - In-memory host tree (elements, text, comments, fragments)
//! - [`scope`] - Ownership scopes, ambient scope stack, error bubbling
//! - [`scheduler`] - Microtasks, local executor, virtual-clock timers
//! - [`reactive`] - Signals, computed values, probes
//! - [`view`] - The renderable value type
//! - [`region`] - Dynamic and streaming regions
//! - [`render`] - Render dispatcher and mounting
//! - [`context`] - Provide/inject along the scope chain
//! - [`hooks`] - Cleanup, catch, effects, timers
//! - [`config`] - Runtime settings
//! - [`error`] - Error types

pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod host;
pub mod reactive;
pub mod region;
pub mod render;
pub mod scheduler;
pub mod scope;
pub mod types;
pub mod view;

// Re-export commonly used items
pub use types::*;

pub use config::{AnchorMode, RuntimeConfig, anchor_mode, config, configure, reset_config, set_anchor_mode};

pub use context::{ContextKey, inject, inject_or, inject_or_else, provide, provide_in, reset_global_context};

pub use error::{RenderError, Result};

pub use hooks::{
    clear_timer, create_effect, create_effect_with, get_active_scope, on_catch, on_cleanup, set_interval,
    set_timeout,
};

pub use host::{HostError, Node, NodeId, NodeKind};

pub use reactive::{Computed, Observable, ObserveFn, Probe, create_computed, create_computed_with, create_signal, sig, sig_fn};

pub use region::{Region, RegionSource, RegionState, children_of, flat_children, region_of, unmount};

pub use render::{MountHandle, RenderResult, mount, render};

pub use scheduler::{TimerId, advance, tick};

pub use scope::{
    Rethrow, Scope, ScopeFlags, clear_unhandled_error_handler, in_scope, on_unhandled_error, run_with,
};

pub use view::View;

pub use spark_signals::{Signal, untrack};

/// Reset all thread-local runtime state (for testing).
///
/// Drops queued work, timers, the ambient scope stack, global context, the
/// unhandled-error handler, and configuration.
pub fn reset_runtime() {
    scheduler::reset_scheduler();
    scope::reset_scope_state();
    context::reset_global_context();
    config::reset_config();
}
