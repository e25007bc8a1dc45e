//! Error taxonomy for the render runtime.
//!
//! Faults travel up the ownership tree as values. A render function reports a
//! failure by returning `Err` (or a [`View::Fault`](crate::View::Fault)); the
//! owning region converts it into a [`Scope::raise`](crate::Scope::raise) call.

use std::error::Error;
use std::rc::Rc;

use crate::host::HostError;

/// Result alias used throughout the crate.
pub type Result<T, E = RenderError> = std::result::Result<T, E>;

/// Every fault the runtime can deliver to an interceptor.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    /// A render function failed synchronously.
    #[error("render failed: {0}")]
    Render(String),

    /// A streaming region's source produced an error.
    #[error("stream failed: {0}")]
    Stream(String),

    /// A region was patched while its anchor had no host parent.
    #[error("region `{region}` is disconnected from the host tree")]
    Disconnected { region: String },

    /// `set` was called on a probe backed by a computed value.
    #[error("cannot set a read-only probe")]
    ReadOnlyProbe,

    /// The host tree rejected a mutation.
    #[error(transparent)]
    Host(#[from] HostError),

    /// Any user error carried through the bubbling chain.
    #[error("{0}")]
    Other(Rc<dyn Error>),
}

impl RenderError {
    /// Shorthand for [`RenderError::Render`].
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    /// Wrap an arbitrary error.
    pub fn other<E: Error + 'static>(error: E) -> Self {
        Self::Other(Rc::new(error))
    }
}

impl From<&str> for RenderError {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

impl From<String> for RenderError {
    fn from(message: String) -> Self {
        Self::Render(message)
    }
}
