//! Renderable values.
//!
//! [`View`] is the closed set of things the dispatcher knows how to render.
//! Conversions exist for the common cases, so most call sites pass plain values:
//!
//! ```ignore
//! render("hello");                    // Text
//! render(count.clone());              // Observable (Signal<i32>)
//! render(View::component(move || {    // Component -> dynamic region
//!     if flag.get() { "on" } else { "off" }
//! }));
//! render(vec![View::from("a"), View::from(node)]); // List -> region
//! ```
//!
//! | Variant      | Rendered as                                         |
//! |--------------|-----------------------------------------------------|
//! | `Node`       | the node itself, no cleanup                          |
//! | `Observable` | one text node updated in place by an effect          |
//! | `Probe`      | region re-rendering the probe's value                |
//! | `Component`  | region re-rendering the function's result            |
//! | `Stream`     | streaming region fed by the stream's items           |
//! | `List`       | region rendering each element in order               |
//! | `Text`       | text node, no cleanup                                |
//! | `Empty`      | empty fragment, no cleanup                           |
//! | `Fault`      | raised on the owning scope                           |

use std::fmt::{self, Display};
use std::rc::Rc;

use futures::stream::{LocalBoxStream, Stream, StreamExt};
use spark_signals::Signal;

use crate::error::{RenderError, Result};
use crate::host::Node;
use crate::reactive::{Computed, ObserveFn, Observable, Probe};

/// Zero-argument render function.
pub type ComponentFn = Rc<dyn Fn() -> View>;

/// Factory producing a fresh stream of views for each render.
pub type StreamFactory = Rc<dyn Fn() -> LocalBoxStream<'static, Result<View>>>;

/// A renderable value.
#[derive(Clone)]
pub enum View {
    Node(Node),
    Observable(Rc<dyn Observable>),
    Probe(ComponentFn),
    Component(ComponentFn),
    Stream(StreamFactory),
    List(Vec<View>),
    Text(String),
    Empty,
    Fault(RenderError),
}

impl View {
    /// A render function re-run whenever what it reads changes.
    pub fn component<V, F>(render: F) -> Self
    where
        V: Into<View>,
        F: Fn() -> V + 'static,
    {
        View::Component(Rc::new(move || render().into()))
    }

    /// A render function taking props.
    pub fn component_with<P, V, F>(render: F, props: P) -> Self
    where
        P: 'static,
        V: Into<View>,
        F: Fn(&P) -> V + 'static,
    {
        View::Component(Rc::new(move || render(&props).into()))
    }

    /// A streaming source: each item replaces the region's content.
    pub fn stream<S, V, E, F>(factory: F) -> Self
    where
        F: Fn() -> S + 'static,
        S: Stream<Item = std::result::Result<V, E>> + 'static,
        V: Into<View>,
        E: Into<RenderError>,
    {
        View::Stream(Rc::new(move || {
            factory()
                .map(|item| -> Result<View> { item.map(Into::into).map_err(Into::into) })
                .boxed_local()
        }))
    }

    /// A streaming source taking props.
    pub fn stream_with<P, S, V, E, F>(factory: F, props: P) -> Self
    where
        P: 'static,
        F: Fn(&P) -> S + 'static,
        S: Stream<Item = std::result::Result<V, E>> + 'static,
        V: Into<View>,
        E: Into<RenderError>,
    {
        Self::stream(move || factory(&props))
    }

    /// Text driven by a tracked closure.
    pub fn observable(read: impl Fn() -> String + 'static) -> Self {
        View::Observable(Rc::new(ObserveFn(read)))
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, View::Fault(_))
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Node(node) => f.debug_tuple("Node").field(node).finish(),
            View::Observable(_) => f.write_str("Observable(..)"),
            View::Probe(_) => f.write_str("Probe(..)"),
            View::Component(_) => f.write_str("Component(..)"),
            View::Stream(_) => f.write_str("Stream(..)"),
            View::List(items) => f.debug_tuple("List").field(items).finish(),
            View::Text(text) => f.debug_tuple("Text").field(text).finish(),
            View::Empty => f.write_str("Empty"),
            View::Fault(error) => f.debug_tuple("Fault").field(error).finish(),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<Node> for View {
    fn from(node: Node) -> Self {
        View::Node(node)
    }
}

impl From<&Node> for View {
    fn from(node: &Node) -> Self {
        View::Node(node.clone())
    }
}

impl From<&str> for View {
    fn from(text: &str) -> Self {
        View::Text(text.to_string())
    }
}

impl From<String> for View {
    fn from(text: String) -> Self {
        View::Text(text)
    }
}

impl From<&String> for View {
    fn from(text: &String) -> Self {
        View::Text(text.clone())
    }
}

macro_rules! view_from_display {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for View {
                fn from(value: $ty) -> Self {
                    View::Text(value.to_string())
                }
            }
        )*
    };
}

view_from_display!(bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl From<()> for View {
    fn from(_: ()) -> Self {
        View::Empty
    }
}

impl<V: Into<View>> From<Option<V>> for View {
    fn from(value: Option<V>) -> Self {
        value.map_or(View::Empty, Into::into)
    }
}

impl<V: Into<View>> From<Vec<V>> for View {
    fn from(items: Vec<V>) -> Self {
        View::List(items.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<View>, E: Into<RenderError>> From<std::result::Result<V, E>> for View {
    fn from(result: std::result::Result<V, E>) -> Self {
        match result {
            Ok(value) => value.into(),
            Err(error) => View::Fault(error.into()),
        }
    }
}

impl From<RenderError> for View {
    fn from(error: RenderError) -> Self {
        View::Fault(error)
    }
}

impl<T> From<Signal<T>> for View
where
    T: Display + Clone + PartialEq + 'static,
{
    fn from(cell: Signal<T>) -> Self {
        View::Observable(Rc::new(cell))
    }
}

impl<T: Display + 'static> From<Computed<T>> for View {
    fn from(computed: Computed<T>) -> Self {
        View::Observable(Rc::new(computed))
    }
}

impl<T> From<Probe<T>> for View
where
    T: Into<View> + 'static,
{
    fn from(probe: Probe<T>) -> Self {
        View::Probe(Rc::new(move || probe.get().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::sig;

    #[test]
    fn test_scalars_become_text() {
        assert!(matches!(View::from("hi"), View::Text(ref t) if t == "hi"));
        assert!(matches!(View::from(42), View::Text(ref t) if t == "42"));
        assert!(matches!(View::from(true), View::Text(ref t) if t == "true"));
        assert!(matches!(View::from(1.5), View::Text(ref t) if t == "1.5"));
    }

    #[test]
    fn test_option_and_unit() {
        assert!(matches!(View::from(None::<&str>), View::Empty));
        assert!(matches!(View::from(Some("x")), View::Text(_)));
        assert!(matches!(View::from(()), View::Empty));
    }

    #[test]
    fn test_result_errors_become_faults() {
        let ok: std::result::Result<&str, RenderError> = Ok("fine");
        let err: std::result::Result<&str, &str> = Err("broken");
        assert!(matches!(View::from(ok), View::Text(_)));
        assert!(View::from(err).is_fault());
    }

    #[test]
    fn test_vec_becomes_list() {
        match View::from(vec!["a", "b"]) {
            View::List(items) => assert_eq!(items.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_probe_becomes_probe_view() {
        let probe = sig(3);
        match View::from(probe) {
            View::Probe(read) => assert!(matches!(read(), View::Text(ref t) if t == "3")),
            other => panic!("expected probe, got {other:?}"),
        }
    }

    #[test]
    fn test_component_with_props() {
        let view = View::component_with(|name: &String| format!("hi {name}"), "ada".to_string());
        match view {
            View::Component(render) => assert!(matches!(render(), View::Text(ref t) if t == "hi ada")),
            other => panic!("expected component, got {other:?}"),
        }
    }
}
