//! Render dispatcher - turns a [`View`] into host nodes.
//!
//! [`render`] classifies its input and returns a [`RenderResult`]: the node to
//! insert, an optional cleanup, and the region when one was created.
//!
//! Static views (nodes, text, empty) become nodes directly and carry no
//! cleanup. Observables become a single text node kept current by an effect.
//! Components, probes, lists, and streams become a [`Region`]; the result's
//! node is the region's container fragment and its cleanup unmounts the region.
//!
//! # Example
//!
//! ```ignore
//! let count = create_signal(0);
//! let root = Node::element("div");
//!
//! let handle = mount(View::component({
//!     let count = count.clone();
//!     move || format!("clicked {} times", count.get())
//! }), &root)?;
//!
//! count.set(3);
//! assert_eq!(root.text_content(), "clicked 3 times");
//! handle.unmount();
//! ```

use std::fmt;
use std::rc::Rc;

use spark_signals::effect_sync;

use crate::error::Result;
use crate::host::Node;
use crate::reactive::Observable;
use crate::region::{Region, RegionSource, render_stream};
use crate::scope::raise_current;
use crate::types::{Cleanup, Output, Rendered};
use crate::view::View;

// =============================================================================
// Render Result
// =============================================================================

/// Output of [`render`].
pub struct RenderResult {
    /// Node to insert into the host tree.
    pub node: Node,
    /// Teardown for whatever the render created. `None` when there is nothing
    /// to tear down.
    pub cleanup: Option<Cleanup>,
    /// The region backing `node`, for dynamic views.
    pub region: Option<Region>,
}

impl RenderResult {
    fn inert(node: Node) -> Self {
        Self {
            node,
            cleanup: None,
            region: None,
        }
    }

    fn from_region(region: Region) -> Self {
        let node = region.container().clone();
        let owned = region.clone();
        Self {
            node,
            cleanup: Some(Box::new(move || owned.unmount())),
            region: Some(region),
        }
    }

    /// Run the cleanup, if any.
    pub fn dispose(self) {
        if let Some(cleanup) = self.cleanup {
            cleanup();
        }
    }

    /// True when the result has no cleanup and no region.
    pub fn is_inert(&self) -> bool {
        self.cleanup.is_none() && self.region.is_none()
    }
}

impl fmt::Debug for RenderResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderResult")
            .field("node", &self.node)
            .field("cleanup", &self.cleanup.is_some())
            .field("region", &self.region)
            .finish()
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Render a view.
///
/// Dynamic views create a region owned by the ambient scope. A
/// [`View::Fault`] is raised on the ambient scope and renders as an empty
/// fragment.
pub fn render(view: impl Into<View>) -> RenderResult {
    match view.into() {
        View::Node(node) => RenderResult::inert(node),
        View::Text(text) => RenderResult::inert(Node::text(text)),
        View::Empty => RenderResult::inert(Node::fragment()),
        View::Fault(error) => {
            raise_current(error);
            RenderResult::inert(Node::fragment())
        }
        View::Observable(source) => render_observable(source),
        View::Component(component) => RenderResult::from_region(Region::new(RegionSource::Component, move |_| {
            collect(component())
        })),
        View::Probe(read) => RenderResult::from_region(Region::new(RegionSource::Probe, move |_| collect(read()))),
        View::List(items) => RenderResult::from_region(Region::new(RegionSource::List, move |_| {
            collect(View::List(items.clone()))
        })),
        View::Stream(factory) => RenderResult::from_region(render_stream(factory)),
    }
}

fn render_observable(source: Rc<dyn Observable>) -> RenderResult {
    let node = Node::text(String::new());
    let target = node.clone();
    let stop = effect_sync(move || target.set_text(&source.read_text()));
    RenderResult {
        node,
        cleanup: Some(Box::new(stop)),
        region: None,
    }
}

/// Render the output of a render function.
///
/// A list is flattened one level: each element is rendered on its own and the
/// outputs are collected in order, keeping only real cleanups. Empty elements
/// contribute nothing. A fault anywhere in the list fails the whole pass before
/// anything is rendered.
pub(crate) fn collect(view: View) -> Result<Rendered> {
    let items = match view {
        View::List(items) => items,
        View::Fault(error) => return Err(error),
        single => vec![single],
    };

    if let Some(error) = items.iter().find_map(|item| match item {
        View::Fault(error) => Some(error.clone()),
        _ => None,
    }) {
        return Err(error);
    }

    let mut rendered = Rendered::default();
    for item in items {
        if matches!(item, View::Empty) {
            continue;
        }
        let RenderResult { node, cleanup, region } = render(item);
        match region {
            Some(region) => rendered.outputs.push(Output::Region(region)),
            None => rendered.push_node(node),
        }
        rendered.cleanups.extend(cleanup);
    }
    Ok(rendered)
}

// =============================================================================
// Mounting
// =============================================================================

/// A view mounted under a host parent.
pub struct MountHandle {
    node: Node,
    region: Option<Region>,
    cleanup: Option<Cleanup>,
}

impl MountHandle {
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    /// Tear the view down and take its nodes out of the host tree.
    pub fn unmount(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
        if self.region.is_none() {
            self.node.remove();
        }
    }
}

impl fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountHandle")
            .field("node", &self.node)
            .field("region", &self.region)
            .finish()
    }
}

/// Render `view` and append it under `parent`.
///
/// Dropping the handle leaves the view mounted.
pub fn mount(view: impl Into<View>, parent: &Node) -> Result<MountHandle> {
    let RenderResult { node, cleanup, region } = render(view);
    if let Err(error) = parent.append_child(&node) {
        if let Some(cleanup) = cleanup {
            cleanup();
        }
        return Err(error.into());
    }
    tracing::debug!(parent = ?parent.id(), dynamic = region.is_some(), "view mounted");
    Ok(MountHandle { node, region, cleanup })
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::error::RenderError;
    use crate::host::{HostError, NodeKind};
    use crate::hooks::create_effect;
    use crate::reactive::{create_computed, create_signal, sig};
    use crate::region::{RegionState, flat_children, region_of};
    use crate::scheduler::{reset_scheduler, tick};
    use crate::scope::{Scope, record_cleanup, reset_scope_state, run_with};

    fn setup() {
        reset_scheduler();
        reset_scope_state();
    }

    #[test]
    fn test_render_text_is_inert() {
        setup();

        let result = render("hello");
        assert_eq!(result.node.kind(), NodeKind::Text);
        assert_eq!(result.node.text_content(), "hello");
        assert!(result.is_inert());
    }

    #[test]
    fn test_render_scalars_stringify() {
        setup();

        assert_eq!(render(42).node.text_content(), "42");
        assert_eq!(render(true).node.text_content(), "true");
        assert_eq!(render(1.5).node.text_content(), "1.5");
    }

    #[test]
    fn test_render_none_is_empty_fragment() {
        setup();

        let result = render(None::<&str>);
        assert_eq!(result.node.kind(), NodeKind::Fragment);
        assert_eq!(result.node.child_count(), 0);
        assert!(result.is_inert());
    }

    #[test]
    fn test_render_node_passes_through() {
        setup();

        let node = Node::element("span");
        let result = render(&node);
        assert!(result.node.ptr_eq(&node));
        assert!(result.is_inert());
    }

    #[test]
    fn test_render_signal_updates_in_place() {
        setup();

        let count = create_signal(0);
        let result = render(count.clone());
        let node = result.node.clone();
        assert_eq!(node.text_content(), "0");

        count.set(5);
        assert_eq!(result.node.text_content(), "5");
        assert!(result.node.ptr_eq(&node), "observable keeps its node");

        result.dispose();
        count.set(9);
        assert_eq!(node.text_content(), "5", "disposed observable stops updating");
    }

    #[test]
    fn test_render_computed() {
        setup();

        let count = create_signal(2);
        let doubled = create_computed({
            let count = count.clone();
            move || count.get() * 2
        });
        let result = render(doubled);
        assert_eq!(result.node.text_content(), "4");
        count.set(10);
        assert_eq!(result.node.text_content(), "20");
        result.dispose();
    }

    #[test]
    fn test_render_component_creates_region() {
        setup();

        let root = Node::element("root");
        let name = create_signal("a");
        let result = render(View::component({
            let name = name.clone();
            move || name.get()
        }));
        root.append_child(&result.node).unwrap();

        let region = result.region.clone().unwrap();
        assert_eq!(region.source(), RegionSource::Component);
        assert_eq!(region.state(), RegionState::Settled);
        assert_eq!(root.text_content(), "a");

        name.set("b");
        assert_eq!(root.text_content(), "b");
        assert_eq!(region.version(), 2);

        result.dispose();
        assert_eq!(root.child_count(), 0, "anchor and output removed");
    }

    #[test]
    fn test_render_probe_region() {
        setup();

        let root = Node::element("root");
        let probe = sig(1);
        let result = render(probe.clone());
        root.append_child(&result.node).unwrap();
        assert_eq!(result.region.as_ref().unwrap().source(), RegionSource::Probe);
        assert_eq!(root.text_content(), "1");

        probe.set(2).unwrap();
        assert_eq!(root.text_content(), "2");
        result.dispose();
    }

    #[test]
    fn test_render_list_contiguous_before_anchor() {
        setup();

        let root = Node::element("root");
        let first = Node::element("first");
        root.append_child(&first).unwrap();

        let result = render(vec![View::from("a"), View::from("b"), View::from("c")]);
        root.append_child(&result.node).unwrap();
        let last = Node::element("last");
        root.append_child(&last).unwrap();

        let region = result.region.clone().unwrap();
        assert_eq!(region.source(), RegionSource::List);
        let children = root.children();
        assert_eq!(children.len(), 6);
        assert_eq!(children[1].text_content(), "a");
        assert_eq!(children[2].text_content(), "b");
        assert_eq!(children[3].text_content(), "c");
        assert!(children[4].ptr_eq(region.anchor()));
        result.dispose();
    }

    #[test]
    fn test_component_list_replaces_output() {
        setup();

        let root = Node::element("root");
        let items = create_signal(Vec::<&'static str>::new());
        let result = render(View::component({
            let items = items.clone();
            move || items.get()
        }));
        root.append_child(&result.node).unwrap();
        let region = result.region.clone().unwrap();
        assert!(region.nodes().is_empty());
        assert_eq!(root.child_count(), 1, "only the anchor");

        items.set(vec!["a", "b"]);
        let nodes = region.nodes();
        assert_eq!(nodes.len(), 2);
        let anchor = region.anchor();
        assert!(nodes[1].next_sibling().unwrap().ptr_eq(anchor));
        assert!(nodes[0].next_sibling().unwrap().ptr_eq(&nodes[1]));
        result.dispose();
    }

    #[test]
    fn test_collect_skips_missing_cleanups() {
        setup();

        let count = create_signal(0);
        let rendered = collect(View::List(vec![View::from("x"), View::from(count.clone()), View::Empty])).unwrap();
        assert_eq!(rendered.outputs.len(), 2, "empty elements contribute nothing");
        assert_eq!(rendered.cleanups.len(), 1, "only the observable has a cleanup");
        rendered.discard();
    }

    #[test]
    fn test_collect_fault_fails_whole_pass() {
        setup();

        let rendered = collect(View::List(vec![View::from("x"), View::Fault(RenderError::msg("bad"))]));
        assert!(matches!(rendered, Err(RenderError::Render(_))));
    }

    #[test]
    fn test_fault_outside_region_raises_on_ambient_scope() {
        setup();

        let seen = Rc::new(Cell::new(false));
        let scope = Scope::root();
        let seen_clone = seen.clone();
        scope.set_interceptor(move |_, _| seen_clone.set(true));

        let result = run_with(&scope, || render(View::Fault(RenderError::msg("nope"))));
        assert!(seen.get());
        assert_eq!(result.node.kind(), NodeKind::Fragment);
    }

    #[test]
    fn test_component_cleanups_drain_before_next_pass() {
        setup();

        let log = Rc::new(RefCell::new(Vec::new()));
        let trigger = create_signal(0);
        let root = Node::element("root");
        let result = render(View::component({
            let log = log.clone();
            let trigger = trigger.clone();
            move || {
                let pass = trigger.get();
                log.borrow_mut().push(format!("render {pass}"));
                let log = log.clone();
                record_cleanup(move || log.borrow_mut().push(format!("cleanup {pass}")));
                pass
            }
        }));
        root.append_child(&result.node).unwrap();

        trigger.set(1);
        tick();
        assert_eq!(*log.borrow(), vec!["render 0", "render 1", "cleanup 0"]);

        result.dispose();
        tick();
        assert_eq!(log.borrow().last().map(String::as_str), Some("cleanup 1"));
    }

    #[test]
    fn test_nested_region_unmounted_with_parent() {
        setup();

        let inner_cleaned = Rc::new(Cell::new(false));
        let root = Node::element("root");
        let result = render(View::component({
            let inner_cleaned = inner_cleaned.clone();
            move || {
                let inner_cleaned = inner_cleaned.clone();
                View::component(move || {
                    let inner_cleaned = inner_cleaned.clone();
                    record_cleanup(move || inner_cleaned.set(true));
                    "inner"
                })
            }
        }));
        root.append_child(&result.node).unwrap();
        assert_eq!(root.text_content(), "inner");

        let outer = result.region.clone().unwrap();
        let nodes = outer.nodes();
        assert_eq!(nodes.len(), 2, "inner text then inner anchor");
        let inner = region_of(&nodes[1]).unwrap();
        assert_eq!(outer.outputs(), vec![Output::Region(inner.clone())]);
        assert_eq!(flat_children(&[nodes[0].clone()]).len(), 1);

        result.dispose();
        tick();
        assert!(inner_cleaned.get());
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn test_nested_region_settles_inside_parent_pass() {
        setup();

        let seen = Rc::new(RefCell::new(None));
        let count = create_signal(3);
        let root = Node::element("root");
        let result = render(View::component({
            let seen = seen.clone();
            let count = count.clone();
            move || {
                let inner = render(View::component(|| "inner"));
                let text = render(count.clone());
                let region = inner.region.clone().unwrap();
                *seen.borrow_mut() = Some((
                    region.state(),
                    region.version(),
                    region.nodes().len(),
                    flat_children(&[inner.node.clone()]).len(),
                    text.node.text_content(),
                ));
                inner.dispose();
                text.dispose();
                "outer"
            }
        }));
        root.append_child(&result.node).unwrap();

        assert_eq!(
            seen.borrow().clone(),
            Some((RegionState::Settled, 1, 1, 1, "3".to_string())),
            "nested regions render before the parent pass returns"
        );
        result.dispose();
    }

    #[test]
    fn test_effect_runs_inside_parent_pass() {
        setup();

        let ran_before_return = Rc::new(Cell::new(false));
        let result = render(View::component({
            let ran_before_return = ran_before_return.clone();
            move || {
                let ran = Rc::new(Cell::new(false));
                let flag = ran.clone();
                create_effect(move || flag.set(true));
                ran_before_return.set(ran.get());
                View::Empty
            }
        }));
        assert!(ran_before_return.get());
        result.dispose();
    }

    #[test]
    fn test_region_nodes_are_contiguous_in_tree() {
        setup();

        let root = Node::element("root");
        let result = render(View::component(|| {
            vec![View::from("a"), View::Empty, View::component(|| "b")]
        }));
        root.append_child(&result.node).unwrap();
        let region = result.region.clone().unwrap();

        let nodes = region.nodes();
        assert_eq!(nodes.len(), 3, "a, b, and the nested anchor");
        for node in &nodes {
            assert!(node.parent().is_some_and(|p| p.ptr_eq(&root)), "every node is attached");
        }
        for pair in nodes.windows(2) {
            assert!(pair[0].next_sibling().unwrap().ptr_eq(&pair[1]));
        }
        assert!(nodes[2].next_sibling().unwrap().ptr_eq(region.anchor()));
        assert_eq!(root.text_content(), "ab");
        result.dispose();
    }

    #[test]
    fn test_fragment_node_contributes_its_children() {
        setup();

        let root = Node::element("root");
        let result = render(View::component(|| {
            let group = Node::fragment();
            group.append_child(&Node::text("x")).unwrap();
            group.append_child(&Node::text("y")).unwrap();
            group
        }));
        root.append_child(&result.node).unwrap();

        let nodes = result.region.as_ref().unwrap().nodes();
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| n.parent().is_some_and(|p| p.ptr_eq(&root))));
        result.dispose();
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn test_mount_and_unmount() {
        setup();

        let root = Node::element("root");
        let handle = mount("static", &root).unwrap();
        assert_eq!(root.text_content(), "static");
        assert!(handle.region().is_none());
        handle.unmount();
        assert_eq!(root.child_count(), 0);

        let flag = create_signal(true);
        let handle = mount(
            View::component({
                let flag = flag.clone();
                move || if flag.get() { "on" } else { "off" }
            }),
            &root,
        )
        .unwrap();
        flag.set(false);
        assert_eq!(root.text_content(), "off");
        handle.unmount();
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn test_mount_into_text_node_fails() {
        setup();

        let parent = Node::text("leaf");
        let error = mount("x", &parent).unwrap_err();
        assert!(matches!(error, RenderError::Host(HostError::NotAContainer(NodeKind::Text))));
    }
}
