//! Dynamic regions - reactively re-rendered runs of host nodes.
//!
//! A [`Region`] owns a render function and an anchor marker in the host tree.
//! Its output nodes always sit immediately before the anchor, contiguous and in
//! render order. Whenever something the render function read changes, the
//! region re-renders and replaces the whole run.
//!
//! # State machine
//!
//! ```text
//! Uninitialized → Rendering → Settled → (Rendering → Settled)* → Disposed
//! ```
//!
//! The first render happens synchronously inside [`Region::new`], also when
//! the region is created inside another region's pass: the backing effect is a
//! sync effect, never queued behind the running flush.
//! [`Region::unmount`] moves to `Disposed` from any state; calling it again
//! does nothing.
//!
//! # Render pass
//!
//! 1. Drain the region's own cleanups (queued, untracked).
//! 2. Run the render function with the region as ambient scope. A fault is
//!    raised on the region's scope instead of propagating.
//! 3. Adopt the pass's cleanups.
//! 4. Patch: unmount the previous output (recursively for nested regions) and
//!    insert the new output before the anchor in one batch. A nested region
//!    contributes its nodes and its anchor.
//! 5. Bump `version`.
//!
//! # Host container
//!
//! Before it is inserted anywhere, a region lives in its own fragment
//! (`container()`), so the first patch has a parent to insert into. Inserting
//! the container moves the region's nodes and anchor into place.
//!
//! # Node → region lookup
//!
//! A pass's output is typed: [`Output::Node`] or [`Output::Region`]. Callers
//! that only hold a bare host node go through the thread-local maps instead,
//! which associate anchor and container nodes with their region through weak
//! references. [`unmount`] and [`children_of`] use them to treat a node list
//! that mixes plain nodes and region markers uniformly.

mod stream;

pub(crate) use stream::render_stream;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use futures::future::AbortHandle;
use spark_signals::{effect_sync, untrack};

use crate::config::{self, AnchorMode};
use crate::error::{RenderError, Result};
use crate::host::{Node, NodeId};
use crate::scope::{self, Scope};
use crate::types::{Cleanup, Output, Rendered};

// =============================================================================
// Types
// =============================================================================

/// Lifecycle state of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Uninitialized,
    Rendering,
    Settled,
    Disposed,
}

/// What produced a region (debug label).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSource {
    Component,
    Probe,
    List,
    Stream,
}

/// Render function of a region.
pub type RenderFn = Rc<dyn Fn(&Region) -> Result<Rendered>>;

struct RegionInner {
    id: RefCell<String>,
    source: RegionSource,
    scope: Scope,
    container: Node,
    anchor: Node,
    outputs: RefCell<Vec<Output>>,
    version: Cell<u64>,
    state: Cell<RegionState>,
    render: RenderFn,
    stop_effect: RefCell<Option<Cleanup>>,
    pump: RefCell<Option<AbortHandle>>,
}

/// Handle to a dynamic region. Cloning shares the region.
#[derive(Clone)]
pub struct Region(Rc<RegionInner>);

thread_local! {
    static ANCHOR_TO_REGION: RefCell<HashMap<NodeId, Weak<RegionInner>>> = RefCell::new(HashMap::new());

    static CONTAINER_TO_REGION: RefCell<HashMap<NodeId, Weak<RegionInner>>> = RefCell::new(HashMap::new());

    static NEXT_REGION_ID: Cell<u64> = const { Cell::new(0) };
}

fn next_region_id() -> String {
    let n = NEXT_REGION_ID.with(|next| {
        let n = next.get();
        next.set(n + 1);
        n
    });
    format!("{}-{}", config::anchor_prefix(), n)
}

fn create_anchor(id: &str) -> Node {
    match config::anchor_mode() {
        AnchorMode::Comment => Node::comment(id),
        AnchorMode::Text => Node::text(""),
    }
}

// =============================================================================
// Construction
// =============================================================================

impl Region {
    /// Create a region owned by the ambient scope and run its first pass.
    pub fn new(source: RegionSource, render: impl Fn(&Region) -> Result<Rendered> + 'static) -> Self {
        let id = next_region_id();
        let container = Node::fragment();
        let anchor = create_anchor(&id);
        container.adopt(anchor.clone());

        let region = Region(Rc::new(RegionInner {
            id: RefCell::new(id),
            source,
            scope: Scope::new_region(),
            container,
            anchor,
            outputs: RefCell::new(Vec::new()),
            version: Cell::new(0),
            state: Cell::new(RegionState::Uninitialized),
            render: Rc::new(render),
            stop_effect: RefCell::new(None),
            pump: RefCell::new(None),
        }));
        region.associate();
        tracing::debug!(region = %region.id(), ?source, "region created");

        let runner = region.clone();
        let stop = effect_sync(move || runner.run_pass());
        *region.0.stop_effect.borrow_mut() = Some(Box::new(stop));

        // Unmounted during its own first pass: the effect handle arrived late.
        if region.state() == RegionState::Disposed {
            region.stop_effect();
        }
        region
    }

    fn associate(&self) {
        let weak = Rc::downgrade(&self.0);
        ANCHOR_TO_REGION.with(|map| map.borrow_mut().insert(self.0.anchor.id(), weak.clone()));
        CONTAINER_TO_REGION.with(|map| map.borrow_mut().insert(self.0.container.id(), weak));
    }

    fn dissociate(&self) {
        ANCHOR_TO_REGION.with(|map| map.borrow_mut().remove(&self.0.anchor.id()));
        CONTAINER_TO_REGION.with(|map| map.borrow_mut().remove(&self.0.container.id()));
    }
}

// =============================================================================
// Accessors
// =============================================================================

impl Region {
    pub fn id(&self) -> String {
        self.0.id.borrow().clone()
    }

    /// Rename the region; comment anchors show the new id.
    pub fn set_anchor_id(&self, id: &str) {
        *self.0.id.borrow_mut() = id.to_string();
        self.0.anchor.set_data(id);
    }

    pub fn source(&self) -> RegionSource {
        self.0.source
    }

    pub fn scope(&self) -> &Scope {
        &self.0.scope
    }

    pub fn anchor(&self) -> &Node {
        &self.0.anchor
    }

    /// The fragment the region was created in. Insert it to place the region.
    pub fn container(&self) -> &Node {
        &self.0.container
    }

    /// Host nodes currently materialized by the region, in tree order.
    ///
    /// Nested regions contribute their own nodes followed by their anchor, so
    /// the list is exactly the run of siblings preceding this region's anchor.
    pub fn nodes(&self) -> Vec<Node> {
        self.0.outputs.borrow().iter().flat_map(Output::host_nodes).collect()
    }

    /// Output units of the last successful pass.
    pub fn outputs(&self) -> Vec<Output> {
        self.0.outputs.borrow().clone()
    }

    /// Number of completed render passes.
    pub fn version(&self) -> u64 {
        self.0.version.get()
    }

    pub fn state(&self) -> RegionState {
        self.0.state.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == RegionState::Disposed
    }

    pub fn ptr_eq(&self, other: &Region) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("id", &*self.0.id.borrow())
            .field("source", &self.0.source)
            .field("state", &self.state())
            .field("version", &self.version())
            .field("outputs", &self.0.outputs.borrow().len())
            .finish()
    }
}

// =============================================================================
// Rendering
// =============================================================================

impl Region {
    /// Effect body: re-run the region's own render function.
    fn run_pass(&self) {
        if self.is_disposed() || self.0.scope.is_cancelled() {
            return;
        }
        let render = self.0.render.clone();
        self.update(|| render(self));
    }

    /// One render pass with `render` as the render function.
    pub(crate) fn update(&self, render: impl FnOnce() -> Result<Rendered>) {
        if self.is_disposed() {
            return;
        }
        self.0.state.set(RegionState::Rendering);

        scope::run_with(&self.0.scope, || {
            untrack(|| self.0.scope.cleanup());
            match render() {
                // Unmounted by its own render function.
                Ok(rendered) if self.is_disposed() => rendered.discard(),
                Ok(Rendered { outputs, cleanups }) => {
                    self.0.scope.extend_cleanups(cleanups);
                    if let Err(error) = untrack(|| self.patch(outputs)) {
                        tracing::error!(region = %self.id(), %error, "patch failed");
                        self.0.scope.raise(error);
                    }
                }
                Err(error) => self.0.scope.raise(error),
            }
        });

        let version = self.0.version.get() + 1;
        self.0.version.set(version);
        if self.state() == RegionState::Rendering {
            self.0.state.set(RegionState::Settled);
        }
        tracing::trace!(region = %self.id(), version, "render pass");
    }

    /// Replace the materialized output with `outputs`.
    fn patch(&self, outputs: Vec<Output>) -> Result<()> {
        let parent = self.0.anchor.parent().ok_or_else(|| RenderError::Disconnected {
            region: self.id(),
        })?;
        self.disconnect();

        let batch = Node::fragment();
        for node in outputs.iter().flat_map(Output::host_nodes) {
            batch.append_child(&node)?;
        }
        parent.insert_before(&batch, Some(&self.0.anchor))?;
        *self.0.outputs.borrow_mut() = outputs;
        Ok(())
    }

    /// Unmount every output: nested regions recursively, plain nodes detached.
    fn disconnect(&self) {
        let previous = std::mem::take(&mut *self.0.outputs.borrow_mut());
        for output in &previous {
            match output {
                Output::Region(region) => region.unmount(),
                Output::Node(node) => unmount(node),
            }
        }
    }

    fn stop_effect(&self) {
        let stop = self.0.stop_effect.borrow_mut().take();
        if let Some(stop) = stop {
            stop();
        }
    }

    pub(crate) fn set_pump(&self, handle: AbortHandle) {
        *self.0.pump.borrow_mut() = Some(handle);
    }

    /// Tear the region down. Idempotent.
    ///
    /// Order: drain cleanups, stop the effect, unmount output, dispose the
    /// scope, detach the anchor, forget the node associations.
    pub fn unmount(&self) {
        if self.is_disposed() {
            return;
        }
        self.0.state.set(RegionState::Disposed);

        self.0.scope.cleanup();
        self.stop_effect();
        let pump = self.0.pump.borrow_mut().take();
        if let Some(pump) = pump {
            pump.abort();
        }
        self.disconnect();
        self.0.scope.dispose();
        self.0.anchor.remove();
        self.dissociate();

        tracing::debug!(region = %self.id(), "region unmounted");
    }
}

// =============================================================================
// Node Lookup
// =============================================================================

/// Region whose anchor or container is `node`.
pub fn region_of(node: &Node) -> Option<Region> {
    let id = node.id();
    ANCHOR_TO_REGION
        .with(|map| map.borrow().get(&id).and_then(Weak::upgrade))
        .or_else(|| CONTAINER_TO_REGION.with(|map| map.borrow().get(&id).and_then(Weak::upgrade)))
        .map(Region)
}

/// Unmount the region behind `node`, or detach `node` if it is a plain node.
pub fn unmount(node: &Node) {
    match region_of(node) {
        Some(region) => region.unmount(),
        None => node.remove(),
    }
}

/// The materialized nodes `node` stands for: a region's output, or `[node]`.
pub fn children_of(node: &Node) -> Vec<Node> {
    match region_of(node) {
        Some(region) => region.nodes(),
        None => vec![node.clone()],
    }
}

/// [`children_of`] over a list, flattened.
pub fn flat_children(nodes: &[Node]) -> Vec<Node> {
    nodes.iter().flat_map(children_of).collect()
}

/// Number of live node → region associations (for diagnostics and tests).
pub fn associated_regions() -> usize {
    ANCHOR_TO_REGION.with(|map| map.borrow().len())
}
