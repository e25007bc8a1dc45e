//! Host nodes and tree mutation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

// =============================================================================
// Types
// =============================================================================

/// Stable identity of a host node, unique per thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// Node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    Comment,
    Fragment,
}

impl NodeKind {
    /// Whether nodes of this kind can hold children.
    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Element | NodeKind::Fragment)
    }
}

/// Rejected tree mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("{0:?} nodes cannot have children")]
    NotAContainer(NodeKind),
    #[error("node would become its own ancestor")]
    HierarchyRequest,
    #[error("reference node is not a child of this node")]
    NotAChild,
}

thread_local! {
    static NEXT_NODE_ID: Cell<u64> = const { Cell::new(0) };
}

fn next_node_id() -> NodeId {
    NEXT_NODE_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        NodeId(id)
    })
}

struct NodeData {
    id: NodeId,
    kind: NodeKind,
    tag: String,
    data: RefCell<String>,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<Node>>,
}

/// Handle to a host node. Cloning is cheap; equality is identity.
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

// =============================================================================
// Creation
// =============================================================================

impl Node {
    fn create(kind: NodeKind, tag: &str, data: String) -> Self {
        Node(Rc::new(NodeData {
            id: next_node_id(),
            kind,
            tag: tag.to_string(),
            data: RefCell::new(data),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        }))
    }

    /// Create an element with the given tag.
    pub fn element(tag: &str) -> Self {
        Self::create(NodeKind::Element, tag, String::new())
    }

    /// Create a text node.
    pub fn text(content: impl Into<String>) -> Self {
        Self::create(NodeKind::Text, "", content.into())
    }

    /// Create a comment node.
    pub fn comment(data: impl Into<String>) -> Self {
        Self::create(NodeKind::Comment, "", data.into())
    }

    /// Create an empty batching container.
    pub fn fragment() -> Self {
        Self::create(NodeKind::Fragment, "", String::new())
    }
}

// =============================================================================
// Inspection
// =============================================================================

impl Node {
    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn kind(&self) -> NodeKind {
        self.0.kind
    }

    /// Tag name for elements, empty otherwise.
    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    /// Snapshot of the child list.
    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    fn index_in_parent(&self) -> Option<(Node, usize)> {
        let parent = self.parent()?;
        let index = parent.0.children.borrow().iter().position(|c| c.ptr_eq(self))?;
        Some((parent, index))
    }

    pub fn next_sibling(&self) -> Option<Node> {
        let (parent, index) = self.index_in_parent()?;
        let children = parent.0.children.borrow();
        children.get(index + 1).cloned()
    }

    pub fn previous_sibling(&self) -> Option<Node> {
        let (parent, index) = self.index_in_parent()?;
        let children = parent.0.children.borrow();
        index.checked_sub(1).and_then(|i| children.get(i).cloned())
    }

    /// True if `self` is `other` or one of its ancestors.
    pub fn contains(&self, other: &Node) -> bool {
        let mut cursor = Some(other.clone());
        while let Some(node) = cursor {
            if node.ptr_eq(self) {
                return true;
            }
            cursor = node.parent();
        }
        false
    }

    /// Character data of text and comment nodes; concatenated descendant text
    /// for containers (comments excluded).
    pub fn text_content(&self) -> String {
        match self.0.kind {
            NodeKind::Text | NodeKind::Comment => self.0.data.borrow().clone(),
            NodeKind::Element | NodeKind::Fragment => {
                let mut out = String::new();
                self.collect_text(&mut out);
                out
            }
        }
    }

    fn collect_text(&self, out: &mut String) {
        for child in self.0.children.borrow().iter() {
            match child.0.kind {
                NodeKind::Text => out.push_str(&child.0.data.borrow()),
                NodeKind::Comment => {}
                NodeKind::Element | NodeKind::Fragment => child.collect_text(out),
            }
        }
    }

    /// Serialize the subtree for debugging and assertions.
    ///
    /// Elements print as `<tag>...</tag>`, comments as `<!--data-->`, fragments
    /// print only their children.
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.write_markup(&mut out);
        out
    }

    fn write_markup(&self, out: &mut String) {
        match self.0.kind {
            NodeKind::Text => out.push_str(&self.0.data.borrow()),
            NodeKind::Comment => {
                out.push_str("<!--");
                out.push_str(&self.0.data.borrow());
                out.push_str("-->");
            }
            NodeKind::Element => {
                out.push('<');
                out.push_str(&self.0.tag);
                out.push('>');
                for child in self.0.children.borrow().iter() {
                    child.write_markup(out);
                }
                out.push_str("</");
                out.push_str(&self.0.tag);
                out.push('>');
            }
            NodeKind::Fragment => {
                for child in self.0.children.borrow().iter() {
                    child.write_markup(out);
                }
            }
        }
    }
}

// =============================================================================
// Mutation
// =============================================================================

impl Node {
    /// Replace character data. On containers, replaces all children with a
    /// single text node.
    pub fn set_text(&self, content: &str) {
        match self.0.kind {
            NodeKind::Text | NodeKind::Comment => {
                let mut data = self.0.data.borrow_mut();
                if *data != content {
                    data.clear();
                    data.push_str(content);
                }
            }
            NodeKind::Element | NodeKind::Fragment => {
                for child in self.children() {
                    child.remove();
                }
                self.adopt(Node::text(content));
            }
        }
    }

    /// Append `child`, moving it from its current parent.
    pub fn append_child(&self, child: &Node) -> Result<(), HostError> {
        self.insert_before(child, None)
    }

    /// Insert `child` before `reference` (or at the end when `None`).
    ///
    /// Inserting a fragment moves its children, in order, and leaves it empty.
    pub fn insert_before(&self, child: &Node, reference: Option<&Node>) -> Result<(), HostError> {
        if !self.0.kind.is_container() {
            return Err(HostError::NotAContainer(self.0.kind));
        }
        if let Some(reference) = reference {
            let is_child = reference.parent().is_some_and(|p| p.ptr_eq(self));
            if !is_child {
                return Err(HostError::NotAChild);
            }
        }

        let incoming = if child.0.kind == NodeKind::Fragment {
            child.children()
        } else {
            vec![child.clone()]
        };
        if incoming.iter().any(|node| node.contains(self)) {
            return Err(HostError::HierarchyRequest);
        }

        // Inserting a node before itself means "keep its position".
        let mut reference = reference.cloned();
        if let Some(r) = &reference {
            if incoming.iter().any(|node| node.ptr_eq(r)) {
                reference = r.next_sibling();
                while let Some(next) = reference.clone() {
                    if incoming.iter().any(|node| node.ptr_eq(&next)) {
                        reference = next.next_sibling();
                    } else {
                        break;
                    }
                }
            }
        }

        for node in incoming {
            node.remove();
            let mut children = self.0.children.borrow_mut();
            let position = reference
                .as_ref()
                .and_then(|r| children.iter().position(|c| c.ptr_eq(r)))
                .unwrap_or(children.len());
            *node.0.parent.borrow_mut() = Rc::downgrade(&self.0);
            children.insert(position, node);
        }
        Ok(())
    }

    /// Remove `child` from this node.
    pub fn remove_child(&self, child: &Node) -> Result<(), HostError> {
        let is_child = child.parent().is_some_and(|p| p.ptr_eq(self));
        if !is_child {
            return Err(HostError::NotAChild);
        }
        child.remove();
        Ok(())
    }

    /// Detach from the current parent. No-op when detached.
    pub fn remove(&self) {
        if let Some(parent) = self.parent() {
            parent.0.children.borrow_mut().retain(|c| !c.ptr_eq(self));
        }
        *self.0.parent.borrow_mut() = Weak::new();
    }

    /// Append a freshly created, detached node. Cannot fail for such nodes.
    pub(crate) fn adopt(&self, child: Node) {
        debug_assert!(self.0.kind.is_container());
        debug_assert!(child.parent().is_none());
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child);
    }

    /// Update comment data (anchor ids).
    pub fn set_data(&self, data: &str) {
        if self.0.kind == NodeKind::Comment {
            self.set_text(data);
        }
    }
}

// =============================================================================
// Trait impls
// =============================================================================

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.kind {
            NodeKind::Element => write!(f, "<{}>#{}", self.0.tag, self.0.id.0),
            NodeKind::Text => write!(f, "{:?}#{}", self.0.data.borrow(), self.0.id.0),
            NodeKind::Comment => write!(f, "<!--{}-->#{}", self.0.data.borrow(), self.0.id.0),
            NodeKind::Fragment => write!(f, "#fragment#{}", self.0.id.0),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
