//! Shared types.

use crate::host::{Node, NodeKind};
use crate::region::Region;

// =============================================================================
// Cleanup Function
// =============================================================================

/// Teardown callback returned by renders and registered on scopes.
pub type Cleanup = Box<dyn FnOnce()>;

// =============================================================================
// Render Output
// =============================================================================

/// One unit of a region's output.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// A plain host node.
    Node(Node),
    /// A nested region; it materializes as its own nodes followed by its anchor.
    Region(Region),
}

impl Output {
    /// Host nodes this output currently occupies, in tree order.
    pub fn host_nodes(&self) -> Vec<Node> {
        match self {
            Output::Node(node) => vec![node.clone()],
            Output::Region(region) => {
                let mut nodes = region.nodes();
                nodes.push(region.anchor().clone());
                nodes
            }
        }
    }
}

/// Output of one render pass: what to materialize and which cleanups to own.
#[derive(Default)]
pub struct Rendered {
    pub outputs: Vec<Output>,
    pub cleanups: Vec<Cleanup>,
}

impl Rendered {
    pub fn new(nodes: Vec<Node>) -> Self {
        let mut rendered = Self::default();
        for node in nodes {
            rendered.push_node(node);
        }
        rendered
    }

    /// Append a plain node. A fragment contributes its children instead, since
    /// inserting it would leave the fragment itself outside the tree.
    pub fn push_node(&mut self, node: Node) {
        if node.kind() == NodeKind::Fragment {
            self.outputs.extend(node.children().into_iter().map(Output::Node));
        } else {
            self.outputs.push(Output::Node(node));
        }
    }

    /// Run every cleanup now and tear down nested regions, consuming the output.
    pub(crate) fn discard(self) {
        for output in &self.outputs {
            if let Output::Region(region) = output {
                region.unmount();
            }
        }
        for cleanup in self.cleanups {
            cleanup();
        }
    }
}

impl std::fmt::Debug for Rendered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rendered")
            .field("outputs", &self.outputs)
            .field("cleanups", &self.cleanups.len())
            .finish()
    }
}
