//! Host markup environment - the tree regions render into.
//!
//! A DOM-shaped tree of reference-counted nodes. Parents own their children;
//! children point back at their parent weakly, so a detached subtree is freed as
//! soon as the last handle goes away.
//!
//! # Node kinds
//!
//! - `Element` - container with a tag name
//! - `Text` - character data, rendered
//! - `Comment` - character data, not rendered (used for anchor markers)
//! - `Fragment` - batching container; inserting it moves its children
//!
//! ```ignore
//! let root = Node::element("div");
//! let batch = Node::fragment();
//! batch.append_child(&Node::text("a"))?;
//! batch.append_child(&Node::text("b"))?;
//! root.append_child(&batch)?; // root: "ab", batch: empty
//! ```

mod node;

pub use node::*;
