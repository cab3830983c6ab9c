//! The visitor trait every read-only or editing pass implements.

use crate::error::Result;
use crate::tree::Node;

/// A pass over the parsed tree. The default `walk_children` method is
/// what every visitor in [`crate::visitors`] relies on for its recursive
/// case; only `find`/`remove`-style visitors that prune the walk
/// override it.
pub trait Visitor {
    fn visit(&mut self, node: &Node<'_>, path: &str) -> Result<()>;

    fn walk(&mut self, node: &Node<'_>, path: &str) -> Result<()> {
        self.visit(node, path)?;
        self.walk_children(node, path)
    }

    fn walk_children(&mut self, node: &Node<'_>, path: &str) -> Result<()> {
        for (i, child) in node.children().into_iter().enumerate() {
            let child_path = format!("{path}/{}[{i}]", child.kind_name());
            self.walk(&child, &child_path)?;
        }
        Ok(())
    }
}
