//! `utk table`: a flat listing of every node, one line each.

use crate::error::Result;
use crate::tree::Node;
use crate::visitor::Visitor;
use crate::visitors::display_name;

pub struct TableVisitor {
    rows: Vec<(String, String, String, usize)>,
}

impl Default for TableVisitor {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl Visitor for TableVisitor {
    fn visit(&mut self, node: &Node<'_>, path: &str) -> Result<()> {
        let name = display_name(node).unwrap_or_default();
        self.rows.push((path.to_string(), node.kind_name().to_string(), name, node.buf().len()));
        Ok(())
    }
}

impl TableVisitor {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{:<40} {:<10} {:<20} {}\n", "PATH", "KIND", "NAME", "SIZE"));
        for (path, kind, name, size) in &self.rows {
            out.push_str(&format!("{path:<40} {kind:<10} {name:<20} {size}\n"));
        }
        out
    }

    pub fn rows(&self) -> &[(String, String, String, usize)] {
        &self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::FlashImage;

    #[test]
    fn lists_all_nodes() {
        let fv = crate::volume::tests_support::minimal_fv_bytes(128, &[]);
        let mut buf = vec![0xFFu8; 32];
        buf.extend_from_slice(&fv);
        let image = FlashImage::parse(&buf).unwrap();
        let mut visitor = TableVisitor::default();
        for root in image.root() {
            visitor.walk(&root, "").unwrap();
        }
        assert!(visitor.rows().iter().any(|(_, kind, ..)| kind == "bios"));
        assert!(visitor.rows().iter().any(|(_, kind, ..)| kind == "volume"));
    }
}
