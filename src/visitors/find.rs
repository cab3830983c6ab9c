//! `utk find <pattern>`: paths of every node whose UI name or GUID
//! matches a regex.

use crate::error::Result;
use crate::tree::Node;
use crate::visitor::Visitor;
use crate::visitors::matches;
use regex::Regex;

pub struct FindVisitor {
    pattern: Regex,
    pub found: Vec<String>,
}

impl FindVisitor {
    pub fn new(pattern: Regex) -> Self {
        Self { pattern, found: Vec::new() }
    }
}

impl Visitor for FindVisitor {
    fn visit(&mut self, node: &Node<'_>, path: &str) -> Result<()> {
        if matches(node, &self.pattern) {
            self.found.push(path.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::FlashImage;

    #[test]
    fn finds_nothing_in_empty_volume() {
        let fv = crate::volume::tests_support::minimal_fv_bytes(128, &[]);
        let mut buf = vec![0xFFu8; 32];
        buf.extend_from_slice(&fv);
        let image = FlashImage::parse(&buf).unwrap();
        let mut visitor = FindVisitor::new(Regex::new("Shell").unwrap());
        for root in image.root() {
            visitor.walk(&root, "").unwrap();
        }
        assert!(visitor.found.is_empty());
    }
}
