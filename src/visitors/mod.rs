//! Read-only and editing passes over a parsed image.
//!
//! `table`/`json`/`find` are pure [`crate::visitor::Visitor`] walks over
//! the immutable [`crate::tree::Node`] view. `remove`/`replace_pe32`
//! mutate the owned tree directly (a `Node` only ever borrows, so an
//! editing pass works one layer down, on `FirmwareVolume`/`File`/
//! `Section` themselves) and `extract`/`parse_dir`/`save` cross the
//! filesystem boundary.

pub mod extract;
pub mod find;
pub mod json;
pub mod parse_dir;
pub mod remove;
pub mod replace_pe32;
pub mod save;
pub mod table;

use crate::guid::Guid;
use crate::tree::Node;
use regex::Regex;

/// The name used to match a node against a `find`/`remove`/`replace_pe32`
/// predicate: a `UserInterface` section's decoded name if a File node has
/// one among its sections, or else the node's GUID (Files and
/// GUID-defined Sections), or else nothing.
pub fn display_name(node: &Node<'_>) -> Option<String> {
    match node {
        Node::File(f) => f
            .sections
            .iter()
            .find_map(|s| s.ui_name.clone())
            .or_else(|| Some(f.name.to_string())),
        Node::Section(s) => s.ui_name.clone().or_else(|| s.guid_defined_guid.map(|g| g.to_string())),
        Node::Volume(v) => v.fv_name.map(|g| g.to_string()),
        _ => None,
    }
}

pub fn node_guid(node: &Node<'_>) -> Option<Guid> {
    match node {
        Node::File(f) => Some(f.name),
        Node::Section(s) => s.guid_defined_guid,
        Node::Volume(v) => v.fv_name,
        _ => None,
    }
}

/// Whether `node` matches a `find`/`remove`/`replace_pe32` pattern.
/// Volume nodes are deliberately excluded: `remove` only ever deletes
/// Files (and, inside a decoded Section, nested Sections/Volumes are
/// reached by deleting their containing File), so matching a Volume's
/// `fv_name` here would let `find` report paths `remove` can never
/// actually delete.
pub fn matches(node: &Node<'_>, pattern: &Regex) -> bool {
    if matches!(node, Node::Volume(_)) {
        return false;
    }
    display_name(node).map(|name| pattern.is_match(&name)).unwrap_or(false)
        || node_guid(node).map(|g| pattern.is_match(&g.to_string())).unwrap_or(false)
}
