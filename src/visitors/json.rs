//! `utk json` / the `summary.json` written alongside `extract`: a
//! serializable mirror of the parsed tree.
//!
//! Schema (spec §6): every node is tagged by its variant under `FType`
//! (`"FlashImage" | "FirmwareVolume" | "File" | "Section" | …`, spelled
//! out in [`crate::tree::FType`]) and carries whatever `ExtractPath`
//! [`crate::visitors::extract::extract`] recorded for it -- `parse_dir`
//! treats that path as the source of truth when reassembling.

use crate::error::Result;
use crate::tree::{FType, Node};
use crate::visitor::Visitor;
use crate::visitors::{display_name, node_guid};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct NodeSummary {
    pub path: String,
    #[serde(rename = "FType")]
    pub f_type: FType,
    pub name: Option<String>,
    pub guid: Option<String>,
    pub size: usize,
    #[serde(rename = "ExtractPath", skip_serializing_if = "Option::is_none", default)]
    pub extract_path: Option<String>,
    #[serde(default)]
    pub children: Vec<NodeSummary>,
}

/// Builds a [`NodeSummary`] tree without going through the `Visitor`
/// trait's flat callback, since the summary needs to nest children under
/// their parent rather than list them alongside it. `extract_path` is
/// `None` here; [`crate::visitors::extract::extract`] fills it in as it
/// writes each node to disk.
pub fn summarize(node: &Node<'_>, path: &str) -> NodeSummary {
    let children = node
        .children()
        .iter()
        .enumerate()
        .map(|(i, child)| summarize(child, &format!("{path}/{}[{i}]", child.kind_name())))
        .collect();
    NodeSummary {
        path: path.to_string(),
        f_type: node.f_type(),
        name: display_name(node),
        guid: node_guid(node).map(|g| g.to_string()),
        size: node.buf().len(),
        extract_path: None,
        children,
    }
}

/// A flat-collecting [`Visitor`] used when the caller wants every node's
/// summary in parse order rather than nested (e.g. for `utk json
/// --flat`).
pub struct JsonVisitor {
    pub nodes: Vec<NodeSummary>,
}

impl Default for JsonVisitor {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl Visitor for JsonVisitor {
    fn visit(&mut self, node: &Node<'_>, path: &str) -> Result<()> {
        self.nodes.push(NodeSummary {
            path: path.to_string(),
            f_type: node.f_type(),
            name: display_name(node),
            guid: node_guid(node).map(|g| g.to_string()),
            size: node.buf().len(),
            extract_path: None,
            children: Vec::new(),
        });
        Ok(())
    }
}
