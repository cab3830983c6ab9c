//! `utk parse-dir <dir>`: the inverse of [`crate::visitors::extract`] --
//! reads `summary.json`, reconstructs the top-level tree shape from its
//! `FType` tags, then rebuilds the on-disk image bytes from each node's
//! `ExtractPath`. This is a filesystem round trip of whatever bytes
//! currently live at those paths -- edit a node's extracted file (or
//! hand-edit `summary.json`'s `ExtractPath` to point elsewhere) before
//! running this to fold a change back in. For in-process edits instead,
//! use `remove`/`replace_pe32` on a loaded [`crate::tree::FlashImage`]
//! and `save` the result.

use crate::descriptor::FlashDescriptor;
use crate::error::{Error, Result};
use crate::tree::FType;
use crate::visitors::json::NodeSummary;
use std::fs;
use std::path::Path;

pub fn parse_dir(root: &Path) -> Result<Vec<u8>> {
    let summary_path = root.join("summary.json");
    let summary_bytes = fs::read(&summary_path).map_err(|_| Error::MissingExtractPath(summary_path))?;
    let summary: NodeSummary =
        serde_json::from_slice(&summary_bytes).map_err(|e| Error::Summary(e.to_string()))?;

    let find = |f_type: FType| summary.children.iter().find(|c| c.f_type == f_type);
    let read_node = |node: &NodeSummary| -> Result<Vec<u8>> {
        let rel = node.extract_path.as_ref().ok_or_else(|| Error::MissingExtractPath(root.to_path_buf()))?;
        let path = root.join(rel);
        fs::read(&path).map_err(|_| Error::MissingExtractPath(path))
    };

    let Some(descriptor_node) = find(FType::FlashDescriptor) else {
        let bios_node = find(FType::BiosRegion).ok_or_else(|| Error::MissingExtractPath(root.to_path_buf()))?;
        return read_node(bios_node);
    };

    let descriptor_bytes = read_node(descriptor_node)?;
    let descriptor = FlashDescriptor::parse(&descriptor_bytes)?;
    let regions = descriptor.regions;

    let mut out = descriptor_bytes;
    for (f_type, region) in [
        (FType::BiosRegion, regions.bios),
        (FType::MeRegion, regions.me),
        (FType::GbeRegion, regions.gbe),
        (FType::PdRegion, regions.pd),
    ] {
        if !region.is_valid() {
            continue;
        }
        let node = find(f_type).ok_or_else(|| Error::MissingExtractPath(root.to_path_buf()))?;
        let bytes = read_node(node)?;
        let (start, end) = (region.start_offset(), region.end_offset());
        if out.len() < end {
            out.resize(end, 0xFF);
        }
        let span_len = (end - start).min(bytes.len());
        out[start..start + span_len].copy_from_slice(&bytes[..span_len]);
    }
    Ok(out)
}
