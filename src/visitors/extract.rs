//! `utk extract <dir>`: writes every node's raw bytes under `dir`,
//! mirroring the tree's shape, plus a `summary.json` describing it.
//!
//! Per spec §4.8/§6, every node written here has its `ExtractPath`
//! recorded (mutating the tree in place) and carried into `summary.json`
//! under its `FType` tag; [`crate::visitors::parse_dir`] is the inverse,
//! reading `summary.json` back and treating each `ExtractPath` as the
//! source of truth for that node's bytes.

use crate::error::Result;
use crate::file::File;
use crate::region::{BiosRegion, GbeRegion, MeRegion, PdRegion};
use crate::section::{Encapsulated, Section};
use crate::tree::{FType, FlashImage};
use crate::visitors::json::NodeSummary;
use crate::volume::FirmwareVolume;
use std::fs;
use std::path::{Path, PathBuf};

/// Extracts `image` into `root`, creating it if necessary. Each node's
/// bytes land at `<root>/<path>.bin`, and that relative path is recorded
/// both on the node itself (`ExtractPath`) and in `summary.json`.
pub fn extract(image: &mut FlashImage, root: &Path) -> Result<()> {
    fs::create_dir_all(root)?;
    let children = match image {
        FlashImage::Full { descriptor, bios, me, gbe, pd } => vec![
            extract_descriptor(descriptor, root, "descriptor")?,
            extract_bios(bios, root, "bios")?,
            extract_me(me, root, "me")?,
            extract_gbe(gbe, root, "gbe")?,
            extract_pd(pd, root, "pd")?,
        ],
        FlashImage::BiosOnly(bios) => vec![extract_bios(bios, root, "bios")?],
    };
    let summary = NodeSummary {
        path: String::new(),
        f_type: FType::FlashImage,
        name: None,
        guid: None,
        size: children.iter().map(|c| c.size).sum(),
        extract_path: None,
        children,
    };
    let json = serde_json::to_string_pretty(&summary).map_err(|e| crate::error::Error::Summary(e.to_string()))?;
    fs::write(root.join("summary.json"), json)?;
    Ok(())
}

fn write_bytes(root: &Path, rel: &str, bytes: &[u8]) -> Result<()> {
    let file_path = root.join(rel);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(file_path, bytes)?;
    Ok(())
}

fn extract_descriptor(d: &mut crate::descriptor::FlashDescriptor, root: &Path, path: &str) -> Result<NodeSummary> {
    let rel = format!("{path}.bin");
    write_bytes(root, &rel, d.buf())?;
    let size = d.buf().len();
    d.extract_path = Some(PathBuf::from(&rel));
    Ok(NodeSummary {
        path: path.to_string(),
        f_type: FType::FlashDescriptor,
        name: None,
        guid: None,
        size,
        extract_path: Some(rel),
        children: Vec::new(),
    })
}

fn extract_me(m: &mut MeRegion, root: &Path, path: &str) -> Result<NodeSummary> {
    let rel = format!("{path}.bin");
    write_bytes(root, &rel, m.buf())?;
    let size = m.buf().len();
    m.extract_path = Some(PathBuf::from(&rel));
    Ok(NodeSummary { path: path.to_string(), f_type: FType::MeRegion, name: None, guid: None, size, extract_path: Some(rel), children: Vec::new() })
}

fn extract_gbe(g: &mut GbeRegion, root: &Path, path: &str) -> Result<NodeSummary> {
    let rel = format!("{path}.bin");
    write_bytes(root, &rel, g.buf())?;
    let size = g.buf().len();
    g.extract_path = Some(PathBuf::from(&rel));
    Ok(NodeSummary { path: path.to_string(), f_type: FType::GbeRegion, name: None, guid: None, size, extract_path: Some(rel), children: Vec::new() })
}

fn extract_pd(p: &mut PdRegion, root: &Path, path: &str) -> Result<NodeSummary> {
    let rel = format!("{path}.bin");
    write_bytes(root, &rel, p.buf())?;
    let size = p.buf().len();
    p.extract_path = Some(PathBuf::from(&rel));
    Ok(NodeSummary { path: path.to_string(), f_type: FType::PdRegion, name: None, guid: None, size, extract_path: Some(rel), children: Vec::new() })
}

fn extract_bios(b: &mut BiosRegion, root: &Path, path: &str) -> Result<NodeSummary> {
    let rel = format!("{path}.bin");
    write_bytes(root, &rel, b.buf())?;
    let size = b.buf().len();
    b.extract_path = Some(PathBuf::from(&rel));
    let mut children = Vec::new();
    for (i, fv) in b.firmware_volumes.iter_mut().enumerate() {
        children.push(extract_volume(fv, root, &format!("{path}/volume[{i}]"))?);
    }
    Ok(NodeSummary { path: path.to_string(), f_type: FType::BiosRegion, name: None, guid: None, size, extract_path: Some(rel), children })
}

fn extract_volume(fv: &mut FirmwareVolume, root: &Path, path: &str) -> Result<NodeSummary> {
    let rel = format!("{path}.bin");
    write_bytes(root, &rel, fv.buf())?;
    let size = fv.buf().len();
    fv.extract_path = Some(PathBuf::from(&rel));
    let mut children = Vec::new();
    for (i, file) in fv.files.iter_mut().enumerate() {
        children.push(extract_file(file, root, &format!("{path}/file[{i}]"))?);
    }
    Ok(NodeSummary {
        path: path.to_string(),
        f_type: FType::FirmwareVolume,
        name: fv.fv_name.map(|g| g.to_string()),
        guid: fv.fv_name.map(|g| g.to_string()),
        size,
        extract_path: Some(rel),
        children,
    })
}

fn extract_file(file: &mut File, root: &Path, path: &str) -> Result<NodeSummary> {
    // A File's exact on-disk form is header + body, which `buf()` alone
    // (body only) doesn't capture -- `assemble` always regenerates it
    // deterministically from the file's own fields, so it doubles as
    // "the bytes this node would be extracted as".
    let bytes = file.assemble()?;
    let rel = format!("{path}.bin");
    write_bytes(root, &rel, &bytes)?;
    file.set_extract_path(PathBuf::from(&rel));
    let name = file.sections.iter().find_map(|s| s.ui_name.clone());
    let mut children = Vec::new();
    for (i, section) in file.sections.iter_mut().enumerate() {
        children.push(extract_section(section, root, &format!("{path}/section[{i}]"))?);
    }
    Ok(NodeSummary {
        path: path.to_string(),
        f_type: FType::File,
        name: name.or_else(|| Some(file.name.to_string())),
        guid: Some(file.name.to_string()),
        size: bytes.len(),
        extract_path: Some(rel),
        children,
    })
}

fn extract_section(section: &mut Section, root: &Path, path: &str) -> Result<NodeSummary> {
    let bytes = section.assemble()?;
    let rel = format!("{path}.bin");
    write_bytes(root, &rel, &bytes)?;
    section.set_extract_path(PathBuf::from(&rel));
    let name = section.ui_name.clone();
    let guid = section.guid_defined_guid.map(|g| g.to_string());
    let mut children = Vec::new();
    match &mut section.encapsulated {
        Some(Encapsulated::Sections(subs)) => {
            for (i, sub) in subs.iter_mut().enumerate() {
                children.push(extract_section(sub, root, &format!("{path}/section[{i}]"))?);
            }
        }
        Some(Encapsulated::Volume(fv)) => {
            children.push(extract_volume(fv, root, &format!("{path}/volume[0]"))?);
        }
        _ => {}
    }
    Ok(NodeSummary { path: path.to_string(), f_type: FType::Section, name, guid, size: bytes.len(), extract_path: Some(rel), children })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_summary_json_and_bin_files() {
        let dir = std::env::temp_dir().join(format!("utk-extract-test-{}", std::process::id()));
        let fv = crate::volume::tests_support::minimal_fv_bytes(128, &[]);
        let mut buf = vec![0xFFu8; 32];
        buf.extend_from_slice(&fv);
        let mut image = FlashImage::parse(&buf).unwrap();
        extract(&mut image, &dir).unwrap();
        assert!(dir.join("summary.json").exists());
        assert!(dir.join("bios.bin").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn records_extract_path_on_the_tree() {
        let dir = std::env::temp_dir().join(format!("utk-extract-test2-{}", std::process::id()));
        let fv = crate::volume::tests_support::minimal_fv_bytes(128, &[]);
        let mut buf = vec![0xFFu8; 32];
        buf.extend_from_slice(&fv);
        let mut image = FlashImage::parse(&buf).unwrap();
        extract(&mut image, &dir).unwrap();
        match &image {
            FlashImage::BiosOnly(bios) => {
                assert_eq!(bios.extract_path.as_deref(), Some(Path::new("bios.bin")));
                assert_eq!(bios.firmware_volumes[0].extract_path.as_deref(), Some(Path::new("bios/volume[0].bin")));
            }
            _ => panic!("expected BiosOnly"),
        }
        let _ = fs::remove_dir_all(&dir);
    }
}
