//! The tagged tree every visitor walks: a tagged `enum Node` rather
//! than a trait-object tree, so matching on node kind is exhaustive and
//! new node kinds are a compiler error at every call site instead of a
//! silently-ignored default.

use crate::descriptor::FlashDescriptor;
use crate::error::{Error, Result};
use crate::file::File;
use crate::region::{BiosRegion, GbeRegion, MeRegion, PdRegion};
use crate::section::{Encapsulated, Section};
use crate::volume::{AssembleCtx, FirmwareVolume};

/// A single node in the parsed image tree. Each variant owns its node's
/// bytes and whatever children it has already parsed; there is no shared
/// mutable state anywhere in this tree.
#[derive(Debug, Clone)]
pub enum Node<'a> {
    Descriptor(&'a FlashDescriptor),
    Bios(&'a BiosRegion),
    Me(&'a MeRegion),
    Gbe(&'a GbeRegion),
    Pd(&'a PdRegion),
    Volume(&'a FirmwareVolume),
    File(&'a File),
    Section(&'a Section),
}

/// A node's variant tag as it appears in `summary.json`'s `FType` field
/// (spec §6: `"FlashImage" | "FirmwareVolume" | "File" | "Section" | …`).
/// Distinct from [`Node::kind_name`], which drives this crate's own
/// (lowercase, index-suffixed) path-building scheme for `table`/`find`/
/// `extract` and is not part of that schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub enum FType {
    FlashImage,
    FlashDescriptor,
    BiosRegion,
    MeRegion,
    GbeRegion,
    PdRegion,
    FirmwareVolume,
    File,
    Section,
}

impl std::fmt::Display for FType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl<'a> Node<'a> {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Descriptor(_) => "descriptor",
            Self::Bios(_) => "bios",
            Self::Me(_) => "me",
            Self::Gbe(_) => "gbe",
            Self::Pd(_) => "pd",
            Self::Volume(_) => "volume",
            Self::File(_) => "file",
            Self::Section(_) => "section",
        }
    }

    pub fn f_type(&self) -> FType {
        match self {
            Self::Descriptor(_) => FType::FlashDescriptor,
            Self::Bios(_) => FType::BiosRegion,
            Self::Me(_) => FType::MeRegion,
            Self::Gbe(_) => FType::GbeRegion,
            Self::Pd(_) => FType::PdRegion,
            Self::Volume(_) => FType::FirmwareVolume,
            Self::File(_) => FType::File,
            Self::Section(_) => FType::Section,
        }
    }

    pub fn buf(&self) -> &[u8] {
        match self {
            Self::Descriptor(d) => d.buf(),
            Self::Bios(b) => b.buf(),
            Self::Me(m) => m.buf(),
            Self::Gbe(g) => g.buf(),
            Self::Pd(p) => p.buf(),
            Self::Volume(v) => v.buf(),
            Self::File(f) => f.buf(),
            Self::Section(s) => s.buf(),
        }
    }

    /// Direct children, in on-disk order. Regions hold Volumes, Volumes
    /// hold Files, Files hold Sections, and GUID-defined/Compression/
    /// FirmwareVolumeImage Sections hold further Sections (or a nested
    /// Volume) once decoded.
    pub fn children(&self) -> Vec<Node<'a>> {
        match self {
            Self::Descriptor(_) => Vec::new(),
            Self::Bios(b) => b.firmware_volumes.iter().map(Node::Volume).collect(),
            Self::Me(_) | Self::Gbe(_) | Self::Pd(_) => Vec::new(),
            Self::Volume(v) => v.files.iter().map(Node::File).collect(),
            Self::File(f) => f.sections.iter().map(Node::Section).collect(),
            Self::Section(s) => match &s.encapsulated {
                Some(Encapsulated::Sections(children)) => children.iter().map(Node::Section).collect(),
                Some(Encapsulated::Volume(fv)) => vec![Node::Volume(fv)],
                _ => Vec::new(),
            },
        }
    }

    pub fn validate(&self) -> Vec<crate::error::ValidationError> {
        match self {
            Self::Descriptor(_) | Self::Me(_) | Self::Gbe(_) | Self::Pd(_) => Vec::new(),
            Self::Bios(b) => b.firmware_volumes.iter().flat_map(|fv| fv.validate()).collect(),
            Self::Volume(v) => v.validate(),
            Self::File(f) => f.validate(),
            Self::Section(s) => s.validate(),
        }
    }
}

/// The top-level parsed image: either a full flash image with a
/// Descriptor and its four regions, or a naked BIOS region: the
/// sniffing rule tries the Descriptor signature first, then falls back
/// to scanning for a bare Firmware Volume.
#[derive(Debug, Clone)]
pub enum FlashImage {
    Full { descriptor: FlashDescriptor, bios: BiosRegion, me: MeRegion, gbe: GbeRegion, pd: PdRegion },
    BiosOnly(BiosRegion),
}

impl FlashImage {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut ctx = AssembleCtx::default();
        let descriptor_bytes = buf.get(..crate::descriptor::DESCRIPTOR_SIZE);
        if let Some(Ok(descriptor)) = descriptor_bytes.map(FlashDescriptor::parse) {
            let regions = descriptor.regions;
            let bios = BiosRegion::parse(&slice_region(buf, regions.bios)?, regions.bios, &mut ctx)?;
            let me = if regions.me.is_valid() {
                MeRegion::parse(&slice_region(buf, regions.me)?, regions.me)?
            } else {
                MeRegion::absent(regions.me)
            };
            let gbe = if regions.gbe.is_valid() {
                GbeRegion::parse(&slice_region(buf, regions.gbe)?, regions.gbe)?
            } else {
                GbeRegion::absent(regions.gbe)
            };
            let pd = if regions.pd.is_valid() {
                PdRegion::parse(&slice_region(buf, regions.pd)?, regions.pd)?
            } else {
                PdRegion::absent(regions.pd)
            };
            return Ok(Self::Full { descriptor, bios, me, gbe, pd });
        }

        let whole_chip = crate::descriptor::Region { base: 0, limit: (buf.len() / 4096).max(1) as u16 - 1 };
        let bios = BiosRegion::parse(buf, whole_chip, &mut ctx)?;
        Ok(Self::BiosOnly(bios))
    }

    pub fn root(&self) -> Vec<Node<'_>> {
        match self {
            Self::Full { descriptor, bios, me, gbe, pd } => {
                vec![Node::Descriptor(descriptor), Node::Bios(bios), Node::Me(me), Node::Gbe(gbe), Node::Pd(pd)]
            }
            Self::BiosOnly(bios) => vec![Node::Bios(bios)],
        }
    }

    pub fn assemble(&self) -> Result<Vec<u8>> {
        let ctx = AssembleCtx::default();
        match self {
            Self::Full { descriptor, bios, me, gbe, pd } => {
                let mut out = descriptor.assemble()?;
                place(&mut out, descriptor.regions.bios, &bios.assemble(&ctx)?)?;
                place(&mut out, descriptor.regions.me, &me.assemble()?)?;
                place(&mut out, descriptor.regions.gbe, &gbe.assemble()?)?;
                place(&mut out, descriptor.regions.pd, &pd.assemble()?)?;
                Ok(out)
            }
            Self::BiosOnly(bios) => bios.assemble(&ctx),
        }
    }
}

fn slice_region(buf: &[u8], region: crate::descriptor::Region) -> Result<Vec<u8>> {
    if !region.is_valid() {
        return Ok(Vec::new());
    }
    let (start, end) = (region.start_offset(), region.end_offset());
    buf.get(start..end.min(buf.len())).map(<[u8]>::to_vec).ok_or(Error::ShortBuffer { need: end, have: buf.len() })
}

fn place(out: &mut Vec<u8>, region: crate::descriptor::Region, bytes: &[u8]) -> Result<()> {
    if !region.is_valid() {
        return Ok(());
    }
    let (start, end) = (region.start_offset(), region.end_offset());
    if out.len() < end {
        out.resize(end, 0xFF);
    }
    let span = &mut out[start..end];
    if bytes.len() > span.len() {
        return Err(Error::FvCapacityExceeded { need: bytes.len(), capacity: span.len() });
    }
    span[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}
