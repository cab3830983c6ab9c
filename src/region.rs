//! BIOS/ME/GbE/PD regions. Only BIOS is structurally parsed (it contains
//! one or more Firmware Volumes); the rest are opaque byte regions whose
//! `assemble` is a raw passthrough.

use crate::descriptor::Region;
use crate::error::{Error, Result};
use crate::volume::{AssembleCtx, FirmwareVolume};
use std::path::PathBuf;

/// Whether `BiosRegion::parse` stops at the first gap between Firmware
/// Volumes, or keeps scanning the remainder of the region for more.
/// See DESIGN.md for which one `utk` uses by default and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FvScanMode {
    /// Stop as soon as a gap at the current cursor no longer starts
    /// with `_FVH`.
    FirstRun,
    /// Keep searching the remainder of the region, 8-byte-strided, for
    /// any further Firmware Volumes -- the implied fix.
    Exhaustive,
}

impl Default for FvScanMode {
    fn default() -> Self {
        Self::Exhaustive
    }
}

const FV_SIGNATURE: &[u8; 4] = b"_FVH";
const FV_SIGNATURE_OFFSET: usize = 40;

/// Scans forward from `search_from` (stride 8) for an FV signature, and
/// returns the offset of the FV's *start* (40 bytes before the
/// signature).
pub fn find_firmware_volume_offset(buf: &[u8], search_from: usize) -> Option<usize> {
    let mut offset = search_from;
    while offset + FV_SIGNATURE_OFFSET + 4 <= buf.len() {
        if &buf[offset + FV_SIGNATURE_OFFSET..offset + FV_SIGNATURE_OFFSET + 4] == FV_SIGNATURE {
            return Some(offset);
        }
        offset += 8;
    }
    None
}

#[derive(Debug, Clone)]
pub struct BiosRegion {
    buf: Vec<u8>,
    pub position: Region,
    pub firmware_volumes: Vec<FirmwareVolume>,
    pub extract_path: Option<PathBuf>,
}

impl BiosRegion {
    pub fn parse(buf: &[u8], position: Region, ctx: &mut AssembleCtx) -> Result<Self> {
        Self::parse_with_scan(buf, position, ctx, FvScanMode::default())
    }

    pub fn parse_with_scan(
        buf: &[u8],
        position: Region,
        ctx: &mut AssembleCtx,
        scan: FvScanMode,
    ) -> Result<Self> {
        let mut firmware_volumes = Vec::new();
        let mut cursor = 0usize;
        loop {
            let found = match scan {
                FvScanMode::FirstRun => {
                    // Only accept an FV if it starts exactly where we expect
                    // the next one, i.e. no further scanning past a gap.
                    if cursor + FV_SIGNATURE_OFFSET + 4 <= buf.len()
                        && &buf[cursor + FV_SIGNATURE_OFFSET..cursor + FV_SIGNATURE_OFFSET + 4] == FV_SIGNATURE
                    {
                        Some(cursor)
                    } else {
                        None
                    }
                }
                FvScanMode::Exhaustive => find_firmware_volume_offset(buf, cursor.max(32)),
            };
            let Some(fv_offset) = found else { break };
            let fv = FirmwareVolume::parse(&buf[fv_offset..], fv_offset, ctx)?;
            let fv_len = fv.length() as usize;
            firmware_volumes.push(fv);
            cursor = fv_offset + fv_len;
            if cursor >= buf.len() {
                break;
            }
        }
        if firmware_volumes.is_empty() {
            return Err(Error::BadSignature("BIOS region contains no Firmware Volumes"));
        }
        Ok(Self { buf: buf.to_vec(), position, firmware_volumes, extract_path: None })
    }

    pub fn buf(&self) -> &[u8] {
        &self.buf
    }

    pub fn assemble(&self, ctx: &AssembleCtx) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.buf.len());
        for fv in &self.firmware_volumes {
            out.extend_from_slice(&fv.assemble(ctx)?);
        }
        if out.len() < self.buf.len() {
            out.resize(self.buf.len(), ctx.erase_polarity);
        }
        Ok(out)
    }
}

/// A macro-free, straightforward opaque region (ME/GbE/PD): `assemble`
/// is always a raw passthrough of `buf`, since this crate does not
/// interpret Intel ME microcode or GbE/PD contents (Non-goals).
macro_rules! opaque_region {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone)]
        pub struct $name {
            buf: Vec<u8>,
            pub position: Region,
            pub extract_path: Option<PathBuf>,
        }

        impl $name {
            pub fn parse(buf: &[u8], position: Region) -> Result<Self> {
                if !position.is_valid() {
                    return Err(Error::BadSignature(concat!(stringify!($name), " position is not valid")));
                }
                Ok(Self { buf: buf.to_vec(), position, extract_path: None })
            }

            /// A region this image's Descriptor marks as not present
            /// (`Limit == 0`): no bytes, no population entry.
            pub fn absent(position: Region) -> Self {
                Self { buf: Vec::new(), position, extract_path: None }
            }

            pub fn buf(&self) -> &[u8] {
                &self.buf
            }

            pub fn assemble(&self) -> Result<Vec<u8>> {
                Ok(self.buf.clone())
            }
        }
    };
}

opaque_region!(MeRegion, "Intel Management Engine region: opaque bytes, never interpreted.");
opaque_region!(GbeRegion, "Gigabit Ethernet firmware region: opaque bytes.");
opaque_region!(PdRegion, "Platform Data region: opaque bytes.");

#[cfg(test)]
mod tests {
    use super::*;

    fn fv_bytes(length: u32) -> Vec<u8> {
        crate::volume::tests_support::minimal_fv_bytes(length, &[])
    }

    #[test]
    fn finds_signature_after_search_offset() {
        let mut buf = vec![0u8; 128];
        let fv = fv_bytes(64);
        buf[32..32 + fv.len()].copy_from_slice(&fv);
        assert_eq!(find_firmware_volume_offset(&buf, 32), Some(32));
    }

    #[test]
    fn bios_region_requires_at_least_one_fv() {
        let buf = vec![0xFFu8; 64];
        let position = Region { base: 0, limit: 0 };
        let mut ctx = AssembleCtx::default();
        assert!(BiosRegion::parse(&buf, position, &mut ctx).is_err());
    }

    #[test]
    fn bios_region_parses_single_fv() {
        let fv = fv_bytes(128);
        let mut buf = vec![0xFFu8; 32];
        buf.extend_from_slice(&fv);
        let position = Region { base: 0, limit: 0 };
        let mut ctx = AssembleCtx::default();
        let region = BiosRegion::parse(&buf, position, &mut ctx).unwrap();
        assert_eq!(region.firmware_volumes.len(), 1);
    }
}
