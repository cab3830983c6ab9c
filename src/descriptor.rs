//! Intel Flash Descriptor (IFD): signature discovery, Descriptor Map,
//! Region table, Master table.

use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

pub const DESCRIPTOR_SIZE: usize = 4096;
pub const FLASH_SIGNATURE: [u8; 4] = [0x5A, 0xA5, 0xF0, 0x0F];

/// One entry of the Region table: a 4 KiB-granular `[Base, Limit]` span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Region {
    pub base: u16,
    pub limit: u16,
}

impl Region {
    /// "valid" iff `Limit > 0` and `Limit >= Base`.
    pub fn is_valid(&self) -> bool {
        self.limit > 0 && self.limit >= self.base
    }

    pub fn start_offset(&self) -> usize {
        self.base as usize * 4096
    }

    pub fn end_offset(&self) -> usize {
        (self.limit as usize + 1) * 4096
    }
}

/// Where, in the descriptor map, the signature was found -- determines
/// where the Descriptor Map itself starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignaturePosition {
    /// ICH legacy: signature at offset 0, map at offset 4.
    Ich,
    /// PCH: signature at offset 16, map at offset 20.
    Pch,
}

impl SignaturePosition {
    pub fn map_offset(self) -> usize {
        match self {
            Self::Ich => 4,
            Self::Pch => 20,
        }
    }
}

/// Finds the flash signature. Per the resolved Open Question (see
/// DESIGN.md), offset 0 (ICH legacy) is tried before offset 16 (PCH).
pub fn find_flash_signature(buf: &[u8]) -> Result<SignaturePosition> {
    if buf.len() >= 4 && buf[0..4] == FLASH_SIGNATURE {
        return Ok(SignaturePosition::Ich);
    }
    if buf.len() >= 20 && buf[16..20] == FLASH_SIGNATURE {
        return Ok(SignaturePosition::Pch);
    }
    Err(Error::BadSignature("flash descriptor signature 5A A5 F0 0F not found at offset 0 or 16"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMap {
    pub region_base: u8,
    pub master_base: u8,
}

impl DescriptorMap {
    pub fn region_start(&self) -> usize {
        self.region_base as usize * 16
    }

    pub fn master_start(&self) -> usize {
        self.master_base as usize * 16
    }
}

#[derive(Debug, Clone)]
pub struct FlashDescriptor {
    buf: Vec<u8>,
    pub map: DescriptorMap,
    pub regions: RegionTable,
    pub master: MasterTable,
    pub extract_path: Option<std::path::PathBuf>,
}

/// The BIOS/ME/GbE/PDR region spans from the Region table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionTable {
    pub bios: Region,
    pub me: Region,
    pub gbe: Region,
    pub pd: Region,
}

/// Per-region access masks from the Master table. Access control
/// semantics beyond "carry the raw masks" are out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterTable {
    pub masks: [u16; 3],
}

impl FlashDescriptor {
    /// `buf` must be exactly [`DESCRIPTOR_SIZE`] bytes.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() != DESCRIPTOR_SIZE {
            return Err(Error::ShortBuffer { need: DESCRIPTOR_SIZE, have: buf.len() });
        }
        let position = find_flash_signature(buf)?;
        let map_offset = position.map_offset();
        if map_offset + 16 > DESCRIPTOR_SIZE {
            return Err(Error::ShortBuffer { need: map_offset + 16, have: DESCRIPTOR_SIZE });
        }
        // DescriptorMap: byte 0 = FLMAP0 (region base @ bits 8-15), etc.
        // We only need the two base nibbles the rest of the layout is
        // keyed on.
        let region_base = buf[map_offset + 2];
        let master_base = buf[map_offset + 6];
        let map = DescriptorMap { region_base, master_base };

        let region_start = map.region_start();
        if region_start + 18 * 2 > DESCRIPTOR_SIZE {
            return Err(Error::ShortBuffer { need: region_start + 36, have: DESCRIPTOR_SIZE });
        }
        let read_region = |i: usize| -> Region {
            let off = region_start + i * 4;
            Region {
                base: LittleEndian::read_u16(&buf[off..off + 2]),
                limit: LittleEndian::read_u16(&buf[off + 2..off + 4]),
            }
        };
        let regions = RegionTable { bios: read_region(0), me: read_region(1), gbe: read_region(2), pd: read_region(3) };

        let master_start = map.master_start();
        if master_start + 12 > DESCRIPTOR_SIZE {
            return Err(Error::ShortBuffer { need: master_start + 12, have: DESCRIPTOR_SIZE });
        }
        let mut masks = [0u16; 3];
        for (i, mask) in masks.iter_mut().enumerate() {
            *mask = LittleEndian::read_u16(&buf[master_start + i * 4..master_start + i * 4 + 2]);
        }
        let master = MasterTable { masks };

        Ok(Self { buf: buf.to_vec(), map, regions, master, extract_path: None })
    }

    pub fn buf(&self) -> &[u8] {
        &self.buf
    }

    /// The raw bytes are authoritative: edits to the region/master
    /// tables' in-memory fields are not re-serialized here, since a
    /// byte-for-bit round trip of the descriptor always wins over them.
    pub fn assemble(&self) -> Result<Vec<u8>> {
        Ok(self.buf.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_descriptor(position: SignaturePosition) -> Vec<u8> {
        let mut buf = vec![0u8; DESCRIPTOR_SIZE];
        let sig_offset = match position {
            SignaturePosition::Ich => 0,
            SignaturePosition::Pch => 16,
        };
        buf[sig_offset..sig_offset + 4].copy_from_slice(&FLASH_SIGNATURE);
        let map_offset = position.map_offset();
        // region_base = 1 -> region table at byte 16; master_base = 2 -> master table at byte 32.
        buf[map_offset + 2] = 1;
        buf[map_offset + 6] = 2;
        // BIOS region: base=0, limit=0x1FF (8 MiB - ish), valid.
        LittleEndian::write_u16(&mut buf[16..18], 0);
        LittleEndian::write_u16(&mut buf[18..20], 0x1FF);
        buf
    }

    #[test]
    fn s4_signature_at_offset_16() {
        let buf = minimal_descriptor(SignaturePosition::Pch);
        assert_eq!(find_flash_signature(&buf).unwrap(), SignaturePosition::Pch);
        assert_eq!(find_flash_signature(&buf).unwrap().map_offset(), 20);
    }

    #[test]
    fn s4_signature_at_offset_0() {
        let buf = minimal_descriptor(SignaturePosition::Ich);
        assert_eq!(find_flash_signature(&buf).unwrap(), SignaturePosition::Ich);
        assert_eq!(find_flash_signature(&buf).unwrap().map_offset(), 4);
    }

    #[test]
    fn s4_signature_misaligned_fails() {
        let mut buf = vec![0u8; DESCRIPTOR_SIZE];
        buf[10..14].copy_from_slice(&FLASH_SIGNATURE);
        assert!(find_flash_signature(&buf).is_err());
    }

    #[test]
    fn parses_region_table() {
        let buf = minimal_descriptor(SignaturePosition::Pch);
        let fd = FlashDescriptor::parse(&buf).unwrap();
        assert!(fd.regions.bios.is_valid());
        assert_eq!(fd.regions.bios.start_offset(), 0);
        assert!(!fd.regions.me.is_valid());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(FlashDescriptor::parse(&[0u8; 10]), Err(Error::ShortBuffer { .. })));
    }
}
