//! Firmware File System (FFS) File: 24/32-byte header, extended-size
//! sentinel, section list, pad files.

use crate::error::{Error, Result};
use crate::guid::Guid;
use crate::helpers::{align, checksum8, read3_size, write3_size, SIZE_EXTENDED_MARKER};
use crate::section::Section;
use modular_bitfield::prelude::*;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// The fixed-position part of the header: 24 bytes, or 32 with the
/// `ExtendedSize` field appended when `Size` reads as the all-ones
/// sentinel.
pub const FILE_HEADER_MIN_LEN: usize = 24;
const FILE_HEADER_EXT_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum KnownFileType {
    All = 0x00,
    Raw = 0x01,
    Freeform = 0x02,
    SecurityCore = 0x03,
    PeiCore = 0x04,
    DxeCore = 0x05,
    Peim = 0x06,
    Driver = 0x07,
    CombinedPeimDriver = 0x08,
    Application = 0x09,
    Mm = 0x0A,
    FirmwareVolumeImage = 0x0B,
    CombinedMmDxe = 0x0C,
    MmCore = 0x0D,
    MmStandalone = 0x0E,
    MmCoreStandalone = 0x0F,
    FfsPad = 0xF0,
}

/// A File's `Type` byte: one of the known FFS file types, or an
/// OEM/unrecognized value carried through verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FileType {
    Known(KnownFileType),
    Unknown(u8),
}

impl FileType {
    fn from_u8(b: u8) -> Self {
        match KnownFileType::from_u8(b) {
            Some(known) => Self::Known(known),
            None => Self::Unknown(b),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Known(known) => known as u8,
            Self::Unknown(b) => b,
        }
    }

    /// Whether this file type carries a Section list (every type except
    /// `Raw`, `FfsPad` and `All`).
    pub fn has_sections(self) -> bool {
        !matches!(
            self,
            Self::Known(KnownFileType::Raw) | Self::Known(KnownFileType::FfsPad) | Self::Known(KnownFileType::All)
        )
    }
}

/// `FFS_ATTRIB_*` bits (PI spec Table "FFS File Attributes").
#[bitfield(bits = 8)]
#[derive(Debug, Clone, Copy)]
pub struct Attributes {
    pub large_file: bool,
    #[skip]
    reserved1: B1,
    pub data_alignment_2: bool,
    pub fixed: bool,
    pub data_alignment: B3,
    pub checksum: bool,
}

impl Attributes {
    /// Expands the split `data_alignment`/`data_alignment_2` fields into
    /// the byte alignment they encode (PI spec Table "FFS_ATTRIB_DATA_ALIGNMENT").
    pub fn alignment_bytes(&self) -> usize {
        let table_low3 = [1usize, 16, 128, 512, 1024, 4096, 32768, 65536];
        let base = table_low3[self.data_alignment() as usize];
        if self.data_alignment_2() && self.data_alignment() == 0 {
            1 << 20 // MAAlignment special case: 1 MiB when bit set with low field 0.
        } else {
            base
        }
    }
}

/// `EFI_FFS_FIXED_CHECKSUM`: the fixed value `IntegrityCheck.File` carries
/// when `FFS_ATTRIB_CHECKSUM` is clear (PI spec §3.2.3) -- not a real
/// checksum, just a sentinel.
const FFS_FIXED_CHECKSUM: u8 = 0xAA;

/// A fully constructed, valid file's `State` byte under the default
/// (0xFF) erase polarity: `EFI_FILE_HEADER_CONSTRUCTION |
/// EFI_FILE_HEADER_VALID | EFI_FILE_DATA_VALID` (bits 0-2), with every
/// other (not-yet-erased) bit left at its erased value of 1 -- PI spec
/// Table "FFS_FIXED_CHECKSUM and FFS File States".
const FILE_STATE_VALID: u8 = 0xF8;

#[derive(Debug, Clone)]
pub struct File {
    pub name: Guid,
    pub file_type: FileType,
    pub attributes: Attributes,
    pub state: u8,
    header_len: usize,
    /// `IntegrityCheck.Header` and `IntegrityCheck.File` exactly as read
    /// from disk. `assemble` never trusts these -- it always recomputes
    /// fresh, correct checksums for whatever `sections`/`body` it is
    /// given -- but `validate` needs the original bytes to be able to
    /// report a mismatch at all.
    header_checksum: u8,
    file_checksum: u8,
    body: Vec<u8>,
    pub sections: Vec<Section>,
    pub index_in_volume: usize,
    extract_path: Option<std::path::PathBuf>,
}

impl File {
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn extract_path(&self) -> Option<&std::path::Path> {
        self.extract_path.as_deref()
    }

    pub fn set_extract_path(&mut self, path: std::path::PathBuf) {
        self.extract_path = Some(path);
    }

    pub fn extended_size(&self) -> u64 {
        (self.header_len + self.body.len()) as u64
    }

    pub fn required_data_alignment(&self) -> usize {
        self.attributes.alignment_bytes()
    }

    pub fn buf(&self) -> &[u8] {
        &self.body
    }

    pub fn set_buf(&mut self, buf: Vec<u8>) {
        self.body = buf;
    }

    /// Parses one File at the start of `buf`. Returns `Ok(None)` when the
    /// next 24 bytes are entirely erase-polarity bytes (the conventional
    /// "no more files" sentinel used by both 0x00- and 0xFF-polarity
    /// volumes), rather than an error.
    pub fn parse(buf: &[u8], index_in_volume: usize) -> Result<Option<Self>> {
        if buf.len() < FILE_HEADER_MIN_LEN {
            return Ok(None);
        }
        let head = &buf[..FILE_HEADER_MIN_LEN];
        if head.iter().all(|&b| b == 0x00) || head.iter().all(|&b| b == 0xFF) {
            return Ok(None);
        }

        let name = Guid::from_wire_bytes(head[0..16].try_into().unwrap());
        let header_checksum = head[16];
        let file_checksum = head[17];
        let file_type = FileType::from_u8(head[18]);
        let attributes = Attributes::from_bytes([head[19]]);
        let size_field: [u8; 3] = head[20..23].try_into().unwrap();
        let state_raw = head[23];

        let (header_len, declared_size) = if size_field == SIZE_EXTENDED_MARKER {
            if buf.len() < FILE_HEADER_EXT_LEN {
                return Err(Error::ShortBuffer { need: FILE_HEADER_EXT_LEN, have: buf.len() });
            }
            let ext = u64::from_le_bytes(buf[24..32].try_into().unwrap());
            (FILE_HEADER_EXT_LEN, ext)
        } else {
            (FILE_HEADER_MIN_LEN, read3_size(size_field) as u64)
        };

        let declared_size = usize::try_from(declared_size).map_err(|_| Error::Arithmetic)?;
        if declared_size < header_len {
            return Err(Error::InvalidSize { declared: declared_size as u64, actual: buf.len() });
        }
        if buf.len() < declared_size {
            return Err(Error::ShortBuffer { need: declared_size, have: buf.len() });
        }

        let body = buf[header_len..declared_size].to_vec();

        let sections = if file_type.has_sections() {
            parse_sections(&body)?
        } else {
            Vec::new()
        };

        Ok(Some(Self {
            name,
            file_type,
            attributes,
            state: state_raw,
            header_len,
            header_checksum,
            file_checksum,
            body,
            sections,
            index_in_volume,
            extract_path: None,
        }))
    }

    /// Builds a pad file exactly `total_len` bytes long (header + body of
    /// erase-polarity-neutral zero fill), used by
    /// [`crate::volume::FirmwareVolume::assemble`] to satisfy a following
    /// file's alignment requirement.
    pub fn new_pad(total_len: usize) -> Self {
        let header_len = FILE_HEADER_MIN_LEN;
        let body = vec![0u8; total_len.saturating_sub(header_len)];
        let mut pad = Self {
            name: Guid::from_wire_bytes([0xFFu8; 16]),
            file_type: FileType::Known(KnownFileType::FfsPad),
            attributes: Attributes::new(),
            state: FILE_STATE_VALID,
            header_len,
            header_checksum: 0,
            file_checksum: FFS_FIXED_CHECKSUM,
            body,
            sections: Vec::new(),
            index_in_volume: 0,
            extract_path: None,
        };
        let (header_checksum, file_checksum) = pad.compute_checksums();
        pad.header_checksum = header_checksum;
        pad.file_checksum = file_checksum;
        pad
    }

    /// The header layout (name/type/attributes/size/state) with the two
    /// `IntegrityCheck` bytes set to whatever the caller supplies --
    /// shared by `validate` (which plugs in the originally parsed bytes)
    /// and `assemble`/`compute_checksums` (which plug in freshly computed
    /// ones).
    fn header_bytes(&self, header_len: usize, total_len: usize, header_checksum: u8, file_checksum: u8) -> Vec<u8> {
        let mut header = vec![0u8; header_len];
        header[0..16].copy_from_slice(&self.name.to_wire_bytes());
        header[16] = header_checksum;
        header[17] = file_checksum;
        header[18] = self.file_type.to_u8();
        header[19] = self.attributes.into_bytes()[0];
        if header_len == FILE_HEADER_EXT_LEN {
            header[20..23].copy_from_slice(&SIZE_EXTENDED_MARKER);
            header[24..32].copy_from_slice(&(total_len as u64).to_le_bytes());
        } else {
            header[20..23].copy_from_slice(&write3_size(total_len as u64));
        }
        header[23] = self.state;
        header
    }

    /// Computes the checksum pair `assemble` should write for this file's
    /// *current* `body`/`header_len`: the header checksum is the
    /// complement of the header sum with `State` and `IntegrityCheck.File`
    /// both zeroed (PI spec: both are defined relative to a lifecycle
    /// state the checksum predates, so neither participates); the file
    /// (body) checksum is the complement of the body sum alone when
    /// `FFS_ATTRIB_CHECKSUM` is set, or the fixed sentinel otherwise.
    fn compute_checksums(&self) -> (u8, u8) {
        let (header_len, total_len) = self.target_sizes();
        let mut header = self.header_bytes(header_len, total_len, 0, 0);
        header[23] = 0;
        let header_checksum = 0u8.wrapping_sub(checksum8(&header));
        let file_checksum =
            if self.attributes.checksum() { 0u8.wrapping_sub(checksum8(&self.body)) } else { FFS_FIXED_CHECKSUM };
        (header_checksum, file_checksum)
    }

    /// The header length and total file length `assemble` would produce
    /// for this file's current body, given its current `sections` (if
    /// any carry sections, their assembled bytes supersede `self.body`).
    fn target_sizes(&self) -> (usize, usize) {
        let body_len = self.body.len();
        let total_len = self.header_len + body_len;
        let use_ext = total_len >= 0x00FF_FFFF || self.header_len == FILE_HEADER_EXT_LEN;
        let header_len = if use_ext { FILE_HEADER_EXT_LEN } else { FILE_HEADER_MIN_LEN };
        (header_len, header_len + body_len)
    }

    pub fn validate(&self) -> Vec<crate::error::ValidationError> {
        use crate::error::ValidationError;
        let mut errors = Vec::new();

        let total_len = self.header_len + self.body.len();
        let mut for_header_checksum = self.header_bytes(self.header_len, total_len, self.header_checksum, 0);
        for_header_checksum[23] = 0;
        if checksum8(&for_header_checksum) != 0 {
            errors.push(ValidationError::BadChecksum(format!("file {} header checksum failure!", self.name)));
        }

        if self.attributes.checksum() {
            let want = 0u8.wrapping_sub(checksum8(&self.body));
            if self.file_checksum != want {
                errors.push(ValidationError::BadChecksum(format!("file {} data checksum mismatch", self.name)));
            }
        } else if self.file_checksum != FFS_FIXED_CHECKSUM {
            errors.push(ValidationError::BadChecksum(format!("file {} fixed data checksum is not 0x{FFS_FIXED_CHECKSUM:02X}", self.name)));
        }

        for section in &self.sections {
            errors.extend(section.validate());
        }
        errors
    }

    /// Reassembles this file's on-disk bytes: header (with recomputed
    /// checksums and size fields) followed by its body. Never trusts the
    /// checksum bytes this file was parsed with -- always recomputes, so
    /// that a mutated body (e.g. `replace_pe32`) comes out correct.
    pub fn assemble(&self) -> Result<Vec<u8>> {
        let body = if self.file_type.has_sections() && !self.sections.is_empty() {
            assemble_sections(&self.sections)?
        } else {
            self.body.clone()
        };
        let total_len = self.header_len + body.len();
        let use_ext = total_len >= 0x00FF_FFFF || self.header_len == FILE_HEADER_EXT_LEN;
        let header_len = if use_ext { FILE_HEADER_EXT_LEN } else { FILE_HEADER_MIN_LEN };
        let total_len = header_len + body.len();

        // Checksums depend on `body`, which here may be the freshly
        // assembled section list rather than `self.body` -- recompute
        // directly instead of reusing `compute_checksums` (which always
        // reads `self.body`).
        let mut for_header_checksum = self.header_bytes(header_len, total_len, 0, 0);
        for_header_checksum[23] = 0;
        let header_checksum = 0u8.wrapping_sub(checksum8(&for_header_checksum));
        let file_checksum =
            if self.attributes.checksum() { 0u8.wrapping_sub(checksum8(&body)) } else { FFS_FIXED_CHECKSUM };

        let mut out = self.header_bytes(header_len, total_len, header_checksum, file_checksum);
        out.extend_from_slice(&body);
        Ok(out)
    }
}

fn parse_sections(body: &[u8]) -> Result<Vec<Section>> {
    let mut sections = Vec::new();
    let mut offset = 0usize;
    while offset + 4 <= body.len() {
        if body[offset..].iter().take(4).all(|&b| b == 0) {
            break;
        }
        let section = Section::parse(&body[offset..])?;
        let size = section.extended_size() as usize;
        offset = align(offset + size, 4);
        sections.push(section);
    }
    Ok(sections)
}

fn assemble_sections(sections: &[Section]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (i, section) in sections.iter().enumerate() {
        let bytes = section.assemble()?;
        out.extend_from_slice(&bytes);
        if i + 1 < sections.len() {
            let padded = align(out.len(), 4);
            out.resize(padded, 0x00);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_raw_file(body: &[u8]) -> Vec<u8> {
        let mut f = File {
            name: crate::guid::ffs2(),
            file_type: FileType::Known(KnownFileType::Raw),
            attributes: Attributes::new(),
            state: 0x07,
            header_len: FILE_HEADER_MIN_LEN,
            header_checksum: 0,
            file_checksum: 0,
            body: body.to_vec(),
            sections: Vec::new(),
            index_in_volume: 0,
            extract_path: None,
        };
        f.assemble().unwrap()
    }

    #[test]
    fn assembles_and_reparses_raw_file() {
        let bytes = minimal_raw_file(b"hello world");
        let parsed = File::parse(&bytes, 0).unwrap().unwrap();
        assert_eq!(parsed.buf(), b"hello world");
        assert_eq!(parsed.file_type.to_u8(), FileType::Known(KnownFileType::Raw).to_u8());
        assert!(parsed.validate().is_empty());
    }

    #[test]
    fn parse_returns_none_on_erase_polarity_sentinel() {
        let buf = vec![0xFFu8; 24];
        assert!(File::parse(&buf, 0).unwrap().is_none());
        let buf = vec![0x00u8; 24];
        assert!(File::parse(&buf, 0).unwrap().is_none());
    }

    #[test]
    fn alignment_table_matches_known_values() {
        let mut attr = Attributes::new();
        attr.set_data_alignment(3); // -> 512
        assert_eq!(attr.alignment_bytes(), 512);
    }

    #[test]
    fn pad_file_round_trips() {
        let pad = File::new_pad(64);
        let bytes = pad.assemble().unwrap();
        assert_eq!(bytes.len(), 64);
        let parsed = File::parse(&bytes, 0).unwrap().unwrap();
        assert_eq!(parsed.file_type.to_u8(), FileType::Known(KnownFileType::FfsPad).to_u8());
        assert!(parsed.validate().is_empty());
    }

    #[test]
    fn new_pad_carries_all_ones_name_and_fixed_checksum() {
        let pad = File::new_pad(48);
        assert_eq!(pad.name, Guid::from_wire_bytes([0xFFu8; 16]));
        assert_eq!(pad.state, FILE_STATE_VALID);
    }

    #[test]
    fn corrupted_header_checksum_is_the_only_reported_error() {
        // All-ones name, freeform type, valid layout otherwise -- then
        // zero IntegrityCheck.Header specifically.
        let f = File {
            name: Guid::from_wire_bytes([0xFFu8; 16]),
            file_type: FileType::Known(KnownFileType::Freeform),
            attributes: Attributes::new(),
            state: 0x07,
            header_len: FILE_HEADER_MIN_LEN,
            header_checksum: 0,
            file_checksum: 0,
            body: b"payload".to_vec(),
            sections: Vec::new(),
            index_in_volume: 0,
            extract_path: None,
        };
        let mut bytes = f.assemble().unwrap();
        bytes[16] ^= 0xFF;
        let parsed = File::parse(&bytes, 0).unwrap().unwrap();
        let errors = parsed.validate();
        assert_eq!(errors.len(), 1);
        let crate::error::ValidationError::BadChecksum(msg) = &errors[0] else {
            panic!("expected a BadChecksum error, got {errors:?}");
        };
        assert_eq!(
            msg,
            "file ffffffff-ffff-ffff-ffff-ffffffffffff header checksum failure!"
        );
    }

    #[test]
    fn checksummed_file_detects_corrupted_body() {
        let mut attr = Attributes::new();
        attr.set_checksum(true);
        let mut f = File {
            name: crate::guid::ffs2(),
            file_type: FileType::Known(KnownFileType::Raw),
            attributes: attr,
            state: 0x07,
            header_len: FILE_HEADER_MIN_LEN,
            header_checksum: 0,
            file_checksum: 0,
            body: b"hello world".to_vec(),
            sections: Vec::new(),
            index_in_volume: 0,
            extract_path: None,
        };
        let bytes = f.assemble().unwrap();
        f = File::parse(&bytes, 0).unwrap().unwrap();
        assert!(f.validate().is_empty());
        f.body[0] ^= 0xFF;
        let errors = f.validate();
        assert!(errors.iter().any(|e| matches!(e, crate::error::ValidationError::BadChecksum(m) if m.contains("data checksum mismatch"))));
    }
}
