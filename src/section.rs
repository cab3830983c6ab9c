//! File Section: 4/8-byte common header, type-specific body.

use crate::codec::{codec_for_guid, Compression};
use crate::depex::DepEx;
use crate::error::{Error, Result};
use crate::guid::Guid;
use crate::helpers::{align, read3_size, write3_size, SIZE_EXTENDED_MARKER};
use crate::ucs2::{encode_ucs2le, DefaultUcs2Decoder, Ucs2Decoder};
use crate::volume::{AssembleCtx, FirmwareVolume};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

pub const SECTION_HEADER_MIN_LEN: usize = 4;
const SECTION_HEADER_EXT_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum KnownSectionType {
    Compression = 0x01,
    GuidDefined = 0x02,
    Disposable = 0x03,
    Pe32 = 0x10,
    Pic = 0x11,
    Te = 0x12,
    DxeDepex = 0x13,
    Version = 0x14,
    UserInterface = 0x15,
    Compatibility16 = 0x16,
    FirmwareVolumeImage = 0x17,
    FreeformSubtypeGuid = 0x18,
    Raw = 0x19,
    PeiDepex = 0x1B,
    MmDepex = 0x1C,
}

/// A Section's `Type` byte: one of the known PI section types, or an
/// unrecognized value kept verbatim (an opaque payload round-trips
/// unchanged regardless).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SectionType {
    Known(KnownSectionType),
    Unknown(u8),
}

impl SectionType {
    pub const Compression: Self = Self::Known(KnownSectionType::Compression);
    pub const GuidDefined: Self = Self::Known(KnownSectionType::GuidDefined);
    pub const Pe32: Self = Self::Known(KnownSectionType::Pe32);
    pub const DxeDepex: Self = Self::Known(KnownSectionType::DxeDepex);
    pub const Version: Self = Self::Known(KnownSectionType::Version);
    pub const UserInterface: Self = Self::Known(KnownSectionType::UserInterface);
    pub const FirmwareVolumeImage: Self = Self::Known(KnownSectionType::FirmwareVolumeImage);
    pub const PeiDepex: Self = Self::Known(KnownSectionType::PeiDepex);
    pub const MmDepex: Self = Self::Known(KnownSectionType::MmDepex);
    pub const Raw: Self = Self::Known(KnownSectionType::Raw);

    fn from_u8(b: u8) -> Self {
        match KnownSectionType::from_u8(b) {
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
}

/// What follows a GUID-defined/compression section's type-specific header
/// once decoded: either further sections (the common case) or a single
/// nested Firmware Volume (an encapsulated capsule-within-capsule image).
#[derive(Debug, Clone)]
pub enum Encapsulated {
    Sections(Vec<Section>),
    Volume(Box<FirmwareVolume>),
    /// Decoding failed (unknown compression GUID, bad LZMA stream, etc).
    /// Kept as opaque bytes so the tree still round-trips losslessly.
    Opaque(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct Section {
    pub section_type: SectionType,
    header_len: usize,
    /// Raw type-specific header bytes between the common header and the
    /// payload (e.g. GUID-defined's GUID+DataOffset+Attributes).
    type_header: Vec<u8>,
    payload: Vec<u8>,
    pub guid_defined_guid: Option<Guid>,
    pub compression: Option<Compression>,
    pub encapsulated: Option<Encapsulated>,
    pub ui_name: Option<String>,
    pub version: Option<(u16, String)>,
    pub depex: Option<DepEx>,
    extract_path: Option<std::path::PathBuf>,
}

impl Section {
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
        (self.header_len + self.payload.len()) as u64
    }

    pub fn buf(&self) -> &[u8] {
        &self.payload
    }

    pub fn set_buf(&mut self, buf: Vec<u8>) {
        self.payload = buf;
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < SECTION_HEADER_MIN_LEN {
            return Err(Error::ShortBuffer { need: SECTION_HEADER_MIN_LEN, have: buf.len() });
        }
        let size_field: [u8; 3] = buf[0..3].try_into().unwrap();
        let section_type = SectionType::from_u8(buf[3]);
        let (header_len, declared_size) = if size_field == SIZE_EXTENDED_MARKER {
            if buf.len() < SECTION_HEADER_EXT_LEN {
                return Err(Error::ShortBuffer { need: SECTION_HEADER_EXT_LEN, have: buf.len() });
            }
            (SECTION_HEADER_EXT_LEN, u32::from_le_bytes(buf[4..8].try_into().unwrap()) as u64)
        } else {
            (SECTION_HEADER_MIN_LEN, read3_size(size_field) as u64)
        };
        let declared_size = usize::try_from(declared_size).map_err(|_| Error::Arithmetic)?;
        if declared_size < header_len || buf.len() < declared_size {
            return Err(Error::InvalidSize { declared: declared_size as u64, actual: buf.len() });
        }
        let rest = &buf[header_len..declared_size];

        let mut section = Self {
            section_type,
            header_len,
            type_header: Vec::new(),
            payload: rest.to_vec(),
            guid_defined_guid: None,
            compression: None,
            encapsulated: None,
            ui_name: None,
            version: None,
            depex: None,
            extract_path: None,
        };

        match section_type {
            SectionType::Compression => section.parse_compression(rest)?,
            SectionType::GuidDefined => section.parse_guid_defined(rest)?,
            SectionType::FirmwareVolumeImage => section.parse_nested_fv(rest)?,
            SectionType::UserInterface => {
                section.ui_name = Some(DefaultUcs2Decoder.decode_ucs2le(rest));
            }
            SectionType::Version => {
                if rest.len() >= 2 {
                    let build = u16::from_le_bytes([rest[0], rest[1]]);
                    let s = DefaultUcs2Decoder.decode_ucs2le(&rest[2..]);
                    section.version = Some((build, s));
                }
            }
            SectionType::DxeDepex | SectionType::PeiDepex | SectionType::MmDepex => {
                section.depex = DepEx::parse(rest).ok();
            }
            _ => {}
        }

        Ok(section)
    }

    fn parse_compression(&mut self, rest: &[u8]) -> Result<()> {
        if rest.len() < 5 {
            return Err(Error::ShortBuffer { need: 5, have: rest.len() });
        }
        self.type_header = rest[..5].to_vec();
        let compression_type = rest[4];
        let compressed = &rest[5..];
        let compression = if compression_type == 0 {
            Compression::Unknown // "not compressed" -- children parsed directly below
        } else if compression_type == 1 {
            Compression::Lzma
        } else if compression_type == 2 {
            Compression::LzmaX86
        } else {
            Compression::Unknown
        };
        self.compression = Some(compression);

        let decoded = if compression_type == 0 {
            Some(compressed.to_vec())
        } else {
            codec_for_guid(match compression {
                Compression::Lzma => crate::guid::lzma_compress(),
                Compression::LzmaX86 => crate::guid::lzma_x86_compress(),
                Compression::Unknown => return Ok(()),
            })
            .and_then(|codec| codec.decompress(compressed).ok())
        };

        self.encapsulated = Some(match decoded {
            Some(bytes) => match parse_section_list(&bytes) {
                Ok(sections) => Encapsulated::Sections(sections),
                Err(_) => Encapsulated::Opaque(bytes),
            },
            None => Encapsulated::Opaque(compressed.to_vec()),
        });
        Ok(())
    }

    fn parse_guid_defined(&mut self, rest: &[u8]) -> Result<()> {
        if rest.len() < 20 {
            return Err(Error::ShortBuffer { need: 20, have: rest.len() });
        }
        let guid = Guid::from_wire_bytes(rest[0..16].try_into().unwrap());
        let data_offset = u16::from_le_bytes([rest[16], rest[17]]) as usize;
        self.guid_defined_guid = Some(guid);
        let inner_header_len = data_offset.saturating_sub(self.header_len);
        self.type_header = rest.get(..inner_header_len.min(rest.len())).unwrap_or_default().to_vec();
        let payload = rest.get(inner_header_len..).unwrap_or_default();

        if let Some(codec) = codec_for_guid(guid) {
            match codec.decompress(payload) {
                Ok(decoded) => {
                    self.encapsulated = Some(match parse_section_list(&decoded) {
                        Ok(sections) => Encapsulated::Sections(sections),
                        Err(_) => Encapsulated::Opaque(decoded),
                    });
                }
                Err(_) => self.encapsulated = Some(Encapsulated::Opaque(payload.to_vec())),
            }
        } else if guid == crate::guid::crc32_guided() {
            // Authentication wrapper: payload is the wrapped sections
            // verbatim, no transform to reverse.
            self.encapsulated = match parse_section_list(payload) {
                Ok(sections) => Some(Encapsulated::Sections(sections)),
                Err(_) => Some(Encapsulated::Opaque(payload.to_vec())),
            };
        } else {
            self.encapsulated = Some(Encapsulated::Opaque(payload.to_vec()));
        }
        Ok(())
    }

    fn parse_nested_fv(&mut self, rest: &[u8]) -> Result<()> {
        let mut ctx = AssembleCtx::default();
        match FirmwareVolume::parse(rest, 0, &mut ctx) {
            Ok(fv) => self.encapsulated = Some(Encapsulated::Volume(Box::new(fv))),
            Err(_) => self.encapsulated = Some(Encapsulated::Opaque(rest.to_vec())),
        }
        Ok(())
    }

    pub fn validate(&self) -> Vec<crate::error::ValidationError> {
        use crate::error::ValidationError;
        let mut errors = Vec::new();
        if matches!(self.section_type, SectionType::GuidDefined) {
            if let Some(guid) = self.guid_defined_guid {
                if codec_for_guid(guid).is_none() && guid != crate::guid::crc32_guided() {
                    errors.push(ValidationError::Other(format!(
                        "GUID-defined section references unrecognized GUID {guid}"
                    )));
                }
            }
        }
        match &self.encapsulated {
            Some(Encapsulated::Sections(sections)) => {
                for s in sections {
                    errors.extend(s.validate());
                }
            }
            Some(Encapsulated::Volume(fv)) => errors.extend(fv.validate()),
            _ => {}
        }
        if let Some(depex) = &self.depex {
            errors.extend(depex.validate());
        }
        errors
    }

    pub fn assemble(&self) -> Result<Vec<u8>> {
        // Compression and GUID-defined sections rebuild their own
        // type-specific header inline as part of their payload, so the
        // generic `type_header` captured at parse time must not be
        // prepended again for them -- it would duplicate the header.
        let (type_header, payload): (&[u8], Vec<u8>) = match self.section_type {
            SectionType::Compression => (&[], self.assemble_compression()?),
            SectionType::GuidDefined => (&[], self.assemble_guid_defined()?),
            SectionType::FirmwareVolumeImage => (
                &self.type_header,
                match &self.encapsulated {
                    Some(Encapsulated::Volume(fv)) => fv.assemble(&AssembleCtx::default())?,
                    _ => self.payload.clone(),
                },
            ),
            SectionType::UserInterface => (
                &self.type_header,
                match &self.ui_name {
                    Some(name) => encode_ucs2le(name),
                    None => self.payload.clone(),
                },
            ),
            SectionType::Version => (
                &self.type_header,
                match &self.version {
                    Some((build, s)) => {
                        let mut out = build.to_le_bytes().to_vec();
                        out.extend_from_slice(&encode_ucs2le(s));
                        out
                    }
                    None => self.payload.clone(),
                },
            ),
            SectionType::DxeDepex | SectionType::PeiDepex | SectionType::MmDepex => (
                &self.type_header,
                match &self.depex {
                    Some(depex) => depex.assemble(),
                    None => self.payload.clone(),
                },
            ),
            _ => (&self.type_header, self.payload.clone()),
        };

        let total_len = SECTION_HEADER_MIN_LEN + type_header.len() + payload.len();
        let use_ext = total_len >= 0x00FF_FFFF;
        let mut header = Vec::new();
        if use_ext {
            header.extend_from_slice(&SIZE_EXTENDED_MARKER);
            header.push(self.section_type.to_u8());
            header.extend_from_slice(&((total_len + 4) as u32).to_le_bytes());
        } else {
            header.extend_from_slice(&write3_size(total_len as u64));
            header.push(self.section_type.to_u8());
        }
        header.extend_from_slice(type_header);
        header.extend_from_slice(&payload);
        Ok(header)
    }

    fn assemble_compression(&self) -> Result<Vec<u8>> {
        let children = match &self.encapsulated {
            Some(Encapsulated::Sections(sections)) => assemble_section_list(sections)?,
            Some(Encapsulated::Opaque(bytes)) => bytes.clone(),
            _ => Vec::new(),
        };
        let uncompressed_len = children.len() as u32;
        let (compression_type, compressed) = match self.compression {
            Some(Compression::Lzma) => (1u8, codec_for_guid(crate::guid::lzma_compress()).unwrap().compress(&children)?),
            Some(Compression::LzmaX86) => {
                (2u8, codec_for_guid(crate::guid::lzma_x86_compress()).unwrap().compress(&children)?)
            }
            _ => (0u8, children),
        };
        let mut out = uncompressed_len.to_le_bytes().to_vec();
        out.push(compression_type);
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    fn assemble_guid_defined(&self) -> Result<Vec<u8>> {
        let guid = self.guid_defined_guid.ok_or(Error::BadSignature("GUID-defined section missing its GUID"))?;
        let inner = match &self.encapsulated {
            Some(Encapsulated::Sections(sections)) => assemble_section_list(sections)?,
            Some(Encapsulated::Opaque(bytes)) => bytes.clone(),
            _ => Vec::new(),
        };
        let payload = if let Some(codec) = codec_for_guid(guid) {
            codec.compress(&inner)?
        } else {
            inner
        };
        // Assumes the common section header stays at its minimal 4-byte
        // form; only sections at or beyond the 16 MiB extended-size
        // threshold would need the 8-byte form, which is out of scope here.
        let data_offset = (SECTION_HEADER_MIN_LEN + 20) as u16;
        let mut out = Vec::new();
        out.extend_from_slice(&guid.to_wire_bytes());
        out.extend_from_slice(&data_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // Attributes: none of the two defined bits are relied on.
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

pub fn parse_section_list(buf: &[u8]) -> Result<Vec<Section>> {
    let mut sections = Vec::new();
    let mut offset = 0usize;
    while offset + 4 <= buf.len() {
        if buf[offset..].iter().take(4).all(|&b| b == 0) {
            break;
        }
        let section = Section::parse(&buf[offset..])?;
        let size = section.extended_size() as usize;
        if size == 0 {
            return Err(Error::InvalidSize { declared: 0, actual: buf.len() });
        }
        offset = align(offset + size, 4);
        sections.push(section);
    }
    Ok(sections)
}

pub fn assemble_section_list(sections: &[Section]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (i, section) in sections.iter().enumerate() {
        out.extend_from_slice(&section.assemble()?);
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

    fn raw_section(payload: &[u8]) -> Section {
        let total = 4 + payload.len();
        let mut buf = write3_size(total as u64).to_vec();
        buf.push(SectionType::Raw.to_u8());
        buf.extend_from_slice(payload);
        Section::parse(&buf).unwrap()
    }

    #[test]
    fn raw_section_roundtrips() {
        let s = raw_section(b"payload-bytes");
        assert_eq!(s.buf(), b"payload-bytes");
        let bytes = s.assemble().unwrap();
        let reparsed = Section::parse(&bytes).unwrap();
        assert_eq!(reparsed.buf(), b"payload-bytes");
    }

    #[test]
    fn user_interface_section_decodes_name() {
        let name = b"L\x00i\x00n\x00u\x00x\x00\x00\x00";
        let total = 4 + name.len();
        let mut buf = write3_size(total as u64).to_vec();
        buf.push(SectionType::UserInterface.to_u8());
        buf.extend_from_slice(name);
        let s = Section::parse(&buf).unwrap();
        assert_eq!(s.ui_name.as_deref(), Some("Linux"));
        let reassembled = s.assemble().unwrap();
        assert_eq!(reassembled, buf);
    }

    #[test]
    fn compression_section_roundtrips_uncompressed() {
        let children = vec![raw_section(b"abc")];
        let children_bytes = assemble_section_list(&children).unwrap();
        let mut payload = (children_bytes.len() as u32).to_le_bytes().to_vec();
        payload.push(0); // not compressed
        payload.extend_from_slice(&children_bytes);
        let total = 4 + payload.len();
        let mut buf = write3_size(total as u64).to_vec();
        buf.push(SectionType::Compression.to_u8());
        buf.extend_from_slice(&payload);
        let s = Section::parse(&buf).unwrap();
        match &s.encapsulated {
            Some(Encapsulated::Sections(sections)) => assert_eq!(sections.len(), 1),
            other => panic!("expected decoded sections, got {other:?}"),
        }

        let reassembled = s.assemble().unwrap();
        let reparsed = Section::parse(&reassembled).unwrap();
        match &reparsed.encapsulated {
            Some(Encapsulated::Sections(sections)) => assert_eq!(sections.len(), 1),
            other => panic!("expected decoded sections after round-trip, got {other:?}"),
        }
    }

    #[test]
    fn guid_defined_section_roundtrips_through_assemble() {
        let guid = crate::guid::crc32_guided();
        let children = vec![raw_section(b"xyz")];
        let children_bytes = assemble_section_list(&children).unwrap();
        let data_offset = (SECTION_HEADER_MIN_LEN + 20) as u16;
        let mut payload = guid.to_wire_bytes().to_vec();
        payload.extend_from_slice(&data_offset.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&children_bytes);
        let total = 4 + payload.len();
        let mut buf = write3_size(total as u64).to_vec();
        buf.push(SectionType::GuidDefined.to_u8());
        buf.extend_from_slice(&payload);

        let s = Section::parse(&buf).unwrap();
        let reassembled = s.assemble().unwrap();
        assert_eq!(reassembled, buf);
        let reparsed = Section::parse(&reassembled).unwrap();
        match &reparsed.encapsulated {
            Some(Encapsulated::Sections(sections)) => assert_eq!(sections.len(), 1),
            other => panic!("expected decoded sections after round-trip, got {other:?}"),
        }
    }
}
