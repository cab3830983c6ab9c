//! Firmware Volume (FV): fixed + extended header, block map, file list.
//! Firmware Volume header, block map, and FFS file list.

use crate::error::{Error, Result};
use crate::file::File;
use crate::guid::Guid;
use crate::helpers::{align8, checksum16};
use byteorder::{ByteOrder, LittleEndian};
use std::path::PathBuf;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned, U16, U32, U64};

type Lu16 = U16<LittleEndian>;
type Lu32 = U32<LittleEndian>;
type Lu64 = U64<LittleEndian>;

pub const FV_SIGNATURE: u32 = 0x4856_465F; // "_FVH" read as a little-endian u32.
pub const FV_FIXED_HEADER_LEN: usize = 56;
const ERASE_POLARITY_BIT: u32 = 0x0000_0800; // EFI_FVB2_ERASE_POLARITY

/// An explicit, per-image context threaded through `parse`/`assemble`
/// instead of a shared mutable singleton, so concurrent parsing of
/// unrelated images never races.
#[derive(Debug, Clone, Copy)]
pub struct AssembleCtx {
    pub erase_polarity: u8,
    /// Set once the first FV has been parsed; later FVs' disagreement
    /// with this value is logged at `warn!` and otherwise ignored
    /// (first-FV-wins).
    polarity_locked: bool,
}

impl Default for AssembleCtx {
    fn default() -> Self {
        Self { erase_polarity: 0xFF, polarity_locked: false }
    }
}

impl AssembleCtx {
    fn observe_polarity(&mut self, polarity: u8) {
        if !self.polarity_locked {
            self.erase_polarity = polarity;
            self.polarity_locked = true;
        } else if polarity != self.erase_polarity {
            log::warn!(
                "Firmware Volume reports erase polarity 0x{polarity:02X}, but an earlier FV already set 0x{:02X}; keeping the first value",
                self.erase_polarity
            );
        }
    }
}

#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy)]
#[repr(C, packed)]
struct FvFixedHeader {
    _reserved_zero: [u8; 16],
    file_system_guid: [u8; 16],
    length: Lu64,
    signature: Lu32,
    attributes: Lu32,
    header_len: Lu16,
    checksum: Lu16,
    ext_header_offset: Lu16,
    reserved: u8,
    revision: u8,
}

#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy)]
#[repr(C, packed)]
struct BlockEntry {
    count: Lu32,
    size: Lu32,
}

#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy)]
#[repr(C, packed)]
struct FvExtHeader {
    fv_name: [u8; 16],
    ext_header_size: Lu32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub count: u32,
    pub size: u32,
}

#[derive(Debug, Clone)]
pub struct FirmwareVolume {
    buf: Vec<u8>,
    pub fv_offset: usize,
    pub file_system_guid: Guid,
    pub length: u64,
    pub attributes: u32,
    pub header_len: u16,
    pub revision: u8,
    pub ext_header_offset: u16,
    pub fv_name: Option<Guid>,
    pub blocks: Vec<Block>,
    pub data_offset: usize,
    pub files: Vec<File>,
    pub extract_path: Option<PathBuf>,
}

impl FirmwareVolume {
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn erase_polarity(&self) -> u8 {
        if self.attributes & ERASE_POLARITY_BIT != 0 {
            0xFF
        } else {
            0x00
        }
    }

    /// `fv_offset` is this volume's absolute offset within its containing
    /// region, recorded only for `extract`'s directory naming.
    pub fn parse(buf: &[u8], fv_offset: usize, ctx: &mut AssembleCtx) -> Result<Self> {
        if buf.len() < 64 {
            return Err(Error::ShortBuffer { need: 64, have: buf.len() });
        }
        let (fixed, _) = LayoutVerified::<_, FvFixedHeader>::new_from_prefix(buf)
            .ok_or(Error::ShortBuffer { need: FV_FIXED_HEADER_LEN, have: buf.len() })?;
        let fixed = fixed.into_ref();

        if fixed.signature.get() != FV_SIGNATURE {
            return Err(Error::BadSignature("Firmware Volume signature _FVH not found"));
        }
        if fixed.revision != 2 {
            return Err(Error::BadSignature("Firmware Volume revision is not 2"));
        }

        let header_len = fixed.header_len.get();
        let length = fixed.length.get();
        let attributes = fixed.attributes.get();
        let file_system_guid = Guid::from_wire_bytes(fixed.file_system_guid);
        let ext_header_offset = fixed.ext_header_offset.get();

        // Block map: a null-terminated list of {count, size} pairs
        // immediately following the fixed header.
        let mut blocks = Vec::new();
        let mut cursor = FV_FIXED_HEADER_LEN;
        loop {
            if cursor + 8 > buf.len() {
                return Err(Error::ShortBuffer { need: cursor + 8, have: buf.len() });
            }
            let count = LittleEndian::read_u32(&buf[cursor..cursor + 4]);
            let size = LittleEndian::read_u32(&buf[cursor + 4..cursor + 8]);
            cursor += 8;
            if count == 0 && size == 0 {
                break;
            }
            blocks.push(Block { count, size });
        }

        let data_offset = if ext_header_offset != 0 && (ext_header_offset as usize + 20) <= buf.len() {
            let (ext, _) = LayoutVerified::<_, FvExtHeader>::new_from_prefix(&buf[ext_header_offset as usize..])
                .ok_or(Error::ShortBuffer { need: ext_header_offset as usize + 20, have: buf.len() })?;
            let ext = ext.into_ref();
            let fv_name = Guid::from_wire_bytes(ext.fv_name);
            let raw_offset = ext_header_offset as usize + ext.ext_header_size.get() as usize;
            let data_offset = align8(raw_offset);
            return Self::finish_parse(
                buf,
                fv_offset,
                fixed,
                header_len,
                length,
                attributes,
                file_system_guid,
                ext_header_offset,
                Some(fv_name),
                blocks,
                data_offset,
                ctx,
            );
        } else {
            align8(header_len as usize)
        };

        Self::finish_parse(
            buf,
            fv_offset,
            fixed,
            header_len,
            length,
            attributes,
            file_system_guid,
            ext_header_offset,
            None,
            blocks,
            data_offset,
            ctx,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_parse(
        buf: &[u8],
        fv_offset: usize,
        _fixed: &FvFixedHeader,
        header_len: u16,
        length: u64,
        attributes: u32,
        file_system_guid: Guid,
        ext_header_offset: u16,
        fv_name: Option<Guid>,
        blocks: Vec<Block>,
        data_offset: usize,
        ctx: &mut AssembleCtx,
    ) -> Result<Self> {
        let length_usize = usize::try_from(length).map_err(|_| Error::Arithmetic)?;
        if buf.len() < length_usize {
            return Err(Error::ShortBuffer { need: length_usize, have: buf.len() });
        }
        let buf = buf[..length_usize].to_vec();

        let polarity = if attributes & ERASE_POLARITY_BIT != 0 { 0xFF } else { 0x00 };
        ctx.observe_polarity(polarity);

        let is_ffs = file_system_guid == crate::guid::ffs2() || file_system_guid == crate::guid::ffs3();
        let mut files = Vec::new();
        if is_ffs {
            let mut offset = align8(data_offset);
            loop {
                if offset >= buf.len() {
                    break;
                }
                match File::parse(&buf[offset..], files.len()) {
                    Ok(Some(file)) => {
                        let size = file.extended_size() as usize;
                        files.push(file);
                        offset = align8(offset + size);
                    }
                    Ok(None) => break, // free-space sentinel: end of files.
                    Err(e) => {
                        log::warn!("stopped walking FV files at offset {offset:#x}: {e}");
                        break;
                    }
                }
            }
        } else {
            log::debug!("Firmware Volume file system GUID {file_system_guid} is not FFS2/FFS3; not walking files");
        }

        Ok(Self {
            buf,
            fv_offset,
            file_system_guid,
            length,
            attributes,
            header_len,
            revision: 2,
            ext_header_offset,
            fv_name,
            blocks,
            data_offset,
            files,
            extract_path: None,
        })
    }

    pub fn buf(&self) -> &[u8] {
        &self.buf
    }

    pub fn set_buf(&mut self, buf: Vec<u8>) {
        self.buf = buf;
    }

    /// Non-fatal validation findings.
    pub fn validate(&self) -> Vec<crate::error::ValidationError> {
        use crate::error::ValidationError;
        let mut errors = Vec::new();
        if (self.header_len as usize) < 72 && self.ext_header_offset != 0 {
            errors.push(ValidationError::Other("FV header length less than 72 with an extended header present".into()));
        }
        if self.buf.len() < self.header_len as usize {
            errors.push(ValidationError::Other("FV buffer shorter than its declared header length".into()));
        }
        if self.length as usize != self.buf.len() {
            errors.push(ValidationError::Other(format!(
                "FV Length field ({}) does not match buffer length ({})",
                self.length,
                self.buf.len()
            )));
        }
        if let Some(header_bytes) = self.buf.get(..self.header_len as usize) {
            match checksum16(header_bytes) {
                Ok(0) => {}
                Ok(_) => errors.push(ValidationError::BadChecksum("FV header checksum does not sum to zero".into())),
                Err(_) => errors.push(ValidationError::Other("FV header length is odd; cannot checksum".into())),
            }
        }
        if self.file_system_guid != crate::guid::ffs2() && self.file_system_guid != crate::guid::ffs3() {
            errors.push(ValidationError::UnknownFileSystemGuid(format!(
                "FV file system GUID {} is neither FFS2 nor FFS3",
                self.file_system_guid
            )));
        }
        for file in &self.files {
            errors.extend(file.validate());
        }
        errors
    }

    /// Reassembles this volume's bytes.
    pub fn assemble(&self, ctx: &AssembleCtx) -> Result<Vec<u8>> {
        if self.files.is_empty() {
            return self.reload_from_extract_path();
        }

        let capacity = usize::try_from(self.length).map_err(|_| Error::Arithmetic)?;
        let mut out = self.buf[..self.data_offset.min(self.buf.len())].to_vec();
        out.resize(self.data_offset, ctx.erase_polarity);

        let mut cursor = align8(self.data_offset);
        for file in &self.files {
            let assembled = file.assemble()?;
            let file_alignment = file.required_data_alignment();
            let mut write_at = align8(cursor);
            if file_alignment > 8 {
                let header_len = file.header_len();
                let mut data_at = crate::helpers::align(write_at + header_len, file_alignment);
                let mut file_start = data_at - header_len;
                let gap = file_start.saturating_sub(write_at);
                if gap >= 8 && gap < crate::file::FILE_HEADER_MIN_LEN {
                    // Too small to host a pad file's own header: re-align to
                    // the next boundary instead.
                    data_at = crate::helpers::align(write_at + header_len + file_alignment, file_alignment);
                    file_start = data_at - header_len;
                }
                let gap = file_start.saturating_sub(write_at);
                if gap >= 8 {
                    let pad = crate::file::File::new_pad(gap);
                    let pad_bytes = pad.assemble()?;
                    if out.len() < write_at {
                        out.resize(write_at, ctx.erase_polarity);
                    }
                    out.truncate(write_at);
                    out.extend_from_slice(&pad_bytes);
                }
                write_at = file_start;
            }
            if out.len() < write_at {
                out.resize(write_at, ctx.erase_polarity);
            }
            out.truncate(write_at);
            if write_at + assembled.len() > capacity {
                return Err(Error::FvCapacityExceeded { need: write_at + assembled.len(), capacity });
            }
            out.extend_from_slice(&assembled);
            cursor = write_at + assembled.len();
        }

        if out.len() > capacity {
            return Err(Error::FvCapacityExceeded { need: out.len(), capacity });
        }
        out.resize(capacity, ctx.erase_polarity);
        Ok(out)
    }

    fn reload_from_extract_path(&self) -> Result<Vec<u8>> {
        match &self.extract_path {
            Some(path) => Ok(std::fs::read(path)?),
            None => Ok(self.buf.clone()),
        }
    }
}

/// Hand-built minimal FV fixtures shared by this module's and
/// `region.rs`'s tests; not part of the public API.
#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;

    /// Builds a valid, file-less FV of the given `length`, optionally
    /// followed by caller-provided file bytes (already placed at the
    /// correct 8-byte-aligned data offset by the caller).
    pub(crate) fn minimal_fv_bytes(length: u32, files: &[u8]) -> Vec<u8> {
        let header_len: u16 = 72; // fixed(56) + one block entry(8) + terminator(8)
        let mut buf = vec![0u8; length as usize];
        buf[16..32].copy_from_slice(&crate::guid::ffs2().to_wire_bytes());
        byteorder::LittleEndian::write_u64(&mut buf[32..40], length as u64);
        buf[40..44].copy_from_slice(b"_FVH");
        byteorder::LittleEndian::write_u32(&mut buf[44..48], ERASE_POLARITY_BIT);
        byteorder::LittleEndian::write_u16(&mut buf[48..50], header_len);
        byteorder::LittleEndian::write_u16(&mut buf[50..52], 0); // checksum placeholder
        byteorder::LittleEndian::write_u16(&mut buf[52..54], 0); // no ext header
        buf[54] = 0;
        buf[55] = 2; // revision
                     // Block map: one entry covering the whole volume, then terminator.
        byteorder::LittleEndian::write_u32(&mut buf[56..60], 1);
        byteorder::LittleEndian::write_u32(&mut buf[60..64], length);
        // bytes 64..72 already zero (terminator).
        let sum = checksum16(&buf[..header_len as usize]).unwrap();
        byteorder::LittleEndian::write_u16(&mut buf[50..52], 0u16.wrapping_sub(sum));
        debug_assert_eq!(checksum16(&buf[..header_len as usize]).unwrap(), 0);
        if !files.is_empty() {
            let at = align8(header_len as usize);
            buf[at..at + files.len()].copy_from_slice(files);
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tests_support::minimal_fv_bytes;

    #[test]
    fn parses_empty_fv_header() {
        let buf = minimal_fv_bytes(128, &[]);
        let mut ctx = AssembleCtx::default();
        let fv = FirmwareVolume::parse(&buf, 0, &mut ctx).unwrap();
        assert_eq!(fv.length(), 128);
        assert!(fv.files.is_empty());
        assert!(fv.validate().is_empty());
    }

    #[test]
    fn erase_polarity_is_derived_from_attributes() {
        let buf = minimal_fv_bytes(128, &[]);
        let mut ctx = AssembleCtx::default();
        let fv = FirmwareVolume::parse(&buf, 0, &mut ctx).unwrap();
        assert_eq!(fv.erase_polarity(), 0xFF);
        assert_eq!(ctx.erase_polarity, 0xFF);
    }

    #[test]
    fn rejects_bad_revision() {
        let mut buf = minimal_fv_bytes(128, &[]);
        buf[55] = 1;
        let mut ctx = AssembleCtx::default();
        assert!(FirmwareVolume::parse(&buf, 0, &mut ctx).is_err());
    }
}
