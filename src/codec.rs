//! GUID-defined section compression codecs, treated as an external
//! byte-in/byte-out service. `Codec` is the trait boundary; [`LzmaCodec`]
//! and [`LzmaX86Codec`] are the two concrete implementations.

use crate::error::{Error, Result};

/// The three states a GUID-defined section's compression can be in after
/// parse: a specific supported codec, or `Unknown` when the
/// GUID wasn't recognized (non-fatal at parse, fatal at assemble).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Compression {
    Lzma,
    LzmaX86,
    Unknown,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Lzma => "LZMA",
            Self::LzmaX86 => "LZMAX86",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// A byte-in/byte-out compression service.
pub trait Codec {
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>>;
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>>;
}

pub struct LzmaCodec;

impl Codec for LzmaCodec {
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        lzma_rs::lzma_decompress(&mut std::io::Cursor::new(input), &mut out)
            .map_err(|e| Error::CodecError(e.to_string()))?;
        Ok(out)
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        lzma_rs::lzma_compress(&mut std::io::Cursor::new(input), &mut out)
            .map_err(|e| Error::CodecError(e.to_string()))?;
        Ok(out)
    }
}

/// LZMA with the x86 BCJ (branch/call/jump) filter applied to the
/// plaintext before compression / after decompression. This is the
/// reversible filter defined by the LZMA SDK that turns relative x86
/// CALL/JMP targets into absolute ones (and back) so that compressed PE32
/// code compresses better.
pub struct LzmaX86Codec;

impl Codec for LzmaX86Codec {
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = LzmaCodec.decompress(input)?;
        x86_bcj_decode(&mut out);
        Ok(out)
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut filtered = input.to_vec();
        x86_bcj_encode(&mut filtered);
        LzmaCodec.compress(&filtered)
    }
}

/// Returns the codec for a GUID-defined section's type-specific GUID, or
/// `None` if the GUID is not one of the two this crate supports.
pub fn codec_for_guid(guid: crate::guid::Guid) -> Option<Box<dyn Codec>> {
    if guid == crate::guid::lzma_compress() {
        Some(Box::new(LzmaCodec))
    } else if guid == crate::guid::lzma_x86_compress() {
        Some(Box::new(LzmaX86Codec))
    } else {
        None
    }
}

fn x86_test_byte(b: u8) -> bool {
    b == 0x00 || b == 0xFF
}

/// In-place x86 BCJ encode (plaintext -> filtered). Converts relative
/// E8/E9 CALL/JMP operands that look like small signed displacements
/// (top byte already 0x00/0xFF) into absolute addresses, re-masked to
/// 25 bits + sign so the top byte stays 0x00/0xFF after the transform.
/// [`x86_bcj_decode`] applies the same detection rule and subtracts
/// instead of adding, which is exactly inverse because the masked form
/// is idempotent on anything that already passed the top-byte test.
fn x86_bcj_encode(buf: &mut [u8]) {
    x86_bcj(buf, true)
}

/// Inverse of [`x86_bcj_encode`].
fn x86_bcj_decode(buf: &mut [u8]) {
    x86_bcj(buf, false)
}

fn x86_bcj(buf: &mut [u8], encoding: bool) {
    if buf.len() < 5 {
        return;
    }
    let mut i = 0usize;
    let limit = buf.len() - 5;
    while i <= limit {
        if (buf[i] == 0xE8 || buf[i] == 0xE9) && x86_test_byte(buf[i + 4]) {
            let src = u32::from_le_bytes([buf[i + 1], buf[i + 2], buf[i + 3], buf[i + 4]]);
            let dest =
                if encoding { src.wrapping_add(i as u32 + 5) } else { src.wrapping_sub(i as u32 + 5) };
            let dest = (dest & 0x01FF_FFFF) | if (dest >> 24) & 1 != 0 { 0xFE00_0000 } else { 0 };
            let bytes = dest.to_le_bytes();
            buf[i + 1..i + 5].copy_from_slice(&bytes);
            i += 5;
        } else {
            i += 1;
        }
    }
}
