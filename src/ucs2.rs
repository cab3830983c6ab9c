//! UCS-2LE to UTF-8 conversion. The default implementation needs
//! nothing beyond `core::char::decode_utf16` (UCS-2 is a strict subset
//! of UTF-16 with no surrogate pairs, so this never produces
//! replacement characters for well-formed input), but it is kept behind
//! a trait so a caller with different error-handling needs can swap in
//! their own.

pub trait Ucs2Decoder {
    /// Decodes a UCS-2LE byte stream up to (and not including) its
    /// terminating NUL code unit, or the end of `bytes` if untermiated.
    fn decode_ucs2le(&self, bytes: &[u8]) -> String;
}

#[derive(Default)]
pub struct DefaultUcs2Decoder;

impl Ucs2Decoder for DefaultUcs2Decoder {
    fn decode_ucs2le(&self, bytes: &[u8]) -> String {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        char::decode_utf16(units).map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)).collect()
    }
}

/// Encodes a UTF-8 string back to UCS-2LE plus a terminating NUL,
/// for assembling `UserInterface` sections. Characters outside the
/// Basic Multilingual Plane are lossily mapped to the replacement
/// character rather than emitted as surrogate pairs (UCS-2, not UTF-16).
pub fn encode_ucs2le(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 2 + 2);
    for c in s.encode_utf16() {
        out.extend_from_slice(&c.to_le_bytes());
    }
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}
