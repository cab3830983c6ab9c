//! GUID parsing/printing and the static well-known-GUID table.
//!
//! The wire format is "mixed-endian": the first three fields of the GUID
//! are stored little-endian, the last two are stored as opaque byte
//! arrays (effectively big-endian). That is exactly what
//! `uuid::Uuid::from_bytes_le`/`to_bytes_le` already implement, so this
//! module is a thin, spec-named wrapper rather than a hand-rolled byte
//! shuffle.

use crate::error::{Error, Result};
use uuid::Uuid;

/// A 16-byte firmware GUID in its natural (parsed) form. Always printed
/// lower-case; parsed case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid(Uuid);

impl Guid {
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses the on-disk 16-byte mixed-endian representation.
    pub fn from_wire_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes_le(bytes))
    }

    /// Produces the on-disk 16-byte mixed-endian representation.
    pub fn to_wire_bytes(self) -> [u8; 16] {
        self.0.to_bytes_le()
    }

    /// Parses a canonical `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX` string,
    /// case-insensitively.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s).map(Self).map_err(|_| Error::BadUuid(s.to_string()))
    }

    /// Looks up this GUID's well-known name, if any (e.g. `"FFS2"`, `"LZMA"`).
    pub fn well_known_name(&self) -> Option<&'static str> {
        well_known_guids().iter().find(|(guid, _)| *guid == *self).map(|(_, name)| *name)
    }
}

impl std::fmt::Display for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl serde::Serialize for Guid {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Guid {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Guid::parse(&s).map_err(serde::de::Error::custom)
    }
}

macro_rules! guid_const {
    ($name:ident, $s:literal) => {
        pub fn $name() -> Guid {
            Guid::parse($s).expect("well-formed literal GUID")
        }
    };
}

/// Firmware File System v2: the only file system this crate walks files
/// under (along with FFS3, below).
guid_const!(ffs2, "8C8CE578-8A3D-4F1C-9935-896185C32DD3");
/// Firmware File System v3 (large-file variant).
guid_const!(ffs3, "5473C07A-3DCB-4DCA-BD6F-1E9689E7349A");
/// LZMA-compressed GUID-defined section.
guid_const!(lzma_compress, "EE4E5898-3914-4259-9D6E-DC7BD79403CF");
/// LZMA-compressed-with-x86-BCJ-filter GUID-defined section.
guid_const!(lzma_x86_compress, "D42AE6BD-1352-4BFB-909A-CA72A6EAE889");
/// CRC32 GUID-defined section (authentication wrapper; not decoded, but
/// named so `validate`/`table` can report it instead of `"UNKNOWN"`).
guid_const!(crc32_guided, "FC1BCDB0-7D31-49AA-936A-A4600D9DD083");

static WELL_KNOWN_NAMES: &[(&str, &str)] = &[
    ("8C8CE578-8A3D-4F1C-9935-896185C32DD3", "FFS2"),
    ("5473C07A-3DCB-4DCA-BD6F-1E9689E7349A", "FFS3"),
    ("EE4E5898-3914-4259-9D6E-DC7BD79403CF", "LZMA"),
    ("D42AE6BD-1352-4BFB-909A-CA72A6EAE889", "LZMAX86"),
    ("FC1BCDB0-7D31-49AA-936A-A4600D9DD083", "CRC32"),
];

static WELL_KNOWN_GUIDS: std::sync::OnceLock<Vec<(Guid, &'static str)>> = std::sync::OnceLock::new();

/// Built lazily on first use since `Guid::parse` is not `const fn`.
fn well_known_guids() -> &'static [(Guid, &'static str)] {
    WELL_KNOWN_GUIDS.get_or_init(|| {
        WELL_KNOWN_NAMES.iter().map(|(s, name)| (Guid::parse(s).expect("literal"), *name)).collect()
    })
}
