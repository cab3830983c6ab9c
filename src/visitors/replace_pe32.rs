//! `utk replace-pe32 <pattern> <file>`: swaps the payload of every PE32
//! Section inside a matching File for caller-supplied bytes.

use crate::error::Result;
use crate::file::File;
use crate::section::{Encapsulated, Section, SectionType};
use crate::tree::FlashImage;
use regex::Regex;

fn file_matches(file: &File, pattern: &Regex) -> bool {
    pattern.is_match(&file.name.to_string()) || file.sections.iter().any(|s| s.ui_name.as_deref().is_some_and(|n| pattern.is_match(n)))
}

/// Replaces the PE32 section's payload in every File matching `pattern`,
/// returning how many sections were replaced.
pub fn replace_pe32(image: &mut FlashImage, pattern: &Regex, new_image: &[u8]) -> Result<usize> {
    let mut replaced = 0;
    match image {
        FlashImage::Full { bios, .. } => {
            for fv in &mut bios.firmware_volumes {
                replaced += replace_in_volume(fv, pattern, new_image);
            }
        }
        FlashImage::BiosOnly(bios) => {
            for fv in &mut bios.firmware_volumes {
                replaced += replace_in_volume(fv, pattern, new_image);
            }
        }
    }
    Ok(replaced)
}

fn replace_in_volume(fv: &mut crate::volume::FirmwareVolume, pattern: &Regex, new_image: &[u8]) -> usize {
    let mut replaced = 0;
    for file in &mut fv.files {
        if file_matches(file, pattern) {
            replaced += replace_pe32_anywhere(&mut file.sections, new_image);
        }
        replaced += recurse_into_nested_volumes(&mut file.sections, pattern, new_image);
    }
    replaced
}

/// Replaces every PE32 section's payload, including ones nested inside
/// GUID-defined/compression encapsulation, within a matching File.
fn replace_pe32_anywhere(sections: &mut [Section], new_image: &[u8]) -> usize {
    let mut replaced = 0;
    for section in sections {
        if section.section_type == SectionType::Pe32 {
            section.set_buf(new_image.to_vec());
            replaced += 1;
        }
        if let Some(Encapsulated::Sections(children)) = &mut section.encapsulated {
            replaced += replace_pe32_anywhere(children, new_image);
        }
    }
    replaced
}

/// Descends into nested Firmware Volumes (via `FirmwareVolumeImage`
/// sections) to give their own Files an independent chance to match,
/// without touching anything in a non-matching File itself.
fn recurse_into_nested_volumes(sections: &mut [Section], pattern: &Regex, new_image: &[u8]) -> usize {
    let mut replaced = 0;
    for section in sections {
        match &mut section.encapsulated {
            Some(Encapsulated::Sections(children)) => {
                replaced += recurse_into_nested_volumes(children, pattern, new_image);
            }
            Some(Encapsulated::Volume(fv)) => {
                replaced += replace_in_volume(fv, pattern, new_image);
            }
            _ => {}
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_nothing_in_empty_volume() {
        let fv = crate::volume::tests_support::minimal_fv_bytes(128, &[]);
        let mut buf = vec![0xFFu8; 32];
        buf.extend_from_slice(&fv);
        let mut image = FlashImage::parse(&buf).unwrap();
        let pattern = Regex::new("Shell").unwrap();
        assert_eq!(replace_pe32(&mut image, &pattern, b"MZ...").unwrap(), 0);
    }
}
