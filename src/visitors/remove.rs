//! `utk remove <pattern>`: deletes every File (and, inside files, every
//! Section) whose UI name or GUID matches. Mutates the owned tree
//! directly rather than going through the read-only `Visitor` trait,
//! since `Node` only ever borrows.

use crate::file::File;
use crate::section::{Encapsulated, Section};
use crate::tree::FlashImage;
use regex::Regex;

fn file_matches(file: &File, pattern: &Regex) -> bool {
    if pattern.is_match(&file.name.to_string()) {
        return true;
    }
    file.sections.iter().any(|s| section_matches(s, pattern))
}

fn section_matches(section: &Section, pattern: &Regex) -> bool {
    if let Some(name) = &section.ui_name {
        if pattern.is_match(name) {
            return true;
        }
    }
    if let Some(guid) = section.guid_defined_guid {
        if pattern.is_match(&guid.to_string()) {
            return true;
        }
    }
    false
}

/// Removes matching nodes everywhere in `image`, returning how many
/// Files and Sections were removed in total.
pub fn remove_matching(image: &mut FlashImage, pattern: &Regex) -> usize {
    let mut removed = 0;
    match image {
        FlashImage::Full { bios, .. } => {
            for fv in &mut bios.firmware_volumes {
                removed += remove_in_volume(fv, pattern);
            }
        }
        FlashImage::BiosOnly(bios) => {
            for fv in &mut bios.firmware_volumes {
                removed += remove_in_volume(fv, pattern);
            }
        }
    }
    removed
}

fn remove_in_volume(fv: &mut crate::volume::FirmwareVolume, pattern: &Regex) -> usize {
    let before = fv.files.len();
    fv.files.retain(|f| !file_matches(f, pattern));
    let mut removed = before - fv.files.len();
    for file in &mut fv.files {
        removed += remove_in_sections(&mut file.sections, pattern);
    }
    removed
}

fn remove_in_sections(sections: &mut Vec<Section>, pattern: &Regex) -> usize {
    let before = sections.len();
    sections.retain(|s| !section_matches(s, pattern));
    let mut removed = before - sections.len();
    for section in sections.iter_mut() {
        match &mut section.encapsulated {
            Some(Encapsulated::Sections(children)) => {
                removed += remove_in_sections(children, pattern);
            }
            Some(Encapsulated::Volume(fv)) => {
                removed += remove_in_volume(fv, pattern);
            }
            _ => {}
        }
    }
    removed
}
