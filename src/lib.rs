//! `fw`: parses, edits, and byte-faithfully reassembles UEFI/Intel
//! platform firmware images -- Flash Descriptor, Regions, Firmware
//! Volumes, FFS Files, Sections, and DEPEX expressions.

pub mod cli;
pub mod codec;
pub mod depex;
pub mod descriptor;
pub mod error;
pub mod file;
pub mod guid;
pub mod helpers;
pub mod region;
pub mod section;
pub mod tree;
pub mod ucs2;
pub mod visitor;
pub mod visitors;
pub mod volume;

pub use error::{Error, Result, ValidationError};
pub use tree::FlashImage;
