//! `utk save <file>`: assembles the in-memory tree and writes it out.

use crate::error::Result;
use crate::tree::FlashImage;
use std::fs;
use std::path::Path;

pub fn save(image: &FlashImage, path: &Path) -> Result<()> {
    let bytes = image.assemble()?;
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_reparse_is_identity() {
        let dir = std::env::temp_dir();
        let out_path = dir.join(format!("utk-save-test-{}.bin", std::process::id()));
        let fv = crate::volume::tests_support::minimal_fv_bytes(128, &[]);
        let mut buf = vec![0xFFu8; 32];
        buf.extend_from_slice(&fv);
        let image = FlashImage::parse(&buf).unwrap();
        save(&image, &out_path).unwrap();
        let reread = std::fs::read(&out_path).unwrap();
        assert_eq!(reread, buf);
        let _ = std::fs::remove_file(&out_path);
    }
}
