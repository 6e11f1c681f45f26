use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

/// True when the file name ends in `.<ext>` for one of [`IMAGE_EXTENSIONS`], ignoring case.
///
/// Works on the raw name bytes, so names that are not valid UTF-8 still match.
pub fn is_supported_image(path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.as_encoded_bytes();
    IMAGE_EXTENSIONS.iter().any(|ext| {
        let ext = ext.as_bytes();
        name.len() > ext.len()
            && name[name.len() - ext.len()..].eq_ignore_ascii_case(ext)
            && name[name.len() - ext.len() - 1] == b'.'
    })
}

/// Image files directly inside `dir`, in directory-listing order.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list input directory {}", dir.display()))?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        let path = entry.path();
        if !is_supported_image(&path) {
            continue;
        }
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
            continue;
        }
        images.push(path);
    }
    Ok(images)
}
