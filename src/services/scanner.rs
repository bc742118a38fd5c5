use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursively enumerates supported images under `root`, sorted for a
/// deterministic indexing order. Any traversal error fail-closes to an
/// empty list so a half-visible folder is never partially indexed.
pub fn list_images(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();

    for entry in walkdir::WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("aborting scan of {}: {err}", root.display());
                return Vec::new();
            }
        };

        // Symlinks count as candidates (a dangling one surfaces later as a
        // stat failure), matching a plain directory listing.
        if !entry.file_type().is_dir() && is_supported_image(entry.path()) {
            found.push(entry.into_path());
        }
    }

    found.sort();
    found
}

/// Canonical form of the folder path used as the index key, so the same
/// folder selected via different spellings maps to the same records.
pub fn resolve_folder(folder: &Path) -> PathBuf {
    folder.canonicalize().unwrap_or_else(|_| {
        if folder.is_absolute() {
            folder.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(folder))
                .unwrap_or_else(|_| folder.to_path_buf())
        }
    })
}
