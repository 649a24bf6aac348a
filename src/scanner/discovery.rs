use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Image files directly inside `folder` (one deployment site).
///
/// Sub-folders are separate deployments and are not descended into.
pub fn discover_images(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if path.is_file() && has_image_extension(path, extensions) {
            images.push(path.to_path_buf());
        }
    }

    // Sort by path for consistent ordering
    images.sort();

    Ok(images)
}

fn has_image_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            extensions.iter().any(|e| e.to_lowercase() == ext_lower)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_discover_images() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("IMG_0002.JPG")).unwrap();
        File::create(dir.path().join("IMG_0001.jpg")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();

        // Nested deployment is ignored
        fs::create_dir(dir.path().join("cam02")).unwrap();
        File::create(dir.path().join("cam02/IMG_0003.jpeg")).unwrap();

        let extensions = vec!["jpg".to_string(), "jpeg".to_string()];
        let images = discover_images(dir.path(), &extensions).unwrap();

        assert_eq!(images.len(), 2);
        assert!(images[0].ends_with("IMG_0001.jpg"));
        assert!(images[1].ends_with("IMG_0002.JPG"));
    }
}
