//! Site output: rewritten pages, copied images and source cleanup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Mirrors the source tree into the site directory.
pub(crate) struct Site {
    source_dir: PathBuf,
    site_dir: PathBuf,
}

impl Site {
    pub(crate) fn new(source_dir: PathBuf, site_dir: PathBuf) -> Self {
        Self {
            source_dir,
            site_dir,
        }
    }

    /// Write a page under its id, creating parent directories.
    pub(crate) fn write_page(&self, page_id: &str, markdown: &str) -> io::Result<PathBuf> {
        let target = self.site_dir.join(page_id);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, markdown)?;
        Ok(target)
    }

    /// Copy a generated image to the same relative location in the site.
    ///
    /// Images outside the source directory are rejected with
    /// [`io::ErrorKind::InvalidInput`].
    pub(crate) fn copy_artifact(&self, artifact: &Path) -> io::Result<PathBuf> {
        let relative = artifact.strip_prefix(&self.source_dir).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} is outside {}",
                    artifact.display(),
                    self.source_dir.display()
                ),
            )
        })?;
        let target = self.site_dir.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(artifact, &target)?;
        Ok(target)
    }
}

/// Delete generated images from the source tree.
///
/// `image_dir` is removed as well once it is empty. Returns the number of
/// files deleted; failures are logged and skipped.
pub(crate) fn cleanup_images(artifacts: &[PathBuf], image_dir: &Path) -> usize {
    let mut removed = 0;
    for path in artifacts {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot remove image"),
        }
    }

    // Fails harmlessly when the directory still holds other files.
    if fs::remove_dir(image_dir).is_ok() {
        tracing::debug!(dir = %image_dir.display(), "removed empty image directory");
    }
    removed
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_write_page_creates_parents() {
        let temp = TempDir::new().unwrap();
        let site = Site::new(temp.path().join("docs"), temp.path().join("site"));

        let target = site.write_page("guide/intro.md", "# Intro\n").unwrap();

        assert_eq!(target, temp.path().join("site/guide/intro.md"));
        assert_eq!(fs::read_to_string(target).unwrap(), "# Intro\n");
    }

    #[test]
    fn test_copy_artifact_keeps_relative_location() {
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        fs::create_dir_all(docs.join("assets/images")).unwrap();
        let image = docs.join("assets/images/index_mermaid_0_abcd1234.svg");
        fs::write(&image, "<svg/>").unwrap();
        let site = Site::new(docs, temp.path().join("site"));

        let target = site.copy_artifact(&image).unwrap();

        assert_eq!(
            target,
            temp.path()
                .join("site/assets/images/index_mermaid_0_abcd1234.svg")
        );
        assert_eq!(fs::read_to_string(target).unwrap(), "<svg/>");
    }

    #[test]
    fn test_copy_artifact_outside_source_rejected() {
        let temp = TempDir::new().unwrap();
        let outside = temp.path().join("elsewhere.svg");
        fs::write(&outside, "<svg/>").unwrap();
        let site = Site::new(temp.path().join("docs"), temp.path().join("site"));

        let err = site.copy_artifact(&outside).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_cleanup_images_removes_files_and_empty_dir() {
        let temp = TempDir::new().unwrap();
        let image_dir = temp.path().join("assets/images");
        fs::create_dir_all(&image_dir).unwrap();
        let a = image_dir.join("a.svg");
        let b = image_dir.join("b.svg");
        fs::write(&a, "<svg/>").unwrap();
        fs::write(&b, "<svg/>").unwrap();

        let removed = cleanup_images(&[a, b, image_dir.join("gone.svg")], &image_dir);

        assert_eq!(removed, 2);
        assert!(!image_dir.exists());
    }

    #[test]
    fn test_cleanup_images_keeps_unrelated_files() {
        let temp = TempDir::new().unwrap();
        let image_dir = temp.path().join("assets/images");
        fs::create_dir_all(&image_dir).unwrap();
        let generated = image_dir.join("page_mermaid_0_abcd1234.svg");
        let logo = image_dir.join("logo.png");
        fs::write(&generated, "<svg/>").unwrap();
        fs::write(&logo, "png").unwrap();

        cleanup_images(&[generated.clone()], &image_dir);

        assert!(!generated.exists());
        assert!(logo.exists());
    }
}
