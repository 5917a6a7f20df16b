//! Markdown page discovery.

use std::fs;
use std::path::{Path, PathBuf};

/// A Markdown page found under the source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Page {
    /// Path relative to the source directory, `/`-separated.
    pub(crate) id: String,
    /// Absolute (or cwd-relative) path on disk.
    pub(crate) path: PathBuf,
}

/// Recursively collect `.md` files under `source_dir`, sorted by id.
///
/// Hidden entries and the directories in `skip` are not descended into, so
/// generated images and a site directory nested inside the sources are
/// never picked up as input. Directories are compared after resolving
/// symlinks and `..`, so relative and absolute spellings of the same
/// directory match.
pub(crate) fn discover(source_dir: &Path, skip: &[PathBuf]) -> Vec<Page> {
    let skip: Vec<PathBuf> = skip
        .iter()
        .filter_map(|dir| fs::canonicalize(dir).ok())
        .collect();
    let mut pages = Vec::new();
    scan_directory(source_dir, "", &skip, &mut pages);
    pages.sort_by(|a, b| a.id.cmp(&b.id));
    pages
}

fn scan_directory(dir: &Path, base: &str, skip: &[PathBuf], pages: &mut Vec<Page>) {
    let Ok(entries) = fs::read_dir(dir) else {
        tracing::warn!(dir = %dir.display(), "cannot read directory");
        return;
    };

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if name.starts_with('.') {
            continue;
        }

        let id = if base.is_empty() {
            name
        } else {
            format!("{base}/{name}")
        };

        if path.is_dir() {
            if fs::canonicalize(&path).is_ok_and(|resolved| skip.contains(&resolved)) {
                continue;
            }
            scan_directory(&path, &id, skip, pages);
        } else if path.extension().is_some_and(|e| e == "md") {
            pages.push(Page { id, path });
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "# Page\n").unwrap();
    }

    fn ids(pages: &[Page]) -> Vec<&str> {
        pages.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_discover_nested_pages_sorted() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "index.md");
        touch(temp.path(), "guide/setup.md");
        touch(temp.path(), "guide/advanced/tuning.md");
        touch(temp.path(), "api.md");

        let pages = discover(temp.path(), &[]);

        assert_eq!(
            ids(&pages),
            vec!["api.md", "guide/advanced/tuning.md", "guide/setup.md", "index.md"]
        );
        assert_eq!(pages[0].path, temp.path().join("api.md"));
    }

    #[test]
    fn test_discover_ignores_other_files() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "index.md");
        touch(temp.path(), "notes.txt");
        touch(temp.path(), "logo.svg");

        let pages = discover(temp.path(), &[]);

        assert_eq!(ids(&pages), vec!["index.md"]);
    }

    #[test]
    fn test_discover_skips_hidden_entries() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "index.md");
        touch(temp.path(), ".drafts/wip.md");
        touch(temp.path(), ".hidden.md");

        let pages = discover(temp.path(), &[]);

        assert_eq!(ids(&pages), vec!["index.md"]);
    }

    #[test]
    fn test_discover_skips_listed_directories() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "index.md");
        touch(temp.path(), "assets/images/readme.md");
        touch(temp.path(), "site/index.md");

        let skip = vec![temp.path().join("assets/images"), temp.path().join("site")];
        let pages = discover(temp.path(), &skip);

        assert_eq!(ids(&pages), vec!["index.md"]);
    }

    #[test]
    fn test_discover_skips_differently_spelled_directories() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "index.md");
        touch(temp.path(), "site/index.md");
        fs::create_dir(temp.path().join("assets")).unwrap();

        let skip = vec![temp.path().join("assets/../site")];
        let pages = discover(temp.path(), &skip);

        assert_eq!(ids(&pages), vec!["index.md"]);
    }

    #[test]
    fn test_discover_missing_directory() {
        let temp = TempDir::new().unwrap();

        let pages = discover(&temp.path().join("missing"), &[]);

        assert!(pages.is_empty());
    }
}
