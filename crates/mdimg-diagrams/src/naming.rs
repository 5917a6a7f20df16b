//! Deterministic artifact file names and image ids.

use std::sync::LazyLock;

use regex::Regex;

use crate::block::DiagramBlock;
use crate::options::ImageFormat;

static NON_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9_-]+").unwrap());

/// Lower-case `text` and collapse runs of other characters into `-`.
pub(crate) fn slugify(text: &str) -> String {
    NON_SLUG
        .replace_all(&text.to_lowercase(), "-")
        .trim_matches('-')
        .to_owned()
}

/// Slug of a page identifier with its Markdown extension removed.
///
/// `guide/Getting Started.md` becomes `guide-getting-started`.
pub(crate) fn page_slug(page_id: &str) -> String {
    let stem = page_id
        .strip_suffix(".md")
        .or_else(|| page_id.strip_suffix(".markdown"))
        .unwrap_or(page_id);
    let slug = slugify(stem);
    if slug.is_empty() { "page".to_owned() } else { slug }
}

/// File name for a block's artifact.
///
/// `{page}_mermaid_{index}_{fp8}.{ext}`, or `{page}_{id}_{fp8}.{ext}` when the
/// block has an `id` attribute. Same inputs give the same name on every build.
pub(crate) fn artifact_file_name(
    page_slug: &str,
    block: &DiagramBlock,
    fingerprint: &str,
    format: ImageFormat,
) -> String {
    let short = &fingerprint[..fingerprint.len().min(8)];
    let ext = format.as_str();
    match block.id().map(slugify).filter(|id| !id.is_empty()) {
        Some(id) => format!("{page_slug}_{id}_{short}.{ext}"),
        None => format!("{page_slug}_mermaid_{}_{short}.{ext}", block.index),
    }
}

/// Identifier attached to a generated image reference.
///
/// An explicit `id` attribute wins; otherwise `{prefix}-{page}-{n}` with a
/// one-based block number. Ids may not start with a digit, so such ids get
/// the prefix too.
pub(crate) fn image_id(prefix: &str, page_slug: &str, block: &DiagramBlock) -> String {
    let prefix = slugify(prefix);
    let id = match block.id().map(slugify).filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => format!("{prefix}-{page_slug}-{}", block.index + 1),
    };
    if id.starts_with(|c: char| c.is_ascii_digit()) {
        format!("{prefix}-{id}")
    } else {
        id
    }
}
