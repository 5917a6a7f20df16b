//! Markdown rewriting.
//!
//! Substitutions are applied in one pass over the original text, in document
//! order. The original is never edited in place, so spans computed during
//! extraction stay valid for every substitution.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::ops::Range;

use crate::options::RenderOptions;

/// Replace `span` of the original text with `replacement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub span: Range<usize>,
    pub replacement: String,
}

/// Build the rewritten text.
///
/// Substitutions are sorted by position first; one that overlaps an earlier
/// substitution is dropped.
#[must_use]
pub fn rewrite(original: &str, substitutions: &[Substitution]) -> String {
    if substitutions.is_empty() {
        return original.to_owned();
    }

    let mut ordered: Vec<&Substitution> = substitutions.iter().collect();
    ordered.sort_by_key(|s| s.span.start);

    let mut result = String::with_capacity(original.len());
    let mut cursor = 0;
    for sub in ordered {
        if sub.span.start < cursor || sub.span.end > original.len() {
            tracing::warn!(span = ?sub.span, "skipping overlapping substitution");
            continue;
        }
        result.push_str(&original[cursor..sub.span.start]);
        result.push_str(&sub.replacement);
        cursor = sub.span.end;
    }
    result.push_str(&original[cursor..]);
    result
}

/// A Markdown image reference with an optional attribute list.
///
/// Renders as `![alt](path "title"){#id .class key="value"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub alt: String,
    pub path: String,
    pub title: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    /// Remaining pass-through attributes in key order.
    pub extra: Vec<(String, String)>,
}

impl ImageReference {
    /// Build a reference from block attributes.
    ///
    /// `alt` (or `caption`) becomes the alt text, `title` the link title,
    /// `id` and `class` the identifier and classes. Render attributes are
    /// dropped and everything else is carried over as `key="value"`.
    /// `generated_id` takes precedence over an `id` attribute.
    #[must_use]
    pub fn from_attributes(
        path: String,
        attrs: &BTreeMap<String, String>,
        default_alt: &str,
        generated_id: Option<String>,
    ) -> Self {
        let alt = attrs
            .get("alt")
            .or_else(|| attrs.get("caption"))
            .cloned()
            .unwrap_or_else(|| default_alt.to_owned());
        let id = generated_id.or_else(|| attrs.get("id").filter(|v| !v.is_empty()).cloned());
        let classes = attrs
            .get("class")
            .map(|c| c.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default();
        let extra = attrs
            .iter()
            .filter(|(key, _)| {
                !RenderOptions::is_render_attribute(key)
                    && !matches!(key.as_str(), "alt" | "caption" | "title" | "id" | "class")
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            alt,
            path,
            title: attrs.get("title").cloned(),
            id,
            classes,
            extra,
        }
    }

    /// Markdown text for this reference.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = format!("![{}](", escape_alt(&self.alt));
        if self.path.contains([' ', '(', ')', '<', '>']) {
            let _ = write!(out, "<{}>", self.path.replace('<', "%3C").replace('>', "%3E"));
        } else {
            out.push_str(&self.path);
        }
        if let Some(title) = &self.title {
            let _ = write!(out, " \"{}\"", escape_quoted(title));
        }
        out.push(')');

        let mut attrs = Vec::new();
        if let Some(id) = &self.id {
            attrs.push(format!("#{id}"));
        }
        attrs.extend(self.classes.iter().map(|c| format!(".{c}")));
        attrs.extend(
            self.extra
                .iter()
                .map(|(k, v)| format!("{k}=\"{}\"", escape_quoted(v))),
        );
        if !attrs.is_empty() {
            let _ = write!(out, "{{{}}}", attrs.join(" "));
        }
        out
    }
}

fn escape_alt(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_quoted(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Relative URL from a document to a target, both `/`-separated and
/// relative to the same root.
///
/// The last segment of `from` is the document itself and is dropped to get
/// the base directory; a trailing slash means `from` is a directory.
///
/// ```
/// use mdimg_diagrams::relative_reference;
///
/// assert_eq!(
///     relative_reference("guide/intro.md", "assets/images/x.svg"),
///     "../assets/images/x.svg"
/// );
/// ```
#[must_use]
pub fn relative_reference(from: &str, target: &str) -> String {
    let from_segs: Vec<&str> = from.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    let target_segs: Vec<&str> = target.split('/').filter(|s| !s.is_empty() && *s != ".").collect();

    let base = if from.ends_with('/') {
        &from_segs[..]
    } else {
        &from_segs[..from_segs.len().saturating_sub(1)]
    };

    let common = base
        .iter()
        .zip(&target_segs)
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = "../".repeat(base.len() - common);
    result.push_str(&target_segs[common..].join("/"));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn sub(span: Range<usize>, replacement: &str) -> Substitution {
        Substitution {
            span,
            replacement: replacement.to_owned(),
        }
    }

    #[test]
    fn test_rewrite_no_substitutions() {
        assert_eq!(rewrite("unchanged", &[]), "unchanged");
    }

    #[test]
    fn test_rewrite_keeps_surrounding_text() {
        let text = "aa[X]bb[Y]cc";
        let result = rewrite(text, &[sub(2..5, "1"), sub(7..10, "22")]);
        assert_eq!(result, "aa1bb22cc");
    }

    #[test]
    fn test_rewrite_order_independent() {
        let text = "aa[X]bb[Y]cc";
        let result = rewrite(text, &[sub(7..10, "22"), sub(2..5, "1")]);
        assert_eq!(result, "aa1bb22cc");
    }

    #[test]
    fn test_rewrite_skips_overlap() {
        let result = rewrite("abcdef", &[sub(1..4, "X"), sub(3..5, "Y")]);
        assert_eq!(result, "aXef");
    }

    #[test]
    fn test_image_reference_defaults() {
        let image = ImageReference::from_attributes(
            "../assets/images/a.svg".to_owned(),
            &BTreeMap::new(),
            "Mermaid Diagram",
            None,
        );
        assert_eq!(image.to_markdown(), "![Mermaid Diagram](../assets/images/a.svg)");
    }

    #[test]
    fn test_image_reference_carries_attributes() {
        let image = ImageReference::from_attributes(
            "a.svg".to_owned(),
            &attrs(&[
                ("caption", "Login [v2]"),
                ("title", "Say \"hi\""),
                ("id", "login"),
                ("class", "wide center"),
                ("align", "left"),
                ("theme", "dark"),
                ("width", "400"),
            ]),
            "Mermaid Diagram",
            None,
        );
        assert_eq!(
            image.to_markdown(),
            r#"![Login \[v2\]](a.svg "Say \"hi\""){#login .wide .center align="left"}"#
        );
    }

    #[test]
    fn test_alt_beats_caption() {
        let image = ImageReference::from_attributes(
            "a.svg".to_owned(),
            &attrs(&[("alt", "Alt"), ("caption", "Caption")]),
            "Mermaid Diagram",
            None,
        );
        assert_eq!(image.alt, "Alt");
        assert_eq!(image.extra, Vec::new());
    }

    #[test]
    fn test_generated_id_wins() {
        let image = ImageReference::from_attributes(
            "a.svg".to_owned(),
            &attrs(&[("id", "mine")]),
            "D",
            Some("mermaid-diagram-index-1".to_owned()),
        );
        assert_eq!(image.to_markdown(), "![D](a.svg){#mermaid-diagram-index-1}");
    }

    #[test]
    fn test_path_with_spaces_is_bracketed() {
        let image =
            ImageReference::from_attributes("my images/a.svg".to_owned(), &BTreeMap::new(), "D", None);
        assert_eq!(image.to_markdown(), "![D](<my images/a.svg>)");
    }

    #[test]
    fn test_relative_reference() {
        let cases = [
            ("index.md", "assets/images/a.svg", "assets/images/a.svg"),
            ("guide/intro.md", "assets/images/a.svg", "../assets/images/a.svg"),
            ("a/b/c.md", "a/img/x.svg", "../img/x.svg"),
            ("a/b/c.md", "a/b/x.svg", "x.svg"),
            ("guide/intro/", "assets/x.svg", "../../assets/x.svg"),
            ("./guide/intro.md", "./assets/x.svg", "../assets/x.svg"),
        ];
        for (from, target, expected) in cases {
            assert_eq!(relative_reference(from, target), expected, "{from} -> {target}");
        }
    }
}
