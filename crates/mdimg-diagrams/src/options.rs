//! Render options that influence the bytes of a generated image.

use std::collections::BTreeMap;

/// Block attributes that are consumed as render options.
///
/// Everything else on a fence is carried over to the image reference.
pub const RENDER_ATTRIBUTES: &[&str] = &["theme", "format", "background", "width", "height", "scale"];

/// Output format for rendered diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    /// Scalable vector graphics (default).
    #[default]
    Svg,
    /// Raster image.
    Png,
}

impl ImageFormat {
    /// Parse format from a configuration or attribute value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "svg" => Some(Self::Svg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    /// Return format as string representation.
    ///
    /// Doubles as the file extension and the renderer's `-e` argument.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }
}

/// Mermaid theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Default,
    Dark,
    Forest,
    Neutral,
}

impl Theme {
    /// Parse theme from a configuration or attribute value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Some(Self::Default),
            "dark" => Some(Self::Dark),
            "forest" => Some(Self::Forest),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Dark => "dark",
            Self::Forest => "forest",
            Self::Neutral => "neutral",
        }
    }
}

/// Options passed to the renderer for one diagram.
///
/// Every field participates in the cache fingerprint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderOptions {
    pub format: ImageFormat,
    pub theme: Theme,
    /// Background colour (`-b`), e.g. `white` or `transparent`.
    pub background: Option<String>,
    /// Page width in pixels (`-w`).
    pub width: Option<u32>,
    /// Page height in pixels (`-H`).
    pub height: Option<u32>,
    /// Puppeteer scale factor (`-s`).
    pub scale: Option<f64>,
}

impl RenderOptions {
    /// Whether `key` is consumed as a render option rather than passed through.
    #[must_use]
    pub fn is_render_attribute(key: &str) -> bool {
        RENDER_ATTRIBUTES.contains(&key)
    }

    /// Apply per-block attribute overrides on top of these options.
    ///
    /// Invalid values keep the current setting and produce a message in the
    /// returned list.
    #[must_use]
    pub fn with_overrides(&self, attrs: &BTreeMap<String, String>) -> (Self, Vec<String>) {
        let mut options = self.clone();
        let mut problems = Vec::new();

        if let Some(value) = attrs.get("format") {
            match ImageFormat::parse(value) {
                Some(format) => options.format = format,
                None => problems.push(format!(
                    "unknown format '{value}', using '{}' (valid: svg, png)",
                    self.format.as_str()
                )),
            }
        }
        if let Some(value) = attrs.get("theme") {
            match Theme::parse(value) {
                Some(theme) => options.theme = theme,
                None => problems.push(format!(
                    "unknown theme '{value}', using '{}' (valid: default, dark, forest, neutral)",
                    self.theme.as_str()
                )),
            }
        }
        if let Some(value) = attrs.get("background") {
            if value.trim().is_empty() {
                problems.push("empty background ignored".to_owned());
            } else {
                options.background = Some(value.clone());
            }
        }
        for (key, slot) in [("width", &mut options.width), ("height", &mut options.height)] {
            if let Some(value) = attrs.get(key) {
                match value.trim().parse::<u32>() {
                    Ok(n) if n > 0 => *slot = Some(n),
                    _ => problems.push(format!("invalid {key} '{value}', expected a positive integer")),
                }
            }
        }
        if let Some(value) = attrs.get("scale") {
            match value.trim().parse::<f64>() {
                Ok(s) if s.is_finite() && s > 0.0 => options.scale = Some(s),
                _ => problems.push(format!("invalid scale '{value}', expected a positive number")),
            }
        }

        (options, problems)
    }
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

    #[test]
    fn test_format_parse() {
        assert_eq!(ImageFormat::parse("svg"), Some(ImageFormat::Svg));
        assert_eq!(ImageFormat::parse("PNG"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::parse("pdf"), None);
    }

    #[test]
    fn test_theme_parse() {
        assert_eq!(Theme::parse("forest"), Some(Theme::Forest));
        assert_eq!(Theme::parse("Dark"), Some(Theme::Dark));
        assert_eq!(Theme::parse("solarized"), None);
    }

    #[test]
    fn test_overrides_apply_valid_values() {
        let base = RenderOptions::default();
        let (options, problems) = base.with_overrides(&attrs(&[
            ("theme", "dark"),
            ("format", "png"),
            ("width", "640"),
            ("scale", "1.5"),
            ("caption", "ignored here"),
        ]));

        assert!(problems.is_empty());
        assert_eq!(
            options,
            RenderOptions {
                format: ImageFormat::Png,
                theme: Theme::Dark,
                background: None,
                width: Some(640),
                height: None,
                scale: Some(1.5),
            }
        );
    }

    #[test]
    fn test_overrides_invalid_values_keep_defaults() {
        let base = RenderOptions {
            theme: Theme::Neutral,
            ..RenderOptions::default()
        };
        let (options, problems) =
            base.with_overrides(&attrs(&[("theme", "neon"), ("height", "0"), ("scale", "big")]));

        assert_eq!(options, base);
        assert_eq!(problems.len(), 3);
        assert!(problems[0].contains("neon"));
        assert!(problems[0].contains("'neutral'"));
    }

    #[test]
    fn test_render_attribute_names() {
        assert!(RenderOptions::is_render_attribute("theme"));
        assert!(RenderOptions::is_render_attribute("scale"));
        assert!(!RenderOptions::is_render_attribute("caption"));
        assert!(!RenderOptions::is_render_attribute("id"));
    }
}
