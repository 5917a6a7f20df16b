//! Diagram block descriptors produced by extraction.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

/// A mermaid diagram discovered on a page.
///
/// Blocks are created by [`extract_blocks`](crate::extract_blocks) and never
/// mutated afterwards; render outcomes are tracked separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock {
    /// Diagram source exactly as authored, without the final line terminator.
    pub source: String,
    /// Fence attributes with lower-cased keys.
    pub attributes: BTreeMap<String, String>,
    /// Byte range from the opening fence to the end of the closing fence.
    ///
    /// The closing fence's line terminator is not part of the span.
    pub span: Range<usize>,
    /// Zero-based position among the diagram blocks of the page.
    pub index: usize,
    /// One-based line number of the opening fence.
    pub line: usize,
}

impl DiagramBlock {
    /// Explicit identifier from the `id` attribute.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.attributes
            .get("id")
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// Malformed diagram syntax that extraction recovered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAnomaly {
    /// One-based line number of the offending fence.
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for ParseAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

/// Result of scanning one page.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Diagram blocks in document order.
    pub blocks: Vec<DiagramBlock>,
    pub anomalies: Vec<ParseAnomaly>,
}
