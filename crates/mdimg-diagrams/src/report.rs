//! Per-block outcomes and diagnostics.

use std::fmt;
use std::path::PathBuf;

use crate::block::DiagramBlock;

/// Human-readable reference to a block on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLabel {
    /// Zero-based block index.
    pub index: usize,
    /// Explicit `id` attribute, if any.
    pub id: Option<String>,
}

impl BlockLabel {
    #[must_use]
    pub fn of(block: &DiagramBlock) -> Self {
        Self {
            index: block.index,
            id: block.id().map(str::to_owned),
        }
    }
}

impl fmt::Display for BlockLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "diagram #{}", self.index + 1)?;
        if let Some(id) = &self.id {
            write!(f, " (id={id})")?;
        }
        Ok(())
    }
}

/// Lifecycle of a block within one page call.
///
/// `Discovered` moves to `CacheHit`, or through `Rendering` to `Rendered` or
/// `Failed`. `CacheHit` is terminal and equivalent to `Rendered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Discovered,
    CacheHit,
    Rendering,
    Rendered,
    Failed,
}

impl BlockState {
    /// Whether the block ended with a usable image.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::CacheHit | Self::Rendered)
    }
}

/// Final state of one block.
#[derive(Debug, Clone)]
pub struct BlockReport {
    pub label: BlockLabel,
    pub fingerprint: String,
    pub state: BlockState,
    /// Image used for the block; `None` when it failed.
    pub artifact: Option<PathBuf>,
}

/// Category of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Malformed fence syntax; the text was left untouched.
    MalformedBlock,
    /// A fence attribute had an unusable value; the default was used.
    InvalidAttribute,
    /// The block could not be rendered and keeps its source.
    RenderFailed,
}

/// A recoverable problem found while processing a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Page identifier.
    pub page: String,
    /// Affected block, when the problem belongs to one.
    pub block: Option<BlockLabel>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.page)?;
        if let Some(block) = &self.block {
            write!(f, "{block}: ")?;
        }
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = Diagnostic {
            page: "guide/intro.md".to_owned(),
            block: Some(BlockLabel {
                index: 1,
                id: Some("flow".to_owned()),
            }),
            kind: DiagnosticKind::RenderFailed,
            message: "renderer timed out after 30s".to_owned(),
        };
        assert_eq!(
            diagnostic.to_string(),
            "guide/intro.md: diagram #2 (id=flow): renderer timed out after 30s"
        );
    }

    #[test]
    fn test_diagnostic_without_block() {
        let diagnostic = Diagnostic {
            page: "index.md".to_owned(),
            block: None,
            kind: DiagnosticKind::MalformedBlock,
            message: "line 3: unterminated mermaid fence".to_owned(),
        };
        assert_eq!(
            diagnostic.to_string(),
            "index.md: line 3: unterminated mermaid fence"
        );
    }

    #[test]
    fn test_terminal_success_states() {
        assert!(BlockState::CacheHit.is_success());
        assert!(BlockState::Rendered.is_success());
        assert!(!BlockState::Failed.is_success());
        assert!(!BlockState::Rendering.is_success());
    }
}
