//! Mermaid diagram pre-rendering for Markdown pages.
//!
//! This crate turns fenced `mermaid` blocks into image files and rewrites the
//! Markdown to reference them, so pages render without client-side scripts:
//! - [`extract_blocks`] finds diagram blocks and their fence attributes
//! - [`ArtifactCache`] maps content fingerprints to generated images
//! - [`MermaidCli`] renders through the mermaid CLI with a timeout
//! - [`rewrite`] and [`ImageReference`] produce the final Markdown
//! - [`PageProcessor`] sequences the above per page and applies the
//!   configured [`ErrorPolicy`]
//!
//! # Architecture
//!
//! The crate is organized into modules:
//! - [`block`]: Block descriptors (`DiagramBlock`, `ParseAnomaly`)
//! - [`extract`]: Fence scanning and attribute parsing
//! - [`options`]: Render options (`ImageFormat`, `Theme`, `RenderOptions`)
//! - [`cache`]: Fingerprints (`DiagramKey`) and `ArtifactCache`
//! - [`renderer`]: The `Renderer` capability and its result types
//! - [`mmdc`]: `MermaidCli`, the process-backed renderer
//! - [`rewrite`]: Single-pass Markdown substitution
//! - [`processor`]: `PageProcessor`, the per-page pipeline
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mdimg_diagrams::{
//!     ArtifactCache, BuildArtifacts, MermaidCli, PageContext, PageProcessor, PipelineSettings,
//! };
//!
//! let renderer = MermaidCli::resolve("mmdc")?;
//! let processor = PageProcessor::new(
//!     PipelineSettings::new("docs"),
//!     Arc::new(renderer),
//!     Arc::new(ArtifactCache::new()),
//! );
//!
//! let artifacts = BuildArtifacts::new();
//! let page = PageContext { page_id: "guide/intro.md", location: "guide/intro.md" };
//! let output = processor.process_page(&page, "```mermaid\nflowchart TD; A-->B\n```\n", &artifacts)?;
//! assert_eq!(output.artifacts.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod block;
mod cache;
mod consts;
mod error;
mod extract;
mod fence;
mod mmdc;
mod naming;
mod options;
mod process;
mod processor;
mod renderer;
mod report;
mod rewrite;
#[cfg(test)]
mod testing;

pub use block::{DiagramBlock, Extraction, ParseAnomaly};
pub use cache::{ArtifactCache, CacheEntry, DiagramKey, FingerprintGuard};
pub use consts::{CACHE_BUCKET, DEFAULT_ALT_TEXT, DEFAULT_TIMEOUT};
pub use error::{PipelineError, RendererError};
pub use extract::extract_blocks;
pub use mmdc::MermaidCli;
pub use options::{ImageFormat, RENDER_ATTRIBUTES, RenderOptions, Theme};
pub use processor::{
    BuildArtifacts, ErrorPolicy, Mode, PageContext, PageOutput, PageProcessor, PipelineSettings,
};
pub use renderer::{CancelToken, FailureKind, RenderFailure, RenderRequest, RenderResult, Renderer};
pub use report::{BlockLabel, BlockReport, BlockState, Diagnostic, DiagnosticKind};
pub use rewrite::{ImageReference, Substitution, relative_reference, rewrite};
