//! Page orchestration.
//!
//! [`PageProcessor`] runs the pipeline for one page: extract blocks, look each
//! fingerprint up in the [`ArtifactCache`], render misses, apply the failure
//! policy and rewrite the Markdown. One processor is shared by all pages of a
//! build and may be called from several threads at once.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::block::DiagramBlock;
use crate::cache::{ArtifactCache, DiagramKey};
use crate::consts::DEFAULT_ALT_TEXT;
use crate::error::PipelineError;
use crate::extract::extract_blocks;
use crate::naming::{artifact_file_name, image_id, page_slug};
use crate::options::RenderOptions;
use crate::renderer::{CancelToken, FailureKind, RenderFailure, RenderRequest, RenderResult, Renderer};
use crate::report::{BlockLabel, BlockReport, BlockState, Diagnostic, DiagnosticKind};
use crate::rewrite::{ImageReference, Substitution, relative_reference, rewrite};

/// What to do when a block fails to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Abort the build on the first failure.
    #[default]
    StopBuild,
    /// Keep the block's source, record a diagnostic and continue.
    SkipAndWarn,
}

impl ErrorPolicy {
    /// Parse `stop-build` or `skip-and-warn`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stop-build" => Some(Self::StopBuild),
            "skip-and-warn" => Some(Self::SkipAndWarn),
            _ => None,
        }
    }
}

/// How the surrounding build runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Full build: diagrams are converted to images.
    #[default]
    Build,
    /// Live preview: pages pass through untouched.
    Serve,
}

/// Build-wide pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Root of the Markdown sources.
    pub docs_dir: PathBuf,
    /// Image directory relative to `docs_dir`.
    pub output_dir: PathBuf,
    /// Render options used unless a block overrides them.
    pub options: RenderOptions,
    pub policy: ErrorPolicy,
    pub mode: Mode,
    /// Alt text for images without `alt` or `caption`.
    pub alt_text: String,
    /// Prefix for generated image ids; `None` disables ids.
    pub image_id_prefix: Option<String>,
}

impl PipelineSettings {
    /// Defaults: `assets/images`, SVG, default theme, stop-build.
    #[must_use]
    pub fn new(docs_dir: impl Into<PathBuf>) -> Self {
        Self {
            docs_dir: docs_dir.into(),
            output_dir: PathBuf::from("assets/images"),
            options: RenderOptions::default(),
            policy: ErrorPolicy::default(),
            mode: Mode::default(),
            alt_text: DEFAULT_ALT_TEXT.to_owned(),
            image_id_prefix: None,
        }
    }
}

/// Identity and destination of a page.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    /// Source path relative to the docs root, `/`-separated.
    pub page_id: &'a str,
    /// Final location of the page relative to the site root, `/`-separated.
    ///
    /// Image references are computed relative to this path.
    pub location: &'a str,
}

/// Result of processing one page.
#[derive(Debug, Default)]
pub struct PageOutput {
    /// Rewritten Markdown.
    pub markdown: String,
    /// Images referenced by the page, absolute and without duplicates.
    pub artifacts: Vec<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
    /// One report per discovered block, in document order.
    pub blocks: Vec<BlockReport>,
}

impl PageOutput {
    fn unchanged(markdown: &str) -> Self {
        Self {
            markdown: markdown.to_owned(),
            ..Self::default()
        }
    }
}

/// Artifacts registered by all pages of a build.
///
/// Owned by the caller for the duration of one build and read once at the
/// end to copy images into the site.
#[derive(Debug, Default)]
pub struct BuildArtifacts {
    paths: Mutex<Vec<PathBuf>>,
}

impl BuildArtifacts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register artifacts, ignoring ones already known.
    pub fn register(&self, artifacts: &[PathBuf]) {
        let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
        for path in artifacts {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
    }

    /// Registered artifacts in registration order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of resolving one block to an image.
enum BlockOutcome {
    Ready { state: BlockState, path: PathBuf },
    Failed(RenderFailure),
}

/// Per-page pipeline shared by all pages of a build.
pub struct PageProcessor {
    settings: PipelineSettings,
    renderer: Arc<dyn Renderer>,
    cache: Arc<ArtifactCache>,
    cancel: CancelToken,
}

impl PageProcessor {
    #[must_use]
    pub fn new(
        settings: PipelineSettings,
        renderer: Arc<dyn Renderer>,
        cache: Arc<ArtifactCache>,
    ) -> Self {
        Self {
            settings,
            renderer,
            cache,
            cancel: CancelToken::new(),
        }
    }

    /// Share a cancellation token with the rest of the build.
    ///
    /// The processor cancels it on a fatal failure and stops rendering once
    /// it is cancelled from elsewhere.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Convert the diagrams of one page.
    ///
    /// Artifacts of a successfully processed page are also registered in
    /// `artifacts`. Errors abort the page and, except for cancellation
    /// requested from outside, cancel the build token.
    pub fn process_page(
        &self,
        page: &PageContext<'_>,
        markdown: &str,
        artifacts: &BuildArtifacts,
    ) -> Result<PageOutput, PipelineError> {
        if self.settings.mode == Mode::Serve {
            tracing::debug!(page = page.page_id, "serve mode, leaving diagrams untouched");
            return Ok(PageOutput::unchanged(markdown));
        }
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let extraction = extract_blocks(markdown);
        let mut output = PageOutput::unchanged(markdown);

        for anomaly in &extraction.anomalies {
            tracing::warn!(page = page.page_id, "{anomaly}");
            output.diagnostics.push(Diagnostic {
                page: page.page_id.to_owned(),
                block: None,
                kind: DiagnosticKind::MalformedBlock,
                message: anomaly.to_string(),
            });
        }
        if extraction.blocks.is_empty() {
            return Ok(output);
        }

        let slug = page_slug(page.page_id);
        let mut substitutions = Vec::with_capacity(extraction.blocks.len());

        for block in &extraction.blocks {
            let label = BlockLabel::of(block);
            let (options, problems) = self.settings.options.with_overrides(&block.attributes);
            for problem in problems {
                tracing::warn!(page = page.page_id, block = %label, "{problem}");
                output.diagnostics.push(Diagnostic {
                    page: page.page_id.to_owned(),
                    block: Some(label.clone()),
                    kind: DiagnosticKind::InvalidAttribute,
                    message: problem,
                });
            }

            let fingerprint = DiagramKey {
                source: &block.source,
                options: &options,
                salt: self.renderer.fingerprint_salt(),
            }
            .compute_hash();

            match self.resolve_block(page, block, &label, &options, &fingerprint, &slug)? {
                BlockOutcome::Ready { state, path } => {
                    substitutions.push(Substitution {
                        span: block.span.clone(),
                        replacement: self.image_markdown(page, block, &slug, &path),
                    });
                    if !output.artifacts.contains(&path) {
                        output.artifacts.push(path.clone());
                    }
                    output.blocks.push(BlockReport {
                        label,
                        fingerprint,
                        state,
                        artifact: Some(path),
                    });
                }
                BlockOutcome::Failed(failure) => {
                    if failure.kind == FailureKind::Cancelled {
                        return Err(PipelineError::Cancelled);
                    }
                    if self.settings.policy == ErrorPolicy::StopBuild {
                        tracing::error!(page = page.page_id, block = %label, "{failure}");
                        self.cancel.cancel();
                        return Err(PipelineError::Render {
                            page: page.page_id.to_owned(),
                            block: label,
                            failure,
                        });
                    }

                    tracing::warn!(page = page.page_id, block = %label, "{failure}");
                    output.diagnostics.push(Diagnostic {
                        page: page.page_id.to_owned(),
                        block: Some(label.clone()),
                        kind: DiagnosticKind::RenderFailed,
                        message: failure.to_string(),
                    });
                    output.blocks.push(BlockReport {
                        label,
                        fingerprint,
                        state: BlockState::Failed,
                        artifact: None,
                    });
                }
            }
        }

        output.markdown = rewrite(markdown, &substitutions);
        artifacts.register(&output.artifacts);
        Ok(output)
    }

    /// Find or render the image for one block.
    fn resolve_block(
        &self,
        page: &PageContext<'_>,
        block: &DiagramBlock,
        label: &BlockLabel,
        options: &RenderOptions,
        fingerprint: &str,
        slug: &str,
    ) -> Result<BlockOutcome, PipelineError> {
        if let Some(path) = self.cached(fingerprint) {
            tracing::debug!(page = page.page_id, block = %label, "cache hit {}", path.display());
            return Ok(BlockOutcome::Ready {
                state: BlockState::CacheHit,
                path,
            });
        }

        let _guard = self.cache.lock(fingerprint);
        // Another page may have rendered the same diagram while we waited
        if let Some(path) = self.cached(fingerprint) {
            tracing::debug!(page = page.page_id, block = %label, "cache hit after wait");
            return Ok(BlockOutcome::Ready {
                state: BlockState::CacheHit,
                path,
            });
        }
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let file_name = artifact_file_name(slug, block, fingerprint, options.format);
        let output_path = self
            .settings
            .docs_dir
            .join(&self.settings.output_dir)
            .join(file_name);

        tracing::debug!(page = page.page_id, block = %label, "rendering");
        let request = RenderRequest {
            source: &block.source,
            options,
            output_path: &output_path,
            cancel: &self.cancel,
        };
        let result = self.renderer.render(&request).map_err(|source| {
            self.cancel.cancel();
            PipelineError::Renderer {
                page: page.page_id.to_owned(),
                source,
            }
        })?;

        match result {
            RenderResult::Success { path, elapsed } => {
                self.cache.store(fingerprint, &path);
                tracing::info!(
                    page = page.page_id,
                    block = %label,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "generated {}",
                    path.display()
                );
                Ok(BlockOutcome::Ready {
                    state: BlockState::Rendered,
                    path,
                })
            }
            RenderResult::Failure(failure) => Ok(BlockOutcome::Failed(failure)),
        }
    }

    /// Cached artifact that lives inside the docs tree.
    fn cached(&self, fingerprint: &str) -> Option<PathBuf> {
        self.cache
            .lookup(fingerprint)
            .filter(|path| self.docs_relative(path).is_some())
    }

    /// `/`-separated path of `path` relative to the docs root.
    fn docs_relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.settings.docs_dir).ok()?;
        let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        Some(parts?.join("/"))
    }

    fn image_markdown(
        &self,
        page: &PageContext<'_>,
        block: &DiagramBlock,
        slug: &str,
        path: &Path,
    ) -> String {
        let target = self.docs_relative(path).unwrap_or_default();
        let generated_id = self
            .settings
            .image_id_prefix
            .as_deref()
            .map(|prefix| image_id(prefix, slug, block));

        ImageReference::from_attributes(
            relative_reference(page.location, &target),
            &block.attributes,
            &self.settings.alt_text,
            generated_id,
        )
        .to_markdown()
    }
}
