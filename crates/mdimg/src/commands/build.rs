//! `mdimg build` command implementation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, ValueEnum};
use mdimg_cache::{Cache, FileCache, NullCache};
use mdimg_config::{CliSettings, Config, DiagramsConfig, DocsConfig};
use mdimg_diagrams::{
    ArtifactCache, BlockState, BuildArtifacts, CACHE_BUCKET, CancelToken, Diagnostic, ErrorPolicy,
    ImageFormat, MermaidCli, Mode, PageContext, PageOutput, PageProcessor, PipelineError,
    PipelineSettings, RenderOptions, Renderer, Theme,
};
use rayon::prelude::*;

use crate::error::CliError;
use crate::output::Output;
use crate::pages;
use crate::site::{Site, cleanup_images};

/// Cache version, bumped with every release so stale entries are dropped.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How the surrounding documentation build runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum BuildMode {
    /// Convert diagrams to images.
    Build,
    /// Live preview: leave diagrams for client-side rendering.
    Serve,
}

/// Arguments for the build command.
#[derive(Args)]
pub(crate) struct BuildArgs {
    /// Path to configuration file (default: auto-discover mdimg.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Markdown source directory (overrides config).
    #[arg(short, long)]
    source_dir: Option<PathBuf>,

    /// Directory for rewritten pages and images (overrides config).
    #[arg(short = 'o', long)]
    site_dir: Option<PathBuf>,

    /// Mermaid CLI command line (overrides config).
    #[arg(long)]
    command: Option<String>,

    /// What to do when a diagram fails to render (overrides config).
    #[arg(long, value_parser = ["stop-build", "skip-and-warn"])]
    on_failure: Option<String>,

    /// Build mode.
    #[arg(long, value_enum)]
    mode: Option<BuildMode>,

    /// Configure the headless browser for CI environments.
    #[arg(long, env = "CI")]
    ci: bool,

    /// Disable the persistent image cache.
    #[arg(long)]
    no_cache: bool,

    /// Enable verbose output (show per-diagram progress).
    #[arg(short, long)]
    pub(crate) verbose: bool,
}

impl BuildArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            source_dir: self.source_dir,
            site_dir: self.site_dir,
            cache_enabled: self.no_cache.then_some(false),
            command: self.command,
            on_failure: self.on_failure,
            serve_mode: self.mode.map(|mode| mode == BuildMode::Serve),
            ci: self.ci.then_some(true),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        output.info(&format!(
            "Source: {}",
            config.docs_resolved.source_dir.display()
        ));
        output.info(&format!("Site: {}", config.docs_resolved.site_dir.display()));

        let cancel = CancelToken::new();
        install_interrupt_handler(&cancel);

        let summary = build_site(&config, &cancel)?;
        report(&output, &summary);
        Ok(())
    }
}

/// What a build produced.
#[derive(Debug, Default)]
pub(crate) struct BuildSummary {
    pub(crate) pages: usize,
    /// Distinct images referenced by the site.
    pub(crate) images: usize,
    pub(crate) rendered: usize,
    pub(crate) cached: usize,
    pub(crate) failed: usize,
    pub(crate) diagnostics: Vec<Diagnostic>,
    /// Images deleted from the source tree after copying.
    pub(crate) cleaned: usize,
    /// Environment variable that switched conversion off.
    pub(crate) disabled_by: Option<String>,
    pub(crate) serve_mode: bool,
}

/// Process every page and write the site.
///
/// Pages are written only once all of them succeeded, so a failed build
/// leaves the previous site output alone.
pub(crate) fn build_site(config: &Config, cancel: &CancelToken) -> Result<BuildSummary, CliError> {
    let docs = &config.docs_resolved;
    let diagrams = &config.diagrams_resolved;
    let image_dir = docs.source_dir.join(&diagrams.output_dir);

    let skip = [
        image_dir.clone(),
        docs.site_dir.clone(),
        docs.project_dir.clone(),
    ];
    let pages = pages::discover(&docs.source_dir, &skip);
    let site = Site::new(docs.source_dir.clone(), docs.site_dir.clone());
    let mut summary = BuildSummary {
        pages: pages.len(),
        serve_mode: diagrams.serve_mode,
        ..BuildSummary::default()
    };

    if !diagrams.is_enabled() {
        tracing::info!(
            variable = diagrams.enabled_if_env.as_deref(),
            "diagram conversion disabled"
        );
        for page in &pages {
            let markdown = read_page(&page.path, &page.id)?;
            site.write_page(&page.id, &markdown)?;
        }
        summary.disabled_by.clone_from(&diagrams.enabled_if_env);
        return Ok(summary);
    }

    let processor = PageProcessor::new(
        pipeline_settings(config),
        renderer(diagrams)?,
        artifact_cache(docs),
    )
    .with_cancel_token(cancel.clone());
    let artifacts = BuildArtifacts::new();

    let results: Vec<Result<PageOutput, CliError>> = pages
        .par_iter()
        .map(|page| {
            let markdown = read_page(&page.path, &page.id)?;
            let context = PageContext {
                page_id: &page.id,
                location: &page.id,
            };
            Ok(processor.process_page(&context, &markdown, &artifacts)?)
        })
        .collect();
    let outputs = collect_pages(results)?;

    for (page, page_output) in pages.iter().zip(&outputs) {
        site.write_page(&page.id, &page_output.markdown)?;
        for block in &page_output.blocks {
            match block.state {
                BlockState::Rendered => summary.rendered += 1,
                BlockState::CacheHit => summary.cached += 1,
                BlockState::Failed => summary.failed += 1,
                BlockState::Discovered | BlockState::Rendering => {}
            }
        }
    }
    summary.diagnostics = outputs.into_iter().flat_map(|o| o.diagnostics).collect();

    let images = artifacts.paths();
    for image in &images {
        site.copy_artifact(image)?;
    }
    summary.images = images.len();

    if diagrams.cleanup_generated_images {
        summary.cleaned = cleanup_images(&images, &image_dir);
    }

    Ok(summary)
}

fn read_page(path: &Path, id: &str) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Page {
        path: id.to_owned(),
        source,
    })
}

/// Keep page order, surfacing the failure that caused a cancellation rather
/// than the cancellations it triggered in other pages.
fn collect_pages(
    results: Vec<Result<PageOutput, CliError>>,
) -> Result<Vec<PageOutput>, CliError> {
    let mut outputs = Vec::with_capacity(results.len());
    let mut cancelled = false;
    for result in results {
        match result {
            Ok(page_output) => outputs.push(page_output),
            Err(CliError::Pipeline(PipelineError::Cancelled)) => cancelled = true,
            Err(err) => return Err(err),
        }
    }
    if cancelled {
        return Err(PipelineError::Cancelled.into());
    }
    Ok(outputs)
}

fn pipeline_settings(config: &Config) -> PipelineSettings {
    let diagrams = &config.diagrams_resolved;
    PipelineSettings {
        docs_dir: config.docs_resolved.source_dir.clone(),
        output_dir: diagrams.output_dir.clone(),
        options: RenderOptions {
            format: ImageFormat::parse(&diagrams.format).unwrap_or_default(),
            theme: Theme::parse(&diagrams.theme).unwrap_or_default(),
            background: diagrams.background.clone(),
            width: diagrams.width,
            height: diagrams.height,
            scale: diagrams.scale,
        },
        policy: ErrorPolicy::parse(&diagrams.on_failure).unwrap_or_default(),
        mode: if diagrams.serve_mode {
            Mode::Serve
        } else {
            Mode::Build
        },
        alt_text: diagrams.alt_text.clone(),
        image_id_prefix: diagrams
            .image_ids
            .then(|| diagrams.image_id_prefix.clone()),
    }
}

/// Resolve the mermaid CLI.
///
/// Serve mode never renders, so the command is not looked up there.
fn renderer(diagrams: &DiagramsConfig) -> Result<Arc<dyn Renderer>, CliError> {
    let cli = if diagrams.serve_mode {
        MermaidCli::new(&diagrams.command, Vec::new())
    } else {
        MermaidCli::resolve(&diagrams.command)?
    };
    let cli = cli
        .timeout(diagrams.timeout)
        .mermaid_config(diagrams.mermaid_config.clone())
        .css_file(diagrams.css_file.clone())
        .puppeteer_config(diagrams.puppeteer_config.clone())
        .ci(diagrams.ci);
    tracing::info!(command = %cli.display_command(), "mermaid renderer ready");
    Ok(Arc::new(cli))
}

/// Images are always shared within a build; `cache_enabled` decides whether
/// the index also survives to the next one.
fn artifact_cache(docs: &DocsConfig) -> Arc<ArtifactCache> {
    let cache: Box<dyn Cache> = if docs.cache_enabled {
        Box::new(FileCache::new(docs.cache_dir(), VERSION))
    } else {
        Box::new(NullCache)
    };
    Arc::new(ArtifactCache::with_persistent(cache.bucket(CACHE_BUCKET)))
}

fn install_interrupt_handler(cancel: &CancelToken) {
    let cancel = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
        tracing::warn!(error = %e, "cannot install interrupt handler");
    }
}

fn report(output: &Output, summary: &BuildSummary) {
    for diagnostic in &summary.diagnostics {
        output.warning(&format!("Warning: {diagnostic}"));
    }

    if let Some(variable) = &summary.disabled_by {
        output.warning(&format!(
            "Diagram conversion disabled ({variable} is not set), {} pages copied unchanged",
            summary.pages
        ));
        return;
    }
    if summary.serve_mode {
        output.info(&format!(
            "Serve mode: {} pages copied, diagrams left for client-side rendering",
            summary.pages
        ));
        return;
    }

    output.success(&format!(
        "Generated {} Mermaid images total ({} rendered, {} from cache) across {} pages",
        summary.images, summary.rendered, summary.cached, summary.pages
    ));
    if summary.failed > 0 {
        output.warning(&format!(
            "{} diagrams failed and were left as source",
            summary.failed
        ));
    }
    if summary.cleaned > 0 {
        output.info(&format!(
            "Removed {} generated images from the source directory",
            summary.cleaned
        ));
    }
}
