//! Rendering through the mermaid CLI (`mmdc`).
//!
//! Each render writes the diagram source to a temporary `.mmd` file, runs
//! `mmdc` with a bounded timeout and checks that the expected image was
//! actually produced. Temporary inputs and generated config files are
//! [`tempfile::NamedTempFile`] guards, so they disappear on every exit path.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::consts::DEFAULT_TIMEOUT;
use crate::error::RendererError;
use crate::options::Theme;
use crate::process::{self, ProcessOutcome};
use crate::renderer::{FailureKind, RenderFailure, RenderRequest, RenderResult, Renderer};

/// Chromium flags for headless CI containers.
const CI_BROWSER_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--single-process",
    "--no-zygote",
];

/// Browsers checked for puppeteer's `executablePath` in CI.
const BROWSER_CANDIDATES: &[&str] = &["google-chrome", "chromium-browser", "chromium"];

/// Mermaid configuration used when none is supplied.
///
/// HTML labels render as `<foreignObject>`, which most SVG consumers outside a
/// browser drop.
fn default_mermaid_config() -> serde_json::Value {
    json!({
        "htmlLabels": false,
        "flowchart": { "htmlLabels": false },
        "class": { "htmlLabels": false },
    })
}

/// [`Renderer`] that shells out to the mermaid CLI.
#[derive(Debug)]
pub struct MermaidCli {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    mermaid_config: Option<PathBuf>,
    css_file: Option<PathBuf>,
    puppeteer_config: Option<PathBuf>,
    ci: bool,
    temp_dir: Option<PathBuf>,
    salt: String,
}

impl MermaidCli {
    /// Locate the renderer for a configured command line.
    ///
    /// The command is split shell-style. A bare `mmdc` falls back to
    /// `npx mmdc` and vice versa. Fails with [`RendererError::NotFound`]
    /// when none of the candidates is on `PATH`.
    pub fn resolve(command: &str) -> Result<Self, RendererError> {
        let argv = shell_words::split(command).map_err(|e| RendererError::InvalidCommand {
            command: command.to_owned(),
            reason: e.to_string(),
        })?;
        if argv.is_empty() {
            return Err(RendererError::InvalidCommand {
                command: command.to_owned(),
                reason: "empty command".to_owned(),
            });
        }

        let candidates = command_candidates(argv);
        for candidate in &candidates {
            if let Ok(program) = which::which(&candidate[0]) {
                tracing::debug!(
                    "using mermaid CLI {} {}",
                    program.display(),
                    candidate[1..].join(" ")
                );
                return Ok(Self::new(program, candidate[1..].to_vec()));
            }
        }

        Err(RendererError::NotFound {
            tried: candidates.iter().map(|c| c.join(" ")).collect(),
        })
    }

    /// Use `program` with leading `args` without probing `PATH`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let mut cli = Self {
            program: program.into(),
            args,
            timeout: DEFAULT_TIMEOUT,
            mermaid_config: None,
            css_file: None,
            puppeteer_config: None,
            ci: false,
            temp_dir: None,
            salt: String::new(),
        };
        cli.refresh_salt();
        cli
    }

    /// Set the per-invocation timeout (default: 30 seconds).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a mermaid configuration file instead of the built-in defaults.
    #[must_use]
    pub fn mermaid_config(mut self, path: Option<PathBuf>) -> Self {
        self.mermaid_config = path;
        self.refresh_salt();
        self
    }

    /// Apply a CSS file to every diagram.
    #[must_use]
    pub fn css_file(mut self, path: Option<PathBuf>) -> Self {
        self.css_file = path;
        self.refresh_salt();
        self
    }

    /// Use a puppeteer configuration file.
    ///
    /// Takes precedence over the generated CI configuration.
    #[must_use]
    pub fn puppeteer_config(mut self, path: Option<PathBuf>) -> Self {
        self.puppeteer_config = path;
        self
    }

    /// Run the browser with sandbox-free flags suitable for CI containers.
    #[must_use]
    pub fn ci(mut self, ci: bool) -> Self {
        self.ci = ci;
        self
    }

    /// Directory for temporary files (default: the system temp directory).
    #[must_use]
    pub fn temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }

    /// Command line as shown in logs and errors.
    #[must_use]
    pub fn display_command(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Recompute the digest of style inputs that affect rendered bytes.
    fn refresh_salt(&mut self) {
        let mut hasher = Sha256::new();
        match &self.mermaid_config {
            Some(path) => hasher.update(read_style_input(path)),
            None => hasher.update(default_mermaid_config().to_string()),
        }
        hasher.update([0u8]);
        if let Some(path) = &self.css_file {
            hasher.update(read_style_input(path));
        }
        self.salt = hex::encode(hasher.finalize());
    }

    fn temp_file(&self, suffix: &str) -> Result<NamedTempFile, RendererError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mdimg-").suffix(suffix);
        let result = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        result.map_err(|source| RendererError::Io {
            path: self
                .temp_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            source,
        })
    }

    fn write_temp(&self, suffix: &str, contents: &str) -> Result<NamedTempFile, RendererError> {
        let mut file = self.temp_file(suffix)?;
        file.write_all(contents.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| RendererError::Io {
                path: file.path().to_path_buf(),
                source,
            })?;
        Ok(file)
    }

    fn ci_puppeteer_config() -> serde_json::Value {
        let mut config = json!({ "args": CI_BROWSER_ARGS });
        if let Some(browser) = BROWSER_CANDIDATES.iter().find_map(|b| which::which(b).ok()) {
            config["executablePath"] = json!(browser.display().to_string());
        }
        config
    }

    /// Assemble the `mmdc` invocation.
    fn build_command(
        &self,
        request: &RenderRequest<'_>,
        input: &Path,
        mermaid_config: &Path,
        puppeteer_config: Option<&Path>,
    ) -> Command {
        let options = request.options;
        let mut args: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        args.extend([
            "-i".into(),
            input.into(),
            "-o".into(),
            request.output_path.into(),
            "-e".into(),
            options.format.as_str().into(),
        ]);
        if options.theme != Theme::Default {
            args.extend(["-t".into(), options.theme.as_str().into()]);
        }
        if let Some(background) = &options.background {
            args.extend(["-b".into(), background.into()]);
        }
        if let Some(width) = options.width {
            args.extend(["-w".into(), width.to_string().into()]);
        }
        if let Some(height) = options.height {
            args.extend(["-H".into(), height.to_string().into()]);
        }
        if let Some(scale) = options.scale {
            args.extend(["-s".into(), scale.to_string().into()]);
        }
        args.extend(["-c".into(), mermaid_config.into()]);
        if let Some(css) = &self.css_file {
            args.extend(["-C".into(), css.into()]);
        }
        if let Some(puppeteer) = puppeteer_config {
            args.extend(["-p".into(), puppeteer.into()]);
        }

        let mut command = Command::new(&self.program);
        command.args(args);
        command
    }

    fn classify(&self, outcome: ProcessOutcome, output: &Path, elapsed: Duration) -> RenderResult {
        let failure = |kind, detail: String| {
            RenderResult::Failure(RenderFailure {
                kind,
                detail,
                elapsed,
            })
        };

        match outcome {
            ProcessOutcome::Exited { status, stderr } if status.success() => {
                if fs::metadata(output).is_ok_and(|m| m.len() > 0) {
                    RenderResult::Success {
                        path: output.to_path_buf(),
                        elapsed,
                    }
                } else {
                    let mut detail = format!("{} is missing or empty", output.display());
                    if !stderr.trim().is_empty() {
                        detail = format!("{detail} ({})", stderr.trim());
                    }
                    failure(FailureKind::OutputMissing, detail)
                }
            }
            ProcessOutcome::Exited { status, stderr } => failure(
                FailureKind::Process {
                    code: status.code(),
                },
                stderr.trim().to_owned(),
            ),
            ProcessOutcome::TimedOut => failure(
                FailureKind::Timeout {
                    after: self.timeout,
                },
                String::new(),
            ),
            ProcessOutcome::Cancelled => failure(FailureKind::Cancelled, String::new()),
        }
    }
}

impl Renderer for MermaidCli {
    fn render(&self, request: &RenderRequest<'_>) -> Result<RenderResult, RendererError> {
        let started = Instant::now();
        let output = request.output_path;

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|source| RendererError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        remove_if_exists(output);

        let input = self.write_temp(".mmd", request.source)?;
        let generated_config;
        let mermaid_config = match &self.mermaid_config {
            Some(path) => path.as_path(),
            None => {
                generated_config = self.write_temp(".json", &default_mermaid_config().to_string())?;
                generated_config.path()
            }
        };
        let generated_puppeteer;
        let puppeteer_config = match (&self.puppeteer_config, self.ci) {
            (Some(path), _) => Some(path.as_path()),
            (None, true) => {
                generated_puppeteer =
                    self.write_temp(".json", &Self::ci_puppeteer_config().to_string())?;
                Some(generated_puppeteer.path())
            }
            (None, false) => None,
        };

        let command = self.build_command(request, input.path(), mermaid_config, puppeteer_config);
        tracing::debug!(command = ?command, "running mermaid CLI");

        let outcome = process::run_with_timeout(command, self.timeout, request.cancel).map_err(
            |source| RendererError::Spawn {
                command: self.display_command(),
                source,
            },
        )?;

        let result = self.classify(outcome, output, started.elapsed());
        if matches!(result, RenderResult::Failure(_)) {
            remove_if_exists(output);
        }
        Ok(result)
    }

    fn fingerprint_salt(&self) -> &str {
        &self.salt
    }
}

/// Candidate command lines in resolution order.
fn command_candidates(argv: Vec<String>) -> Vec<Vec<String>> {
    let fallback = match argv.as_slice() {
        [program] if program == "mmdc" => Some(vec!["npx".to_owned(), "mmdc".to_owned()]),
        [npx, mmdc] if npx == "npx" && mmdc == "mmdc" => Some(vec!["mmdc".to_owned()]),
        _ => None,
    };
    std::iter::once(argv).chain(fallback).collect()
}

fn read_style_input(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap_or_else(|e| {
        tracing::warn!("failed to read {}: {e}", path.display());
        Vec::new()
    })
}

fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("failed to remove {}: {e}", path.display()),
    }
}
