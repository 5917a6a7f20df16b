//! Configuration management for mdimg.
//!
//! Parses `mdimg.toml` with serde, discovers the file in parent directories,
//! resolves relative paths against the config file location and validates
//! every option before any page is processed.
//!
//! CLI settings are applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `docs.site_dir`
//! - `diagrams.command`
//! - `diagrams.theme`
//! - `diagrams.background`

mod expand;

use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "mdimg.toml";

/// Valid values for `diagrams.format`.
pub const FORMATS: &[&str] = &["svg", "png"];

/// Valid values for `diagrams.theme`.
pub const THEMES: &[&str] = &["default", "dark", "forest", "neutral"];

/// Valid values for `diagrams.on_failure`.
pub const FAILURE_POLICIES: &[&str] = &["stop-build", "skip-and-warn"];

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// CLI settings that override configuration file values.
///
/// Only `Some` values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override docs source directory.
    pub source_dir: Option<PathBuf>,
    /// Override site output directory.
    pub site_dir: Option<PathBuf>,
    /// Override cache enabled flag.
    pub cache_enabled: Option<bool>,
    /// Override renderer command.
    pub command: Option<String>,
    /// Override failure policy (`stop-build` or `skip-and-warn`).
    pub on_failure: Option<String>,
    /// Run in serve mode (diagrams are left untouched).
    pub serve_mode: Option<bool>,
    /// Renderer runs in a CI/headless environment.
    pub ci: Option<bool>,
}

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    docs: DocsConfigRaw,
    diagrams: DiagramsConfigRaw,

    /// Resolved docs configuration (set after loading).
    #[serde(skip)]
    pub docs_resolved: DocsConfig,
    /// Resolved diagrams configuration (set after loading).
    #[serde(skip)]
    pub diagrams_resolved: DiagramsConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DocsConfigRaw {
    source_dir: Option<String>,
    site_dir: Option<String>,
    cache_enabled: Option<bool>,
}

/// Resolved documentation configuration with absolute paths.
#[derive(Debug, Default)]
pub struct DocsConfig {
    /// Source directory for markdown files.
    pub source_dir: PathBuf,
    /// Directory the build writes transformed pages and images to.
    pub site_dir: PathBuf,
    /// Project directory for mdimg data (`.mdimg/`).
    pub project_dir: PathBuf,
    /// Whether the persistent artifact cache is enabled.
    pub cache_enabled: bool,
}

impl DocsConfig {
    /// Cache directory path (`.mdimg/cache/`).
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.project_dir.join("cache")
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DiagramsConfigRaw {
    output_dir: Option<String>,
    format: Option<String>,
    theme: Option<String>,
    on_failure: Option<String>,
    timeout_secs: Option<u64>,
    command: Option<String>,
    mermaid_config: Option<String>,
    css_file: Option<String>,
    puppeteer_config: Option<String>,
    background: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    scale: Option<f64>,
    alt_text: Option<String>,
    image_ids: Option<bool>,
    image_id_prefix: Option<String>,
    enabled_if_env: Option<String>,
    cleanup_generated_images: Option<bool>,
}

/// Resolved diagram configuration.
#[derive(Debug, Clone)]
pub struct DiagramsConfig {
    /// Image output directory, relative to the docs source directory.
    pub output_dir: PathBuf,
    /// Image format (`svg` or `png`).
    pub format: String,
    /// Mermaid theme name.
    pub theme: String,
    /// Failure policy (`stop-build` or `skip-and-warn`).
    pub on_failure: String,
    /// Per-invocation renderer timeout.
    pub timeout: Duration,
    /// Renderer command line.
    pub command: String,
    /// Mermaid configuration JSON file.
    pub mermaid_config: Option<PathBuf>,
    /// CSS file applied to rendered diagrams.
    pub css_file: Option<PathBuf>,
    /// Puppeteer configuration JSON file.
    pub puppeteer_config: Option<PathBuf>,
    /// Background colour.
    pub background: Option<String>,
    /// Page width in pixels.
    pub width: Option<u32>,
    /// Page height in pixels.
    pub height: Option<u32>,
    /// Puppeteer scale factor.
    pub scale: Option<f64>,
    /// Default alt text for generated image references.
    pub alt_text: String,
    /// Attach ids to generated image references.
    pub image_ids: bool,
    /// Prefix for generated image ids.
    pub image_id_prefix: String,
    /// Environment variable that must be non-empty for conversion to run.
    pub enabled_if_env: Option<String>,
    /// Remove generated images from the source tree after the build.
    pub cleanup_generated_images: bool,
    /// Serve mode: pages pass through untouched (set from the CLI only).
    pub serve_mode: bool,
    /// Renderer runs headless in CI (set from the CLI only).
    pub ci: bool,
}

impl Default for DiagramsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("assets/images"),
            format: "svg".to_owned(),
            theme: "default".to_owned(),
            on_failure: "stop-build".to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            command: "mmdc".to_owned(),
            mermaid_config: None,
            css_file: None,
            puppeteer_config: None,
            background: None,
            width: None,
            height: None,
            scale: None,
            alt_text: "Mermaid Diagram".to_owned(),
            image_ids: false,
            image_id_prefix: "mermaid-diagram".to_owned(),
            enabled_if_env: None,
            cleanup_generated_images: false,
            serve_mode: false,
            ci: false,
        }
    }
}

impl DiagramsConfig {
    /// Whether diagram conversion is active.
    ///
    /// Without `enabled_if_env` conversion is always on. Otherwise the named
    /// environment variable must be set to a non-blank value.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.is_enabled_by(|name| std::env::var(name).ok())
    }

    fn is_enabled_by(&self, lookup: impl Fn(&str) -> Option<String>) -> bool {
        match &self.enabled_if_env {
            Some(name) => lookup(name).is_some_and(|v| !v.trim().is_empty()),
            None => true,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`diagrams.command`").
        field: String,
        /// Error message.
        message: String,
    },
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_one_of(value: &str, allowed: &[&str], field: &str) -> Result<(), ConfigError> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(ConfigError::Validation(format!(
        "{field} must be one of {}, got '{value}'",
        allowed.join(", ")
    )))
}

fn require_existing_file(path: Option<&Path>, field: &str) -> Result<(), ConfigError> {
    match path {
        Some(p) if !p.is_file() => Err(ConfigError::Validation(format!(
            "{field} not found: {}",
            p.display()
        ))),
        _ => Ok(()),
    }
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `mdimg.toml` in the current directory and its parents, falling
    /// back to defaults relative to the current directory.
    ///
    /// CLI settings are applied after path resolution and the result is
    /// validated once more, so overrides are checked too.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }
        config.validate()?;

        Ok(config)
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(source_dir) = &settings.source_dir {
            self.docs_resolved.source_dir.clone_from(source_dir);
        }
        if let Some(site_dir) = &settings.site_dir {
            self.docs_resolved.site_dir.clone_from(site_dir);
        }
        if let Some(cache_enabled) = settings.cache_enabled {
            self.docs_resolved.cache_enabled = cache_enabled;
        }
        if let Some(command) = &settings.command {
            self.diagrams_resolved.command.clone_from(command);
        }
        if let Some(on_failure) = &settings.on_failure {
            self.diagrams_resolved.on_failure.clone_from(on_failure);
        }
        if let Some(serve_mode) = settings.serve_mode {
            self.diagrams_resolved.serve_mode = serve_mode;
        }
        if let Some(ci) = settings.ci {
            self.diagrams_resolved.ci = ci;
        }
    }

    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    fn default_with_base(base: &Path) -> Self {
        Self {
            docs: DocsConfigRaw::default(),
            diagrams: DiagramsConfigRaw::default(),
            docs_resolved: DocsConfig {
                source_dir: base.join("docs"),
                site_dir: base.join("site"),
                project_dir: base.join(".mdimg"),
                cache_enabled: true,
            },
            diagrams_resolved: DiagramsConfig::default(),
            config_path: None,
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Any failure here is a configuration fault: the build must not start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_docs()?;
        self.validate_diagrams()?;
        Ok(())
    }

    fn validate_docs(&self) -> Result<(), ConfigError> {
        let docs = &self.docs_resolved;
        if docs.site_dir == docs.source_dir {
            return Err(ConfigError::Validation(
                "docs.site_dir must differ from docs.source_dir".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_diagrams(&self) -> Result<(), ConfigError> {
        let d = &self.diagrams_resolved;

        require_one_of(&d.format, FORMATS, "diagrams.format")?;
        require_one_of(&d.theme, THEMES, "diagrams.theme")?;
        require_one_of(&d.on_failure, FAILURE_POLICIES, "diagrams.on_failure")?;
        require_non_empty(&d.command, "diagrams.command")?;
        require_non_empty(&d.image_id_prefix, "diagrams.image_id_prefix")?;

        if d.output_dir.is_absolute()
            || d
                .output_dir
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ConfigError::Validation(
                "diagrams.output_dir must be a relative path inside docs.source_dir".to_owned(),
            ));
        }
        if d.timeout.is_zero() {
            return Err(ConfigError::Validation(
                "diagrams.timeout_secs must be greater than 0".to_owned(),
            ));
        }
        if d.width == Some(0) || d.height == Some(0) {
            return Err(ConfigError::Validation(
                "diagrams.width and diagrams.height must be greater than 0".to_owned(),
            ));
        }
        if let Some(scale) = d.scale
            && !(scale.is_finite() && scale > 0.0)
        {
            return Err(ConfigError::Validation(
                "diagrams.scale must be a positive number".to_owned(),
            ));
        }

        require_existing_file(d.mermaid_config.as_deref(), "diagrams.mermaid_config")?;
        require_existing_file(d.css_file.as_deref(), "diagrams.css_file")?;
        require_existing_file(d.puppeteer_config.as_deref(), "diagrams.puppeteer_config")?;

        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref site_dir) = self.docs.site_dir {
            self.docs.site_dir = Some(expand::expand_env(site_dir, "docs.site_dir")?);
        }
        let diagrams = &mut self.diagrams;
        if let Some(ref command) = diagrams.command {
            diagrams.command = Some(expand::expand_env(command, "diagrams.command")?);
        }
        if let Some(ref theme) = diagrams.theme {
            diagrams.theme = Some(expand::expand_env(theme, "diagrams.theme")?);
        }
        if let Some(ref background) = diagrams.background {
            diagrams.background = Some(expand::expand_env(background, "diagrams.background")?);
        }
        Ok(())
    }

    /// Resolve raw values against the config directory and fill in defaults.
    fn resolve(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));
        let file = |path: &Option<String>| path.as_deref().map(|p| config_dir.join(p));

        self.docs_resolved = DocsConfig {
            source_dir: resolve(self.docs.source_dir.as_deref(), "docs"),
            site_dir: resolve(self.docs.site_dir.as_deref(), "site"),
            project_dir: config_dir.join(".mdimg"),
            cache_enabled: self.docs.cache_enabled.unwrap_or(true),
        };

        let raw = &self.diagrams;
        let defaults = DiagramsConfig::default();
        self.diagrams_resolved = DiagramsConfig {
            output_dir: raw
                .output_dir
                .as_deref()
                .map_or(defaults.output_dir, PathBuf::from),
            format: raw.format.clone().unwrap_or(defaults.format),
            theme: raw.theme.clone().unwrap_or(defaults.theme),
            on_failure: raw.on_failure.clone().unwrap_or(defaults.on_failure),
            timeout: raw
                .timeout_secs
                .map_or(defaults.timeout, Duration::from_secs),
            command: raw.command.clone().unwrap_or(defaults.command),
            mermaid_config: file(&raw.mermaid_config),
            css_file: file(&raw.css_file),
            puppeteer_config: file(&raw.puppeteer_config),
            background: raw.background.clone(),
            width: raw.width,
            height: raw.height,
            scale: raw.scale,
            alt_text: raw.alt_text.clone().unwrap_or(defaults.alt_text),
            image_ids: raw.image_ids.unwrap_or(false),
            image_id_prefix: raw
                .image_id_prefix
                .clone()
                .unwrap_or(defaults.image_id_prefix),
            enabled_if_env: raw.enabled_if_env.clone(),
            cleanup_generated_images: raw.cleanup_generated_images.unwrap_or(false),
            serve_mode: false,
            ci: false,
        };
    }
}
