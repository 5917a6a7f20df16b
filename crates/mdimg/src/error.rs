//! CLI error types.

use mdimg_config::ConfigError;
use mdimg_diagrams::{PipelineError, RendererError};

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Renderer(#[from] RendererError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("{path}: {source}")]
    Page {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
