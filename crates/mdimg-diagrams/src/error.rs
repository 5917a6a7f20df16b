//! Error types for diagram processing.

use std::io;
use std::path::PathBuf;

use crate::renderer::RenderFailure;
use crate::report::BlockLabel;

/// Environment-level renderer fault.
///
/// Unlike [`RenderFailure`], these abort the build regardless of the failure
/// policy.
#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    /// No usable renderer executable was found.
    #[error("mermaid CLI not found (tried: {})", tried.join(", "))]
    NotFound { tried: Vec<String> },
    /// The renderer command line could not be parsed.
    #[error("invalid renderer command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },
    /// The renderer process could not be started or supervised.
    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    /// Temporary files or the output directory could not be prepared.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Error that aborts processing of a page.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A block failed under the stop-build policy.
    #[error("{page}: {block}: {failure}")]
    Render {
        page: String,
        block: BlockLabel,
        failure: RenderFailure,
    },
    /// The renderer itself is unusable.
    #[error("{page}: {source}")]
    Renderer {
        page: String,
        #[source]
        source: RendererError,
    },
    /// The build was cancelled.
    #[error("build cancelled")]
    Cancelled,
}
