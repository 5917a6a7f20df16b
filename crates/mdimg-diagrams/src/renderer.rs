//! Renderer capability.
//!
//! The pipeline talks to image generation only through [`Renderer`]. Expected
//! failures (timeouts, syntax errors in the diagram, missing output) come back
//! as [`RenderResult::Failure`]; `Err` is reserved for faults of the
//! environment such as a renderer that cannot be started at all.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::RendererError;
use crate::options::RenderOptions;

/// Build-wide cancellation flag.
///
/// Clones share the same flag. Renderers poll it while a process runs and
/// terminate the process once it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every render sharing this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One renderer invocation.
#[derive(Debug)]
pub struct RenderRequest<'a> {
    /// Diagram source to render.
    pub source: &'a str,
    pub options: &'a RenderOptions,
    /// Where the image must be written.
    pub output_path: &'a Path,
    pub cancel: &'a CancelToken,
}

/// Outcome of one renderer invocation.
#[derive(Debug)]
pub enum RenderResult {
    /// The image exists at `path` and is non-empty.
    Success { path: PathBuf, elapsed: Duration },
    Failure(RenderFailure),
}

/// Why a render failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The process exceeded its time budget and was killed.
    Timeout { after: Duration },
    /// The process exited unsuccessfully; `code` is `None` when killed by a signal.
    Process { code: Option<i32> },
    /// The process reported success but the image is missing or empty.
    OutputMissing,
    /// The build was cancelled while the process ran.
    Cancelled,
}

/// A failed render with its diagnostic text.
#[derive(Debug, Clone)]
pub struct RenderFailure {
    pub kind: FailureKind,
    /// Captured standard error or a description of the problem.
    pub detail: String,
    pub elapsed: Duration,
}

impl fmt::Display for RenderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Timeout { after } => {
                write!(f, "renderer timed out after {}s", after.as_secs_f64())?;
            }
            FailureKind::Process { code: Some(code) } => {
                write!(f, "renderer exited with status {code}")?;
            }
            FailureKind::Process { code: None } => f.write_str("renderer was terminated")?,
            FailureKind::OutputMissing => f.write_str("renderer produced no output")?,
            FailureKind::Cancelled => f.write_str("render cancelled")?,
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// Turns diagram source into an image file.
pub trait Renderer: Send + Sync {
    /// Render `request.source` to `request.output_path`.
    fn render(&self, request: &RenderRequest<'_>) -> Result<RenderResult, RendererError>;

    /// Extra input that affects rendered bytes beyond [`RenderOptions`].
    ///
    /// Mixed into every fingerprint; an empty string by default.
    fn fingerprint_salt(&self) -> &str {
        ""
    }
}
