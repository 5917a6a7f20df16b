//! In-memory renderer for pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::RendererError;
use crate::renderer::{FailureKind, RenderFailure, RenderRequest, RenderResult, Renderer};

/// Renderer that writes `<svg>` files and fails on marker words.
///
/// - `FAIL` in the source: non-zero exit with a parse error
/// - `TIMEOUT`: timeout after 30s
/// - `NOOUT`: exit ok without output
/// - `BROKEN`: the renderer cannot be started
/// - `SLOW`: sleeps 50ms before writing the image
#[derive(Default)]
pub(crate) struct FakeRenderer {
    calls: AtomicUsize,
    salt: String,
}

impl FakeRenderer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_salt(salt: &str) -> Self {
        Self {
            salt: salt.to_owned(),
            ..Self::default()
        }
    }

    /// Number of `render` calls so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Renderer for FakeRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<RenderResult, RendererError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let source = request.source;

        if source.contains("BROKEN") {
            return Err(RendererError::NotFound {
                tried: vec!["mmdc".to_owned()],
            });
        }

        let failure = |kind, detail: &str| {
            Ok(RenderResult::Failure(RenderFailure {
                kind,
                detail: detail.to_owned(),
                elapsed: Duration::ZERO,
            }))
        };
        if source.contains("FAIL") {
            return failure(FailureKind::Process { code: Some(1) }, "Parse error on line 1");
        }
        if source.contains("TIMEOUT") {
            return failure(
                FailureKind::Timeout {
                    after: Duration::from_secs(30),
                },
                "",
            );
        }
        if source.contains("NOOUT") {
            return failure(FailureKind::OutputMissing, "");
        }
        if request.cancel.is_cancelled() {
            return failure(FailureKind::Cancelled, "");
        }
        if source.contains("SLOW") {
            std::thread::sleep(Duration::from_millis(50));
        }

        let path = request.output_path;
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            path,
            format!("<svg data-theme=\"{}\">{source}</svg>", request.options.theme.as_str()),
        )
        .unwrap();

        Ok(RenderResult::Success {
            path: path.to_path_buf(),
            elapsed: Duration::from_millis(1),
        })
    }

    fn fingerprint_salt(&self) -> &str {
        &self.salt
    }
}
