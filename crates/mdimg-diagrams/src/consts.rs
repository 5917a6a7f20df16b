//! Internal constants for diagram rendering.

use std::time::Duration;

/// Default timeout for one renderer invocation (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How often a running renderer process is checked for exit or cancellation.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Minimum wait for renderer output after the process has exited.
pub(crate) const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Default alt text for generated image references.
pub const DEFAULT_ALT_TEXT: &str = "Mermaid Diagram";

/// Name of the persistent cache bucket holding artifact entries.
pub const CACHE_BUCKET: &str = "artifacts";
