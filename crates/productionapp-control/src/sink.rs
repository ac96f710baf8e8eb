//! Progress output sinks.
//!
//! Engine operations such as `up` and `destroy` stream their progress line
//! by line. The caller decides where those lines go by passing an
//! [`OutputSink`].

use std::sync::Mutex;

use tracing::info;

/// Receives engine progress output, one line at a time.
pub trait OutputSink: Send + Sync {
    /// Handle a single line of output (without trailing newline).
    fn line(&self, line: &str);
}

impl<F> OutputSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn line(&self, line: &str) {
        self(line);
    }
}

/// Forwards every line to `tracing` under the `engine` target.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    deployment: Option<String>,
}

impl TracingSink {
    /// Create a sink that tags every line with the deployment name.
    #[must_use]
    pub fn for_deployment(name: impl Into<String>) -> Self {
        Self {
            deployment: Some(name.into()),
        }
    }
}

impl OutputSink for TracingSink {
    fn line(&self, line: &str) {
        match &self.deployment {
            Some(deployment) => info!(target: "engine", deployment = %deployment, "{line}"),
            None => info!(target: "engine", "{line}"),
        }
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    lines: Mutex<Vec<String>>,
}

impl BufferSink {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the lines received so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl OutputSink for BufferSink {
    fn line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_owned());
        }
    }
}

/// Discards all output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn line(&self, _line: &str) {}
}
