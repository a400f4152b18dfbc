//! Diagnostic output.
//!
//! Every line goes to `tracing` with the envelope id as a field, and to the
//! host's log sink if one was installed. Neither affects control flow.

use std::fmt;
use std::sync::Arc;

/// Host callback receiving human-readable diagnostic lines.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct Diagnostics {
    sink: Option<LogSink>,
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl Diagnostics {
    pub(crate) fn new(sink: Option<LogSink>) -> Self {
        Self { sink }
    }

    pub(crate) fn debug(&self, id: &str, line: &str) {
        tracing::debug!(id, "{}", line);
        self.forward(line);
    }

    pub(crate) fn warn(&self, id: &str, line: &str) {
        tracing::warn!(id, "{}", line);
        self.forward(line);
    }

    pub(crate) fn error(&self, line: &str) {
        tracing::error!("{}", line);
        self.forward(line);
    }

    fn forward(&self, line: &str) {
        if let Some(sink) = &self.sink {
            sink(&format!("duplex: {}", line));
        }
    }
}
