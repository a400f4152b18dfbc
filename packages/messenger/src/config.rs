//! Messenger configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`Messenger`](crate::Messenger).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust
/// use duplex_messenger::MessengerConfig;
///
/// let config = MessengerConfig::from_json(r#"{"request_timeout_ms": 5000}"#).unwrap();
/// assert_eq!(config.id_prefix, "client_");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessengerConfig {
    /// Tag prepended to the counter to form request ids. Must differ from
    /// the peer's tag.
    pub id_prefix: String,

    /// Reject requests that get no reply within this many milliseconds.
    /// `None` waits forever.
    pub request_timeout_ms: Option<u64>,

    /// How often the background reaper looks for overdue requests.
    pub reaper_interval_ms: u64,

    /// Start a reaper thread when a timeout is set. When false the host calls
    /// `Messenger::expire_overdue` itself.
    pub spawn_reaper: bool,

    /// Send the handler error's source chain as `detail`.
    pub include_error_sources: bool,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            id_prefix: "client_".to_string(),
            request_timeout_ms: None,
            reaper_interval_ms: 1000,
            spawn_reaper: true,
            include_error_sources: false,
        }
    }
}

impl MessengerConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Reject requests unanswered after `timeout`, rounded up to a whole
    /// millisecond.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(whole_millis(timeout));
        self
    }

    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval_ms = whole_millis(interval);
        self
    }

    pub fn without_reaper(mut self) -> Self {
        self.spawn_reaper = false;
        self
    }

    pub fn with_error_sources(mut self, include: bool) -> Self {
        self.include_error_sources = include;
        self
    }

    /// The request timeout, never shorter than one millisecond.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms
            .map(|ms| Duration::from_millis(ms.max(1)))
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms.max(1))
    }
}

fn whole_millis(duration: Duration) -> u64 {
    let mut millis = duration.as_millis();
    if duration.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    u64::try_from(millis).unwrap_or(u64::MAX)
}
