//! Subscription service configuration.

use std::time::Duration;

/// Subscription service configuration.
#[derive(Debug, Clone)]
pub struct SubscriptionsConfig {
    /// Path under which subjects are mounted (`{path_prefix}/{subject}`).
    pub path_prefix: String,
    /// Origins allowed to open connections. Requests without an Origin header are always
    /// accepted; `"*"` accepts any origin.
    pub allowed_origins: Vec<String>,
    /// Max blocks a reader visits per read before yielding back to the delivery loop.
    pub max_blocks_per_read: usize,
    /// Time allowed for the WebSocket handshake.
    pub handshake_timeout_secs: u64,
}

impl SubscriptionsConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Whether a request carrying `origin` (if any) passes the allowlist.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            None | Some("") => true,
            Some(origin) => self
                .allowed_origins
                .iter()
                .any(|allowed| allowed == "*" || allowed == origin),
        }
    }
}

impl Default for SubscriptionsConfig {
    fn default() -> Self {
        Self {
            path_prefix: "/subscriptions".to_string(),
            allowed_origins: Vec::new(),
            max_blocks_per_read: 10,
            handshake_timeout_secs: 10,
        }
    }
}
