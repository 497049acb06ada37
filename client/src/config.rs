use std::time::Duration;

use crate::connection::ReconnectPolicy;

/// Tunables for one sync client instance.
pub struct SyncConfig {
    /// WebSocket endpoint, e.g. `wss://sync.huddle.app/socket`.
    pub url: String,

    /// Backoff schedule for transport-level reconnects.
    pub reconnect: ReconnectPolicy,

    /// How long a pending send may wait for its correlated echo before
    /// being marked Failed.
    pub send_timeout: Duration,

    /// Typing indicator lifetime, matching the sender-side debounce.
    pub typing_timeout: Duration,

    /// Bound on optimistically queued sends per room.
    pub max_pending_sends: usize,

    /// Cadence of the pending-send deadline sweep.
    pub sweep_interval: Duration,
}

impl SyncConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectPolicy::default(),
            send_timeout: Duration::from_secs(10),
            typing_timeout: Duration::from_secs(3),
            max_pending_sends: 8,
            sweep_interval: Duration::from_secs(1),
        }
    }
}
