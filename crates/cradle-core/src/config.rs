// ── Runtime monitor configuration ──
//
// Tuning for one DeviceMonitor instance. The UI layer constructs this
// and hands it in; core never reads config files.

use std::time::Duration;

use cradle_api::ReconnectConfig;

/// Configuration for connecting to a single device.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Reconnection backoff policy for the transport.
    pub reconnect: ReconnectConfig,
    /// Tumbling window for heartbeat supervision.
    pub heartbeat_window: Duration,
    /// Maximum age of items replayed to late subscribers.
    pub replay_window: Duration,
    /// Maximum item count retained per replay buffer.
    pub replay_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            heartbeat_window: Duration::from_secs(20),
            replay_window: Duration::from_secs(300),
            replay_capacity: 1000,
        }
    }
}
