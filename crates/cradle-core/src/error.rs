// ── Core error types ──
//
// Consumer-facing errors from cradle-core. Transport failures while a
// connection is up never appear here -- they surface as lifecycle
// transitions on the connection-state feed. What remains are setup-time
// failures and misuse.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach device {hostname}: {reason}")]
    ConnectionFailed { hostname: String, reason: String },

    #[error("Monitor is disconnected")]
    MonitorDisconnected,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from I/O-layer errors ─────────────────────────────────

impl From<cradle_api::Error> for CoreError {
    fn from(err: cradle_api::Error) -> Self {
        match err {
            cradle_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                hostname: String::new(),
                reason,
            },
            cradle_api::Error::InvalidAddress { address, reason } => CoreError::Config {
                message: format!("invalid device address {address}: {reason}"),
            },
            cradle_api::Error::SendDropped => CoreError::MonitorDisconnected,
            cradle_api::Error::DiscoverySocket(e) => CoreError::Internal(e.to_string()),
            cradle_api::Error::Serialize(e) => CoreError::Internal(e.to_string()),
        }
    }
}
