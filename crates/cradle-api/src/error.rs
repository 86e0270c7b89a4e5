use thiserror::Error;

/// Top-level error type for the `cradle-api` crate.
///
/// Covers the I/O surfaces: websocket transport, UDP discovery, and the
/// liveness probe. Note that per the degradation policy, most transport
/// failures are *not* returned to callers -- they drive lifecycle
/// transitions and the reconnection loop instead. What remains here are
/// setup-time failures (bad address, socket bind) and best-effort send
/// errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// WebSocket connection failed (refused, reset, DNS, timeout).
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// Device address could not be parsed into a websocket URL.
    #[error("Invalid device address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Outbound send was dropped (transport gone or queue full).
    #[error("Send dropped: transport is not available")]
    SendDropped,

    // ── Discovery ───────────────────────────────────────────────────
    /// UDP socket setup failed (bind, broadcast option).
    #[error("Discovery socket error: {0}")]
    DiscoverySocket(#[from] std::io::Error),

    // ── Data ────────────────────────────────────────────────────────
    /// Outbound JSON serialization failed.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
