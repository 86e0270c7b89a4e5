//! Wire protocol for the device websocket.
//!
//! One JSON object per message, discriminated by the `action` field.
//! Inbound and outbound vocabularies are disjoint: the device pushes
//! measurements and status, the client pushes commands.
//!
//! Decoding is strict on the discriminator and lenient on everything
//! else: an unknown `action` decodes to [`Envelope::Unknown`] and is
//! dropped by the consumer, a malformed payload fails the decode and is
//! dropped at the parse site. Neither case is an error to callers.

use serde::{Deserialize, Serialize};

/// Inbound message envelope, tagged by the `action` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Envelope {
    /// Noise level measurement, `volume` in `0.0..=1.0`.
    Volume { volume: f64 },
    /// Movement magnitude, `value` in `0.0..=1.0`.
    Movement { value: f64 },
    /// Periodic liveness tick, no payload.
    Heartbeat,
    /// Device-side power state change announcement.
    SystemStatus { status: String },
    /// Any discriminator we don't know. Dropped by consumers.
    #[serde(other)]
    Unknown,
}

impl Envelope {
    /// Decode one text frame. `None` means the frame was not a valid
    /// envelope; the caller logs and moves on.
    pub fn decode(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(env) => Some(env),
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed inbound frame");
                None
            }
        }
    }
}

/// Outbound command envelope. Serializes to `{"action": "<name>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Command {
    LightsOn,
    LightsOff,
    Shutdown,
    Restart,
}

/// Power operation announced by the device through `systemstatus`.
///
/// Unrecognized status strings map to [`Invalid`](Self::Invalid) -- never
/// an error, the device firmware may be newer than this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOperation {
    Shutdown,
    Restart,
    Invalid,
}

impl DeviceOperation {
    pub fn from_status(status: &str) -> Self {
        match status {
            "shutdown" => Self::Shutdown,
            "restart" => Self::Restart,
            _ => Self::Invalid,
        }
    }
}
