// ── Domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection state of a [`DeviceMonitor`](crate::monitor::DeviceMonitor).
///
/// Driven exclusively by transport lifecycle events. A freshly created
/// monitor starts in `Connecting`; the default (never connected) is
/// `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
}

/// A known monitor device.
///
/// Owned by the external registry; the core reads `hostname`/`id` and
/// updates `alive` through discovery probes. Two devices are the same
/// device when their hostnames match after trimming, case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: u64,
    pub name: String,
    pub hostname: String,
    /// Last known result of the liveness probe.
    #[serde(default)]
    pub alive: bool,
}

impl Device {
    pub fn new(id: u64, name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            hostname: hostname.into(),
            alive: false,
        }
    }

    /// Normalized hostname used for identity and registry keys.
    pub fn hostname_key(&self) -> String {
        self.hostname.trim().to_lowercase()
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.hostname_key() == other.hostname_key()
    }
}

impl Eq for Device {}

/// One noise level sample, scaled to `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub time: DateTime<Utc>,
    pub value: u8,
}

/// One movement magnitude sample, scaled to `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub time: DateTime<Utc>,
    pub value: u8,
}

/// An alarm raised for a device.
///
/// The alarm feed is wired but has no producer yet; threshold-based
/// triggering stayed out of scope until its semantics settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub time: DateTime<Utc>,
}

/// Items that carry their own event timestamp.
///
/// Lets the movement buffer keep replayed history in timestamp order
/// even when samples were decoded out of arrival order.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for Volume {
    fn timestamp(&self) -> DateTime<Utc> {
        self.time
    }
}

impl Timestamped for Movement {
    fn timestamp(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Scale a raw `0.0..=1.0` measurement to `0..=100`, truncating.
/// Out-of-range and non-finite input saturates instead of failing.
pub(crate) fn scale_unit(raw: f64) -> u8 {
    (raw * 100.0) as u8
}
