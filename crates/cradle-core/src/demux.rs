//! Action demultiplexer.
//!
//! Stateless routing of inbound envelopes into the typed feeds: noise
//! samples into the volume buffer, movement samples into the movement
//! buffer (timestamp-ordered), heartbeats into the window counter, and
//! `systemstatus` onto the one-shot operation feed. Unknown actions are
//! dropped at debug level.

use std::sync::Arc;

use chrono::Utc;
use cradle_api::{DeviceOperation, Envelope};
use tokio::sync::broadcast;

use crate::heartbeat::HeartbeatMonitor;
use crate::model::{Movement, Volume, scale_unit};
use crate::replay::ReplayBuffer;

pub(crate) const STATUS_CHANNEL_CAPACITY: usize = 16;

/// Routes decoded envelopes into the monitor's feeds.
pub struct Demux {
    pub(crate) volumes: Arc<ReplayBuffer<Volume>>,
    pub(crate) movements: Arc<ReplayBuffer<Movement>>,
    pub(crate) status_tx: broadcast::Sender<DeviceOperation>,
    pub(crate) heartbeat: HeartbeatMonitor,
}

impl Demux {
    /// Route one envelope. Timestamps are stamped here, at decode time.
    pub fn route(&self, envelope: Envelope) {
        match envelope {
            Envelope::Volume { volume } => {
                self.volumes.publish(Volume {
                    time: Utc::now(),
                    value: scale_unit(volume),
                });
            }
            Envelope::Movement { value } => {
                self.movements.publish_ordered(Movement {
                    time: Utc::now(),
                    value: scale_unit(value),
                });
            }
            Envelope::Heartbeat => self.heartbeat.tick(),
            Envelope::SystemStatus { status } => {
                let operation = DeviceOperation::from_status(&status);
                tracing::info!(?operation, status, "device announced power operation");
                let _ = self.status_tx.send(operation);
            }
            Envelope::Unknown => {
                tracing::debug!("dropping envelope with unknown action");
            }
        }
    }
}
