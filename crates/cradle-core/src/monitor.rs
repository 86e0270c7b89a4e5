// ── Connection facade ──
//
// One DeviceMonitor per connected device. Owns the transport, the
// demultiplexer task, the replay buffers, and the heartbeat windows;
// exposes typed feeds plus the outbound commands. A caller connecting
// to a new device drops the previous monitor, which tears everything
// down through the cancellation token.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cradle_api::{Command, DeviceOperation, SocketHandle, TransportEvent};

use crate::config::MonitorConfig;
use crate::demux::{Demux, STATUS_CHANNEL_CAPACITY};
use crate::error::CoreError;
use crate::feed::Feed;
use crate::heartbeat::HeartbeatMonitor;
use crate::model::{Alarm, ConnectionState, Device, Movement, Volume};
use crate::registry::DeviceRegistry;
use crate::replay::ReplayBuffer;
use cradle_api::LivenessProbe;

/// The main entry point for consumers.
///
/// Created via [`connect`](Self::connect) (real transport) or
/// [`with_socket`](Self::with_socket) (injected transport). Dropping the
/// monitor or calling [`disconnect`](Self::disconnect) stops the
/// reconnection loop, the heartbeat windows, and the demux task.
pub struct DeviceMonitor {
    device: Device,
    socket: SocketHandle,
    state_tx: watch::Sender<ConnectionState>,
    active_tx: watch::Sender<Option<Device>>,
    demux: Arc<Demux>,
    alarms: Arc<ReplayBuffer<Alarm>>,
    cancel: CancellationToken,
    drive: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceMonitor {
    /// Connect to `device` and start the background tasks.
    ///
    /// The connection itself is established asynchronously; observe
    /// [`connection_state`](Self::connection_state) for progress. The
    /// first published state is always [`ConnectionState::Connecting`].
    pub fn connect(
        device: Device,
        config: MonitorConfig,
        registry: Arc<dyn DeviceRegistry>,
        probe: Arc<dyn LivenessProbe>,
    ) -> Result<Self, CoreError> {
        let socket = SocketHandle::connect(
            &device.hostname,
            config.reconnect.clone(),
            CancellationToken::new(),
        )?;
        Ok(Self::with_socket(device, socket, config, registry, probe))
    }

    /// Build a monitor around an existing transport handle.
    ///
    /// This is the injection seam: tests pair it with
    /// [`SocketHandle::detached`] to drive lifecycle events and inbound
    /// envelopes by hand.
    pub fn with_socket(
        device: Device,
        socket: SocketHandle,
        config: MonitorConfig,
        registry: Arc<dyn DeviceRegistry>,
        probe: Arc<dyn LivenessProbe>,
    ) -> Self {
        let cancel = CancellationToken::new();

        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let (active_tx, _) = watch::channel(None);
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);

        let demux = Arc::new(Demux {
            volumes: Arc::new(ReplayBuffer::new(
                config.replay_window,
                config.replay_capacity,
            )),
            movements: Arc::new(ReplayBuffer::new(
                config.replay_window,
                config.replay_capacity,
            )),
            status_tx,
            heartbeat: HeartbeatMonitor::spawn(config.heartbeat_window, cancel.child_token()),
        });
        let alarms = Arc::new(ReplayBuffer::new(
            config.replay_window,
            config.replay_capacity,
        ));

        // Subscribe before spawning so no event is lost in between.
        let lifecycle_rx = socket.lifecycle();
        let envelope_rx = socket.envelopes();

        let drive = DriveTask {
            device: device.clone(),
            state_tx: state_tx.clone(),
            active_tx: active_tx.clone(),
            demux: Arc::clone(&demux),
            registry,
            probe,
            cancel: cancel.clone(),
        };
        let drive = tokio::spawn(drive.run(lifecycle_rx, envelope_rx));

        info!(host = %device.hostname, "monitor created");
        Self {
            device,
            socket,
            state_tx,
            active_tx,
            demux,
            alarms,
            cancel,
            drive: Mutex::new(Some(drive)),
        }
    }

    /// The device this monitor is bound to.
    pub fn device(&self) -> &Device {
        &self.device
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to connection state. Most-recent-value semantics: a
    /// late subscriber sees the current state, not the history.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to the currently active device. Publishes `None` when
    /// the connection drops, signalling a return to the idle state.
    pub fn active_device(&self) -> watch::Receiver<Option<Device>> {
        self.active_tx.subscribe()
    }

    // ── Typed feeds ──────────────────────────────────────────────

    /// Noise level feed: retained history plus live samples.
    pub fn volumes(&self) -> Feed<Volume> {
        let (history, rx) = self.demux.volumes.subscribe();
        Feed::new(history, rx)
    }

    /// Movement feed: retained history (timestamp-ordered) plus live
    /// samples.
    pub fn movements(&self) -> Feed<Movement> {
        let (history, rx) = self.demux.movements.subscribe();
        Feed::new(history, rx)
    }

    /// Alarm feed. Reserved: nothing publishes into it yet.
    pub fn alarms(&self) -> Feed<Alarm> {
        let (history, rx) = self.alarms.subscribe();
        Feed::new(history, rx)
    }

    /// Power operations announced by the device (no replay).
    pub fn operations(&self) -> broadcast::Receiver<DeviceOperation> {
        self.demux.status_tx.subscribe()
    }

    /// Missing-heartbeat events: one sequence number per empty window.
    pub fn missing_heartbeats(&self) -> broadcast::Receiver<u64> {
        self.demux.heartbeat.subscribe()
    }

    // ── Outbound commands ────────────────────────────────────────
    //
    // All best effort: no acknowledgement, failures show up only as a
    // later connection-state transition if the transport notices.

    /// Switch the device lights on or off.
    pub fn lights(&self, on: bool) -> Result<(), CoreError> {
        let command = if on {
            Command::LightsOn
        } else {
            Command::LightsOff
        };
        self.socket.send(command).map_err(CoreError::from)
    }

    /// Ask the device to power down.
    pub fn shutdown(&self) -> Result<(), CoreError> {
        self.socket.send(Command::Shutdown).map_err(CoreError::from)
    }

    /// Ask the device to reboot.
    pub fn restart(&self) -> Result<(), CoreError> {
        self.socket.send(Command::Restart).map_err(CoreError::from)
    }

    // ── Teardown ─────────────────────────────────────────────────

    /// Stop the transport's reconnection lifecycle and all internal
    /// tasks, then wait for the routing task to exit. Idempotent;
    /// in-flight sends may be dropped. After this returns no new events
    /// reach any subscriber.
    pub async fn disconnect(&self) {
        if !self.cancel.is_cancelled() {
            info!(host = %self.device.hostname, "disconnecting monitor");
            self.cancel.cancel();
            self.socket.shutdown();
            self.state_tx.send_replace(ConnectionState::Disconnected);
            self.active_tx.send_replace(None);
        }
        let drive = self.drive.lock().expect("drive handle poisoned").take();
        if let Some(task) = drive {
            let _ = task.await;
        }
    }
}

impl Drop for DeviceMonitor {
    fn drop(&mut self) {
        // Cannot await the drive task here; dropping may race one
        // in-flight envelope. disconnect() is the clean teardown.
        self.cancel.cancel();
        self.socket.shutdown();
    }
}

// ── Drive task ───────────────────────────────────────────────────────

struct DriveTask {
    device: Device,
    state_tx: watch::Sender<ConnectionState>,
    active_tx: watch::Sender<Option<Device>>,
    demux: Arc<Demux>,
    registry: Arc<dyn DeviceRegistry>,
    probe: Arc<dyn LivenessProbe>,
    cancel: CancellationToken,
}

impl DriveTask {
    /// Drain transport events and inbound envelopes until cancelled.
    async fn run(
        self,
        mut lifecycle_rx: broadcast::Receiver<TransportEvent>,
        mut envelope_rx: broadcast::Receiver<cradle_api::Envelope>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = lifecycle_rx.recv() => {
                    match event {
                        Ok(event) => self.apply_transition(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "lifecycle feed lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                envelope = envelope_rx.recv() => {
                    match envelope {
                        Ok(envelope) => self.demux.route(envelope),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "envelope feed lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        debug!("monitor drive task exiting");
    }

    fn apply_transition(&self, event: TransportEvent) {
        let state = match event {
            TransportEvent::Opened => ConnectionState::Connected,
            TransportEvent::Closing | TransportEvent::Closed | TransportEvent::Failed => {
                ConnectionState::Disconnected
            }
        };
        info!(?event, ?state, "connection state transition");
        self.state_tx.send_replace(state);

        match state {
            ConnectionState::Connected => {
                self.active_tx.send_replace(Some(self.device.clone()));
            }
            ConnectionState::Disconnected => {
                self.active_tx.send_replace(None);
            }
            ConnectionState::Connecting => {}
        }

        // Every transition refreshes liveness of all known devices.
        let registry = Arc::clone(&self.registry);
        let probe = Arc::clone(&self.probe);
        tokio::spawn(async move {
            refresh_liveness(registry.as_ref(), probe.as_ref()).await;
        });
    }
}

/// Probe every registered device and persist changed liveness flags.
async fn refresh_liveness(registry: &dyn DeviceRegistry, probe: &dyn LivenessProbe) {
    for mut device in registry.list() {
        let alive = probe.is_alive(&device.hostname).await;
        if alive != device.alive {
            debug!(host = %device.hostname, alive, "device liveness changed");
            device.alive = alive;
            registry.upsert(device);
        }
    }
}
