//! Device websocket transport with auto-reconnect.
//!
//! Maintains one duplex connection to a monitor device at
//! `ws://<hostname>:8080` and streams decoded [`Envelope`]s and
//! [`TransportEvent`]s through [`tokio::sync::broadcast`] channels.
//! Reconnection is automatic and driven by [`ReconnectConfig`]; the loop
//! only stops when the handle's cancellation token fires.
//!
//! # Example
//!
//! ```rust,ignore
//! use cradle_api::socket::SocketHandle;
//! use cradle_api::{Command, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let handle = SocketHandle::connect("nursery-pi", ReconnectConfig::default(), cancel.clone())?;
//!
//! let mut envelopes = handle.envelopes();
//! handle.send(Command::LightsOn)?;
//!
//! while let Ok(env) = envelopes.recv().await {
//!     println!("{env:?}");
//! }
//!
//! handle.shutdown();
//! ```

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::backoff::ReconnectConfig;
use crate::error::Error;
use crate::protocol::{Command, Envelope};

/// Fixed websocket port on the device.
pub const DEVICE_PORT: u16 = 8080;

// ── Channel capacities ───────────────────────────────────────────────

const ENVELOPE_CHANNEL_CAPACITY: usize = 1024;
const LIFECYCLE_CHANNEL_CAPACITY: usize = 64;
const OUTBOUND_QUEUE_CAPACITY: usize = 64;

// ── TransportEvent ───────────────────────────────────────────────────

/// Lifecycle event of the underlying connection.
///
/// These are the *only* way transport failures reach consumers -- errors
/// are never returned from the receive path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established; the device is reachable.
    Opened,
    /// Server sent a close frame; teardown is in progress.
    Closing,
    /// Connection ended cleanly (close handshake or stream end).
    Closed,
    /// Connection attempt or established connection failed.
    Failed,
}

// ── SocketHandle ─────────────────────────────────────────────────────

/// Handle to a running device socket.
///
/// Dropping the handle does not stop the background loop; call
/// [`shutdown`](Self::shutdown) (or cancel the token passed to
/// [`connect`](Self::connect)) for a graceful teardown.
pub struct SocketHandle {
    lifecycle_tx: broadcast::Sender<TransportEvent>,
    envelope_tx: broadcast::Sender<Envelope>,
    outbound_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl SocketHandle {
    /// Spawn the reconnection loop against `ws://<hostname>:8080`.
    ///
    /// Returns immediately; the first connection attempt happens in the
    /// background. Subscribe to [`lifecycle`](Self::lifecycle) to observe
    /// it.
    pub fn connect(
        hostname: &str,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        let url = device_url(hostname)?;

        let (lifecycle_tx, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);
        let (envelope_tx, _) = broadcast::channel(ENVELOPE_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

        let task_lifecycle = lifecycle_tx.clone();
        let task_envelopes = envelope_tx.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            socket_loop(url, task_lifecycle, task_envelopes, outbound_rx, reconnect, task_cancel)
                .await;
        });

        Ok(Self {
            lifecycle_tx,
            envelope_tx,
            outbound_tx,
            cancel,
        })
    }

    /// Create a handle with no network behind it, plus the driver for
    /// the far side. The driver injects envelopes and lifecycle events
    /// and observes outbound frames -- the seam used by facade tests and
    /// by callers that need a connection-shaped null object.
    pub fn detached() -> (Self, SocketDriver) {
        let (lifecycle_tx, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);
        let (envelope_tx, _) = broadcast::channel(ENVELOPE_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

        let handle = Self {
            lifecycle_tx: lifecycle_tx.clone(),
            envelope_tx: envelope_tx.clone(),
            outbound_tx,
            cancel: CancellationToken::new(),
        };
        let driver = SocketDriver {
            lifecycle_tx,
            envelope_tx,
            outbound_rx,
        };
        (handle, driver)
    }

    /// New receiver for transport lifecycle events.
    pub fn lifecycle(&self) -> broadcast::Receiver<TransportEvent> {
        self.lifecycle_tx.subscribe()
    }

    /// New receiver for decoded inbound envelopes.
    ///
    /// Multiple consumers can subscribe concurrently. A consumer that
    /// falls behind sees [`broadcast::error::RecvError::Lagged`] and can
    /// keep reading from the newest frame on.
    pub fn envelopes(&self) -> broadcast::Receiver<Envelope> {
        self.envelope_tx.subscribe()
    }

    /// Queue one command for sending. Best effort: no acknowledgement,
    /// and the frame is dropped if the queue is full or the transport is
    /// being torn down.
    pub fn send(&self, command: Command) -> Result<(), Error> {
        let text = serde_json::to_string(&command)?;
        self.outbound_tx
            .try_send(text)
            .map_err(|_| Error::SendDropped)
    }

    /// Stop the reconnection loop gracefully. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── SocketDriver (test / null seam) ──────────────────────────────────

/// The far side of a [`SocketHandle::detached`] pair.
pub struct SocketDriver {
    lifecycle_tx: broadcast::Sender<TransportEvent>,
    envelope_tx: broadcast::Sender<Envelope>,
    outbound_rx: mpsc::Receiver<String>,
}

impl SocketDriver {
    /// Inject a transport lifecycle event.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.lifecycle_tx.send(event);
    }

    /// Inject an inbound envelope.
    pub fn push(&self, envelope: Envelope) {
        let _ = self.envelope_tx.send(envelope);
    }

    /// Await the next outbound frame queued through the handle.
    pub async fn next_outbound(&mut self) -> Option<String> {
        self.outbound_rx.recv().await
    }

    /// Pop an outbound frame without waiting.
    pub fn try_next_outbound(&mut self) -> Option<String> {
        self.outbound_rx.try_recv().ok()
    }
}

// ── URL construction ─────────────────────────────────────────────────

fn device_url(hostname: &str) -> Result<Url, Error> {
    let address = format!("ws://{}:{}", hostname.trim(), DEVICE_PORT);
    Url::parse(&address).map_err(|e| Error::InvalidAddress {
        address,
        reason: e.to_string(),
    })
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → pump → on termination, backoff → reconnect.
async fn socket_loop(
    url: Url,
    lifecycle_tx: broadcast::Sender<TransportEvent>,
    envelope_tx: broadcast::Sender<Envelope>,
    mut outbound_rx: mpsc::Receiver<String>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = run_connection(
                &url,
                &lifecycle_tx,
                &envelope_tx,
                &mut outbound_rx,
                &cancel,
                &mut attempt,
            ) => result,
        };

        // Explicit disconnect: stop silently, no further events.
        if cancel.is_cancelled() {
            break;
        }

        match result {
            Ok(()) => {
                tracing::info!("device socket closed, reconnecting");
                let _ = lifecycle_tx.send(TransportEvent::Closed);
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "device socket failed");
                let _ = lifecycle_tx.send(TransportEvent::Failed);
            }
        }

        let delay = reconnect.next_delay(attempt);
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }

    tracing::debug!("socket loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one connection and pump frames in both directions until it
/// terminates. Emits `Opened` on success and `Closing` when the server
/// starts a close handshake; `Closed`/`Failed` are emitted by the caller
/// based on the return value.
async fn run_connection(
    url: &Url,
    lifecycle_tx: &broadcast::Sender<TransportEvent>,
    envelope_tx: &broadcast::Sender<Envelope>,
    outbound_rx: &mut mpsc::Receiver<String>,
    cancel: &CancellationToken,
    attempt: &mut u32,
) -> Result<(), Error> {
    // Commands queued while we were disconnected are stale by now.
    while outbound_rx.try_recv().is_ok() {}

    tracing::info!(url = %url, "connecting to device");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("device socket connected");
    *attempt = 0;
    let _ = lifecycle_tx.send(TransportEvent::Opened);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if let Some(envelope) = Envelope::decode(&text) {
                            // Ignore send errors -- no subscribers right now
                            let _ = envelope_tx.send(envelope);
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite replies with pong automatically
                        tracing::trace!("device socket ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "close frame received");
                        } else {
                            tracing::info!("close frame received (no payload)");
                        }
                        let _ = lifecycle_tx.send(TransportEvent::Closing);
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("device stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- this protocol is text-only
                    }
                }
            }
            command = outbound_rx.recv() => {
                if let Some(text) = command {
                    write
                        .send(tungstenite::Message::text(text))
                        .await
                        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
