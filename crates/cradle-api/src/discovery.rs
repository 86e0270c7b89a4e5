//! LAN discovery over UDP broadcast.
//!
//! Devices answer a `{"action":"discover"}` broadcast on port 31634 with
//! `{"action":"advertise","host":"<hostname>"}`. The service binds one
//! socket for both directions: a background task drains inbound
//! datagrams into an [`Advertise`] feed while [`discover`](Discovery::discover)
//! fires probes at the local subnet's broadcast address.
//!
//! Malformed datagrams and unknown actions never stop the receive loop;
//! they are logged at debug level and skipped.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Fixed UDP port of the discovery protocol.
pub const DISCOVERY_PORT: u16 = 31634;

const MAX_DATAGRAM: usize = 1024;
const ADVERTISE_CHANNEL_CAPACITY: usize = 64;

/// Pause after a transient socket error before the next receive.
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(1);

// ── Wire messages ────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum DiscoveryMessage {
    Discover,
    Advertise { host: String },
    #[serde(other)]
    Unknown,
}

/// A device announcing itself on the broadcast domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertise {
    /// Hostname the device declared for itself.
    pub host: String,
}

// ── Discovery ────────────────────────────────────────────────────────

/// Running discovery service.
///
/// One instance per process is the expected shape; starting a second one
/// on the same port fails at bind time.
pub struct Discovery {
    socket: Arc<UdpSocket>,
    port: u16,
    advert_tx: broadcast::Sender<Advertise>,
    cancel: CancellationToken,
}

impl Discovery {
    /// Bind the discovery socket on [`DISCOVERY_PORT`] and start the
    /// receive loop.
    pub async fn start() -> Result<Self, Error> {
        Self::start_on(DISCOVERY_PORT).await
    }

    /// Bind on an explicit port (tests use an ephemeral one).
    pub async fn start_on(port: u16) -> Result<Self, Error> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        socket.set_broadcast(true)?;
        let port = socket.local_addr()?.port();
        let socket = Arc::new(socket);

        let (advert_tx, _) = broadcast::channel(ADVERTISE_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let task_socket = Arc::clone(&socket);
        let task_tx = advert_tx.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            receive_loop(task_socket, task_tx, task_cancel).await;
        });

        tracing::info!(port, "discovery listening");
        Ok(Self {
            socket,
            port,
            advert_tx,
            cancel,
        })
    }

    /// New receiver for advertise events.
    pub fn subscribe(&self) -> broadcast::Receiver<Advertise> {
        self.advert_tx.subscribe()
    }

    /// Broadcast one `discover` probe on the local subnet.
    ///
    /// Best effort: devices that hear it will advertise themselves on
    /// the same port; nothing is awaited here beyond the send itself.
    pub async fn discover(&self) -> Result<(), Error> {
        let payload = serde_json::to_vec(&DiscoveryMessage::Discover)?;
        let target = SocketAddr::new(IpAddr::V4(broadcast_address()), self.port);
        tracing::debug!(%target, "broadcasting discover probe");
        self.socket.send_to(&payload, target).await?;
        Ok(())
    }

    /// Stop the receive loop. The pending receive is abandoned
    /// deterministically; no task stays parked on the socket.
    pub fn stop(&self) {
        tracing::info!("stopping discovery");
        self.cancel.cancel();
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Receive loop ─────────────────────────────────────────────────────

async fn receive_loop(
    socket: Arc<UdpSocket>,
    advert_tx: broadcast::Sender<Advertise>,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, from)) => handle_datagram(&buf[..len], from, &advert_tx),
                    Err(e) => {
                        // Transient while running; stop() cancels us instead.
                        tracing::warn!(error = %e, "discovery receive error, retrying");
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(TRANSIENT_RETRY_DELAY) => {}
                        }
                    }
                }
            }
        }
    }

    tracing::debug!("discovery loop exiting");
}

fn handle_datagram(data: &[u8], from: SocketAddr, advert_tx: &broadcast::Sender<Advertise>) {
    let message: DiscoveryMessage = match serde_json::from_slice(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(%from, error = %e, "dropping malformed discovery datagram");
            return;
        }
    };

    match message {
        DiscoveryMessage::Advertise { host } => {
            tracing::info!(%from, host, "device advertised");
            let _ = advert_tx.send(Advertise { host });
        }
        // Our own probes echo back on the shared socket; ignore them.
        DiscoveryMessage::Discover | DiscoveryMessage::Unknown => {
            tracing::trace!(%from, "ignoring discovery datagram");
        }
    }
}

// ── Broadcast address resolution ─────────────────────────────────────

/// Broadcast address of the first non-loopback, up interface, falling
/// back to the limited broadcast address.
#[cfg(target_os = "linux")]
fn broadcast_address() -> Ipv4Addr {
    use std::process::Command;

    let output = match Command::new("ip").args(["-4", "addr", "show", "up"]).output() {
        Ok(o) => o,
        Err(_) => {
            tracing::debug!("'ip' command not found, using limited broadcast");
            return Ipv4Addr::BROADCAST;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_broadcast(&stdout).unwrap_or(Ipv4Addr::BROADCAST)
}

#[cfg(not(target_os = "linux"))]
fn broadcast_address() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}

/// Pull the first `brd` address out of `ip -4 addr show` output,
/// computing one from the CIDR prefix when the field is missing.
fn parse_broadcast(ip_output: &str) -> Option<Ipv4Addr> {
    for line in ip_output.lines() {
        let line = line.trim();
        if !line.starts_with("inet ") || line.contains("127.0.0.1") {
            continue;
        }

        let mut tokens = line.split_whitespace().peekable();
        let mut cidr = None;
        while let Some(token) = tokens.next() {
            match token {
                "inet" => cidr = tokens.peek().copied(),
                "brd" => {
                    if let Some(addr) = tokens.peek().and_then(|t| t.parse().ok()) {
                        return Some(addr);
                    }
                }
                _ => {}
            }
        }

        // Point-to-point interfaces have no `brd`; derive it.
        if let Some(cidr) = cidr {
            if let Some((addr, prefix)) = cidr.split_once('/') {
                let addr: Ipv4Addr = addr.parse().ok()?;
                let prefix: u32 = prefix.parse().ok()?;
                if prefix < 32 {
                    let mask = u32::MAX >> prefix;
                    return Some(Ipv4Addr::from(u32::from(addr) | mask));
                }
            }
        }
    }
    None
}

// ── Tests ────────────────────────────────────────────────────────────
