// Integration tests for `DeviceMonitor` driven through a detached
// transport handle.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use pretty_assertions::assert_eq;

use cradle_api::socket::{SocketDriver, SocketHandle, TransportEvent};
use cradle_api::{Envelope, LivenessProbe};
use cradle_core::{
    ConnectionState, Device, DeviceMonitor, DeviceOperation, MemoryRegistry, MonitorConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

struct AlwaysAlive;

impl LivenessProbe for AlwaysAlive {
    fn is_alive(&self, _hostname: &str) -> BoxFuture<'static, bool> {
        Box::pin(async { true })
    }
}

fn setup() -> (DeviceMonitor, SocketDriver) {
    let (socket, driver) = SocketHandle::detached();
    let monitor = DeviceMonitor::with_socket(
        Device::new(1, "Nursery", "nursery-pi"),
        socket,
        MonitorConfig::default(),
        Arc::new(MemoryRegistry::new()),
        Arc::new(AlwaysAlive),
    );
    (monitor, driver)
}

/// Let the monitor's background task drain everything injected so far.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

// ── Connection state ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn fresh_monitor_reports_connecting() {
    let (monitor, _driver) = setup();
    assert_eq!(
        *monitor.connection_state().borrow(),
        ConnectionState::Connecting
    );
}

#[tokio::test(start_paused = true)]
async fn opened_transport_reports_connected() {
    let (monitor, driver) = setup();
    let mut state = monitor.connection_state();

    driver.emit(TransportEvent::Opened);
    state.changed().await.unwrap();
    assert_eq!(*state.borrow_and_update(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn failed_transport_reports_disconnected() {
    let (monitor, driver) = setup();
    let mut state = monitor.connection_state();

    driver.emit(TransportEvent::Opened);
    state.changed().await.unwrap();
    driver.emit(TransportEvent::Failed);
    state.changed().await.unwrap();

    assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn late_subscriber_sees_only_the_current_state() {
    let (monitor, driver) = setup();
    let mut early = monitor.connection_state();

    driver.emit(TransportEvent::Opened);
    early.changed().await.unwrap();

    // A fresh subscription starts at the present, not the history.
    let late = monitor.connection_state();
    assert_eq!(*late.borrow(), ConnectionState::Connected);
    assert!(!late.has_changed().unwrap());
}

// ── Active device ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn active_device_follows_the_connection() {
    let (monitor, driver) = setup();
    let mut active = monitor.active_device();
    assert!(active.borrow().is_none());

    driver.emit(TransportEvent::Opened);
    active.changed().await.unwrap();
    let current = active.borrow_and_update().clone();
    assert_eq!(current.unwrap().hostname, "nursery-pi");

    driver.emit(TransportEvent::Closed);
    active.changed().await.unwrap();
    assert!(active.borrow_and_update().is_none());
}

// ── Typed feeds ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn volume_samples_arrive_scaled() {
    let (monitor, driver) = setup();
    let mut volumes = monitor.volumes();

    driver.push(Envelope::Volume { volume: 0.42 });

    let sample = volumes.recv().await.unwrap();
    assert_eq!(sample.value, 42);
}

#[tokio::test(start_paused = true)]
async fn replayed_history_reaches_late_subscribers() {
    let (monitor, driver) = setup();

    driver.push(Envelope::Volume { volume: 1.0 });
    driver.push(Envelope::Volume { volume: 0.5 });
    settle().await;

    let feed = monitor.volumes();
    let values: Vec<_> = feed.history().iter().map(|v| v.value).collect();
    assert_eq!(values, vec![100, 50]);
}

#[tokio::test(start_paused = true)]
async fn movement_samples_land_in_their_own_feed() {
    let (monitor, driver) = setup();
    let mut movements = monitor.movements();

    driver.push(Envelope::Movement { value: 0.25 });

    let sample = movements.recv().await.unwrap();
    assert_eq!(sample.value, 25);
}

#[tokio::test(start_paused = true)]
async fn feeds_compose_as_streams() {
    use futures_util::StreamExt;

    let (monitor, driver) = setup();
    let mut loud = monitor
        .volumes()
        .into_stream()
        .filter(|v| futures_util::future::ready(v.value >= 50));

    driver.push(Envelope::Volume { volume: 0.10 });
    driver.push(Envelope::Volume { volume: 0.80 });

    assert_eq!(loud.next().await.unwrap().value, 80);
}

#[tokio::test(start_paused = true)]
async fn system_status_surfaces_as_operation() {
    let (monitor, driver) = setup();
    let mut operations = monitor.operations();

    driver.push(Envelope::SystemStatus {
        status: "restart".into(),
    });

    assert_eq!(operations.recv().await.unwrap(), DeviceOperation::Restart);
}

#[tokio::test(start_paused = true)]
async fn silent_device_triggers_missing_heartbeat() {
    let (monitor, driver) = setup();
    let mut missed = monitor.missing_heartbeats();

    driver.push(Envelope::Heartbeat);
    settle().await;

    // The window containing the tick stays quiet.
    tokio::time::advance(Duration::from_secs(21)).await;
    assert!(missed.try_recv().is_err());

    // The next, empty window fires exactly once.
    tokio::time::advance(Duration::from_secs(20)).await;
    assert_eq!(missed.try_recv().unwrap(), 1);
    assert!(missed.try_recv().is_err());
}

// ── Outbound commands ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn lights_commands_hit_the_wire() {
    let (monitor, mut driver) = setup();

    monitor.lights(true).unwrap();
    monitor.lights(false).unwrap();

    assert_eq!(
        driver.next_outbound().await.unwrap(),
        r#"{"action":"lightson"}"#
    );
    assert_eq!(
        driver.next_outbound().await.unwrap(),
        r#"{"action":"lightsoff"}"#
    );
}

#[tokio::test(start_paused = true)]
async fn power_commands_hit_the_wire() {
    let (monitor, mut driver) = setup();

    monitor.shutdown().unwrap();
    monitor.restart().unwrap();

    assert_eq!(
        driver.next_outbound().await.unwrap(),
        r#"{"action":"shutdown"}"#
    );
    assert_eq!(
        driver.next_outbound().await.unwrap(),
        r#"{"action":"restart"}"#
    );
}

// ── Teardown ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn disconnect_is_idempotent_and_final() {
    let (monitor, driver) = setup();

    monitor.disconnect().await;
    monitor.disconnect().await;
    assert_eq!(
        *monitor.connection_state().borrow(),
        ConnectionState::Disconnected
    );
    assert!(monitor.active_device().borrow().is_none());

    // Nothing injected after teardown reaches a feed.
    driver.push(Envelope::Volume { volume: 1.0 });
    settle().await;
    assert!(monitor.volumes().history().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_routing_after_disconnect_returns() {
    let (monitor, driver) = setup();
    for _ in 0..64 {
        driver.push(Envelope::Volume { volume: 1.0 });
    }

    monitor.disconnect().await;

    // The routing task has been awaited; whatever made it into the
    // buffer is all there will ever be.
    let routed = monitor.volumes().history().len();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(monitor.volumes().history().len(), routed);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_monitor_stops_routing() {
    let (monitor, driver) = setup();
    drop(monitor);

    driver.push(Envelope::Heartbeat);
    settle().await;
    // No panic, no leaked task -- the injected frame just goes nowhere.
}
