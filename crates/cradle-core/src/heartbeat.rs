//! Heartbeat supervision.
//!
//! The device sends a `heartbeat` envelope every few seconds. The
//! monitor counts ticks in tumbling windows (default 20s) and publishes
//! the window's sequence number when a window closes with zero ticks.
//! This is a liveness *signal* only -- tearing the connection down in
//! response is the caller's decision.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

const MISSED_CHANNEL_CAPACITY: usize = 16;

/// Handle to a running heartbeat window task.
pub struct HeartbeatMonitor {
    tick_tx: mpsc::UnboundedSender<()>,
    missed_tx: broadcast::Sender<u64>,
}

impl HeartbeatMonitor {
    /// Spawn the window task. The first window opens immediately and
    /// closes after `window`; the task stops when `cancel` fires.
    pub fn spawn(window: Duration, cancel: CancellationToken) -> Self {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let (missed_tx, _) = broadcast::channel(MISSED_CHANNEL_CAPACITY);

        let task_tx = missed_tx.clone();
        tokio::spawn(async move {
            window_loop(window, tick_rx, task_tx, cancel).await;
        });

        Self { tick_tx, missed_tx }
    }

    /// Record one heartbeat in the current window.
    pub fn tick(&self) {
        let _ = self.tick_tx.send(());
    }

    /// New receiver for missing-heartbeat events. Each event carries the
    /// sequence number of the window that closed empty.
    pub fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.missed_tx.subscribe()
    }
}

async fn window_loop(
    window: Duration,
    mut tick_rx: mpsc::UnboundedReceiver<()>,
    missed_tx: broadcast::Sender<u64>,
    cancel: CancellationToken,
) {
    // Window k covers [k*window, (k+1)*window); the interval fires at
    // each close. Skip missed closes rather than bursting after a stall.
    let mut boundary = interval_at(Instant::now() + window, window);
    boundary.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut seq: u64 = 0;
    let mut count: u64 = 0;
    let mut ticking = true;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = tick_rx.recv(), if ticking => {
                match received {
                    Some(()) => count += 1,
                    // All senders gone. Disable this arm so the closed
                    // channel cannot starve the boundary; windows keep
                    // closing until cancel.
                    None => ticking = false,
                }
            }
            _ = boundary.tick() => {
                if count == 0 {
                    tracing::warn!(window = seq, "no heartbeat received in window");
                    let _ = missed_tx.send(seq);
                }
                count = 0;
                seq += 1;
            }
        }
    }

    tracing::debug!("heartbeat window loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(20);

    async fn advance(secs: u64) {
        tokio::time::advance(Duration::from_secs(secs)).await;
    }

    fn drain(rx: &mut broadcast::Receiver<u64>) -> Vec<u64> {
        let mut events = Vec::new();
        while let Ok(seq) = rx.try_recv() {
            events.push(seq);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn windows_with_ticks_emit_nothing() {
        let cancel = CancellationToken::new();
        let monitor = HeartbeatMonitor::spawn(WINDOW, cancel.clone());
        let mut missed = monitor.subscribe();

        monitor.tick();
        advance(19).await;
        monitor.tick();
        advance(2).await; // first window closed with 2 ticks
        assert!(drain(&mut missed).is_empty());

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn empty_window_emits_exactly_one_event() {
        let cancel = CancellationToken::new();
        let monitor = HeartbeatMonitor::spawn(WINDOW, cancel.clone());
        let mut missed = monitor.subscribe();

        monitor.tick();
        advance(21).await; // window 0: one tick, no event
        assert!(drain(&mut missed).is_empty());

        advance(20).await; // window 1 closes empty
        assert_eq!(drain(&mut missed), vec![1]);

        advance(20).await; // window 2 closes empty
        assert_eq!(drain(&mut missed), vec![2]);

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn tick_resets_only_the_current_window() {
        let cancel = CancellationToken::new();
        let monitor = HeartbeatMonitor::spawn(WINDOW, cancel.clone());
        let mut missed = monitor.subscribe();

        advance(21).await; // window 0 empty
        monitor.tick();
        advance(20).await; // window 1 has the tick
        advance(20).await; // window 2 empty

        assert_eq!(drain(&mut missed), vec![0, 2]);

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn windows_keep_closing_after_all_senders_drop() {
        let cancel = CancellationToken::new();
        let monitor = HeartbeatMonitor::spawn(WINDOW, cancel.clone());
        let mut missed = monitor.subscribe();

        drop(monitor); // tick sender gone, subscriber still listening

        advance(21).await;
        advance(20).await;
        assert_eq!(drain(&mut missed), vec![0, 1]);

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_monitor_stops_emitting() {
        let cancel = CancellationToken::new();
        let monitor = HeartbeatMonitor::spawn(WINDOW, cancel.clone());
        let mut missed = monitor.subscribe();

        cancel.cancel();
        advance(100).await;
        assert!(drain(&mut missed).is_empty());
    }
}
