//! Multi-subscriber feeds with bounded replay.
//!
//! A [`ReplayBuffer`] fans every published item out to live subscribers
//! immediately and retains recent items so a late subscriber can catch
//! up. Retention is bounded jointly by item count and age: an item
//! leaves the replay set as soon as either bound is exceeded.
//!
//! Live delivery uses [`tokio::sync::broadcast`], so a subscriber that
//! cannot keep up lags and resumes at the newest item -- it may miss
//! intermediate values but never observes corrupted state. Ages are
//! measured with [`tokio::time::Instant`], which follows the paused
//! clock in tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::model::Timestamped;

struct Entry<T> {
    inserted: Instant,
    item: T,
}

/// Bounded-replay publish feed. See the module docs.
pub struct ReplayBuffer<T> {
    // Lock covers retention *and* subscription so a subscriber never
    // misses or double-sees an item published concurrently.
    inner: Mutex<VecDeque<Entry<T>>>,
    tx: broadcast::Sender<T>,
    window: Duration,
    capacity: usize,
}

impl<T: Clone + Send + 'static> ReplayBuffer<T> {
    /// Create a buffer retaining at most `capacity` items, each for at
    /// most `window`.
    pub fn new(window: Duration, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Mutex::new(VecDeque::new()),
            tx,
            window,
            capacity,
        }
    }

    /// Publish one item: retain it and fan it out to live subscribers.
    /// Never blocks.
    pub fn publish(&self, item: T) {
        let mut inner = self.inner.lock().expect("replay buffer poisoned");
        inner.push_back(Entry {
            inserted: Instant::now(),
            item: item.clone(),
        });
        Self::evict(&mut inner, self.window, self.capacity);
        let _ = self.tx.send(item);
    }

    /// Snapshot the retained history (oldest first) and subscribe to
    /// everything published from this point on.
    pub fn subscribe(&self) -> (Vec<T>, broadcast::Receiver<T>) {
        let mut inner = self.inner.lock().expect("replay buffer poisoned");
        Self::evict(&mut inner, self.window, self.capacity);
        let history = inner.iter().map(|e| e.item.clone()).collect();
        (history, self.tx.subscribe())
    }

    /// Number of items currently replayable.
    pub fn retained(&self) -> usize {
        let mut inner = self.inner.lock().expect("replay buffer poisoned");
        Self::evict(&mut inner, self.window, self.capacity);
        inner.len()
    }

    fn evict(inner: &mut VecDeque<Entry<T>>, window: Duration, capacity: usize) {
        let now = Instant::now();
        // Sorted inserts can place fresh entries ahead of expired ones,
        // so the age bound scans the whole deque, not just the front.
        inner.retain(|e| now.duration_since(e.inserted) <= window);
        while inner.len() > capacity {
            inner.pop_front();
        }
    }
}

impl<T: Clone + Send + Timestamped + 'static> ReplayBuffer<T> {
    /// Publish keeping retained history in ascending timestamp order.
    ///
    /// Fan-out to live subscribers still happens in arrival order; the
    /// sorted insert protects what late subscribers replay when items
    /// were stamped out of order.
    pub fn publish_ordered(&self, item: T) {
        let mut inner = self.inner.lock().expect("replay buffer poisoned");
        let position = inner
            .iter()
            .rposition(|e| e.item.timestamp() <= item.timestamp())
            .map_or(0, |i| i + 1);
        inner.insert(
            position,
            Entry {
                inserted: Instant::now(),
                item: item.clone(),
            },
        );
        Self::evict(&mut inner, self.window, self.capacity);
        let _ = self.tx.send(item);
    }
}
