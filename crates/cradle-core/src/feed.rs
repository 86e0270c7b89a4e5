// ── Reactive event feeds ──
//
// Subscription type handed out by the monitor facade: the retained
// history at subscription time plus live delivery of everything after.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

/// A subscription to one typed event feed.
///
/// Carries the snapshot of retained items captured at subscription time
/// and receives every item published afterwards, via [`recv`](Self::recv)
/// or by converting to a `Stream`.
pub struct Feed<T> {
    history: Vec<T>,
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone + Send + 'static> Feed<T> {
    pub(crate) fn new(history: Vec<T>, receiver: broadcast::Receiver<T>) -> Self {
        Self { history, receiver }
    }

    /// Items retained when the subscription was created, oldest first.
    pub fn history(&self) -> &[T] {
        &self.history
    }

    /// Wait for the next live item. Returns `None` once the feed's
    /// producer is gone. A slow consumer that falls behind skips to the
    /// oldest item still buffered rather than erroring out.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(item) => return Some(item),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "feed consumer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    /// The history snapshot is dropped; only live items are yielded.
    pub fn into_stream(self) -> FeedStream<T> {
        FeedStream {
            inner: BroadcastStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter over a feed's live side. Lagged gaps are skipped.
pub struct FeedStream<T> {
    inner: BroadcastStream<T>,
}

impl<T: Clone + Send + 'static> Stream for FeedStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(item))) => return Poll::Ready(Some(item)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!(skipped, "feed stream lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
