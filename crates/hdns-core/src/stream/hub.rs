//! Multicast fan-out with latest-value replay
//!
//! One lifecycle manager publishes, any number of [`MessageStream`]s
//! consume. A new subscriber first receives the most recent payload and then
//! everything published after it subscribed, with no gap and no duplicate.

use crate::error::StreamError;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

type Item<T> = Result<T, StreamError>;

pub(crate) struct MessageHub<T> {
    resource: String,
    inner: Mutex<HubInner<T>>,
    /// Number of live [`MessageStream`]s
    subscribers: Arc<watch::Sender<usize>>,
}

struct HubInner<T> {
    latest: Option<T>,
    /// `None` once the hub completed or failed
    tx: Option<broadcast::Sender<Item<T>>>,
}

impl<T> MessageHub<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn new(resource: impl Into<String>, capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let (subscribers, _) = watch::channel(0);
        Arc::new(Self {
            resource: resource.into(),
            inner: Mutex::new(HubInner {
                latest: None,
                tx: Some(tx),
            }),
            subscribers: Arc::new(subscribers),
        })
    }

    /// Receiver tracking the number of live subscribers
    pub(crate) fn demand(&self) -> watch::Receiver<usize> {
        self.subscribers.subscribe()
    }

    /// Most recently published payload
    pub(crate) fn latest(&self) -> Option<T> {
        self.lock().latest.clone()
    }

    pub(crate) fn subscribe(&self) -> MessageStream<T> {
        let guard = SubscriberGuard::new(Arc::clone(&self.subscribers));

        let inner = self.lock();
        let stream: Pin<Box<dyn Stream<Item = Item<T>> + Send>> = match inner.tx.as_ref() {
            Some(tx) => {
                let replay = tokio_stream::iter(inner.latest.clone().map(Ok));
                let resource = self.resource.clone();
                let live = BroadcastStream::new(tx.subscribe()).filter_map(move |item| match item {
                    Ok(item) => Some(item),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(
                            resource = %resource,
                            skipped,
                            "Subscriber lagging behind, skipped payloads"
                        );
                        None
                    }
                });
                Box::pin(replay.chain(live))
            }
            None => Box::pin(tokio_stream::empty()),
        };
        drop(inner);

        MessageStream {
            inner: stream,
            _guard: guard,
        }
    }

    pub(crate) fn publish(&self, value: T) {
        let mut inner = self.lock();
        if let Some(tx) = inner.tx.as_ref() {
            // No subscribers is fine; the value is still kept for replay.
            let _ = tx.send(Ok(value.clone()));
            inner.latest = Some(value);
        }
    }

    /// Deliver a terminal error to every subscriber and end their streams
    pub(crate) fn fail(&self, error: StreamError) {
        let mut inner = self.lock();
        if let Some(tx) = inner.tx.take() {
            let _ = tx.send(Err(error));
        }
    }

    /// End every subscriber's stream
    pub(crate) fn complete(&self) {
        self.lock().tx = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct SubscriberGuard {
    subscribers: Arc<watch::Sender<usize>>,
}

impl SubscriberGuard {
    fn new(subscribers: Arc<watch::Sender<usize>>) -> Self {
        subscribers.send_modify(|count| *count += 1);
        Self { subscribers }
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.subscribers
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// One subscription to a stream's decoded payloads
///
/// Yields `Ok(payload)` items in transport order. If the stream gives up,
/// a single `Err` is yielded before the stream ends. Dropping the last
/// subscription of a handle closes the live socket until someone subscribes
/// again.
pub struct MessageStream<T> {
    inner: Pin<Box<dyn Stream<Item = Item<T>> + Send>>,
    _guard: SubscriberGuard,
}

impl<T> Stream for MessageStream<T> {
    type Item = Item<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

impl<T> std::fmt::Debug for MessageStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_subscriber_gets_latest_then_live_values() {
        let hub = MessageHub::new("test", 8);
        let mut early = hub.subscribe();

        hub.publish(1);
        hub.publish(2);

        let mut late = hub.subscribe();
        hub.publish(3);
        hub.complete();

        let early_items: Vec<_> = (&mut early).collect().await;
        let late_items: Vec<_> = (&mut late).collect().await;
        assert_eq!(early_items, vec![Ok(1), Ok(2), Ok(3)]);
        assert_eq!(late_items, vec![Ok(2), Ok(3)]);
    }

    #[tokio::test]
    async fn failure_reaches_every_subscriber_once() {
        let hub: Arc<MessageHub<u8>> = MessageHub::new("test", 8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        let error = StreamError::Fatal("gone".to_string());
        hub.fail(error.clone());
        hub.fail(StreamError::Fatal("again".to_string()));

        assert_eq!(a.next().await, Some(Err(error.clone())));
        assert_eq!(a.next().await, None);
        assert_eq!(b.next().await, Some(Err(error)));
        assert_eq!(b.next().await, None);
    }

    #[tokio::test]
    async fn subscriber_count_follows_stream_lifetimes() {
        let hub: Arc<MessageHub<u8>> = MessageHub::new("test", 8);
        let demand = hub.demand();
        assert_eq!(*demand.borrow(), 0);

        let first = hub.subscribe();
        let second = hub.subscribe();
        assert_eq!(*demand.borrow(), 2);

        drop(first);
        drop(second);
        assert_eq!(*demand.borrow(), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_instead_of_failing() {
        let hub = MessageHub::new("test", 2);
        let mut slow = hub.subscribe();
        for value in 0..5 {
            hub.publish(value);
        }
        hub.complete();

        let items: Vec<_> = (&mut slow).collect().await;
        assert_eq!(items, vec![Ok(3), Ok(4)]);
    }
}
