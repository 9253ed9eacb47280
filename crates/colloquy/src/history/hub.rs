//! Replay-then-live fan-out of published messages.
//!
//! ```text
//!                         ┌─ inbox (bounded) ─▶ delivery task ─▶ sink ─▶ Subscription
//! publish ─▶ [history] ───┼─ inbox (bounded) ─▶ delivery task ─▶ sink ─▶ Subscription
//!                         └─ ...
//! ```
//!
//! One mutex guards both the history and the subscriber registry, so
//! "snapshot the history and register" and "append and enqueue" never
//! interleave. A subscriber therefore sees every message exactly once: the
//! ones published before it registered in its replay, the rest live.
//!
//! Publishing only ever does a non-blocking `try_send` into each inbox. The
//! potentially slow hand-off to the consumer happens on the subscriber's own
//! delivery task, so a stalled consumer can never hold up the publisher or
//! its peers. A subscriber whose inbox fills up is disconnected.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use crate::{Error, Message};

/// Identifier handed out by [`HistoryHub::subscribe`]. Never reused.
pub type SubscriberId = u64;

/// Default per-subscriber buffer, in messages.
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

/// Tuning for a [`HistoryHub`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Messages a subscriber may fall behind before it is disconnected.
    /// Also the size of its outbound channel.
    pub buffer_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl HubConfig {
    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }
}

struct SubscriberEntry {
    inbox: mpsc::Sender<Message>,
    delivery: AbortHandle,
}

#[derive(Default)]
struct Registry {
    history: Vec<Message>,
    subscribers: HashMap<SubscriberId, SubscriberEntry>,
    next_id: SubscriberId,
    closed: bool,
}

struct HubInner {
    registry: Mutex<Registry>,
    capacity: usize,
}

impl HubInner {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(&self, id: SubscriberId) -> bool {
        let entry = self.lock().subscribers.remove(&id);
        match entry {
            Some(entry) => {
                entry.delivery.abort();
                debug!("Subscriber {id} removed");
                true
            }
            None => false,
        }
    }
}

/// Append-only message history with any number of live observers.
///
/// Cloning is cheap and yields another handle to the same hub.
///
/// All methods that register subscribers spawn a delivery task and must be
/// called from within a Tokio runtime.
#[derive(Clone)]
pub struct HistoryHub {
    inner: Arc<HubInner>,
}

impl std::fmt::Debug for HistoryHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.inner.lock();
        f.debug_struct("HistoryHub")
            .field("history_len", &registry.history.len())
            .field("subscribers", &registry.subscribers.len())
            .field("closed", &registry.closed)
            .finish()
    }
}

impl Default for HistoryHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl HistoryHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                registry: Mutex::new(Registry::default()),
                capacity: config.buffer_capacity.max(1),
            }),
        }
    }

    /// Register a new observer.
    ///
    /// With `replay`, the subscription first yields every message published
    /// so far, in order, then continues with live messages. Without it, only
    /// messages published after this call are delivered.
    pub fn subscribe(&self, replay: bool) -> Result<Subscription, Error> {
        let capacity = self.inner.capacity;
        let (inbox_tx, inbox_rx) = mpsc::channel(capacity);
        let (sink_tx, sink_rx) = mpsc::channel(capacity);

        let (id, replay_len) = {
            let mut registry = self.inner.lock();
            if registry.closed {
                return Err(Error::HubClosed);
            }
            let id = registry.next_id;
            registry.next_id += 1;

            let snapshot = if replay {
                registry.history.clone()
            } else {
                Vec::new()
            };
            let replay_len = snapshot.len();
            let task = tokio::spawn(deliver(id, snapshot, inbox_rx, sink_tx));
            registry.subscribers.insert(
                id,
                SubscriberEntry {
                    inbox: inbox_tx,
                    delivery: task.abort_handle(),
                },
            );
            (id, replay_len)
        };

        debug!("Subscriber {id} registered (replaying {replay_len} message(s))");
        Ok(Subscription {
            id,
            receiver: sink_rx,
            hub: Arc::downgrade(&self.inner),
        })
    }

    /// Append `message` to the history and hand it to every subscriber.
    ///
    /// Never blocks on a subscriber. Subscribers whose buffer is full are
    /// disconnected, subscribers whose consumer has gone away are removed.
    pub fn publish(&self, message: Message) -> Result<(), Error> {
        let mut registry = self.inner.lock();
        if registry.closed {
            return Err(Error::HubClosed);
        }
        registry.history.push(message.clone());

        let mut stale = Vec::new();
        for (id, entry) in &registry.subscribers {
            match entry.inbox.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Subscriber {id} fell {} messages behind, disconnecting",
                        self.inner.capacity
                    );
                    stale.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Subscriber {id} went away, removing");
                    stale.push(*id);
                }
            }
        }
        for id in stale {
            if let Some(entry) = registry.subscribers.remove(&id) {
                entry.delivery.abort();
            }
        }
        trace!(
            "Published message {} from {} to {} subscriber(s)",
            registry.history.len(),
            message.from,
            registry.subscribers.len()
        );
        Ok(())
    }

    /// Remove a subscriber and close its stream. Returns whether it was
    /// still registered; unknown or already-removed ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.remove(id)
    }

    /// Refuse further publishes and subscribes and close every subscription.
    ///
    /// Each subscription still yields what was published before the
    /// shutdown, then ends.
    pub fn shutdown(&self) {
        let drained: Vec<(SubscriberId, SubscriberEntry)> = {
            let mut registry = self.inner.lock();
            if registry.closed {
                return;
            }
            registry.closed = true;
            registry.subscribers.drain().collect()
        };
        // Dropping the inboxes lets each delivery task flush and exit.
        debug!("History hub shut down ({} subscriber(s) closed)", drained.len());
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Copy of everything published so far.
    pub fn history(&self) -> Vec<Message> {
        self.inner.lock().history.clone()
    }

    /// Number of messages published so far.
    pub fn len(&self) -> usize {
        self.inner.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-subscriber delivery: drain the replay snapshot, then forward live
/// messages. Ends when either side goes away.
async fn deliver(
    id: SubscriberId,
    replay: Vec<Message>,
    mut inbox: mpsc::Receiver<Message>,
    sink: mpsc::Sender<Message>,
) {
    for message in replay {
        if sink.send(message).await.is_err() {
            trace!("Subscriber {id} dropped during replay");
            return;
        }
    }
    while let Some(message) = inbox.recv().await {
        if sink.send(message).await.is_err() {
            trace!("Subscriber {id} dropped");
            return;
        }
    }
}

// ── Subscription ───────────────────────────────────────────────────

/// The consumer end of a [`HistoryHub`] subscription.
///
/// Yields messages in publication order. Ends (returns `None`) once the
/// subscriber has been removed, disconnected for lagging, or the hub has
/// shut down. Dropping it unsubscribes.
///
/// Also usable as a [`Stream`] of [`Message`]s.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Message>,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next message. `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Take a message if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}

impl std::fmt::Debug for HubInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubInner")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::time::timeout;

    fn msg(i: usize) -> Message {
        Message::new("A", format!("m{i}"))
    }

    async fn next(sub: &mut Subscription) -> Option<Message> {
        timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("timed out waiting for message")
    }

    #[tokio::test]
    async fn replay_then_live_without_gaps_or_duplicates() {
        let hub = HistoryHub::default();
        for i in 0..3 {
            hub.publish(msg(i)).unwrap();
        }
        let mut sub = hub.subscribe(true).unwrap();
        for i in 3..5 {
            hub.publish(msg(i)).unwrap();
        }

        let mut got = Vec::new();
        for _ in 0..5 {
            got.push(next(&mut sub).await.unwrap().content);
        }
        assert_eq!(got, vec!["m0", "m1", "m2", "m3", "m4"]);
        assert!(sub.try_recv().is_none());
        assert_eq!(hub.len(), 5);
    }

    #[tokio::test]
    async fn live_only_subscription_skips_history() {
        let hub = HistoryHub::default();
        hub.publish(msg(0)).unwrap();
        let mut sub = hub.subscribe(false).unwrap();
        hub.publish(msg(1)).unwrap();
        assert_eq!(next(&mut sub).await.unwrap().content, "m1");
    }

    #[tokio::test]
    async fn publish_without_subscribers_only_records() {
        let hub = HistoryHub::default();
        hub.publish(msg(0)).unwrap();
        hub.publish(msg(1)).unwrap();
        assert_eq!(hub.subscriber_count(), 0);
        let contents: Vec<String> = hub.history().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["m0", "m1"]);
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_without_affecting_others() {
        let hub = HistoryHub::new(HubConfig::default().with_buffer_capacity(4));
        let mut fast = hub.subscribe(true).unwrap();
        let slow = hub.subscribe(true).unwrap();

        for i in 0..20 {
            hub.publish(msg(i)).unwrap();
            assert_eq!(next(&mut fast).await.unwrap().content, format!("m{i}"));
        }

        // The slow consumer never reads: its sink and inbox fill up (4 + 4 plus
        // one in flight) and the next publish disconnects it.
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(hub.len(), 20);
        drop(slow);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_closes_the_stream() {
        let hub = HistoryHub::default();
        let mut sub = hub.subscribe(true).unwrap();
        let id = sub.id();
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert!(!hub.unsubscribe(9_999));
        assert_eq!(hub.subscriber_count(), 0);

        hub.publish(msg(0)).unwrap();
        assert!(next(&mut sub).await.is_none());
    }

    #[tokio::test]
    async fn dropping_a_subscription_unsubscribes() {
        let hub = HistoryHub::default();
        let a = hub.subscribe(true).unwrap();
        let _b = hub.subscribe(true).unwrap();
        assert_eq!(hub.subscriber_count(), 2);
        drop(a);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn subscriber_ids_are_unique() {
        let hub = HistoryHub::default();
        let a = hub.subscribe(false).unwrap();
        let b = hub.subscribe(false).unwrap();
        let a_id = a.id();
        drop(a);
        let c = hub.subscribe(false).unwrap();
        assert_ne!(a_id, b.id());
        assert_ne!(a_id, c.id());
        assert_ne!(b.id(), c.id());
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_messages_before_ending() {
        let hub = HistoryHub::default();
        let mut sub = hub.subscribe(false).unwrap();
        for i in 0..10 {
            hub.publish(msg(i)).unwrap();
        }
        hub.shutdown();
        let mut got = Vec::new();
        while let Some(m) = next(&mut sub).await {
            got.push(m.content);
        }
        assert_eq!(got.len(), 10);
        assert_eq!(got[9], "m9");
    }

    #[tokio::test]
    async fn shutdown_ends_streams_and_rejects_new_work() {
        let hub = HistoryHub::default();
        let mut sub = hub.subscribe(true).unwrap();
        hub.shutdown();
        assert!(hub.is_closed());
        assert!(next(&mut sub).await.is_none());
        assert!(matches!(hub.publish(msg(0)), Err(Error::HubClosed)));
        assert!(matches!(hub.subscribe(true), Err(Error::HubClosed)));
        // Idempotent.
        hub.shutdown();
    }

    #[tokio::test]
    async fn subscription_is_a_stream() {
        let hub = HistoryHub::default();
        for i in 0..3 {
            hub.publish(msg(i)).unwrap();
        }
        let sub = hub.subscribe(true).unwrap();
        let got: Vec<String> = sub.take(3).map(|m| m.content).collect().await;
        assert_eq!(got, vec!["m0", "m1", "m2"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn late_subscriber_sees_every_message_exactly_once() {
        const TOTAL: usize = 300;
        let hub = HistoryHub::new(HubConfig::default().with_buffer_capacity(1_024));

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for i in 0..TOTAL {
                    hub.publish(msg(i)).unwrap();
                    if i % 10 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        // Join at an arbitrary point while publishing is under way.
        tokio::task::yield_now().await;
        let mut sub = hub.subscribe(true).unwrap();

        let mut got = Vec::with_capacity(TOTAL);
        while got.len() < TOTAL {
            got.push(next(&mut sub).await.unwrap().content);
        }
        publisher.await.unwrap();

        let expected: Vec<String> = (0..TOTAL).map(|i| format!("m{i}")).collect();
        assert_eq!(got, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_unsubscribe_and_publish_do_not_interfere() {
        let hub = HistoryHub::default();
        let mut keeper = hub.subscribe(true).unwrap();

        let churn = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    let sub = hub.subscribe(true).unwrap();
                    tokio::task::yield_now().await;
                    hub.unsubscribe(sub.id());
                }
            })
        };
        for i in 0..100 {
            hub.publish(msg(i)).unwrap();
            tokio::task::yield_now().await;
        }
        churn.await.unwrap();

        for i in 0..100 {
            assert_eq!(next(&mut keeper).await.unwrap().content, format!("m{i}"));
        }
        assert_eq!(hub.subscriber_count(), 1);
    }
}
