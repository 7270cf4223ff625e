//! Per-channel subscriber registry and fan-out.
//!
//! Every subscriber owns a small bounded queue of frame batches, one batch per
//! producer read. [`ChannelBroadcaster::broadcast_batch`] only ever calls
//! `try_send`, so it never waits on a subscriber: a full queue (slow consumer)
//! or a closed queue (dead connection) gets that subscriber removed on the
//! spot, and the remaining subscribers are unaffected. A read that completes
//! many frames at once still occupies a single queue slot.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use framecast_frame::Frame;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, warn};

/// Identity of one subscriber within its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Frames completed by one producer read, shared by every subscriber.
type Batch = Arc<[Frame]>;

/// Outcome of one [`ChannelBroadcaster::broadcast_batch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers the batch was queued for.
    pub delivered: usize,
    /// Subscribers removed because delivery failed.
    pub dropped: usize,
}

/// Live subscriber set for one channel.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct ChannelBroadcaster {
    inner: Arc<Inner>,
}

struct Inner {
    channel: String,
    queue_depth: usize,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Batch>>>,
}

impl ChannelBroadcaster {
    /// Create an empty registry. `queue_depth` is clamped to at least 1.
    pub fn new(channel: impl Into<String>, queue_depth: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                channel: channel.into(),
                queue_depth: queue_depth.max(1),
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// Register a new subscriber.
    ///
    /// The subscriber sees every frame broadcast after this call returns and
    /// none broadcast before it. Dropping the returned handle unsubscribes.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.inner.queue_depth);
        let count = {
            let mut subscribers = self.lock();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        debug!(channel = %self.inner.channel, subscriber = %id, count, "subscribed");

        Subscription {
            id,
            receiver: rx,
            pending: VecDeque::new(),
            broadcaster: self.clone(),
        }
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.lock();
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };
        if removed {
            debug!(channel = %self.inner.channel, subscriber = %id, count, "unsubscribed");
        }
        removed
    }

    /// Queue a single frame for every current subscriber.
    pub fn broadcast(&self, frame: &Frame) -> BroadcastReport {
        self.broadcast_batch(vec![frame.clone()])
    }

    /// Queue `frames` as one batch for every current subscriber without
    /// waiting on any of them.
    ///
    /// Subscribers whose queue is full or closed are removed; their connection
    /// task sees its queue close and shuts the connection down. An empty batch
    /// is a no-op.
    pub fn broadcast_batch(&self, frames: Vec<Frame>) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        if frames.is_empty() {
            return report;
        }
        let batch: Batch = frames.into();
        let mut subscribers = self.lock();

        subscribers.retain(|id, tx| match tx.try_send(Arc::clone(&batch)) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                report.dropped += 1;
                warn!(
                    channel = %self.inner.channel,
                    subscriber = %id,
                    queue_depth = self.inner.queue_depth,
                    "subscriber too slow; dropping"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                report.dropped += 1;
                debug!(
                    channel = %self.inner.channel,
                    subscriber = %id,
                    "subscriber gone; dropping"
                );
                false
            }
        });

        report
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// True if `id` is currently registered.
    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.lock().contains_key(&id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<Batch>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ChannelBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBroadcaster")
            .field("channel", &self.inner.channel)
            .field("queue_depth", &self.inner.queue_depth)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// One subscriber's end of a channel.
///
/// Unsubscribes when dropped, so closing a connection task always removes
/// its registry entry.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Batch>,
    /// Rest of the batch currently being handed out.
    pending: VecDeque<Frame>,
    broadcaster: ChannelBroadcaster,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next frame. `None` once the broadcaster dropped this
    /// subscriber and everything already queued has been handed out.
    ///
    /// Cancel safe: no frame is lost if the future is dropped before it
    /// completes.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(frame);
            }
            let batch = self.receiver.recv().await?;
            self.pending.extend(batch.iter().cloned());
        }
    }

    /// Take a queued frame without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(frame);
            }
            match self.receiver.try_recv() {
                Ok(batch) => self.pending.extend(batch.iter().cloned()),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}
