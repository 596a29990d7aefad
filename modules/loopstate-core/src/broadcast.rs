//! Multicast channels behind the store's `states()` and `effects()`.
//!
//! Each subscriber gets its own unbounded queue, so a slow subscriber never
//! loses elements and never holds back the others.

use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

struct Subscribers<T> {
    senders: Vec<UnboundedSender<T>>,
    closed: bool,
}

impl<T: Clone> Subscribers<T> {
    fn new() -> Self {
        Self {
            senders: Vec::new(),
            closed: false,
        }
    }

    /// Deliver to every live subscriber, forgetting the ones that went away.
    fn send(&mut self, value: &T) {
        self.senders
            .retain(|tx| tx.unbounded_send(value.clone()).is_ok());
    }

    fn close(&mut self) {
        self.closed = true;
        self.senders.clear();
    }
}

struct StateInner<T> {
    latest: T,
    subscribers: Subscribers<T>,
}

/// Stateful multicast: new subscribers first receive the latest value, and
/// consecutive equal values are coalesced.
pub(crate) struct StateBroadcast<T> {
    inner: Mutex<StateInner<T>>,
}

impl<T> StateBroadcast<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub(crate) fn new(initial: T) -> Self {
        Self {
            inner: Mutex::new(StateInner {
                latest: initial,
                subscribers: Subscribers::new(),
            }),
        }
    }

    pub(crate) fn current(&self) -> T {
        self.inner.lock().latest.clone()
    }

    /// Replace the latest value. Returns `false` (and emits nothing) when
    /// `next` equals the current value.
    pub(crate) fn publish(&self, next: T) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.latest == next {
            return false;
        }
        inner.latest = next;
        inner.subscribers.send(&inner.latest);
        true
    }

    /// Latest value first, then every distinct value published afterwards.
    /// After `close` the stream yields the latest value once and ends.
    pub(crate) fn subscribe(&self) -> BoxStream<'static, T> {
        let mut inner = self.inner.lock();
        let (tx, rx) = unbounded();
        // Seeding under the lock keeps the replayed value and live updates gap-free.
        let _ = tx.unbounded_send(inner.latest.clone());
        if !inner.subscribers.closed {
            inner.subscribers.senders.push(tx);
        }
        rx.boxed()
    }

    pub(crate) fn close(&self) {
        self.inner.lock().subscribers.close();
    }
}

/// Stateless multicast: subscribers only see values published after they
/// subscribed. No replay, no deduplication.
pub(crate) struct EffectBroadcast<T> {
    subscribers: Mutex<Subscribers<T>>,
}

impl<T> EffectBroadcast<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Mutex::new(Subscribers::new()),
        }
    }

    pub(crate) fn publish(&self, value: T) {
        self.subscribers.lock().send(&value);
    }

    /// After `close` the stream ends immediately.
    pub(crate) fn subscribe(&self) -> BoxStream<'static, T> {
        let mut subscribers = self.subscribers.lock();
        if subscribers.closed {
            return stream::empty().boxed();
        }
        let (tx, rx) = unbounded();
        subscribers.senders.push(tx);
        rx.boxed()
    }

    pub(crate) fn close(&self) {
        self.subscribers.lock().close();
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().senders.len()
    }
}
