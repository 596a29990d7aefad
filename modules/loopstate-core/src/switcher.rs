//! Single-slot supervisor for overlapping asynchronous work.
//!
//! A `Switcher` holds at most one active task. Starting a new one cancels the
//! previous occupant first, which is how a debounced search drops a stale
//! request:
//!
//! ```ignore
//! let search = Switcher::new();
//!
//! // Inside an actor, for every keystroke:
//! search.switch(Duration::from_millis(300), move || fetch_results(query))
//! ```
//!
//! Every `switch` or `cancel` takes a fresh generation when it is first
//! polled. Delayed work only fires while its generation is still the newest,
//! so a later call always wins over an earlier one still waiting out its delay.

use std::future::{self, Future};
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::stream::{self as futures_stream, BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Default)]
struct Slot {
    generation: u64,
    occupant: Option<(u64, CancellationToken)>,
}

impl Slot {
    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn evict(&mut self) {
        if let Some((generation, token)) = self.occupant.take() {
            trace!(generation, "switcher slot evicted");
            token.cancel();
        }
    }
}

/// Frees the slot when a switched stream completes or is dropped.
struct Release {
    slot: Arc<Mutex<Slot>>,
    generation: u64,
    token: CancellationToken,
}

impl Drop for Release {
    fn drop(&mut self) {
        self.token.cancel();
        let mut slot = self.slot.lock();
        if matches!(slot.occupant, Some((generation, _)) if generation == self.generation) {
            slot.occupant = None;
        }
    }
}

/// Cloning a `Switcher` shares its slot.
#[derive(Clone, Default)]
pub struct Switcher {
    slot: Arc<Mutex<Slot>>,
}

impl Switcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` in the slot after `delay`, cancelling the current occupant.
    ///
    /// Nothing happens until the returned stream is polled. Dropping the
    /// stream cancels the work and empties the slot.
    pub fn switch<T, F, St>(&self, delay: Duration, action: F) -> BoxStream<'static, T>
    where
        T: Send + 'static,
        F: FnOnce() -> St + Send + 'static,
        St: Stream<Item = T> + Send + 'static,
    {
        let slot = self.slot.clone();
        stream! {
            let token = CancellationToken::new();
            let generation = {
                let mut guard = slot.lock();
                guard.evict();
                let generation = guard.next_generation();
                guard.occupant = Some((generation, token.clone()));
                generation
            };
            let _release = Release {
                slot: slot.clone(),
                generation,
                token: token.clone(),
            };

            let cancelled = if delay.is_zero() {
                false
            } else {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => true,
                    _ = tokio::time::sleep(delay) => false,
                }
            };
            // A later cancel() may have taken over while we were waiting.
            let superseded = cancelled || slot.lock().generation != generation;

            if superseded {
                trace!(generation, "switch superseded before start");
            } else {
                let mut inner = Box::pin(action());
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = token.cancelled() => None,
                        item = inner.next() => item,
                    };
                    match next {
                        Some(item) => yield item,
                        None => break,
                    }
                }
            }
        }
        .boxed()
    }

    /// Single-value form of [`Switcher::switch`].
    pub fn switch_once<T, F, Fut>(&self, delay: Duration, action: F) -> BoxStream<'static, T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.switch(delay, move || futures_stream::once(action()))
    }

    /// Resolve with the first element of a switched action, cancelling the
    /// rest of it. `None` when the action was superseded or produced nothing.
    pub fn first<T, F, St>(
        &self,
        delay: Duration,
        action: F,
    ) -> impl Future<Output = Option<T>> + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce() -> St + Send + 'static,
        St: Stream<Item = T> + Send + 'static,
    {
        let mut switched = self.switch(delay, action);
        async move { switched.next().await }
    }

    /// Cancel the occupant after `delay`, unless a newer `switch` or `cancel`
    /// arrives first. The returned stream never yields; it exists so an actor
    /// can return it as its event stream.
    pub fn cancel<T>(&self, delay: Duration) -> BoxStream<'static, T>
    where
        T: Send + 'static,
    {
        let slot = self.slot.clone();
        let cancellation = async move {
            let generation = slot.lock().next_generation();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut guard = slot.lock();
            if guard.generation == generation {
                guard.evict();
            } else {
                trace!(generation, "cancel superseded");
            }
        };
        futures_stream::once(cancellation)
            .filter_map(|()| future::ready(None))
            .boxed()
    }

    /// Whether a task currently holds the slot (waiting or running).
    pub fn is_occupied(&self) -> bool {
        self.slot.lock().occupant.is_some()
    }
}
