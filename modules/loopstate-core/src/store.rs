//! The serialized event loop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::actor::Actor;
use crate::broadcast::{EffectBroadcast, StateBroadcast};
use crate::error::StoreError;
use crate::logger::Logger;
use crate::reducer::Reducer;
use crate::transition::Transition;

/// Owns one state and applies events to it one at a time.
///
/// accept → reduce → publish state (if changed) → publish effects → run
/// commands on the actor. Events emitted by the actor go back through the
/// same queue. Reduction is serialized; actor executions run concurrently
/// with the loop and with each other.
///
/// `Store` is a cheap handle: clones share the same loop. When the last
/// handle is dropped the loop and all actor work are cancelled.
pub struct Store<E, S, Ef, C>
where
    E: Send + 'static,
    S: Clone + PartialEq + Send + 'static,
    Ef: Clone + Send + 'static,
    C: Send + 'static,
{
    shared: Arc<Shared<E, S, Ef, C>>,
    _lifetime: Arc<DropGuard>,
}

struct Shared<E, S, Ef, C> {
    reducer: Box<dyn Reducer<E, S, Ef, C>>,
    actor: Box<dyn Actor<C, E>>,
    logger: Logger,
    states: StateBroadcast<S>,
    effects: EffectBroadcast<Ef>,
    inbox: mpsc::UnboundedSender<E>,
    /// Present until the first `start()`.
    pending: Mutex<Option<Pending<E>>>,
    /// Held for the whole of one reduction.
    serial: Mutex<()>,
    started: AtomicBool,
    stopped: AtomicBool,
    lifetime: CancellationToken,
    tasks: TaskTracker,
}

struct Pending<E> {
    inbox: mpsc::UnboundedReceiver<E>,
    start_event: Option<E>,
}

impl<E, S, Ef, C> Store<E, S, Ef, C>
where
    E: Send + 'static,
    S: Clone + PartialEq + Send + 'static,
    Ef: Clone + Send + 'static,
    C: Send + 'static,
{
    pub fn new(
        initial_state: S,
        reducer: impl Reducer<E, S, Ef, C>,
        actor: impl Actor<C, E>,
    ) -> Self {
        Self::builder(initial_state, reducer, actor).build()
    }

    pub fn builder(
        initial_state: S,
        reducer: impl Reducer<E, S, Ef, C>,
        actor: impl Actor<C, E>,
    ) -> StoreBuilder<E, S, Ef, C> {
        StoreBuilder {
            initial_state,
            reducer: Box::new(reducer),
            actor: Box::new(actor),
            start_event: None,
            logger: Logger::default(),
        }
    }

    /// Launch the loop. The start event given at construction, if any, is
    /// applied before events accepted earlier. Calling it again is a no-op;
    /// a stopped store cannot be restarted.
    ///
    /// Outside a tokio runtime the store is not started and the failure is
    /// reported at `Severity::Fatal`.
    pub fn start(&self) -> &Self {
        self.launch(None)
    }

    /// Like [`Store::start`], with a start event that overrides the one given
    /// at construction.
    pub fn start_with(&self, start_event: E) -> &Self {
        self.launch(Some(start_event))
    }

    fn launch(&self, start_event: Option<E>) -> &Self {
        let Ok(runtime) = Handle::try_current() else {
            self.shared
                .logger
                .fatal("start() called outside a tokio runtime", None);
            return self;
        };
        let mut pending = self.shared.pending.lock();
        let Some(Pending {
            inbox,
            start_event: configured,
        }) = pending.take()
        else {
            if self.is_stopped() {
                self.shared
                    .logger
                    .nonfatal("start() on a stopped store is not supported", None);
            } else {
                self.shared.logger.debug("start() on a running store ignored");
            }
            return self;
        };

        self.shared.started.store(true, Ordering::SeqCst);
        let shared = self.shared.clone();
        runtime.spawn(run(shared, inbox, start_event.or(configured)));
        info!("store started");
        self
    }

    /// Cancel all actor work, halt the queue and close both streams for
    /// current subscribers. Idempotent. Once this returns no further
    /// reduction happens.
    pub fn stop(&self) {
        // Waits for an in-flight reduction to finish publishing.
        let _serial = self.shared.serial.lock();
        if self.shared.halt() {
            info!("store stopped");
        }
    }

    /// Enqueue an event without waiting for it to be reduced.
    ///
    /// Events accepted before `start()` are queued; events accepted after
    /// `stop()` are dropped.
    pub fn accept(&self, event: E) {
        if let Err(e) = self.try_accept(event) {
            self.shared.logger.debug(&format!("event dropped: {e}"));
        }
    }

    pub fn try_accept(&self, event: E) -> Result<(), StoreError> {
        if self.is_stopped() {
            return Err(StoreError::Stopped);
        }
        self.shared
            .inbox
            .send(event)
            .map_err(|_| StoreError::Stopped)
    }

    /// Snapshot of the latest applied state.
    pub fn current_state(&self) -> S {
        self.shared.states.current()
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// The current state, then every distinct state applied afterwards.
    /// Ends when the store stops.
    pub fn states(&self) -> BoxStream<'static, S> {
        self.shared.states.subscribe()
    }

    /// Effects published after subscribing. Ends when the store stops.
    pub fn effects(&self) -> BoxStream<'static, Ef> {
        self.shared.effects.subscribe()
    }

    /// Number of actor executions still running.
    pub fn in_flight(&self) -> usize {
        self.shared.tasks.len()
    }
}

impl<E, S, Ef, C> Clone for Store<E, S, Ef, C>
where
    E: Send + 'static,
    S: Clone + PartialEq + Send + 'static,
    Ef: Clone + Send + 'static,
    C: Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            _lifetime: self._lifetime.clone(),
        }
    }
}

pub struct StoreBuilder<E, S, Ef, C> {
    initial_state: S,
    reducer: Box<dyn Reducer<E, S, Ef, C>>,
    actor: Box<dyn Actor<C, E>>,
    start_event: Option<E>,
    logger: Logger,
}

impl<E, S, Ef, C> StoreBuilder<E, S, Ef, C>
where
    E: Send + 'static,
    S: Clone + PartialEq + Send + 'static,
    Ef: Clone + Send + 'static,
    C: Send + 'static,
{
    /// Event applied first when the store starts.
    pub fn start_event(mut self, event: E) -> Self {
        self.start_event = Some(event);
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Store<E, S, Ef, C> {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let lifetime = CancellationToken::new();
        let shared = Shared {
            reducer: self.reducer,
            actor: self.actor,
            logger: self.logger,
            states: StateBroadcast::new(self.initial_state),
            effects: EffectBroadcast::new(),
            inbox: inbox_tx,
            pending: Mutex::new(Some(Pending {
                inbox: inbox_rx,
                start_event: self.start_event,
            })),
            serial: Mutex::new(()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            lifetime: lifetime.clone(),
            tasks: TaskTracker::new(),
        };

        Store {
            shared: Arc::new(shared),
            _lifetime: Arc::new(lifetime.drop_guard()),
        }
    }
}

impl<E, S, Ef, C> Shared<E, S, Ef, C>
where
    E: Send + 'static,
    S: Clone + PartialEq + Send + 'static,
    Ef: Clone + Send + 'static,
    C: Send + 'static,
{
    /// Apply one event. Returns `false` when the loop must exit.
    ///
    /// Commands are handed to the actor after the reduction lock is released,
    /// so an actor may call back into the store.
    fn apply(&self, event: E) -> bool {
        let commands = {
            let serial = self.serial.lock();
            if self.lifetime.is_cancelled() {
                return false;
            }

            let current = self.states.current();
            let reduced = panic::catch_unwind(AssertUnwindSafe(|| {
                self.reducer.reduce(event, &current)
            }))
            .unwrap_or_else(|payload| {
                Err(anyhow!("reducer panicked: {}", panic_message(&*payload)))
            });

            let Transition {
                state,
                effects,
                commands,
            } = match reduced {
                Ok(transition) => transition,
                Err(e) => {
                    self.halt();
                    drop(serial);
                    let error = anyhow::Error::new(StoreError::Reduce(e));
                    self.logger.fatal("reduction failed, store stopped", Some(&error));
                    return false;
                }
            };

            let changed = self.states.publish(state);
            debug!(
                changed,
                effects = effects.len(),
                commands = commands.len(),
                "event reduced"
            );
            for effect in effects {
                self.effects.publish(effect);
            }
            commands
        };

        for command in commands {
            self.dispatch(command);
        }
        true
    }

    fn dispatch(&self, command: C) {
        if self.lifetime.is_cancelled() {
            return;
        }
        let execution = panic::catch_unwind(AssertUnwindSafe(|| self.actor.execute(command)));
        let mut events = match execution {
            Ok(events) => events,
            Err(payload) => {
                let error = anyhow!("actor panicked: {}", panic_message(&*payload));
                self.logger
                    .nonfatal("actor failed, command abandoned", Some(&error));
                return;
            }
        };
        let inbox = self.inbox.clone();
        let token = self.lifetime.child_token();
        let logger = self.logger.clone();

        self.tasks.spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    next = events.next() => next,
                };
                match next {
                    Some(Ok(event)) => {
                        if token.is_cancelled() || inbox.send(event).is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        logger.nonfatal("actor failed, command abandoned", Some(&e));
                        break;
                    }
                    None => break,
                }
            }
        });
    }

    /// Returns `false` if the store was already stopped. Callers hold `serial`.
    fn halt(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.lifetime.cancel();
        self.started.store(false, Ordering::SeqCst);
        // Drops events queued before a start() that never came.
        self.pending.lock().take();
        self.tasks.close();
        self.states.close();
        self.effects.close();
        true
    }
}

async fn run<E, S, Ef, C>(
    shared: Arc<Shared<E, S, Ef, C>>,
    mut inbox: mpsc::UnboundedReceiver<E>,
    start_event: Option<E>,
) where
    E: Send + 'static,
    S: Clone + PartialEq + Send + 'static,
    Ef: Clone + Send + 'static,
    C: Send + 'static,
{
    if let Some(event) = start_event {
        if !shared.apply(event) {
            return;
        }
    }

    loop {
        let event = tokio::select! {
            biased;
            _ = shared.lifetime.cancelled() => break,
            event = inbox.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        if !shared.apply(event) {
            break;
        }
    }
    debug!("store loop exited");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
