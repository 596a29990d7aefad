//! Command execution.

use std::future::Future;
use std::marker::PhantomData;

use anyhow::Result;
use futures::stream::{self, BoxStream, Stream, StreamExt};

/// Lazily produced events of one command execution.
///
/// An `Err` item ends that execution; it never stops the store.
pub type ActorStream<E> = BoxStream<'static, Result<E>>;

/// Converts a command into a cold, possibly infinite, stream of events.
///
/// The store may have many executions in flight at once, so implementations
/// must not assume one call finishes before the next begins.
pub trait Actor<C, E>: Send + Sync + 'static {
    fn execute(&self, command: C) -> ActorStream<E>;
}

impl<C, E, F> Actor<C, E> for F
where
    F: Fn(C) -> ActorStream<E> + Send + Sync + 'static,
{
    fn execute(&self, command: C) -> ActorStream<E> {
        self(command)
    }
}

/// Completes immediately without emitting anything.
pub struct NoOpActor<C> {
    _phantom: PhantomData<fn(C)>,
}

impl<C> NoOpActor<C> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<C> Default for NoOpActor<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static, E: Send + 'static> Actor<C, E> for NoOpActor<C> {
    fn execute(&self, _command: C) -> ActorStream<E> {
        stream::empty().boxed()
    }
}

/// Lift an infallible stream into an actor stream.
pub fn events<E, St>(events: St) -> ActorStream<E>
where
    E: Send + 'static,
    St: Stream<Item = E> + Send + 'static,
{
    events.map(Ok).boxed()
}

/// Lift a one-shot future into a single-element actor stream.
pub fn once<E, Fut>(future: Fut) -> ActorStream<E>
where
    E: Send + 'static,
    Fut: Future<Output = Result<E>> + Send + 'static,
{
    stream::once(future).boxed()
}

/// Adapts a future-returning executor into an `Actor` that emits exactly one
/// event (or one failure) per command.
pub struct FutureActor<F> {
    execute: F,
}

impl<F> FutureActor<F> {
    pub fn new(execute: F) -> Self {
        Self { execute }
    }
}

impl<C, E, F, Fut> Actor<C, E> for FutureActor<F>
where
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<E>> + Send + 'static,
    E: Send + 'static,
{
    fn execute(&self, command: C) -> ActorStream<E> {
        once((self.execute)(command))
    }
}
