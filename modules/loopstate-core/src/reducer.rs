//! Pure state transitions.

use std::marker::PhantomData;

use anyhow::Result;

use crate::transition::Transition;

/// Pure state updates. No I/O, no side effects.
///
/// Called once per dequeued event, never concurrently with another call on
/// the same store. Returning `Err` is treated as fatal by the store: it is
/// shut down and keeps the last applied state.
pub trait Reducer<E, S, Ef, C>: Send + Sync + 'static {
    fn reduce(&self, event: E, state: &S) -> Result<Transition<S, Ef, C>>;
}

impl<E, S, Ef, C, F> Reducer<E, S, Ef, C> for F
where
    F: Fn(E, &S) -> Result<Transition<S, Ef, C>> + Send + Sync + 'static,
{
    fn reduce(&self, event: E, state: &S) -> Result<Transition<S, Ef, C>> {
        self(event, state)
    }
}

/// Ignores every event and keeps the state as it is.
pub struct NoOpReducer<E> {
    _phantom: PhantomData<fn(E)>,
}

impl<E> NoOpReducer<E> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<E> Default for NoOpReducer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, S, Ef, C> Reducer<E, S, Ef, C> for NoOpReducer<E>
where
    E: 'static,
    S: Clone + 'static,
{
    fn reduce(&self, _event: E, state: &S) -> Result<Transition<S, Ef, C>> {
        Ok(Transition::new(state.clone()))
    }
}
