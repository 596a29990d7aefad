//! Lifecycle binding for whatever owns a store (a screen, a session, a
//! request scope).
//!
//! The host is handed its store explicitly; nothing is created lazily.

use crate::store::Store;

/// Ties a store's `start()`/`stop()` to the host's own lifetime.
pub struct StoreHost<E, S, Ef, C>
where
    E: Send + 'static,
    S: Clone + PartialEq + Send + 'static,
    Ef: Clone + Send + 'static,
    C: Send + 'static,
{
    store: Store<E, S, Ef, C>,
    owns: bool,
}

impl<E, S, Ef, C> StoreHost<E, S, Ef, C>
where
    E: Send + 'static,
    S: Clone + PartialEq + Send + 'static,
    Ef: Clone + Send + 'static,
    C: Send + 'static,
{
    /// Attach and start `store`; it is stopped when the host is destroyed.
    pub fn owning(store: Store<E, S, Ef, C>) -> Self {
        store.start();
        Self { store, owns: true }
    }

    /// Attach to a store someone else starts and stops.
    pub fn borrowing(store: Store<E, S, Ef, C>) -> Self {
        Self { store, owns: false }
    }

    pub fn store(&self) -> &Store<E, S, Ef, C> {
        &self.store
    }

    pub fn owns_store(&self) -> bool {
        self.owns
    }

    /// End of the host's lifecycle. Same as dropping it.
    pub fn destroy(self) {}
}

impl<E, S, Ef, C> Drop for StoreHost<E, S, Ef, C>
where
    E: Send + 'static,
    S: Clone + PartialEq + Send + 'static,
    Ef: Clone + Send + 'static,
    C: Send + 'static,
{
    fn drop(&mut self) {
        if self.owns {
            self.store.stop();
        }
    }
}
