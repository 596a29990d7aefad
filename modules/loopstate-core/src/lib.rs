//! Unidirectional state engine.
//!
//! Provides a serialized event loop: reduce → publish state → publish effects
//! → dispatch commands. Commands run concurrently on actors and the events they
//! produce re-enter the same loop, so only event *application* is serialized.
//!
//! Consumers define their domain by implementing `Reducer` (pure transitions)
//! and `Actor` (side-effectful command execution that emits new events).
//! `Switcher` supervises "cancel the previous, start the new" work inside
//! actors and can be used on its own.

pub mod actor;
mod broadcast;
pub mod config;
pub mod error;
pub mod host;
pub mod logger;
pub mod reducer;
pub mod store;
pub mod switcher;
pub mod transition;

pub use actor::{Actor, ActorStream, FutureActor, NoOpActor};
pub use config::{Config, LogProfile};
pub use error::StoreError;
pub use host::StoreHost;
pub use logger::{Crash, IgnoreLog, LogStrategy, Logger, Severity, TracingLog};
pub use reducer::{NoOpReducer, Reducer};
pub use store::{Store, StoreBuilder};
pub use switcher::Switcher;
pub use transition::Transition;
