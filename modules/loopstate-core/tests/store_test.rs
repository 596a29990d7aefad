//! Behaviour of the store loop: ordering, coalescing, effect broadcast,
//! command feedback, lifecycle and failure handling.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use loopstate_core::actor::{self, ActorStream};
use loopstate_core::{Actor, NoOpActor, Store, StoreError, Switcher, Transition};
use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Test model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct State {
    value: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Event {
    value: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Effect {
    value: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Command {
    value: i32,
}

type TestStore = Store<Event, State, Effect, Command>;
type Step = Result<Transition<State, Effect, Command>>;

fn state(value: i32) -> State {
    State { value }
}

fn event(value: i32) -> Event {
    Event { value }
}

fn effect(value: i32) -> Effect {
    Effect { value }
}

fn store<R>(reducer: R, actor: impl Actor<Command, Event>) -> TestStore
where
    R: Fn(Event, &State) -> Step + Send + Sync + 'static,
{
    Store::new(State::default(), reducer, actor)
}

fn set_value(event: Event, _state: &State) -> Step {
    Ok(Transition::new(state(event.value)))
}

fn effect_per_event(event: Event, state: &State) -> Step {
    Ok(Transition::new(*state).with_effect(effect(event.value)))
}

/// Let every ready task run to completion (paused clock advances past idle).
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Sets a flag when dropped; lets a test observe stream cancellation.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn ticking(every: Duration, guard: DropFlag) -> ActorStream<Event> {
    actor::events(stream::unfold(guard, move |guard| async move {
        tokio::time::sleep(every).await;
        Some((event(1), guard))
    }))
}

// =========================================================================
// States
// =========================================================================

#[tokio::test(start_paused = true)]
async fn current_state_reflects_accepted_event() {
    let store = store(set_value, NoOpActor::new());
    store.start();
    assert_eq!(store.current_state(), state(0));

    store.accept(event(10));
    settle().await;

    assert_eq!(store.current_state(), state(10));
    store.stop();
}

#[tokio::test(start_paused = true)]
async fn equal_state_is_not_emitted() {
    let store = store(set_value, NoOpActor::new());
    store.start();
    let states = store.states();

    store.accept(event(0));
    settle().await;
    store.stop();

    assert_eq!(states.collect::<Vec<_>>().await, vec![state(0)]);
}

#[tokio::test(start_paused = true)]
async fn actor_events_are_fed_back_in_order() {
    let store = store(
        |event: Event, _state: &State| {
            let next = (event.value > 0).then(|| Command {
                value: event.value - 1,
            });
            Ok(Transition::new(state(event.value)).with_command_opt(next))
        },
        |command: Command| actor::events(stream::iter([event(command.value)])),
    );
    store.start();
    let states = store.states();

    store.accept(event(3));
    settle().await;
    store.stop();

    assert_eq!(
        states.collect::<Vec<_>>().await,
        vec![state(0), state(3), state(2), state(1), state(0)]
    );
}

#[tokio::test(start_paused = true)]
async fn stopping_ends_state_updates() {
    let store = store(
        |_event: Event, current: &State| {
            Ok(Transition::new(state(current.value + 1)).with_command(Command::default()))
        },
        |_command: Command| {
            actor::once(async {
                tokio::time::sleep(Duration::from_millis(1000)).await;
                Ok::<_, anyhow::Error>(Event::default())
            })
        },
    );
    store.start();
    let states = store.states();

    store.accept(Event::default());
    tokio::time::sleep(Duration::from_millis(3500)).await;
    store.stop();

    assert_eq!(
        states.collect::<Vec<_>>().await,
        vec![state(0), state(1), state(2), state(3), state(4)]
    );

    // The pending command is cancelled and never lands.
    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert_eq!(store.current_state(), state(4));
    assert_eq!(store.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn every_state_subscriber_sees_the_full_sequence() {
    let store = store(set_value, NoOpActor::new());
    store.start();
    let first = store.states();
    let second = store.states();

    for value in [1, 2, 2, 3] {
        store.accept(event(value));
    }
    settle().await;
    let late = store.states();
    store.stop();

    let expected = vec![state(0), state(1), state(2), state(3)];
    assert_eq!(first.collect::<Vec<_>>().await, expected);
    assert_eq!(second.collect::<Vec<_>>().await, expected);
    assert_eq!(late.collect::<Vec<_>>().await, vec![state(3)]);
}

#[tokio::test(start_paused = true)]
async fn states_after_stop_replay_last_state_then_end() {
    let store = store(set_value, NoOpActor::new());
    store.start();
    store.accept(event(8));
    settle().await;
    store.stop();

    assert_eq!(store.states().collect::<Vec<_>>().await, vec![state(8)]);
    assert!(store.effects().collect::<Vec<_>>().await.is_empty());
}

// =========================================================================
// Effects
// =========================================================================

#[tokio::test(start_paused = true)]
async fn collects_all_emitted_effects() {
    let store = store(effect_per_event, NoOpActor::new());
    store.start();
    let effects = store.effects();

    store.accept(event(1));
    store.accept(event(-1));
    settle().await;
    store.stop();

    assert_eq!(
        effects.collect::<Vec<_>>().await,
        vec![effect(1), effect(-1)]
    );
}

#[tokio::test(start_paused = true)]
async fn effect_emitted_before_subscribing_is_lost() {
    let store = store(effect_per_event, NoOpActor::new());
    store.start();

    store.accept(event(1));
    settle().await;
    let effects = store.effects();
    store.accept(event(-1));
    settle().await;
    store.stop();

    assert_eq!(effects.collect::<Vec<_>>().await, vec![effect(-1)]);
}

#[tokio::test(start_paused = true)]
async fn duplicate_effects_in_one_transition_are_both_delivered() {
    let store = store(
        |event: Event, current: &State| {
            Ok(Transition::new(*current).with_effects([effect(event.value), effect(event.value)]))
        },
        NoOpActor::new(),
    );
    store.start();
    let effects = store.effects();

    store.accept(event(1));
    settle().await;
    store.stop();

    assert_eq!(effects.collect::<Vec<_>>().await, vec![effect(1), effect(1)]);
}

#[tokio::test(start_paused = true)]
async fn every_effect_subscriber_receives_every_effect() {
    let store = store(effect_per_event, NoOpActor::new());
    store.start();
    let first = store.effects();
    let second = store.effects();

    store.accept(event(1));
    store.accept(event(-1));
    settle().await;
    store.stop();

    let expected = vec![effect(1), effect(-1)];
    assert_eq!(first.collect::<Vec<_>>().await, expected);
    assert_eq!(second.collect::<Vec<_>>().await, expected);
}

#[tokio::test(start_paused = true)]
async fn equal_effects_from_separate_events_are_not_deduplicated() {
    let store = store(effect_per_event, NoOpActor::new());
    store.start();
    let effects = store.effects();

    store.accept(event(1));
    store.accept(event(1));
    settle().await;
    store.stop();

    assert_eq!(effects.collect::<Vec<_>>().await, vec![effect(1), effect(1)]);
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_final() {
    let store = store(set_value, NoOpActor::new());
    store.start();
    store.accept(event(1));
    store.stop();
    settle().await;

    assert!(!store.is_started());
    assert!(store.is_stopped());

    store.stop();
    store.start();
    assert!(!store.is_started());

    store.accept(event(5));
    settle().await;
    assert!(matches!(store.try_accept(event(6)), Err(StoreError::Stopped)));
    assert_ne!(store.current_state(), state(5));
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent() {
    let applied = Arc::new(AtomicUsize::new(0));
    let counter = applied.clone();
    let store: TestStore = Store::builder(
        State::default(),
        move |event: Event, _state: &State| -> Step {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Transition::new(state(event.value)))
        },
        NoOpActor::new(),
    )
    .start_event(event(1))
    .build();

    store.start().start();
    settle().await;

    assert_eq!(applied.load(Ordering::SeqCst), 1);
    store.stop();
}

#[tokio::test(start_paused = true)]
async fn start_event_runs_before_events_accepted_earlier() {
    let store: TestStore = Store::builder(State::default(), set_value, NoOpActor::new())
        .start_event(event(5))
        .build();
    let states = store.states();

    store.accept(event(7));
    settle().await;
    assert_eq!(store.current_state(), state(0));

    store.start();
    settle().await;
    store.stop();

    assert_eq!(
        states.collect::<Vec<_>>().await,
        vec![state(0), state(5), state(7)]
    );
}

#[tokio::test(start_paused = true)]
async fn start_with_overrides_configured_start_event() {
    let store: TestStore = Store::builder(State::default(), set_value, NoOpActor::new())
        .start_event(event(5))
        .build();

    store.start_with(event(9));
    settle().await;

    assert_eq!(store.current_state(), state(9));
    store.stop();
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_infinite_actor_work() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    let store = store(
        |event: Event, current: &State| {
            let next = Transition::new(state(current.value + event.value));
            Ok(if current.value == 0 {
                next.with_command(Command::default())
            } else {
                next
            })
        },
        move |_command: Command| {
            ticking(Duration::from_millis(100), DropFlag(flag.clone()))
        },
    );
    store.start();
    store.accept(event(1));

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(store.current_state(), state(4));
    assert_eq!(store.in_flight(), 1);

    store.stop();
    let frozen = store.current_state();
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert_eq!(store.current_state(), frozen);
    assert!(cancelled.load(Ordering::SeqCst));
    assert_eq!(store.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_cancels_actor_work() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    let store = store(
        |_event: Event, current: &State| {
            Ok(Transition::new(*current).with_command(Command::default()))
        },
        move |_command: Command| {
            ticking(Duration::from_millis(100), DropFlag(flag.clone()))
        },
    );
    store.start();
    store.accept(event(0));
    settle().await;

    drop(store);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(cancelled.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_switched_actor_work() {
    let switcher = Switcher::new();
    let actor_switcher = switcher.clone();
    let store = store(
        |event: Event, current: &State| {
            let next = Transition::new(state(current.value + event.value));
            Ok(if current.value == 0 {
                next.with_command(Command::default())
            } else {
                next
            })
        },
        move |_command: Command| -> ActorStream<Event> {
            actor::events(actor_switcher.switch(Duration::from_millis(50), || {
                stream::unfold((), |()| async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Some((event(1), ()))
                })
            }))
        },
    );
    store.start();
    store.accept(event(1));

    // Ticks land at 150, 250 and 350ms.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.current_state(), state(4));
    assert!(switcher.is_occupied());
    assert_eq!(store.in_flight(), 1);

    store.stop();
    let frozen = store.current_state();
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert_eq!(store.current_state(), frozen);
    assert!(!switcher.is_occupied());
    assert_eq!(store.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn actor_may_stop_the_store_while_executing() {
    let handle: Arc<Mutex<Option<TestStore>>> = Arc::new(Mutex::new(None));
    let slot = handle.clone();
    let store = store(
        |event: Event, _state: &State| {
            Ok(Transition::new(state(event.value)).with_command(Command::default()))
        },
        move |_command: Command| -> ActorStream<Event> {
            if let Some(store) = slot.lock().as_ref() {
                store.stop();
            }
            stream::empty().boxed()
        },
    );
    *handle.lock() = Some(store.clone());
    store.start();

    store.accept(event(3));
    settle().await;

    assert!(store.is_stopped());
    assert_eq!(store.current_state(), state(3));
    handle.lock().take();
}

#[test]
fn start_outside_a_runtime_leaves_store_unstarted() {
    let store = store(set_value, NoOpActor::new());
    store.start();

    assert!(!store.is_started());
    assert!(!store.is_stopped());
}

// =========================================================================
// Failures
// =========================================================================

#[tokio::test(start_paused = true)]
async fn reducer_failure_stops_store_and_keeps_last_state() {
    let store = store(
        |event: Event, _state: &State| {
            if event.value < 0 {
                anyhow::bail!("negative value {}", event.value);
            }
            Ok(Transition::new(state(event.value)))
        },
        NoOpActor::new(),
    );
    store.start();
    let states = store.states();

    store.accept(event(1));
    store.accept(event(-1));
    store.accept(event(2));
    settle().await;

    assert!(store.is_stopped());
    assert_eq!(store.current_state(), state(1));
    assert_eq!(
        states.collect::<Vec<_>>().await,
        vec![state(0), state(1)]
    );
}

#[tokio::test(start_paused = true)]
async fn reducer_panic_stops_store_and_ends_streams() {
    let store = store(
        |event: Event, _state: &State| {
            assert!(event.value >= 0, "negative value {}", event.value);
            Ok(Transition::new(state(event.value)))
        },
        NoOpActor::new(),
    );
    store.start();
    let states = store.states();
    let effects = store.effects();

    store.accept(event(1));
    store.accept(event(-1));
    settle().await;

    assert!(store.is_stopped());
    assert!(!store.is_started());
    assert_eq!(store.current_state(), state(1));
    assert!(matches!(store.try_accept(event(2)), Err(StoreError::Stopped)));
    assert_eq!(
        states.collect::<Vec<_>>().await,
        vec![state(0), state(1)]
    );
    assert!(effects.collect::<Vec<_>>().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn actor_panic_is_scoped_to_its_command() {
    let store = store(
        |event: Event, current: &State| {
            Ok(Transition::new(state(current.value + event.value))
                .with_command(Command { value: event.value }))
        },
        |command: Command| -> ActorStream<Event> {
            if command.value == 13 {
                panic!("unlucky command");
            }
            stream::empty().boxed()
        },
    );
    store.start();

    store.accept(event(13));
    settle().await;
    assert!(store.is_started());
    assert_eq!(store.current_state(), state(13));

    store.accept(event(2));
    settle().await;
    assert_eq!(store.current_state(), state(15));
    assert_eq!(store.in_flight(), 0);
    store.stop();
}

#[tokio::test(start_paused = true)]
async fn actor_failure_is_scoped_to_its_command() {
    let store = store(
        |event: Event, current: &State| {
            let next = Transition::new(state(current.value + event.value));
            Ok(match event.value {
                0 => next.with_commands([Command { value: 13 }, Command { value: 1 }]),
                _ => next,
            })
        },
        |command: Command| -> ActorStream<Event> {
            if command.value == 13 {
                stream::iter([Err(anyhow::anyhow!("unlucky")), Ok(event(100))]).boxed()
            } else {
                actor::events(stream::iter([event(command.value), event(command.value)]))
            }
        },
    );
    store.start();

    store.accept(event(0));
    settle().await;

    assert!(store.is_started());
    assert_eq!(store.current_state(), state(2));

    store.accept(event(5));
    settle().await;
    assert_eq!(store.current_state(), state(7));
    store.stop();
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_never_lose_a_reduction() {
    let store = store(
        |event: Event, current: &State| Ok(Transition::new(state(current.value + event.value))),
        NoOpActor::new(),
    );
    store.start();
    let mut states = store.states();

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..250 {
                    store.accept(event(1));
                }
            })
        })
        .collect();
    for caller in callers {
        caller.await.unwrap();
    }

    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        let mut last = 0;
        while let Some(next) = states.next().await {
            // Each reduction adds 1, so emissions are strictly increasing.
            assert_eq!(next.value, last + i32::from(next.value != 0));
            last = next.value;
            if last == 2000 {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();

    assert!(reached);
    store.stop();
}
