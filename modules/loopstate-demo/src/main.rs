use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use loopstate_core::{Config, StoreHost};

mod config;
mod search;

use config::DemoConfig;
use search::{search_store, Catalog, SearchActor, SearchEffect, SearchEvent};

const LANGUAGES: [&str; 10] = [
    "Rust", "Ruby", "Racket", "Python", "Go", "Haskell", "Elm", "Erlang", "Elixir", "Kotlin",
];

const KEYSTROKE_INTERVAL: Duration = Duration::from_millis(120);
const CATALOG_LATENCY: Duration = Duration::from_millis(150);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("loopstate_core=info".parse()?)
                .add_directive("loopstate_demo=info".parse()?),
        )
        .init();

    let engine_config = Config::from_env();
    let demo_config = DemoConfig::from_env()?;
    info!(
        profile = ?engine_config.log_profile,
        debounce_ms = demo_config.debounce.as_millis() as u64,
        queries = demo_config.queries.len(),
        "Starting search demo"
    );

    let catalog = Arc::new(Catalog::new(LANGUAGES, CATALOG_LATENCY));
    let actor = SearchActor::new(catalog.clone(), demo_config.debounce);
    let host = StoreHost::owning(search_store(actor, engine_config.logger()));
    let store = host.store().clone();

    let mut states = store.states();
    let render = tokio::spawn(async move {
        while let Some(state) = states.next().await {
            info!(
                query = %state.query,
                loading = state.loading,
                results = ?state.results,
                "render"
            );
        }
    });

    let mut effects = store.effects();
    let notify = tokio::spawn(async move {
        while let Some(effect) = effects.next().await {
            match effect {
                SearchEffect::NoMatches(query) => info!(%query, "No matches"),
                SearchEffect::ShowError(reason) => warn!(%reason, "Search failed"),
            }
        }
    });

    for query in &demo_config.queries {
        store.accept(SearchEvent::QueryChanged(query.clone()));
        tokio::time::sleep(KEYSTROKE_INTERVAL).await;
    }
    tokio::time::sleep(demo_config.debounce + CATALOG_LATENCY * 2).await;

    let last = store.current_state();
    info!(
        query = %last.query,
        results = last.results.len(),
        searches = catalog.searches(),
        "Demo complete"
    );

    drop(store);
    host.destroy();
    render.await?;
    notify.await?;
    Ok(())
}
