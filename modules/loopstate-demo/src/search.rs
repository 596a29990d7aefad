//! Debounced search. Every keystroke supersedes the search still pending or
//! running for the previous one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use loopstate_core::{Actor, ActorStream, Logger, Store, Switcher, Transition};
use tracing::debug;

pub type SearchStore = Store<SearchEvent, SearchState, SearchEffect, SearchCommand>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchState {
    pub query: String,
    pub results: Vec<String>,
    pub loading: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    QueryChanged(String),
    ResultsLoaded { query: String, results: Vec<String> },
    SearchFailed { query: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchEffect {
    NoMatches(String),
    ShowError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchCommand {
    Search(String),
    CancelSearch,
}

pub fn reduce(
    event: SearchEvent,
    state: &SearchState,
) -> Result<Transition<SearchState, SearchEffect, SearchCommand>> {
    let transition = match event {
        SearchEvent::QueryChanged(query) if query.trim().is_empty() => {
            Transition::new(SearchState::default()).with_command(SearchCommand::CancelSearch)
        }
        SearchEvent::QueryChanged(query) => Transition::new(SearchState {
            query: query.clone(),
            results: state.results.clone(),
            loading: true,
        })
        .with_command(SearchCommand::Search(query)),
        // Answers for a query the user already moved past.
        SearchEvent::ResultsLoaded { query, .. } | SearchEvent::SearchFailed { query, .. }
            if query != state.query =>
        {
            debug!(%query, "stale search result ignored");
            Transition::new(state.clone())
        }
        SearchEvent::ResultsLoaded { query, results } => {
            let no_matches = results
                .is_empty()
                .then(|| SearchEffect::NoMatches(query.clone()));
            Transition::new(SearchState {
                query,
                results,
                loading: false,
            })
            .with_effects(no_matches)
        }
        SearchEvent::SearchFailed { reason, .. } => Transition::new(SearchState {
            loading: false,
            ..state.clone()
        })
        .with_effect(SearchEffect::ShowError(reason)),
    };
    Ok(transition)
}

/// In-memory stand-in for a search backend.
pub struct Catalog {
    entries: Vec<String>,
    latency: Duration,
    searches: AtomicUsize,
}

impl Catalog {
    pub fn new(entries: impl IntoIterator<Item = impl Into<String>>, latency: Duration) -> Self {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
            latency,
            searches: AtomicUsize::new(0),
        }
    }

    /// Case-insensitive prefix match. Queries containing `!` are rejected.
    pub async fn search(&self, query: &str) -> Result<Vec<String>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        if query.contains('!') {
            bail!("unsupported query syntax: {query}");
        }
        let needle = query.to_lowercase();
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.to_lowercase().starts_with(&needle))
            .cloned()
            .collect())
    }

    /// Number of searches that actually reached the catalog.
    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

pub struct SearchActor {
    catalog: Arc<Catalog>,
    debounce: Duration,
    switcher: Switcher,
}

impl SearchActor {
    pub fn new(catalog: Arc<Catalog>, debounce: Duration) -> Self {
        Self {
            catalog,
            debounce,
            switcher: Switcher::new(),
        }
    }
}

impl Actor<SearchCommand, SearchEvent> for SearchActor {
    fn execute(&self, command: SearchCommand) -> ActorStream<SearchEvent> {
        match command {
            SearchCommand::Search(query) => {
                let catalog = self.catalog.clone();
                self.switcher.switch_once(self.debounce, move || async move {
                    // Failures become events so the reducer can show them.
                    let event = match catalog.search(&query).await {
                        Ok(results) => SearchEvent::ResultsLoaded { query, results },
                        Err(e) => SearchEvent::SearchFailed {
                            query,
                            reason: e.to_string(),
                        },
                    };
                    Ok::<_, anyhow::Error>(event)
                })
            }
            SearchCommand::CancelSearch => self.switcher.cancel(Duration::ZERO),
        }
    }
}

pub fn search_store(actor: SearchActor, logger: Logger) -> SearchStore {
    Store::builder(SearchState::default(), reduce, actor)
        .logger(logger)
        .build()
}
