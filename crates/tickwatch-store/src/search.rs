//! Latest search results and recent query history.

use std::sync::Arc;

use serde::Serialize;
use tickwatch_core::{Asset, AssetType, Clock, ErrorState, MarketApi, SearchHit, SearchResults};
use tokio::sync::watch;
use tracing::debug;

use crate::FetchOutcome;

pub const MAX_HISTORY: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchState {
    pub query: String,
    pub stock_results: Vec<Asset>,
    pub crypto_results: Vec<Asset>,
    pub warnings: Vec<String>,
    pub loading: bool,
    pub error: Option<ErrorState>,
    /// Most recent first.
    pub history: Vec<String>,
}

impl SearchState {
    /// Stock hits then crypto hits, tagged with their origin.
    pub fn all_results(&self) -> Vec<SearchHit> {
        let stocks = self.stock_results.iter().map(|asset| SearchHit {
            origin: AssetType::Stock,
            asset: asset.clone(),
        });
        let crypto = self.crypto_results.iter().map(|asset| SearchHit {
            origin: AssetType::Crypto,
            asset: asset.clone(),
        });
        stocks.chain(crypto).collect()
    }
}

fn push_history(history: &mut Vec<String>, query: &str) -> bool {
    let query = query.trim();
    if query.is_empty() {
        return false;
    }
    let lowered = query.to_lowercase();
    history.retain(|entry| entry.to_lowercase() != lowered);
    history.insert(0, query.to_owned());
    history.truncate(MAX_HISTORY);
    true
}

pub struct SearchStore {
    clock: Arc<dyn Clock>,
    state: watch::Sender<SearchState>,
}

impl SearchStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: watch::Sender::new(SearchState::default()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SearchState {
        self.state.borrow().clone()
    }

    /// Replaces the query. A different query supersedes any search in
    /// flight, so the loading flag is cleared with it.
    pub fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.state.send_if_modified(|state| {
            if state.query == query {
                return false;
            }
            state.query = query;
            state.loading = false;
            true
        });
    }

    pub fn set_results(&self, results: SearchResults) {
        self.state.send_modify(|state| {
            state.stock_results = results.stocks;
            state.crypto_results = results.crypto;
            state.warnings = results.warnings;
            state.loading = false;
            state.error = None;
        });
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.loading != loading;
            state.loading = loading;
            changed
        });
    }

    pub fn set_error(&self, error: Option<ErrorState>) {
        self.state.send_modify(|state| {
            state.error = error;
            state.loading = false;
        });
    }

    /// Records `query` as the most recent search. Blank queries are ignored
    /// and an earlier entry differing only in case is replaced.
    pub fn add_to_history(&self, query: &str) {
        self.state.send_if_modified(|state| push_history(&mut state.history, query));
    }

    pub fn clear_history(&self) {
        self.state.send_if_modified(|state| {
            let changed = !state.history.is_empty();
            state.history.clear();
            changed
        });
    }

    pub fn clear_results(&self) {
        self.state.send_modify(|state| {
            state.query.clear();
            state.stock_results.clear();
            state.crypto_results.clear();
            state.warnings.clear();
            state.error = None;
            state.loading = false;
        });
    }

    pub fn all_results(&self) -> Vec<SearchHit> {
        self.state.borrow().all_results()
    }

    /// Runs `query` against both providers.
    ///
    /// Results arriving after the query was changed are dropped.
    pub async fn search(&self, api: &dyn MarketApi, query: &str) -> FetchOutcome {
        let query = query.trim().to_owned();
        if query.is_empty() {
            return FetchOutcome::Idle;
        }

        self.state.send_modify(|state| {
            state.query = query.clone();
            state.loading = true;
            state.error = None;
            push_history(&mut state.history, &query);
        });

        let result = api.search(&query).await;
        if self.state.borrow().query != query {
            debug!(%query, "discarding stale search response");
            return FetchOutcome::Discarded;
        }

        match result {
            Ok(results) => self.set_results(results),
            Err(error) => self.set_error(Some(error.to_error_state(self.clock.now()))),
        }
        FetchOutcome::Applied
    }
}
