//! The tracked asset list and its latest known prices.
//!
//! Item lifecycle: `absent -> present (no price) -> present (priced)`.
//! Persisting actions (`add`, `remove`, `clear`) write through the storage
//! collaborator first and only then touch memory; a storage failure leaves
//! the in-memory list as it was. They are serialized by a store-wide write
//! gate, so two concurrent adds of the same symbol yield exactly one entry.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tickwatch_core::{Asset, Clock, ErrorState, MarketApi, PriceData, UtcDateTime};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::storage::{PersistedWatchlistEntry, WatchlistStorage};
use crate::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistItem {
    pub asset: Asset,
    pub added_at: UtcDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<PriceData>,
}

impl WatchlistItem {
    pub fn from_persisted(entry: PersistedWatchlistEntry) -> Self {
        Self {
            asset: entry.asset,
            added_at: entry.added_at,
            current_price: None,
        }
    }

    pub fn to_persisted(&self) -> PersistedWatchlistEntry {
        PersistedWatchlistEntry {
            asset: self.asset.clone(),
            added_at: self.added_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistState {
    pub items: Vec<WatchlistItem>,
    pub loading: bool,
    pub error: Option<ErrorState>,
}

impl WatchlistState {
    pub fn find(&self, symbol: &str) -> Option<&WatchlistItem> {
        self.items.iter().find(|item| item.asset.matches_symbol(symbol))
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.find(symbol).is_some()
    }
}

pub struct WatchlistStore {
    storage: Arc<dyn WatchlistStorage>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<WatchlistState>,
    write_gate: Mutex<()>,
}

impl WatchlistStore {
    pub fn new(storage: Arc<dyn WatchlistStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            state: watch::Sender::new(WatchlistState::default()),
            write_gate: Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<WatchlistState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> WatchlistState {
        self.state.borrow().clone()
    }

    fn record_error(&self, error: &StoreError) {
        let state = error.to_error_state(self.clock.now());
        self.state.send_modify(|current| {
            current.loading = false;
            current.error = Some(state);
        });
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|current| current.error.take().is_some());
    }

    /// Appends `asset` unpriced. Fails on a duplicate symbol (ignoring case)
    /// or a storage failure; both are also recorded in the state.
    pub async fn add(&self, asset: Asset) -> Result<WatchlistItem, StoreError> {
        let _gate = self.write_gate.lock().await;

        if self.state.borrow().contains(&asset.symbol) {
            let error = StoreError::Duplicate {
                symbol: asset.symbol.clone(),
            };
            self.record_error(&error);
            return Err(error);
        }

        let item = WatchlistItem {
            asset,
            added_at: self.clock.now(),
            current_price: None,
        };
        if let Err(error) = self.storage.add(item.to_persisted()).await {
            warn!(symbol = %item.asset.symbol, %error, "failed to persist watchlist add");
            let error = StoreError::from(error);
            self.record_error(&error);
            return Err(error);
        }

        self.state.send_modify(|current| {
            current.items.push(item.clone());
            current.error = None;
        });
        info!(symbol = %item.asset.symbol, "added to watchlist");
        Ok(item)
    }

    /// Removes the item matching `symbol`. Returns whether one was present.
    pub async fn remove(&self, symbol: &str) -> Result<bool, StoreError> {
        let _gate = self.write_gate.lock().await;

        if let Err(error) = self.storage.remove(symbol).await {
            warn!(symbol, %error, "failed to persist watchlist removal");
            let error = StoreError::from(error);
            self.record_error(&error);
            return Err(error);
        }

        let mut removed = false;
        self.state.send_modify(|current| {
            let before = current.items.len();
            current.items.retain(|item| !item.asset.matches_symbol(symbol));
            removed = current.items.len() != before;
            current.error = None;
        });
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;

        if let Err(error) = self.storage.clear().await {
            warn!(%error, "failed to persist watchlist clear");
            let error = StoreError::from(error);
            self.record_error(&error);
            return Err(error);
        }

        self.state.send_modify(|current| {
            current.items.clear();
            current.error = None;
        });
        Ok(())
    }

    /// Replaces the list with the persisted one. On failure the previous
    /// list stays and the error is recorded; nothing is returned to the caller.
    pub async fn load(&self) {
        let _gate = self.write_gate.lock().await;
        self.state.send_modify(|current| current.loading = true);

        match self.storage.load().await {
            Ok(entries) => {
                debug!(entries = entries.len(), "watchlist loaded");
                let items = entries.into_iter().map(WatchlistItem::from_persisted).collect();
                self.state.send_modify(|current| {
                    current.items = items;
                    current.loading = false;
                    current.error = None;
                });
            }
            Err(error) => {
                warn!(%error, "failed to load watchlist; keeping last known list");
                self.record_error(&StoreError::from(error));
            }
        }
    }

    /// Sets the price of the matching item. In memory only.
    pub fn update_price(&self, symbol: &str, price: PriceData) -> bool {
        self.state.send_if_modified(|current| {
            match current
                .items
                .iter_mut()
                .find(|item| item.asset.matches_symbol(symbol))
            {
                Some(item) => {
                    item.current_price = Some(price);
                    true
                }
                None => false,
            }
        })
    }

    /// Applies several prices at once, publishing a single update. Returns
    /// how many items were priced.
    pub fn update_prices(&self, prices: HashMap<String, PriceData>) -> usize {
        let mut updated = 0;
        self.state.send_if_modified(|current| {
            for item in &mut current.items {
                let price = prices
                    .iter()
                    .find(|(symbol, _)| item.asset.matches_symbol(symbol))
                    .map(|(_, price)| price.clone());
                if let Some(price) = price {
                    item.current_price = Some(price);
                    updated += 1;
                }
            }
            updated > 0
        });
        updated
    }

    /// Fetches a fresh price for every item, one request at a time. Items
    /// whose fetch fails keep their previous price; the last failure is
    /// recorded in the state.
    pub async fn refresh_prices(&self, api: &dyn MarketApi) -> usize {
        let assets: Vec<Asset> = self
            .state
            .borrow()
            .items
            .iter()
            .map(|item| item.asset.clone())
            .collect();

        let mut prices = HashMap::with_capacity(assets.len());
        let mut last_error = None;
        for asset in assets {
            match api.details(&asset.symbol, asset.asset_type).await {
                Ok(details) => {
                    prices.insert(asset.symbol, details.price);
                }
                Err(error) => {
                    debug!(symbol = %asset.symbol, %error, "price refresh failed");
                    last_error = Some(StoreError::from(error));
                }
            }
        }

        let updated = self.update_prices(prices);
        if let Some(error) = last_error {
            self.record_error(&error);
        }
        updated
    }
}
