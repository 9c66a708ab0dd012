//! # Tickwatch Store
//!
//! Client-side state for the tickwatch dashboard.
//!
//! Each store owns its state exclusively and publishes snapshots through a
//! [`tokio::sync::watch`] channel. Readers either clone a consistent
//! snapshot or subscribe for updates.
//!
//! | Store | Holds |
//! |-------|-------|
//! | [`WatchlistStore`] | Tracked assets (persisted) and their latest prices (memory only) |
//! | [`ChartStore`] | One candlestick series plus modal/fullscreen mode |
//! | [`SearchStore`] | Latest stock and crypto hits plus query history |

pub mod chart;
pub mod error;
pub mod search;
pub mod storage;
pub mod watchlist;

pub use chart::{ChartState, ChartStore, DEFAULT_MAX_DATA_AGE};
pub use error::{StorageError, StoreError};
pub use search::{SearchState, SearchStore, MAX_HISTORY};
pub use storage::{
    JsonFileWatchlistStorage, MemoryWatchlistStorage, PersistedWatchlistEntry, StorageFuture,
    WatchlistStorage, WATCHLIST_FILE_VERSION,
};
pub use watchlist::{WatchlistItem, WatchlistState, WatchlistStore};

/// What happened to the result of an asynchronous store fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result (or its error) was written to the store.
    Applied,
    /// The store moved on to another selection before the result arrived.
    Discarded,
    /// Nothing to fetch.
    Idle,
}
