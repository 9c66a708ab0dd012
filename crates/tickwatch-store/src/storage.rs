//! Persistence collaborators for the watchlist.
//!
//! Only `{ asset, addedAt }` pairs are persisted; prices are never written.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tickwatch_core::{Asset, UtcDateTime};
use tracing::debug;

use crate::StorageError;

pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// One persisted watchlist record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedWatchlistEntry {
    pub asset: Asset,
    pub added_at: UtcDateTime,
}

/// Client-local persistent watchlist.
pub trait WatchlistStorage: Send + Sync {
    /// Entries in insertion order.
    fn load(&self) -> StorageFuture<'_, Vec<PersistedWatchlistEntry>>;

    fn add(&self, entry: PersistedWatchlistEntry) -> StorageFuture<'_, ()>;

    /// Removes every entry whose symbol matches, ignoring case. Returns
    /// whether anything was removed.
    fn remove<'a>(&'a self, symbol: &'a str) -> StorageFuture<'a, bool>;

    fn clear(&self) -> StorageFuture<'_, ()>;
}

fn remove_matching(entries: &mut Vec<PersistedWatchlistEntry>, symbol: &str) -> bool {
    let before = entries.len();
    entries.retain(|entry| !entry.asset.matches_symbol(symbol));
    entries.len() != before
}

/// Process-memory storage; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryWatchlistStorage {
    entries: Mutex<Vec<PersistedWatchlistEntry>>,
}

impl MemoryWatchlistStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<PersistedWatchlistEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<PersistedWatchlistEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WatchlistStorage for MemoryWatchlistStorage {
    fn load(&self) -> StorageFuture<'_, Vec<PersistedWatchlistEntry>> {
        let entries = self.entries().clone();
        Box::pin(async move { Ok(entries) })
    }

    fn add(&self, entry: PersistedWatchlistEntry) -> StorageFuture<'_, ()> {
        self.entries().push(entry);
        Box::pin(async { Ok(()) })
    }

    fn remove<'a>(&'a self, symbol: &'a str) -> StorageFuture<'a, bool> {
        let removed = remove_matching(&mut self.entries(), symbol);
        Box::pin(async move { Ok(removed) })
    }

    fn clear(&self) -> StorageFuture<'_, ()> {
        self.entries().clear();
        Box::pin(async { Ok(()) })
    }
}

pub const WATCHLIST_FILE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct WatchlistDocument {
    version: u32,
    entries: Vec<PersistedWatchlistEntry>,
}

/// JSON file storage.
///
/// The file holds `{ "version": 1, "entries": [...] }`. Writes go to a
/// sibling temp file that is then renamed over the original. A missing file
/// reads as an empty watchlist.
#[derive(Debug)]
pub struct JsonFileWatchlistStorage {
    path: PathBuf,
    io: tokio::sync::Mutex<()>,
}

impl JsonFileWatchlistStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn read(&self) -> Result<Vec<PersistedWatchlistEntry>, StorageError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(self.io_error(error)),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let document: WatchlistDocument =
            serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        if document.version != WATCHLIST_FILE_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: document.version,
                expected: WATCHLIST_FILE_VERSION,
            });
        }
        Ok(document.entries)
    }

    async fn write(&self, entries: Vec<PersistedWatchlistEntry>) -> Result<(), StorageError> {
        let document = WatchlistDocument {
            version: WATCHLIST_FILE_VERSION,
            entries,
        };
        let body = serde_json::to_string_pretty(&document).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| self.io_error(error))?;
        }

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        tokio::fs::write(&temp, body)
            .await
            .map_err(|error| self.io_error(error))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|error| self.io_error(error))?;

        debug!(path = %self.path.display(), entries = document.entries.len(), "watchlist written");
        Ok(())
    }
}

impl WatchlistStorage for JsonFileWatchlistStorage {
    fn load(&self) -> StorageFuture<'_, Vec<PersistedWatchlistEntry>> {
        Box::pin(async move {
            let _io = self.io.lock().await;
            self.read().await
        })
    }

    fn add(&self, entry: PersistedWatchlistEntry) -> StorageFuture<'_, ()> {
        Box::pin(async move {
            let _io = self.io.lock().await;
            let mut entries = self.read().await?;
            entries.push(entry);
            self.write(entries).await
        })
    }

    fn remove<'a>(&'a self, symbol: &'a str) -> StorageFuture<'a, bool> {
        Box::pin(async move {
            let _io = self.io.lock().await;
            let mut entries = self.read().await?;
            if !remove_matching(&mut entries, symbol) {
                return Ok(false);
            }
            self.write(entries).await?;
            Ok(true)
        })
    }

    fn clear(&self) -> StorageFuture<'_, ()> {
        Box::pin(async move {
            let _io = self.io.lock().await;
            self.write(Vec::new()).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(symbol: &str) -> PersistedWatchlistEntry {
        PersistedWatchlistEntry {
            asset: Asset::stock(symbol, symbol).expect("valid asset"),
            added_at: UtcDateTime::parse("2024-06-01T12:00:00Z").expect("timestamp"),
        }
    }

    #[tokio::test]
    async fn memory_storage_keeps_insertion_order() {
        let storage = MemoryWatchlistStorage::new();
        storage.add(entry("MSFT")).await.expect("add");
        storage.add(entry("AAPL")).await.expect("add");

        let symbols: Vec<String> = storage
            .load()
            .await
            .expect("load")
            .into_iter()
            .map(|entry| entry.asset.symbol)
            .collect();
        assert_eq!(symbols, vec!["MSFT", "AAPL"]);

        assert!(storage.remove("msft").await.expect("remove"));
        assert!(!storage.remove("msft").await.expect("remove"));
    }

    #[tokio::test]
    async fn json_file_round_trips_entries() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("watchlist.json");
        let storage = JsonFileWatchlistStorage::new(&path);

        assert!(storage.load().await.expect("missing file is empty").is_empty());
        storage.add(entry("AAPL")).await.expect("add");
        storage.add(entry("NVDA")).await.expect("add");

        let reopened = JsonFileWatchlistStorage::new(&path);
        let entries = reopened.load().await.expect("load");
        assert_eq!(entries, vec![entry("AAPL"), entry("NVDA")]);

        let raw = std::fs::read_to_string(&path).expect("read file");
        let document: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(document["version"], 1);
        assert_eq!(document["entries"][0]["addedAt"], "2024-06-01T12:00:00Z");
        assert_eq!(document["entries"][0]["asset"]["assetType"], "stock");
        assert!(!dir.path().join("nested").join("watchlist.json.tmp").exists());
    }

    #[tokio::test]
    async fn json_file_rejects_unknown_version() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("watchlist.json");
        std::fs::write(&path, r#"{"version":9,"entries":[]}"#).expect("seed file");

        let error = JsonFileWatchlistStorage::new(&path)
            .load()
            .await
            .expect_err("must fail");
        assert!(matches!(error, StorageError::UnsupportedVersion { found: 9, .. }));
    }

    #[tokio::test]
    async fn json_file_reports_corruption() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("watchlist.json");
        std::fs::write(&path, "{ not json").expect("seed file");

        let error = JsonFileWatchlistStorage::new(&path)
            .load()
            .await
            .expect_err("must fail");
        assert!(matches!(error, StorageError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn json_file_clear_empties_document() {
        let dir = tempfile::tempdir().expect("temp dir");
        let storage = JsonFileWatchlistStorage::new(dir.path().join("watchlist.json"));
        storage.add(entry("AAPL")).await.expect("add");

        storage.clear().await.expect("clear");
        assert!(storage.load().await.expect("load").is_empty());
    }
}
