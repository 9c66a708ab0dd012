mod chart;
mod quote;
mod search;
mod usage;
mod watchlist;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tickwatch_core::{
    ApiResponse, AppConfig, Clock, MarketService, ReqwestHttpClient, SystemClock,
};
use tickwatch_store::{JsonFileWatchlistStorage, WatchlistStore};
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub const DEFAULT_WATCHLIST_PATH: &str = "tickwatch-watchlist.json";

/// Everything a command needs, wired from configuration.
pub struct Context {
    pub service: MarketService,
    pub clock: Arc<dyn Clock>,
    pub watchlist_path: PathBuf,
}

impl Context {
    pub fn from_config(config: &AppConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let service =
            MarketService::from_config(config, Arc::new(ReqwestHttpClient::new()), clock.clone());
        let watchlist_path = config
            .watchlist_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WATCHLIST_PATH));

        Self {
            service,
            clock,
            watchlist_path,
        }
    }

    pub fn watchlist(&self) -> WatchlistStore {
        WatchlistStore::new(
            Arc::new(JsonFileWatchlistStorage::new(&self.watchlist_path)),
            self.clock.clone(),
        )
    }
}

pub async fn run(cli: &Cli) -> Result<ApiResponse<Value>, CliError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    debug!(config = ?cli.config, "configuration loaded");
    let context = Context::from_config(&config);

    match &cli.command {
        Command::Search(args) => search::run(args, &context).await,
        Command::Quote(args) => quote::run(args, &context).await,
        Command::Chart(args) => chart::run(args, &context).await,
        Command::Watchlist(args) => watchlist::run(args, &context).await,
        Command::Usage => usage::run(&context),
    }
}

/// Re-types an envelope's payload as JSON for rendering.
fn into_value<T: Serialize>(response: ApiResponse<T>) -> Result<ApiResponse<Value>, CliError> {
    let mut failure = None;
    let response = response.map(|data| {
        serde_json::to_value(data).unwrap_or_else(|error| {
            failure = Some(error);
            Value::Null
        })
    });
    match failure {
        Some(error) => Err(error.into()),
        None => Ok(response),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tickwatch_core::{ApiError, UtcDateTime};

    use super::*;

    fn ts() -> UtcDateTime {
        UtcDateTime::parse("2024-06-01T00:00:00Z").expect("timestamp")
    }

    #[test]
    fn into_value_keeps_message_and_payload() {
        let response = ApiResponse::success(vec![1, 2, 3], ts()).with_message("partial");

        let value = into_value(response).expect("serializable");
        assert_eq!(value.data, Some(json!([1, 2, 3])));
        assert_eq!(value.message.as_deref(), Some("partial"));
    }

    #[test]
    fn into_value_keeps_error_status() {
        let response: ApiResponse<String> =
            ApiResponse::failure(&ApiError::rate_limited("slow down"), ts());

        let value = into_value(response).expect("serializable");
        assert!(!value.success);
        assert_eq!(value.http_status(), 429);
    }

    #[test]
    fn watchlist_path_defaults_to_working_directory() {
        let context = Context::from_config(&AppConfig::default());
        assert_eq!(context.watchlist_path, PathBuf::from(DEFAULT_WATCHLIST_PATH));
    }
}
