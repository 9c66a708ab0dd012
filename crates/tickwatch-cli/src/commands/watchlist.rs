use serde::Serialize;
use serde_json::Value;
use tickwatch_core::{ApiError, ApiResponse, ErrorState};
use tickwatch_store::{WatchlistItem, WatchlistStore};
use tracing::info;

use crate::cli::{AssetArgs, WatchlistArgs, WatchlistCommand};
use crate::error::CliError;

use super::{into_value, Context};

#[derive(Debug, Serialize)]
struct RemoveResponseData {
    symbol: String,
    removed: bool,
}

fn state_failure(state: &ErrorState) -> ApiError {
    let error = ApiError::new(state.code, state.message.clone());
    match &state.details {
        Some(details) => error.with_details(details.clone()),
        None => error,
    }
}

pub async fn run(args: &WatchlistArgs, context: &Context) -> Result<ApiResponse<Value>, CliError> {
    let store = context.watchlist();
    store.load().await;
    if let Some(error) = store.snapshot().error {
        return into_value(ApiResponse::<()>::failure(&state_failure(&error), context.clock.now()));
    }

    match &args.command {
        WatchlistCommand::Add(asset) => add(asset, &store, context).await,
        WatchlistCommand::Remove { symbol } => {
            let response = match store.remove(symbol).await {
                Ok(removed) => ApiResponse::success(
                    RemoveResponseData {
                        symbol: symbol.trim().to_owned(),
                        removed,
                    },
                    context.clock.now(),
                ),
                Err(error) => ApiResponse::failure(&error.to_api_error(), context.clock.now()),
            };
            into_value(response)
        }
        WatchlistCommand::List => into_value(ApiResponse::success(
            store.snapshot().items,
            context.clock.now(),
        )),
        WatchlistCommand::Clear => {
            let response = match store.clear().await {
                Ok(()) => ApiResponse::success(Vec::<WatchlistItem>::new(), context.clock.now())
                    .with_message("watchlist cleared"),
                Err(error) => ApiResponse::failure(&error.to_api_error(), context.clock.now()),
            };
            into_value(response)
        }
        WatchlistCommand::Refresh => {
            let updated = store.refresh_prices(&context.service).await;
            let state = store.snapshot();
            info!(updated, total = state.items.len(), "watchlist prices refreshed");
            let message = state
                .error
                .map(|error| format!("some prices could not be refreshed: {}", error.message))
                .unwrap_or_default();
            into_value(ApiResponse::success(state.items, context.clock.now()).with_message(message))
        }
    }
}

/// Resolves the asset through the details endpoint so only real assets are
/// tracked, then stores it with the price that came back.
async fn add(
    args: &AssetArgs,
    store: &WatchlistStore,
    context: &Context,
) -> Result<ApiResponse<Value>, CliError> {
    let details = match context.service.details(&args.symbol, args.asset_type()).await {
        Ok(details) => details,
        Err(error) => return into_value(ApiResponse::<()>::failure(&error, context.clock.now())),
    };

    let response = match store.add(details.asset).await {
        Ok(mut item) => {
            store.update_price(&item.asset.symbol, details.price.clone());
            item.current_price = Some(details.price);
            ApiResponse::success(item, context.clock.now())
        }
        Err(error) => ApiResponse::failure(&error.to_api_error(), context.clock.now()),
    };
    into_value(response)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tickwatch_core::{AppConfig, ErrorCode, ManualClock, MarketService, ReqwestHttpClient, UtcDateTime};

    use super::*;

    fn context(dir: &tempfile::TempDir) -> Context {
        let clock = Arc::new(ManualClock::new(
            UtcDateTime::parse("2024-06-01T12:00:00Z").expect("timestamp"),
        ));
        Context {
            service: MarketService::from_config(
                &AppConfig::default(),
                Arc::new(ReqwestHttpClient::new()),
                clock.clone(),
            ),
            clock,
            watchlist_path: dir.path().join("watchlist.json"),
        }
    }

    #[tokio::test]
    async fn list_of_missing_file_is_empty_success() {
        let dir = tempfile::tempdir().expect("temp dir");
        let args = WatchlistArgs {
            command: WatchlistCommand::List,
        };

        let response = run(&args, &context(&dir)).await.expect("renderable");

        assert!(response.success);
        assert_eq!(response.data, Some(Value::Array(Vec::new())));
    }

    #[tokio::test]
    async fn remove_of_untracked_symbol_reports_false() {
        let dir = tempfile::tempdir().expect("temp dir");
        let args = WatchlistArgs {
            command: WatchlistCommand::Remove {
                symbol: String::from("AAPL"),
            },
        };

        let response = run(&args, &context(&dir)).await.expect("renderable");

        assert_eq!(
            response.data,
            Some(serde_json::json!({ "symbol": "AAPL", "removed": false }))
        );
    }

    #[tokio::test]
    async fn corrupt_file_yields_error_envelope() {
        let dir = tempfile::tempdir().expect("temp dir");
        let context = context(&dir);
        std::fs::write(&context.watchlist_path, "not json").expect("seed file");
        let args = WatchlistArgs {
            command: WatchlistCommand::List,
        };

        let response = run(&args, &context).await.expect("renderable");

        assert!(!response.success);
        assert_eq!(
            response.error.map(|error| error.code),
            Some(ErrorCode::ExternalApiError)
        );
    }
}
