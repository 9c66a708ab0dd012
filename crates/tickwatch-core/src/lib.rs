//! # Tickwatch Core
//!
//! API aggregation and error normalization for the tickwatch market
//! dashboard.
//!
//! ## Overview
//!
//! - **Error taxonomy** shared by every layer: five stable [`ErrorCode`]s
//! - **Usage tracking** with per-provider quotas reset on fixed windows
//! - **Retry** with exponential backoff that refuses client errors
//! - **Response cache** with per-entry TTL
//! - **Provider adapters** for Alpha Vantage (stocks) and CoinGecko (crypto)
//! - **Market service** exposing search, details, chart and usage endpoints
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Alpha Vantage and CoinGecko sources |
//! | [`cache`] | TTL response cache |
//! | [`clock`] | Injectable time source |
//! | [`config`] | File and environment configuration |
//! | [`data_source`] | Source and market API traits |
//! | [`domain`] | Assets, prices, candles, timeframes |
//! | [`envelope`] | `{ success, data | error, timestamp }` responses |
//! | [`error`] | Error taxonomy and upstream failure variants |
//! | [`error_handler`] | Classification, quota gate, request validation |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`provider_policy`] | Per-provider quota policies |
//! | [`retry`] | Backoff and retry loop |
//! | [`service`] | Endpoint handlers |
//! | [`source`] | Provider identifiers |
//! | [`usage`] | Quota accounting |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tickwatch_core::{AppConfig, AssetType, MarketService, ReqwestHttpClient, SystemClock};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load(None)?;
//!     let service = MarketService::from_config(
//!         &config,
//!         Arc::new(ReqwestHttpClient::new()),
//!         Arc::new(SystemClock),
//!     );
//!
//!     let response = service.handle_details("AAPL", AssetType::Stock).await;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cache;
pub mod clock;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod error_handler;
pub mod http_client;
pub mod provider_policy;
pub mod retry;
pub mod service;
pub mod source;
pub mod usage;

pub use adapters::{AlphaVantageSource, CoinGeckoSource};
pub use cache::{cache_key, CacheMode, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, CacheConfig, ConfigError, ProvidersConfig};
pub use data_source::{ApiFuture, AssetSource, MarketApi, SourceFuture};
pub use domain::*;
pub use envelope::{ApiResponse, ErrorBody};
pub use error::{ApiError, ErrorCode, ErrorState, UpstreamError, ValidationError};
pub use error_handler::{
    classify, classify_logged, handle_error, validate_request, with_error_handling, RequestParams,
};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpFuture, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};
pub use provider_policy::{UsagePolicy, UsageWindow};
pub use retry::{with_retry, Backoff, RetryClassify, RetryPolicy, RetrySettings};
pub use service::MarketService;
pub use source::ProviderId;
pub use usage::{Availability, UsageRecord, UsageStats, UsageTracker};
