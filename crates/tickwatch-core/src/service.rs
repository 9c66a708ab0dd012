//! Endpoint handlers composing both providers with quota, retry, cache and
//! error normalization.
//!
//! Every provider call runs as `retry(quota_gate(operation))`: each attempt
//! re-checks the quota, and a denial is never retried.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::adapters::{AlphaVantageSource, CoinGeckoSource};
use crate::cache::{cache_key, CacheMode, ResponseCache};
use crate::clock::Clock;
use crate::config::{AppConfig, CacheConfig};
use crate::data_source::{ApiFuture, AssetSource, MarketApi};
use crate::error_handler::{classify_logged, validate_request, with_error_handling, RequestParams};
use crate::http_client::HttpClient;
use crate::retry::RetryPolicy;
use crate::usage::{UsageStats, UsageTracker};
use crate::{
    normalize_symbol, ApiError, ApiResponse, AssetDetails, AssetType, CandlestickData,
    SearchResults, Timeframe, UpstreamError,
};

/// The market data endpoints.
pub struct MarketService {
    stocks: Arc<dyn AssetSource>,
    crypto: Arc<dyn AssetSource>,
    tracker: Arc<UsageTracker>,
    retry: RetryPolicy,
    cache_mode: CacheMode,
    search_cache: ResponseCache<SearchResults>,
    details_cache: ResponseCache<AssetDetails>,
    chart_cache: ResponseCache<Vec<CandlestickData>>,
    clock: Arc<dyn Clock>,
}

impl MarketService {
    pub fn new(
        stocks: Arc<dyn AssetSource>,
        crypto: Arc<dyn AssetSource>,
        tracker: Arc<UsageTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = CacheConfig::default();
        Self {
            stocks,
            crypto,
            tracker,
            retry: RetryPolicy::default(),
            cache_mode: cache.mode,
            search_cache: ResponseCache::with_clock(cache.search_ttl(), clock.clone()),
            details_cache: ResponseCache::with_clock(cache.details_ttl(), clock.clone()),
            chart_cache: ResponseCache::with_clock(cache.chart_ttl(), clock.clone()),
            clock,
        }
    }

    /// Wires the real provider adapters from configuration.
    pub fn from_config(config: &AppConfig, http_client: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        let providers = &config.providers;

        let mut stocks = AlphaVantageSource::new(http_client.clone(), providers.alphavantage_api_key.clone())
            .with_timeout_ms(providers.timeout_ms)
            .with_clock(clock.clone());
        if let Some(base_url) = &providers.alphavantage_base_url {
            stocks = stocks.with_base_url(base_url.clone());
        }
        if !stocks.is_configured() {
            warn!("no Alpha Vantage API key configured; stock endpoints will fail");
        }

        let mut crypto = CoinGeckoSource::new(http_client, providers.coingecko_api_key.clone())
            .with_timeout_ms(providers.timeout_ms);
        if let Some(base_url) = &providers.coingecko_base_url {
            crypto = crypto.with_base_url(base_url.clone());
        }

        let tracker = Arc::new(UsageTracker::new(config.usage_policies(), clock.clone()));
        Self::new(Arc::new(stocks), Arc::new(crypto), tracker, clock)
            .with_retry(config.retry.into())
            .with_cache(config.cache)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache_mode = cache.mode;
        self.search_cache = ResponseCache::with_clock(cache.search_ttl(), self.clock.clone());
        self.details_cache = ResponseCache::with_clock(cache.details_ttl(), self.clock.clone());
        self.chart_cache = ResponseCache::with_clock(cache.chart_ttl(), self.clock.clone());
        self
    }

    pub fn tracker(&self) -> &Arc<UsageTracker> {
        &self.tracker
    }

    fn source(&self, asset_type: AssetType) -> &dyn AssetSource {
        match asset_type {
            AssetType::Stock => self.stocks.as_ref(),
            AssetType::Crypto => self.crypto.as_ref(),
        }
    }

    /// Runs one provider operation through retry and the quota gate, then
    /// classifies any failure.
    async fn call<T, F, Fut>(&self, source: &dyn AssetSource, context: &str, operation: F) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let provider = source.provider();
        let tracker = self.tracker.as_ref();
        let operation = &operation;

        self.retry
            .run(move || with_error_handling(tracker, provider, context, move || operation()))
            .await
            .map_err(|failure| classify_logged(&failure, Some(context)))
    }

    /// Searches both providers. One provider failing leaves its list empty
    /// and adds a warning; both failing returns the stock provider's error.
    pub async fn search(&self, query: &str) -> Result<SearchResults, ApiError> {
        validate_request(&RequestParams::from_pairs([("query", query)]), &["query"])?;
        let query = query.trim();

        let normalized = query.to_lowercase();
        let key = cache_key("search", &[("query", normalized.as_str())]);
        if self.cache_mode.reads() {
            if let Some(hit) = self.search_cache.get(&key).await {
                debug!(query, "search served from cache");
                return Ok(hit);
            }
        }

        let stocks = self.stocks.as_ref();
        let crypto = self.crypto.as_ref();
        let (stock_result, crypto_result) = tokio::join!(
            self.call(stocks, "search:stock", || stocks.search(query)),
            self.call(crypto, "search:crypto", || crypto.search(query)),
        );

        let results = match (stock_result, crypto_result) {
            (Err(stock_error), Err(_)) => return Err(stock_error),
            (Ok(stocks), Ok(crypto)) => SearchResults {
                stocks,
                crypto,
                warnings: Vec::new(),
            },
            (Ok(stocks), Err(error)) => SearchResults {
                stocks,
                crypto: Vec::new(),
                warnings: vec![format!("Crypto search unavailable: {}", error.message)],
            },
            (Err(error), Ok(crypto)) => SearchResults {
                stocks: Vec::new(),
                crypto,
                warnings: vec![format!("Stock search unavailable: {}", error.message)],
            },
        };

        if results.warnings.is_empty() && self.cache_mode.writes() {
            self.search_cache.put(key, results.clone()).await;
        }
        info!(
            query,
            stocks = results.stocks.len(),
            crypto = results.crypto.len(),
            "search completed"
        );
        Ok(results)
    }

    pub async fn details(&self, symbol: &str, asset_type: AssetType) -> Result<AssetDetails, ApiError> {
        validate_request(&RequestParams::from_pairs([("symbol", symbol)]), &["symbol"])?;
        let symbol = normalize_symbol(symbol, asset_type)?;

        let key = cache_key("details", &[("type", asset_type.as_str()), ("symbol", symbol.as_str())]);
        if self.cache_mode.reads() {
            if let Some(hit) = self.details_cache.get(&key).await {
                return Ok(hit);
            }
        }

        let source = self.source(asset_type);
        let details = self
            .call(source, "details", || source.details(&symbol))
            .await?;

        if self.cache_mode.writes() {
            self.details_cache.put(key, details.clone()).await;
        }
        Ok(details)
    }

    pub async fn chart(
        &self,
        symbol: &str,
        asset_type: AssetType,
        timeframe: Timeframe,
    ) -> Result<Vec<CandlestickData>, ApiError> {
        validate_request(&RequestParams::from_pairs([("symbol", symbol)]), &["symbol"])?;
        let symbol = normalize_symbol(symbol, asset_type)?;

        let key = cache_key(
            "chart",
            &[
                ("type", asset_type.as_str()),
                ("symbol", symbol.as_str()),
                ("timeframe", timeframe.as_str()),
            ],
        );
        if self.cache_mode.reads() {
            if let Some(hit) = self.chart_cache.get(&key).await {
                return Ok(hit);
            }
        }

        let source = self.source(asset_type);
        let candles = self
            .call(source, "chart", || source.chart(&symbol, timeframe))
            .await?;

        if self.cache_mode.writes() {
            self.chart_cache.put(key, candles.clone()).await;
        }
        Ok(candles)
    }

    pub fn usage(&self) -> Vec<UsageStats> {
        self.tracker.usage_stats()
    }

    pub async fn handle_search(&self, query: &str) -> ApiResponse<SearchResults> {
        let result = self.search(query).await;
        let warnings = result
            .as_ref()
            .map(|results| results.warnings.join("; "))
            .unwrap_or_default();
        ApiResponse::from_result(result, self.clock.now()).with_message(warnings)
    }

    pub async fn handle_details(&self, symbol: &str, asset_type: AssetType) -> ApiResponse<AssetDetails> {
        ApiResponse::from_result(self.details(symbol, asset_type).await, self.clock.now())
    }

    pub async fn handle_chart(
        &self,
        symbol: &str,
        asset_type: AssetType,
        timeframe: Timeframe,
    ) -> ApiResponse<Vec<CandlestickData>> {
        ApiResponse::from_result(
            self.chart(symbol, asset_type, timeframe).await,
            self.clock.now(),
        )
    }

    pub fn handle_usage(&self) -> ApiResponse<Vec<UsageStats>> {
        ApiResponse::success(self.usage(), self.clock.now())
    }
}

impl MarketApi for MarketService {
    fn search<'a>(&'a self, query: &'a str) -> ApiFuture<'a, SearchResults> {
        Box::pin(MarketService::search(self, query))
    }

    fn details<'a>(&'a self, symbol: &'a str, asset_type: AssetType) -> ApiFuture<'a, AssetDetails> {
        Box::pin(MarketService::details(self, symbol, asset_type))
    }

    fn chart<'a>(
        &'a self,
        symbol: &'a str,
        asset_type: AssetType,
        timeframe: Timeframe,
    ) -> ApiFuture<'a, Vec<CandlestickData>> {
        Box::pin(MarketService::chart(self, symbol, asset_type, timeframe))
    }
}
