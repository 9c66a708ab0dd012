use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::{invalid_payload, status_failure, SEARCH_LIMIT};
use crate::data_source::{AssetSource, SourceFuture};
use crate::domain::normalize_series;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, DEFAULT_TIMEOUT_MS};
use crate::{
    ApiError, Asset, AssetDetails, CandlestickData, PriceData, ProviderId, Timeframe, UpstreamError,
    UtcDateTime,
};

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const API_KEY_HEADER: &str = "x-cg-demo-api-key";
const VS_CURRENCY: &str = "usd";

/// Crypto data from CoinGecko. Asset symbols are CoinGecko coin ids.
#[derive(Clone)]
pub struct CoinGeckoSource {
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    base_url: String,
    timeout_ms: u64,
}

impl CoinGeckoSource {
    /// The public API works without a key; a demo key raises the limits.
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: Option<String>) -> Self {
        let auth = match api_key.filter(|key| !key.trim().is_empty()) {
            Some(value) => HttpAuth::Header {
                name: String::from(API_KEY_HEADER),
                value,
            },
            None => HttpAuth::None,
        };
        Self {
            http_client,
            auth,
            base_url: String::from(DEFAULT_BASE_URL),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path_and_query: &str) -> Result<T, UpstreamError> {
        let request = HttpRequest::get(format!("{}{}", self.base_url, path_and_query))
            .with_auth(&self.auth)
            .with_timeout_ms(self.timeout_ms);

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(status_failure(&response));
        }
        Ok(serde_json::from_str(&response.body)?)
    }

    async fn fetch_search(&self, query: &str) -> Result<Vec<Asset>, UpstreamError> {
        let payload: SearchPayload = self
            .get(&format!("/search?query={}", urlencoding::encode(query)))
            .await?;

        Ok(payload
            .coins
            .into_iter()
            .filter_map(|coin| match Asset::crypto(&coin.id, coin.name.as_str()) {
                Ok(asset) => Some(asset),
                Err(error) => {
                    debug!(id = %coin.id, %error, "skipping unusable coin");
                    None
                }
            })
            .take(SEARCH_LIMIT)
            .collect())
    }

    async fn fetch_details(&self, id: &str) -> Result<AssetDetails, UpstreamError> {
        let path = format!(
            "/simple/price?ids={}&vs_currencies={VS_CURRENCY}&include_market_cap=true&include_24hr_vol=true&include_24hr_change=true&include_last_updated_at=true",
            urlencoding::encode(id)
        );
        let mut payload: HashMap<String, SimplePrice> = self.get(&path).await?;

        let quote = payload
            .remove(id)
            .ok_or_else(|| ApiError::asset_not_found(format!("No price found for coin '{id}'")))?;
        let usd = quote
            .usd
            .ok_or_else(|| ApiError::asset_not_found(format!("No USD price for coin '{id}'")))?;

        let timestamp = match quote.last_updated_at {
            Some(seconds) => UtcDateTime::from_unix_seconds(seconds)
                .map_err(|error| invalid_payload(error.to_string()))?,
            None => UtcDateTime::now(),
        };

        let price = PriceData::new(usd, timestamp)
            .and_then(|price| price.with_volume(quote.usd_24h_vol))
            .and_then(|price| price.with_market_cap(quote.usd_market_cap))
            .and_then(|price| price.with_change_24h(quote.usd_24h_change))
            .map_err(|error| invalid_payload(format!("unusable price for '{id}': {error}")))?;
        let asset = Asset::crypto(id, id).map_err(|error| invalid_payload(error.to_string()))?;

        Ok(AssetDetails { asset, price })
    }

    async fn fetch_chart(
        &self,
        id: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<CandlestickData>, UpstreamError> {
        let path = format!(
            "/coins/{}/ohlc?vs_currency={VS_CURRENCY}&days={}",
            urlencoding::encode(id),
            timeframe.days()
        );
        let rows: Vec<[f64; 5]> = self.get(&path).await?;

        let mut candles = Vec::with_capacity(rows.len());
        for [millis, open, high, low, close] in rows {
            let timestamp = UtcDateTime::from_unix_millis(millis as i64)
                .map_err(|error| invalid_payload(error.to_string()))?;
            // The OHLC endpoint carries no volume.
            let candle = CandlestickData::new(timestamp, open, high, low, close, 0.0)
                .map_err(|error| invalid_payload(format!("invalid candle at {timestamp}: {error}")))?;
            candles.push(candle);
        }

        Ok(normalize_series(candles))
    }
}

impl AssetSource for CoinGeckoSource {
    fn provider(&self) -> ProviderId {
        ProviderId::CoinGecko
    }

    fn search<'a>(&'a self, query: &'a str) -> SourceFuture<'a, Vec<Asset>> {
        Box::pin(self.fetch_search(query))
    }

    fn details<'a>(&'a self, symbol: &'a str) -> SourceFuture<'a, AssetDetails> {
        Box::pin(self.fetch_details(symbol))
    }

    fn chart<'a>(
        &'a self,
        symbol: &'a str,
        timeframe: Timeframe,
    ) -> SourceFuture<'a, Vec<CandlestickData>> {
        Box::pin(self.fetch_chart(symbol, timeframe))
    }
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(default)]
    coins: Vec<SearchCoin>,
}

#[derive(Debug, Deserialize)]
struct SearchCoin {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
    usd_market_cap: Option<f64>,
    usd_24h_vol: Option<f64>,
    usd_24h_change: Option<f64>,
    last_updated_at: Option<i64>,
}
