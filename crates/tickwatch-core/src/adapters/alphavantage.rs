use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};
use tracing::debug;

use super::{invalid_payload, parse_number, status_failure, unconfigured, SEARCH_LIMIT};
use crate::clock::{Clock, SystemClock};
use crate::data_source::{AssetSource, SourceFuture};
use crate::domain::normalize_series;
use crate::http_client::{HttpClient, HttpRequest, DEFAULT_TIMEOUT_MS};
use crate::{
    ApiError, Asset, AssetDetails, CandlestickData, PriceData, ProviderId, Timeframe, UpstreamError,
    UtcDateTime,
};

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";

/// Request shape used to cover one timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SeriesRequest {
    pub function: &'static str,
    pub interval: Option<&'static str>,
    pub output_size: &'static str,
}

pub(crate) const fn series_request(timeframe: Timeframe) -> SeriesRequest {
    match timeframe {
        Timeframe::OneDay => SeriesRequest {
            function: "TIME_SERIES_INTRADAY",
            interval: Some("5min"),
            output_size: "compact",
        },
        Timeframe::OneWeek => SeriesRequest {
            function: "TIME_SERIES_INTRADAY",
            interval: Some("60min"),
            output_size: "full",
        },
        Timeframe::OneMonth | Timeframe::ThreeMonths => SeriesRequest {
            function: "TIME_SERIES_DAILY",
            interval: None,
            output_size: "compact",
        },
        Timeframe::OneYear => SeriesRequest {
            function: "TIME_SERIES_DAILY",
            interval: None,
            output_size: "full",
        },
    }
}

/// Stock data from Alpha Vantage.
#[derive(Clone)]
pub struct AlphaVantageSource {
    http_client: Arc<dyn HttpClient>,
    api_key: Option<String>,
    base_url: String,
    timeout_ms: u64,
    clock: Arc<dyn Clock>,
}

impl AlphaVantageSource {
    /// A blank or missing key leaves the source unconfigured: every call
    /// fails with `NETWORK_ERROR` before any request is sent.
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: Option<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: String::from(DEFAULT_BASE_URL),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Issues one query and screens the body for in-band provider errors.
    async fn query(&self, params: &[(&str, &str)]) -> Result<Value, UpstreamError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| unconfigured("Alpha Vantage"))?;

        let mut url = self.base_url.clone();
        let mut separator = '?';
        for (name, value) in params.iter().chain(&[("apikey", api_key)]) {
            url.push(separator);
            url.push_str(name);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
            separator = '&';
        }

        let request = HttpRequest::get(url).with_timeout_ms(self.timeout_ms);
        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(status_failure(&response));
        }

        let body: Value = serde_json::from_str(&response.body)?;
        screen_body(&body)?;
        Ok(body)
    }

    async fn fetch_search(&self, query: &str) -> Result<Vec<Asset>, UpstreamError> {
        let body = self
            .query(&[("function", "SYMBOL_SEARCH"), ("keywords", query)])
            .await?;
        let payload: SearchPayload = serde_json::from_value(body)?;

        Ok(payload
            .best_matches
            .into_iter()
            .filter_map(|entry| {
                match Asset::stock(&entry.symbol, entry.name.trim()) {
                    Ok(asset) => Some(asset.with_exchange(entry.region.unwrap_or_default())),
                    Err(error) => {
                        debug!(symbol = %entry.symbol, %error, "skipping unusable search match");
                        None
                    }
                }
            })
            .take(SEARCH_LIMIT)
            .collect())
    }

    async fn fetch_details(&self, symbol: &str) -> Result<AssetDetails, UpstreamError> {
        let body = self
            .query(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol)])
            .await?;
        let payload: QuotePayload = serde_json::from_value(body)?;

        let Some(raw_price) = payload.quote.price.as_deref() else {
            return Err(ApiError::asset_not_found(format!("No quote found for symbol '{symbol}'")).into());
        };

        let price = PriceData::new(parse_number("05. price", raw_price)?, self.clock.now())
            .and_then(|price| {
                price.with_volume(
                    payload
                        .quote
                        .volume
                        .as_deref()
                        .and_then(|raw| parse_number("06. volume", raw).ok()),
                )
            })
            .and_then(|price| {
                price.with_change_24h(
                    payload
                        .quote
                        .change_percent
                        .as_deref()
                        .and_then(|raw| parse_number("10. change percent", raw).ok()),
                )
            })
            .map_err(|error| invalid_payload(format!("unusable quote for '{symbol}': {error}")))?;

        let quoted_symbol = payload.quote.symbol.as_deref().unwrap_or(symbol);
        let asset = Asset::stock(quoted_symbol, quoted_symbol)
            .map_err(|error| invalid_payload(error.to_string()))?;

        Ok(AssetDetails { asset, price })
    }

    async fn fetch_chart(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<CandlestickData>, UpstreamError> {
        let shape = series_request(timeframe);
        let mut params = vec![
            ("function", shape.function),
            ("symbol", symbol),
            ("outputsize", shape.output_size),
        ];
        if let Some(interval) = shape.interval {
            params.push(("interval", interval));
        }

        let body = self.query(&params).await?;
        let series = extract_series(&body)
            .ok_or_else(|| ApiError::asset_not_found(format!("No chart data for symbol '{symbol}'")))?;

        let mut candles = Vec::with_capacity(series.len());
        for (stamp, bar) in series {
            candles.push(bar.into_candle(&stamp)?);
        }

        Ok(trim_to_span(normalize_series(candles), timeframe))
    }
}

impl AssetSource for AlphaVantageSource {
    fn provider(&self) -> ProviderId {
        ProviderId::AlphaVantage
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

/// Alpha Vantage reports throttling and bad requests with HTTP 200.
fn screen_body(body: &Value) -> Result<(), UpstreamError> {
    for key in ["Note", "Information"] {
        if let Some(text) = body.get(key).and_then(Value::as_str) {
            return Err(ApiError::rate_limited(text).into());
        }
    }
    if let Some(text) = body.get("Error Message").and_then(Value::as_str) {
        return Err(ApiError::asset_not_found(text).into());
    }
    Ok(())
}

fn extract_series(body: &Value) -> Option<BTreeMap<String, SeriesBar>> {
    let (_, series) = body
        .as_object()?
        .iter()
        .find(|(key, _)| key.starts_with("Time Series"))?;
    serde_json::from_value(series.clone()).ok()
}

/// Keeps the candles within `timeframe` of the newest one.
fn trim_to_span(series: Vec<CandlestickData>, timeframe: Timeframe) -> Vec<CandlestickData> {
    let Some(latest) = series.last().map(|candle| candle.timestamp) else {
        return series;
    };
    let cutoff = latest.saturating_sub(timeframe.span());
    series
        .into_iter()
        .filter(|candle| candle.timestamp >= cutoff)
        .collect()
}

/// Series keys are exchange-local wall times; they are read as UTC.
fn parse_series_stamp(raw: &str) -> Result<UtcDateTime, UpstreamError> {
    let intraday = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let daily = format_description!("[year]-[month]-[day]");

    let parsed = PrimitiveDateTime::parse(raw, intraday)
        .or_else(|_| Date::parse(raw, daily).map(|date| date.midnight()))
        .map_err(|_| invalid_payload(format!("unrecognized series timestamp '{raw}'")))?;

    UtcDateTime::from_offset_datetime(parsed.assume_utc())
        .map_err(|error| invalid_payload(error.to_string()))
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(rename = "bestMatches", default)]
    best_matches: Vec<SearchMatch>,
}

#[derive(Debug, Deserialize)]
struct SearchMatch {
    #[serde(rename = "1. symbol")]
    symbol: String,
    #[serde(rename = "2. name")]
    name: String,
    #[serde(rename = "4. region", default)]
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuotePayload {
    #[serde(rename = "Global Quote", default)]
    quote: GlobalQuote,
}

#[derive(Debug, Default, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol", default)]
    symbol: Option<String>,
    #[serde(rename = "05. price", default)]
    price: Option<String>,
    #[serde(rename = "06. volume", default)]
    volume: Option<String>,
    #[serde(rename = "10. change percent", default)]
    change_percent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeriesBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume", default)]
    volume: Option<String>,
}

impl SeriesBar {
    fn into_candle(self, stamp: &str) -> Result<CandlestickData, UpstreamError> {
        let volume = match self.volume.as_deref() {
            Some(raw) => parse_number("5. volume", raw)?,
            None => 0.0,
        };
        CandlestickData::new(
            parse_series_stamp(stamp)?,
            parse_number("1. open", &self.open)?,
            parse_number("2. high", &self.high)?,
            parse_number("3. low", &self.low)?,
            parse_number("4. close", &self.close)?,
            volume,
        )
        .map_err(|error| invalid_payload(format!("invalid candle at {stamp}: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error_handler::classify;
    use crate::http_client::testing::ScriptedHttpClient;
    use crate::http_client::{HttpError, HttpResponse};
    use crate::ErrorCode;

    fn source(client: Arc<ScriptedHttpClient>) -> AlphaVantageSource {
        AlphaVantageSource::new(client, Some(String::from("test-key")))
            .with_base_url("https://av.test/query")
            .with_clock(Arc::new(ManualClock::new(
                UtcDateTime::parse("2024-06-03T15:00:00Z").expect("timestamp"),
            )))
    }

    #[tokio::test]
    async fn when_quote_present_details_are_parsed() {
        let client = Arc::new(ScriptedHttpClient::json(
            r#"{"Global Quote":{"01. symbol":"AAPL","05. price":"187.4400","06. volume":"52000000","10. change percent":"-0.8123%"}}"#,
        ));
        let details = source(client.clone())
            .details("AAPL")
            .await
            .expect("details should parse");

        assert_eq!(details.asset.symbol, "AAPL");
        assert_eq!(details.price.price, 187.44);
        assert_eq!(details.price.volume, Some(52_000_000.0));
        assert_eq!(details.price.change_24h, Some(-0.8123));

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.starts_with("https://av.test/query?function=GLOBAL_QUOTE&symbol=AAPL"));
        assert!(requests[0].url.ends_with("&apikey=test-key"));
    }

    #[tokio::test]
    async fn when_quote_empty_asset_is_not_found() {
        let client = Arc::new(ScriptedHttpClient::json(r#"{"Global Quote":{}}"#));
        let error = source(client).details("ZZZZ").await.expect_err("must fail");
        assert_eq!(classify(&error).code, ErrorCode::AssetNotFound);
    }

    #[tokio::test]
    async fn when_body_carries_note_call_is_rate_limited() {
        let client = Arc::new(ScriptedHttpClient::json(
            r#"{"Note":"Thank you for using Alpha Vantage! Our standard API rate limit is 25 requests per day."}"#,
        ));
        let error = source(client).search("apple").await.expect_err("must fail");
        assert_eq!(classify(&error).code, ErrorCode::ApiRateLimit);
    }

    #[tokio::test]
    async fn when_key_missing_no_request_is_sent() {
        let client = Arc::new(ScriptedHttpClient::default());
        let unconfigured = AlphaVantageSource::new(client.clone(), Some(String::from("  ")));

        let error = unconfigured.search("apple").await.expect_err("must fail");
        let classified = classify(&error);
        assert_eq!(classified.code, ErrorCode::NetworkError);
        assert_eq!(classified.status, 503);
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn when_searching_matches_become_stock_assets() {
        let client = Arc::new(ScriptedHttpClient::json(
            r#"{"bestMatches":[
                {"1. symbol":"AAPL","2. name":"Apple Inc","3. type":"Equity","4. region":"United States"},
                {"1. symbol":"APLE","2. name":"Apple Hospitality REIT Inc","3. type":"Equity","4. region":"United States"}
            ]}"#,
        ));
        let assets = source(client).search("apple").await.expect("search should parse");

        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].symbol, "AAPL");
        assert_eq!(assets[0].exchange.as_deref(), Some("United States"));
    }

    #[tokio::test]
    async fn when_daily_series_returned_candles_are_sorted_and_trimmed() {
        let client = Arc::new(ScriptedHttpClient::json(
            r#"{"Meta Data":{},"Time Series (Daily)":{
                "2024-06-03":{"1. open":"10","2. high":"12","3. low":"9","4. close":"11","5. volume":"100"},
                "2024-01-02":{"1. open":"5","2. high":"6","3. low":"4","4. close":"5","5. volume":"100"},
                "2024-05-31":{"1. open":"9","2. high":"10","3. low":"8","4. close":"10","5. volume":"100"}
            }}"#,
        ));
        let candles = source(client.clone())
            .chart("AAPL", Timeframe::OneMonth)
            .await
            .expect("chart should parse");

        let closes: Vec<f64> = candles.iter().map(|candle| candle.close).collect();
        assert_eq!(closes, vec![10.0, 11.0]);
        assert!(client.requests()[0].url.contains("function=TIME_SERIES_DAILY"));
    }

    #[tokio::test]
    async fn when_intraday_requested_interval_is_sent() {
        let client = Arc::new(ScriptedHttpClient::json(
            r#"{"Time Series (5min)":{
                "2024-06-03 15:55:00":{"1. open":"1","2. high":"2","3. low":"1","4. close":"2","5. volume":"10"}
            }}"#,
        ));
        let candles = source(client.clone())
            .chart("AAPL", Timeframe::OneDay)
            .await
            .expect("chart should parse");

        assert_eq!(candles.len(), 1);
        assert_eq!(
            candles[0].timestamp,
            UtcDateTime::parse("2024-06-03T15:55:00Z").expect("timestamp")
        );
        assert!(client.requests()[0].url.contains("interval=5min"));
    }

    #[tokio::test]
    async fn when_transport_times_out_failure_is_timeout() {
        let client = Arc::new(ScriptedHttpClient::new([Err(HttpError::timeout("deadline"))]));
        let error = source(client).details("AAPL").await.expect_err("must fail");
        assert!(matches!(error, UpstreamError::Timeout { .. }));
    }

    #[tokio::test]
    async fn when_status_not_success_failure_carries_status() {
        let client = Arc::new(ScriptedHttpClient::new([Ok(HttpResponse {
            status: 503,
            body: String::new(),
        })]));
        let error = source(client).details("AAPL").await.expect_err("must fail");
        assert_eq!(error.http_status(), Some(503));
    }

    #[test]
    fn timeframes_map_to_series_functions() {
        assert_eq!(series_request(Timeframe::OneDay).interval, Some("5min"));
        assert_eq!(series_request(Timeframe::OneWeek).interval, Some("60min"));
        assert_eq!(series_request(Timeframe::ThreeMonths).function, "TIME_SERIES_DAILY");
        assert_eq!(series_request(Timeframe::OneYear).output_size, "full");
    }
}
