//! Provider adapters.
//!
//! | Provider | Asset type | Search | Details | Chart |
//! |----------|------------|--------|---------|-------|
//! | Alpha Vantage | stock | `SYMBOL_SEARCH` | `GLOBAL_QUOTE` | `TIME_SERIES_INTRADAY` / `TIME_SERIES_DAILY` |
//! | CoinGecko | crypto | `/search` | `/simple/price` | `/coins/{id}/ohlc` |

pub mod alphavantage;
pub mod coingecko;

pub use alphavantage::AlphaVantageSource;
pub use coingecko::CoinGeckoSource;

use serde_json::Value;

use crate::http_client::HttpResponse;
use crate::{ApiError, UpstreamError};

/// Search hits returned per provider.
pub(crate) const SEARCH_LIMIT: usize = 10;

const BODY_EXCERPT_CHARS: usize = 200;

pub(crate) fn unconfigured(provider: &str) -> UpstreamError {
    UpstreamError::Classified(
        ApiError::network(format!("{provider} is not configured; set an API key to enable it"))
            .with_status(503),
    )
}

/// Turns a non-2xx response into a status failure, keeping the provider's
/// own error text when the body carries one.
pub(crate) fn status_failure(response: &HttpResponse) -> UpstreamError {
    UpstreamError::Status {
        status: response.status,
        message: error_text(&response.body),
    }
}

fn error_text(body: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let candidates = [
            value.get("error").and_then(Value::as_str),
            value
                .pointer("/status/error_message")
                .and_then(Value::as_str),
            value.get("message").and_then(Value::as_str),
        ];
        if let Some(text) = candidates.into_iter().flatten().next() {
            return Some(text.to_owned());
        }
    }

    let trimmed = body.trim();
    (!trimmed.is_empty()).then(|| trimmed.chars().take(BODY_EXCERPT_CHARS).collect())
}

/// Parses a numeric field that providers deliver as a string.
pub(crate) fn parse_number(field: &str, raw: &str) -> Result<f64, UpstreamError> {
    raw.trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .map_err(|_| UpstreamError::Other {
            code: Some(String::from("PARSE_ERROR")),
            message: Some(format!("field '{field}' is not numeric: '{raw}'")),
        })
}

pub(crate) fn invalid_payload(message: impl Into<String>) -> UpstreamError {
    UpstreamError::Other {
        code: Some(String::from("PARSE_ERROR")),
        message: Some(message.into()),
    }
}
