use serde::{Deserialize, Serialize};

use crate::{UtcDateTime, ValidationError};

/// Latest known price for an asset, normalized from a provider quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceData {
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(rename = "change24h", default, skip_serializing_if = "Option::is_none")]
    pub change_24h: Option<f64>,
    pub timestamp: UtcDateTime,
}

impl PriceData {
    pub fn new(price: f64, timestamp: UtcDateTime) -> Result<Self, ValidationError> {
        validate_positive("price", price)?;
        Ok(Self {
            price,
            volume: None,
            market_cap: None,
            change_24h: None,
            timestamp,
        })
    }

    pub fn with_volume(mut self, volume: Option<f64>) -> Result<Self, ValidationError> {
        validate_optional_non_negative("volume", volume)?;
        self.volume = volume;
        Ok(self)
    }

    pub fn with_market_cap(mut self, market_cap: Option<f64>) -> Result<Self, ValidationError> {
        validate_optional_non_negative("market_cap", market_cap)?;
        self.market_cap = market_cap;
        Ok(self)
    }

    /// Sets the 24h change; the sign is meaningful so only finiteness is checked.
    pub fn with_change_24h(mut self, change: Option<f64>) -> Result<Self, ValidationError> {
        if let Some(value) = change {
            if !value.is_finite() {
                return Err(ValidationError::NonFiniteValue { field: "change_24h" });
            }
        }
        self.change_24h = change;
        Ok(self)
    }
}

/// One OHLCV bucket of a chart series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandlestickData {
    pub timestamp: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl CandlestickData {
    pub fn new(
        timestamp: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("open", open)?;
        validate_non_negative("high", high)?;
        validate_non_negative("low", low)?;
        validate_non_negative("close", close)?;
        validate_non_negative("volume", volume)?;

        if high < low {
            return Err(ValidationError::InvalidCandleRange);
        }

        Ok(Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// Sorts a series ascending by timestamp and collapses duplicate timestamps.
///
/// When two candles share a timestamp the one delivered later wins.
pub fn normalize_series(mut candles: Vec<CandlestickData>) -> Vec<CandlestickData> {
    candles.sort_by_key(|candle| candle.timestamp);

    let mut series: Vec<CandlestickData> = Vec::with_capacity(candles.len());
    for candle in candles {
        match series.last_mut() {
            Some(last) if last.timestamp == candle.timestamp => *last = candle,
            _ => series.push(candle),
        }
    }
    series
}

fn validate_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field });
    }
    Ok(())
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

fn validate_optional_non_negative(
    field: &'static str,
    value: Option<f64>,
) -> Result<(), ValidationError> {
    if let Some(value) = value {
        validate_non_negative(field, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(seconds: i64) -> UtcDateTime {
        UtcDateTime::from_unix_seconds(seconds).expect("timestamp")
    }

    fn candle(seconds: i64, close: f64) -> CandlestickData {
        CandlestickData::new(ts(seconds), close, close + 1.0, close - 1.0, close, 10.0)
            .expect("valid candle")
    }

    #[test]
    fn price_must_be_positive_and_finite() {
        assert!(matches!(
            PriceData::new(0.0, ts(0)),
            Err(ValidationError::NonPositiveValue { field: "price" })
        ));
        assert!(matches!(
            PriceData::new(f64::NAN, ts(0)),
            Err(ValidationError::NonFiniteValue { field: "price" })
        ));
        assert!(PriceData::new(0.0001, ts(0)).is_ok());
    }

    #[test]
    fn negative_change_is_allowed() {
        let price = PriceData::new(10.0, ts(0))
            .and_then(|price| price.with_change_24h(Some(-4.2)))
            .expect("valid price");
        assert_eq!(price.change_24h, Some(-4.2));
    }

    #[test]
    fn rejects_inverted_candle() {
        let err = CandlestickData::new(ts(0), 10.0, 9.0, 11.0, 10.0, 0.0).expect_err("must fail");
        assert_eq!(err, ValidationError::InvalidCandleRange);
    }

    #[test]
    fn normalize_sorts_and_keeps_latest_duplicate() {
        let series = normalize_series(vec![candle(3, 3.0), candle(1, 1.0), candle(3, 30.0), candle(2, 2.0)]);

        let closes: Vec<f64> = series.iter().map(|candle| candle.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 30.0]);
    }
}
