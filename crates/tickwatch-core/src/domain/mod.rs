//! # Domain Models
//!
//! Canonical types shared by the provider adapters, the market service and
//! the client stores.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Asset`] | Stock or crypto instrument identity |
//! | [`PriceData`] | Latest known price and market stats |
//! | [`CandlestickData`] | One OHLCV chart bucket |
//! | [`Timeframe`] | Chart span (1D, 1W, 1M, 3M, 1Y) |
//! | [`AssetDetails`] | Asset plus its current price |
//! | [`SearchResults`] | Stock and crypto search hits |
//! | [`UtcDateTime`] | UTC timestamp |

mod asset;
mod models;
mod price;
mod timeframe;
mod timestamp;

pub use asset::{normalize_symbol, Asset, AssetType};
pub use models::{AssetDetails, SearchHit, SearchResults};
pub use price::{normalize_series, CandlestickData, PriceData};
pub use timeframe::Timeframe;
pub use timestamp::UtcDateTime;
