//! Provider adapter contract and the market API consumed by client stores.
//!
//! | Layer | Trait | Error type |
//! |-------|-------|------------|
//! | Provider adapter | [`AssetSource`] | [`UpstreamError`] (raw, unclassified) |
//! | Endpoint surface | [`MarketApi`] | [`ApiError`] (classified) |

use std::future::Future;
use std::pin::Pin;

use crate::{
    ApiError, AssetDetails, AssetType, CandlestickData, ProviderId, SearchResults, Timeframe,
    UpstreamError,
};
use crate::domain::Asset;

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UpstreamError>> + Send + 'a>>;

pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// One upstream market data provider serving a single asset type.
///
/// Implementations report failures as raw [`UpstreamError`] values; quota
/// accounting, retries and classification happen above this layer.
pub trait AssetSource: Send + Sync {
    fn provider(&self) -> ProviderId;

    fn asset_type(&self) -> AssetType {
        self.provider().asset_type()
    }

    /// Assets whose symbol or name matches `query`.
    fn search<'a>(&'a self, query: &'a str) -> SourceFuture<'a, Vec<Asset>>;

    /// Descriptive data and latest price for one symbol.
    fn details<'a>(&'a self, symbol: &'a str) -> SourceFuture<'a, AssetDetails>;

    /// Candles covering `timeframe`, in any order.
    fn chart<'a>(&'a self, symbol: &'a str, timeframe: Timeframe) -> SourceFuture<'a, Vec<CandlestickData>>;
}

/// Endpoint surface the client stores call into.
pub trait MarketApi: Send + Sync {
    fn search<'a>(&'a self, query: &'a str) -> ApiFuture<'a, SearchResults>;

    fn details<'a>(&'a self, symbol: &'a str, asset_type: AssetType) -> ApiFuture<'a, AssetDetails>;

    fn chart<'a>(
        &'a self,
        symbol: &'a str,
        asset_type: AssetType,
        timeframe: Timeframe,
    ) -> ApiFuture<'a, Vec<CandlestickData>>;
}
