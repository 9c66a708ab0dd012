use serde::{Deserialize, Serialize};

use crate::{Asset, AssetType, PriceData};

/// Asset identity together with its freshly fetched price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDetails {
    pub asset: Asset,
    pub price: PriceData,
}

/// Search hits from both providers, kept apart by origin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub stocks: Vec<Asset>,
    pub crypto: Vec<Asset>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty() && self.crypto.is_empty()
    }

    /// Stock hits first, then crypto hits, each tagged with its origin.
    pub fn hits(&self) -> Vec<SearchHit> {
        let stocks = self.stocks.iter().map(|asset| SearchHit {
            origin: AssetType::Stock,
            asset: asset.clone(),
        });
        let crypto = self.crypto.iter().map(|asset| SearchHit {
            origin: AssetType::Crypto,
            asset: asset.clone(),
        });
        stocks.chain(crypto).collect()
    }
}

/// One search result tagged with the provider family it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub origin: AssetType,
    pub asset: Asset,
}
