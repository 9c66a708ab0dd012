use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{AssetType, ValidationError};

/// Canonical identifiers of the upstream market-data providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    AlphaVantage,
    CoinGecko,
}

impl ProviderId {
    pub const ALL: [Self; 2] = [Self::AlphaVantage, Self::CoinGecko];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlphaVantage => "alphavantage",
            Self::CoinGecko => "coingecko",
        }
    }

    /// Asset family served by the provider.
    pub const fn asset_type(self) -> AssetType {
        match self {
            Self::AlphaVantage => AssetType::Stock,
            Self::CoinGecko => AssetType::Crypto,
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "alphavantage" => Ok(Self::AlphaVantage),
            "coingecko" => Ok(Self::CoinGecko),
            other => Err(ValidationError::InvalidProvider {
                value: other.to_owned(),
            }),
        }
    }
}
