use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_SYMBOL_LEN: usize = 64;

/// Kind of instrument an [`Asset`] identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Stock,
    Crypto,
}

impl AssetType {
    pub const ALL: [Self; 2] = [Self::Stock, Self::Crypto];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Crypto => "crypto",
        }
    }
}

impl Display for AssetType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stock" => Ok(Self::Stock),
            "crypto" => Ok(Self::Crypto),
            other => Err(ValidationError::InvalidAssetType {
                value: other.to_owned(),
            }),
        }
    }
}

/// A trackable instrument.
///
/// Stock symbols are ticker codes normalized to uppercase; crypto symbols are
/// provider coin ids normalized to lowercase. Equality compares the asset
/// type and the symbol, ignoring case for stocks only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub symbol: String,
    pub name: String,
    pub asset_type: AssetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
}

impl Asset {
    pub fn new(
        symbol: &str,
        name: impl Into<String>,
        asset_type: AssetType,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            symbol: normalize_symbol(symbol, asset_type)?,
            name: name.into(),
            asset_type,
            exchange: None,
        })
    }

    pub fn stock(symbol: &str, name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(symbol, name, AssetType::Stock)
    }

    pub fn crypto(symbol: &str, name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(symbol, name, AssetType::Crypto)
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        let exchange = exchange.into();
        self.exchange = (!exchange.trim().is_empty()).then_some(exchange);
        self
    }

    pub fn same_as(&self, other: &Self) -> bool {
        if self.asset_type != other.asset_type {
            return false;
        }

        match self.asset_type {
            AssetType::Stock => self.symbol.eq_ignore_ascii_case(&other.symbol),
            AssetType::Crypto => self.symbol == other.symbol,
        }
    }

    /// Case-insensitive symbol match, regardless of asset type.
    pub fn matches_symbol(&self, symbol: &str) -> bool {
        self.symbol.eq_ignore_ascii_case(symbol.trim())
    }
}

impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Asset {}

/// Trim, validate and apply the provider-specific casing rule to a symbol.
pub fn normalize_symbol(input: &str, asset_type: AssetType) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptySymbol);
    }

    let len = trimmed.chars().count();
    if len > MAX_SYMBOL_LEN {
        return Err(ValidationError::SymbolTooLong {
            len,
            max: MAX_SYMBOL_LEN,
        });
    }

    for (index, ch) in trimmed.chars().enumerate() {
        let valid = ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_' | '^' | '=');
        if !valid {
            return Err(ValidationError::SymbolInvalidChar { ch, index });
        }
    }

    Ok(match asset_type {
        AssetType::Stock => trimmed.to_ascii_uppercase(),
        AssetType::Crypto => trimmed.to_ascii_lowercase(),
    })
}
