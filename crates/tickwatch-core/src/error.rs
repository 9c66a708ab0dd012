use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::UtcDateTime;

/// Validation and contract errors raised while constructing domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid timeframe '{value}', expected one of 1D, 1W, 1M, 3M, 1Y")]
    InvalidTimeframe { value: String },
    #[error("invalid asset type '{value}', expected stock or crypto")]
    InvalidAssetType { value: String },
    #[error("invalid provider '{value}', expected alphavantage or coingecko")]
    InvalidProvider { value: String },
    #[error("invalid error code '{value}'")]
    InvalidErrorCode { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be positive")]
    NonPositiveValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("candle high must be >= low")]
    InvalidCandleRange,
}

/// Fixed error taxonomy shared by every layer that talks to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AssetNotFound,
    ApiRateLimit,
    ExternalApiError,
    InvalidSymbol,
    NetworkError,
}

impl ErrorCode {
    pub const ALL: [Self; 5] = [
        Self::AssetNotFound,
        Self::ApiRateLimit,
        Self::ExternalApiError,
        Self::InvalidSymbol,
        Self::NetworkError,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AssetNotFound => "ASSET_NOT_FOUND",
            Self::ApiRateLimit => "API_RATE_LIMIT",
            Self::ExternalApiError => "EXTERNAL_API_ERROR",
            Self::InvalidSymbol => "INVALID_SYMBOL",
            Self::NetworkError => "NETWORK_ERROR",
        }
    }

    /// Outbound HTTP status used when no more specific status is known.
    pub const fn default_status(self) -> u16 {
        match self {
            Self::InvalidSymbol => 400,
            Self::AssetNotFound => 404,
            Self::ApiRateLimit => 429,
            Self::ExternalApiError => 500,
            Self::NetworkError => 503,
        }
    }

    /// Maps an upstream HTTP status onto the taxonomy.
    pub const fn from_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidSymbol,
            403 | 408 => Self::NetworkError,
            404 => Self::AssetNotFound,
            429 => Self::ApiRateLimit,
            _ => Self::ExternalApiError,
        }
    }

    /// Default user-facing text for the kind.
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::AssetNotFound => "The requested asset could not be found.",
            Self::ApiRateLimit => "API rate limit exceeded. Please try again later.",
            Self::ExternalApiError => "The market data provider returned an error.",
            Self::InvalidSymbol => "The request is missing a valid symbol or parameter.",
            Self::NetworkError => "Unable to reach the market data provider.",
        }
    }

    /// Whether the UI should offer a retry action for this kind.
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::ApiRateLimit | Self::NetworkError | Self::ExternalApiError
        )
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == value.trim())
            .ok_or_else(|| ValidationError::InvalidErrorCode {
                value: value.to_owned(),
            })
    }
}

/// Normalized error produced by the error handler.
///
/// `status` is the HTTP-style status chosen for the outbound response; it is
/// not part of the serialized error body.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} ({code})")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
    pub status: u16,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            status: code.default_status(),
        }
    }

    pub fn asset_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AssetNotFound, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiRateLimit, message)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalApiError, message)
    }

    pub fn invalid_symbol(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSymbol, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn to_error_state(&self, timestamp: UtcDateTime) -> ErrorState {
        ErrorState {
            code: self.code,
            message: self.message.clone(),
            details: self.details.clone(),
            timestamp,
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::invalid_symbol(error.to_string())
    }
}

/// Error shape rendered by the UI and stored in client state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorState {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub timestamp: UtcDateTime,
}

/// Raw failure observed at a provider boundary, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamError {
    /// Already expressed in the taxonomy (local admission denial, provider-specific codes).
    Classified(ApiError),
    /// The upstream answered with a non-success HTTP status.
    Status { status: u16, message: Option<String> },
    /// Host name could not be resolved.
    Dns { message: String },
    /// The connection was refused or reset before a response arrived.
    ConnectionRefused { message: String },
    /// The request exceeded its timeout.
    Timeout { message: String },
    /// Anything else; `code` carries an optional provider or runtime code.
    Other {
        code: Option<String>,
        message: Option<String>,
    },
}

impl UpstreamError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: Some(message.into()),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: None,
            message: Some(message.into()),
        }
    }

    /// HTTP-like status carried by the failure, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Classified(error) => Some(error.status),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl Display for UpstreamError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classified(error) => write!(f, "{error}"),
            Self::Status { status, message } => match message {
                Some(message) => write!(f, "upstream returned status {status}: {message}"),
                None => write!(f, "upstream returned status {status}"),
            },
            Self::Dns { message } => write!(f, "dns lookup failed: {message}"),
            Self::ConnectionRefused { message } => write!(f, "connection refused: {message}"),
            Self::Timeout { message } => write!(f, "request timed out: {message}"),
            Self::Other { code, message } => {
                let message = message.as_deref().unwrap_or("upstream call failed");
                match code {
                    Some(code) => write!(f, "{message} ({code})"),
                    None => f.write_str(message),
                }
            }
        }
    }
}

impl std::error::Error for UpstreamError {}

impl From<ApiError> for UpstreamError {
    fn from(error: ApiError) -> Self {
        Self::Classified(error)
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(error: serde_json::Error) -> Self {
        Self::Other {
            code: Some(String::from("PARSE_ERROR")),
            message: Some(format!("failed to parse provider response: {error}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_round_trips_through_wire_name() {
        for code in ErrorCode::ALL {
            assert_eq!(code.as_str().parse::<ErrorCode>(), Ok(code));
        }
        assert!(matches!(
            "TEAPOT".parse::<ErrorCode>(),
            Err(ValidationError::InvalidErrorCode { .. })
        ));
    }

    #[test]
    fn status_mapping_follows_table() {
        assert_eq!(ErrorCode::from_status(400), ErrorCode::InvalidSymbol);
        assert_eq!(ErrorCode::from_status(403), ErrorCode::NetworkError);
        assert_eq!(ErrorCode::from_status(404), ErrorCode::AssetNotFound);
        assert_eq!(ErrorCode::from_status(408), ErrorCode::NetworkError);
        assert_eq!(ErrorCode::from_status(429), ErrorCode::ApiRateLimit);
        assert_eq!(ErrorCode::from_status(500), ErrorCode::ExternalApiError);
        assert_eq!(ErrorCode::from_status(503), ErrorCode::ExternalApiError);
    }

    #[test]
    fn serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::ApiRateLimit).expect("serialize");
        assert_eq!(json, "\"API_RATE_LIMIT\"");
    }

    #[test]
    fn validation_errors_become_invalid_symbol() {
        let error = ApiError::from(ValidationError::EmptySymbol);
        assert_eq!(error.code, ErrorCode::InvalidSymbol);
        assert_eq!(error.status, 400);
    }
}
