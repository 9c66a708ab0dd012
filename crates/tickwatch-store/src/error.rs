use std::path::PathBuf;

use thiserror::Error;
use tickwatch_core::{ApiError, ErrorCode, ErrorState, UtcDateTime};

/// Failure of a watchlist storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access watchlist file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("watchlist file '{path}' is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("watchlist file version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("watchlist storage unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a store action.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("'{symbol}' is already in the watchlist")]
    Duplicate { symbol: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Duplicate { .. } => ErrorCode::InvalidSymbol,
            Self::Storage(_) => ErrorCode::ExternalApiError,
            Self::Api(error) => error.code,
        }
    }

    /// The error in the shape endpoint envelopes carry.
    pub fn to_api_error(&self) -> ApiError {
        match self {
            Self::Api(error) => error.clone(),
            other => ApiError::new(other.code(), other.to_string()),
        }
    }

    /// The error as the UI renders it.
    pub fn to_error_state(&self, timestamp: UtcDateTime) -> ErrorState {
        match self {
            Self::Api(error) => error.to_error_state(timestamp),
            other => ErrorState {
                code: other.code(),
                message: other.to_string(),
                details: None,
                timestamp,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_renders_as_invalid_symbol() {
        let ts = UtcDateTime::parse("2024-06-01T00:00:00Z").expect("timestamp");
        let state = StoreError::Duplicate {
            symbol: String::from("AAPL"),
        }
        .to_error_state(ts);

        assert_eq!(state.code, ErrorCode::InvalidSymbol);
        assert_eq!(state.message, "'AAPL' is already in the watchlist");
    }

    #[test]
    fn api_errors_keep_their_code_and_details() {
        let ts = UtcDateTime::parse("2024-06-01T00:00:00Z").expect("timestamp");
        let error = StoreError::from(
            ApiError::rate_limited("slow down").with_details(serde_json::json!({ "provider": "coingecko" })),
        );
        let state = error.to_error_state(ts);

        assert_eq!(state.code, ErrorCode::ApiRateLimit);
        assert!(state.details.is_some());
    }

    #[test]
    fn storage_failure_becomes_external_api_error() {
        let error = StoreError::from(StorageError::Unavailable(String::from("read-only")));
        let api = error.to_api_error();

        assert_eq!(api.code, ErrorCode::ExternalApiError);
        assert_eq!(api.status, 500);
        assert!(api.message.contains("read-only"));
    }
}
