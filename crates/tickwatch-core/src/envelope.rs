use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ApiError, ErrorCode, UtcDateTime};

/// Uniform response envelope returned by every endpoint.
///
/// Success: `{ success: true, data, message?, timestamp }`.
/// Failure: `{ success: false, error: { code, message, details? }, timestamp }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub timestamp: UtcDateTime,
    #[serde(skip)]
    status: u16,
}

/// Serialized error payload of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, timestamp: UtcDateTime) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
            timestamp,
            status: 200,
        }
    }

    pub fn failure(error: &ApiError, timestamp: UtcDateTime) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(ErrorBody {
                code: error.code,
                message: error.message.clone(),
                details: error.details.clone(),
            }),
            timestamp,
            status: error.status,
        }
    }

    pub fn from_result(result: Result<T, ApiError>, timestamp: UtcDateTime) -> Self {
        match result {
            Ok(data) => Self::success(data, timestamp),
            Err(error) => Self::failure(&error, timestamp),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.message = (!message.trim().is_empty()).then_some(message);
        self
    }

    /// HTTP status the response should be sent with.
    pub fn http_status(&self) -> u16 {
        match (self.success, self.status) {
            (true, _) => 200,
            (false, 0) => self
                .error
                .as_ref()
                .map(|error| error.code.default_status())
                .unwrap_or(500),
            (false, status) => status,
        }
    }

    /// Re-types the payload, e.g. into `serde_json::Value` for rendering.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            success: self.success,
            data: self.data.map(f),
            message: self.message,
            error: self.error,
            timestamp: self.timestamp,
            status: self.status,
        }
    }
}
