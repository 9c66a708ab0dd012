//! Classification of upstream failures into the fixed error taxonomy, the
//! quota-gated call wrapper and request parameter validation.
//!
//! Classification precedence (first match wins):
//!
//! | Step | Failure | Kind |
//! |------|---------|------|
//! | 1 | already classified, or `Other` whose code names a kind | that kind, verbatim |
//! | 2 | HTTP status | per [`ErrorCode::from_status`] |
//! | 3 | DNS failure / connection refused, or code `ENOTFOUND`, `EAI_AGAIN`, `ECONNREFUSED`, `ECONNRESET` | `NETWORK_ERROR` (503) |
//! | 4 | timeout, or code `ETIMEDOUT`, `ECONNABORTED` | `NETWORK_ERROR` (408) |
//! | 5 | anything else | `EXTERNAL_API_ERROR` |

use std::collections::BTreeMap;
use std::future::Future;

use serde_json::json;
use tracing::{debug, error, warn};

use crate::usage::UsageTracker;
use crate::{ApiError, ApiResponse, ErrorCode, ProviderId, UpstreamError, UtcDateTime};

const FALLBACK_MESSAGE: &str = "An unexpected error occurred while contacting the data provider";

/// Maps any upstream failure onto exactly one taxonomy kind.
pub fn classify(failure: &UpstreamError) -> ApiError {
    match failure {
        UpstreamError::Classified(error) => error.clone(),
        UpstreamError::Other {
            code: Some(code),
            message,
        } => classify_code(code, message.as_deref()),
        UpstreamError::Status { status, message } => classify_status(*status, message.as_deref()),
        UpstreamError::Dns { message } | UpstreamError::ConnectionRefused { message } => {
            unreachable_provider(message)
        }
        UpstreamError::Timeout { message } => timed_out(message),
        UpstreamError::Other { code: None, message } => external(message.as_deref()),
    }
}

fn classify_code(code: &str, message: Option<&str>) -> ApiError {
    if let Ok(kind) = code.parse::<ErrorCode>() {
        return ApiError::new(
            kind,
            message.map_or_else(|| kind.user_message().to_owned(), str::to_owned),
        );
    }

    let detail = message.filter(|message| !message.trim().is_empty()).unwrap_or(code);
    match code.trim().to_ascii_uppercase().as_str() {
        "ENOTFOUND" | "EAI_AGAIN" | "ECONNREFUSED" | "ECONNRESET" => unreachable_provider(detail),
        "ETIMEDOUT" | "ECONNABORTED" => timed_out(detail),
        _ => external(message),
    }
}

fn unreachable_provider(detail: &str) -> ApiError {
    ApiError::network(format!("Unable to connect to the data provider: {detail}")).with_status(503)
}

fn timed_out(detail: &str) -> ApiError {
    ApiError::network(format!("The data provider did not respond in time: {detail}"))
        .with_status(408)
}

fn external(message: Option<&str>) -> ApiError {
    ApiError::external(
        message
            .filter(|message| !message.trim().is_empty())
            .unwrap_or(FALLBACK_MESSAGE),
    )
}

fn classify_status(status: u16, message: Option<&str>) -> ApiError {
    let kind = ErrorCode::from_status(status);
    let message = message
        .filter(|message| !message.trim().is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| match kind {
            ErrorCode::ExternalApiError => {
                format!("The data provider responded with status {status}")
            }
            _ => kind.user_message().to_owned(),
        });

    let outbound = match (kind, status) {
        (ErrorCode::ExternalApiError, 503) => 503,
        (ErrorCode::ExternalApiError, _) => 502,
        (_, status) => status,
    };

    ApiError::new(kind, message)
        .with_status(outbound)
        .with_details(json!({ "upstreamStatus": status }))
}

/// Classifies a failure and logs it with an optional context label.
pub fn classify_logged(failure: &UpstreamError, context: Option<&str>) -> ApiError {
    let classified = classify(failure);
    let context = context.unwrap_or("unlabelled");

    if classified.status >= 500 {
        error!(context, code = %classified.code, status = classified.status, %failure, "upstream call failed");
    } else {
        warn!(context, code = %classified.code, status = classified.status, %failure, "request rejected");
    }
    classified
}

/// Classifies a failure into a failed response envelope.
pub fn handle_error<T>(
    failure: &UpstreamError,
    context: Option<&str>,
    timestamp: UtcDateTime,
) -> ApiResponse<T> {
    ApiResponse::failure(&classify_logged(failure, context), timestamp)
}

/// Runs `operation` only if `provider` still has quota, counting it on success.
///
/// A denied admission returns `API_RATE_LIMIT` without invoking the
/// operation. Operation failures are returned unchanged.
pub async fn with_error_handling<T, F, Fut>(
    tracker: &UsageTracker,
    provider: ProviderId,
    context: &str,
    operation: F,
) -> Result<T, UpstreamError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let availability = tracker.check_availability(provider);
    if !availability.available {
        let reset = availability
            .reset_time
            .map(|reset| reset.format_rfc3339())
            .unwrap_or_default();
        debug!(%provider, context, reset = %reset, "quota exhausted; call not attempted");
        return Err(UpstreamError::Classified(
            ApiError::rate_limited(format!(
                "{provider} API rate limit exceeded. Resets at {reset}"
            ))
            .with_details(json!({
                "provider": provider.as_str(),
                "remaining": availability.remaining,
                "resetTime": reset,
            })),
        ));
    }

    let value = operation().await?;
    if !tracker.increment_usage(provider) {
        warn!(%provider, context, "call completed after quota filled concurrently");
    }
    Ok(value)
}

/// Named request parameters, e.g. decoded query-string pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams(BTreeMap<String, String>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Fails with `INVALID_SYMBOL` when any required parameter is absent or blank.
///
/// `details.missingParams` lists the offending names in the order requested,
/// without duplicates.
pub fn validate_request(params: &RequestParams, required: &[&str]) -> Result<(), ApiError> {
    let mut missing: Vec<&str> = Vec::new();
    for &name in required {
        let present = params
            .get(name)
            .is_some_and(|value| !value.trim().is_empty());
        if !present && !missing.contains(&name) {
            missing.push(name);
        }
    }

    if missing.is_empty() {
        return Ok(());
    }

    Err(ApiError::invalid_symbol(format!(
        "Missing required parameters: {}",
        missing.join(", ")
    ))
    .with_details(json!({ "missingParams": missing })))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::provider_policy::{UsagePolicy, UsageWindow};

    fn tracker(limit: u32) -> UsageTracker {
        let clock = Arc::new(ManualClock::new(
            UtcDateTime::parse("2024-06-01T00:00:00Z").expect("timestamp"),
        ));
        UsageTracker::new(
            HashMap::from([(
                ProviderId::AlphaVantage,
                UsagePolicy {
                    limit,
                    window: UsageWindow::Daily,
                },
            )]),
            clock,
        )
    }

    #[test]
    fn classified_errors_pass_through_verbatim() {
        let original = ApiError::asset_not_found("no such ticker");
        assert_eq!(classify(&UpstreamError::Classified(original.clone())), original);
    }

    #[test]
    fn other_with_taxonomy_code_is_used_directly() {
        let failure = UpstreamError::Other {
            code: Some(String::from("INVALID_SYMBOL")),
            message: None,
        };
        assert_eq!(classify(&failure).code, ErrorCode::InvalidSymbol);
    }

    #[test]
    fn unknown_code_falls_back_to_external_error() {
        let failure = UpstreamError::Other {
            code: Some(String::from("EPIPE")),
            message: None,
        };
        let classified = classify(&failure);
        assert_eq!(classified.code, ErrorCode::ExternalApiError);
        assert_eq!(classified.message, FALLBACK_MESSAGE);
    }

    #[test]
    fn lowercase_timeout_code_is_network_error() {
        let failure = UpstreamError::Other {
            code: Some(String::from("etimedout")),
            message: None,
        };
        let classified = classify(&failure);
        assert_eq!(classified.code, ErrorCode::NetworkError);
        assert_eq!(classified.status, 408);
        assert!(classified.message.ends_with("etimedout"));
    }

    #[test]
    fn statuses_map_to_kinds() {
        let cases = [
            (400, ErrorCode::InvalidSymbol, 400),
            (403, ErrorCode::NetworkError, 403),
            (404, ErrorCode::AssetNotFound, 404),
            (408, ErrorCode::NetworkError, 408),
            (429, ErrorCode::ApiRateLimit, 429),
            (500, ErrorCode::ExternalApiError, 502),
            (502, ErrorCode::ExternalApiError, 502),
            (503, ErrorCode::ExternalApiError, 503),
        ];

        for (status, kind, outbound) in cases {
            let classified = classify(&UpstreamError::Status {
                status,
                message: None,
            });
            assert_eq!(classified.code, kind, "status {status}");
            assert_eq!(classified.status, outbound, "status {status}");
        }
    }

    #[test]
    fn connectivity_and_timeouts_are_network_errors() {
        let dns = classify(&UpstreamError::Dns {
            message: String::from("getaddrinfo ENOTFOUND"),
        });
        let refused = classify(&UpstreamError::ConnectionRefused {
            message: String::from("ECONNREFUSED"),
        });
        let timeout = classify(&UpstreamError::Timeout {
            message: String::from("5000ms"),
        });

        assert_eq!(dns.code, ErrorCode::NetworkError);
        assert_eq!(refused.code, ErrorCode::NetworkError);
        assert_eq!(timeout.code, ErrorCode::NetworkError);
        assert_eq!(timeout.status, 408);
    }

    #[test]
    fn unknown_failures_fall_back_to_external_error() {
        let with_message = classify(&UpstreamError::other("boom"));
        let bare = classify(&UpstreamError::Other {
            code: Some(String::from("EWHATEVER")),
            message: None,
        });

        assert_eq!(with_message.code, ErrorCode::ExternalApiError);
        assert_eq!(with_message.message, "boom");
        assert_eq!(bare.code, ErrorCode::ExternalApiError);
        assert_eq!(bare.message, FALLBACK_MESSAGE);
    }

    #[test]
    fn handle_error_builds_failed_envelope() {
        let ts = UtcDateTime::parse("2024-06-01T00:00:00Z").expect("timestamp");
        let response: ApiResponse<()> =
            handle_error(&UpstreamError::status(404, "Unknown symbol"), Some("details"), ts);

        assert!(!response.success);
        assert_eq!(response.http_status(), 404);
        assert_eq!(
            response.error.expect("error body").code,
            ErrorCode::AssetNotFound
        );
    }

    #[tokio::test]
    async fn denied_admission_never_invokes_operation() {
        let tracker = tracker(0);
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = with_error_handling(&tracker, ProviderId::AlphaVantage, "quote", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        let error = classify(&result.expect_err("must be rate limited"));
        assert_eq!(error.code, ErrorCode::ApiRateLimit);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_counts_usage_and_failure_propagates_unchanged() {
        let tracker = tracker(5);

        let value = with_error_handling(&tracker, ProviderId::AlphaVantage, "quote", || async {
            Ok::<_, UpstreamError>(42)
        })
        .await
        .expect("should succeed");
        assert_eq!(value, 42);
        assert_eq!(tracker.all_usage_data()[&ProviderId::AlphaVantage].used, 1);

        let failure = UpstreamError::status(500, "upstream exploded");
        let result: Result<(), _> = with_error_handling(&tracker, ProviderId::AlphaVantage, "quote", || {
            let failure = failure.clone();
            async move { Err(failure) }
        })
        .await;

        assert_eq!(result, Err(failure));
        assert_eq!(tracker.all_usage_data()[&ProviderId::AlphaVantage].used, 1);
    }

    #[test]
    fn validate_request_lists_missing_params_in_order() {
        let params = RequestParams::from_pairs([("a", "1"), ("c", "  ")]);

        let error = validate_request(&params, &["a", "b", "c", "b"]).expect_err("must fail");
        assert_eq!(error.code, ErrorCode::InvalidSymbol);
        assert_eq!(
            error.details.expect("details")["missingParams"],
            json!(["b", "c"])
        );
    }

    #[test]
    fn validate_request_accepts_complete_params() {
        let params = RequestParams::from_pairs([("a", "1"), ("b", "2")]);
        assert!(validate_request(&params, &["a", "b"]).is_ok());
    }
}
