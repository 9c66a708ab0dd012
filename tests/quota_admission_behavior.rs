//! Behavior-driven tests for quota admission.
//!
//! These tests verify HOW the usage tracker and the quota-gated call wrapper
//! admit, count and reject upstream calls as windows fill and roll over.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tickwatch_core::{
    classify, handle_error, with_error_handling, ApiResponse, ErrorCode, ManualClock, ProviderId,
    UpstreamError, UsagePolicy, UsageTracker, UsageWindow, UtcDateTime,
};

fn start() -> UtcDateTime {
    UtcDateTime::parse("2024-06-01T23:59:30Z").expect("valid timestamp")
}

fn tracker_with(limit: u32) -> (UsageTracker, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let policies = HashMap::from([
        (
            ProviderId::AlphaVantage,
            UsagePolicy {
                limit,
                window: UsageWindow::Daily,
            },
        ),
        (
            ProviderId::CoinGecko,
            UsagePolicy {
                limit,
                window: UsageWindow::Minute,
            },
        ),
    ]);
    (UsageTracker::new(policies, clock.clone()), clock)
}

// =============================================================================
// Quota: Limits
// =============================================================================

#[test]
fn when_quota_fills_further_increments_are_rejected_without_counting() {
    // Given: A tracker allowing three calls per provider
    let (tracker, _) = tracker_with(3);

    for provider in ProviderId::ALL {
        // When: More increments arrive than the limit allows
        let accepted = (0..5).filter(|_| tracker.increment_usage(provider)).count();

        // Then: Exactly the limit is admitted and used never exceeds it
        assert_eq!(accepted, 3);
        let record = tracker.all_usage_data()[&provider];
        assert_eq!(record.used, 3);
        assert_eq!(record.remaining(), 0);
        assert!(!tracker.check_availability(provider).available);
    }
}

#[test]
fn when_quota_is_zero_nothing_is_admitted() {
    let (tracker, _) = tracker_with(0);

    assert!(!tracker.check_availability(ProviderId::CoinGecko).available);
    assert!(!tracker.increment_usage(ProviderId::CoinGecko));
}

// =============================================================================
// Quota: Window Reset
// =============================================================================

#[test]
fn when_minute_window_elapses_counter_resets_with_later_reset_time() {
    // Given: An exhausted minute-window provider
    let (tracker, clock) = tracker_with(1);
    assert!(tracker.increment_usage(ProviderId::CoinGecko));
    let first = tracker.check_availability(ProviderId::CoinGecko);
    assert!(!first.available);
    assert_eq!(
        first.reset_time,
        Some(UtcDateTime::parse("2024-06-01T23:59:00Z").expect("valid").saturating_add(Duration::from_secs(60)))
    );

    // When: The clock reaches the reset time
    clock.advance(Duration::from_secs(30));
    let after = tracker.check_availability(ProviderId::CoinGecko);

    // Then: The counter is zero and the next reset is strictly later
    assert!(after.available);
    assert_eq!(after.remaining, 1);
    assert!(after.reset_time > first.reset_time);
}

#[test]
fn when_day_rolls_over_daily_counter_resets_at_midnight_utc() {
    let (tracker, clock) = tracker_with(2);
    assert!(tracker.increment_usage(ProviderId::AlphaVantage));
    assert!(tracker.increment_usage(ProviderId::AlphaVantage));

    // Still the same day: remains exhausted
    clock.advance(Duration::from_secs(29));
    assert!(!tracker.increment_usage(ProviderId::AlphaVantage));

    // Midnight: a fresh window
    clock.advance(Duration::from_secs(1));
    assert!(tracker.increment_usage(ProviderId::AlphaVantage));

    let record = tracker.all_usage_data()[&ProviderId::AlphaVantage];
    assert_eq!(record.used, 1);
    assert_eq!(record.reset_time, UtcDateTime::parse("2024-06-03T00:00:00Z").expect("valid"));
}

#[test]
fn when_stats_are_read_after_window_they_report_reset_values() {
    let (tracker, clock) = tracker_with(4);
    assert!(tracker.increment_usage(ProviderId::CoinGecko));
    assert!(tracker.increment_usage(ProviderId::CoinGecko));

    let before = tracker
        .usage_stats()
        .into_iter()
        .find(|entry| entry.provider == ProviderId::CoinGecko)
        .expect("coingecko stats");
    assert_eq!(before.used, 2);
    assert_eq!(before.percentage, 50.0);

    clock.advance(Duration::from_secs(120));
    let after = tracker
        .usage_stats()
        .into_iter()
        .find(|entry| entry.provider == ProviderId::CoinGecko)
        .expect("coingecko stats");
    assert_eq!(after.used, 0);
    assert_eq!(after.remaining, 4);
}

// =============================================================================
// Quota Gate: End-to-End
// =============================================================================

#[tokio::test]
async fn when_provider_is_rate_limited_operation_is_never_invoked() {
    // Given: A provider whose quota is exhausted
    let (tracker, _) = tracker_with(1);
    assert!(tracker.increment_usage(ProviderId::AlphaVantage));
    assert!(!tracker.check_availability(ProviderId::AlphaVantage).available);

    // When: A call is attempted through the quota gate
    let calls = AtomicUsize::new(0);
    let result: Result<String, UpstreamError> =
        with_error_handling(&tracker, ProviderId::AlphaVantage, "details", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(String::from("should not happen"))
        })
        .await;

    // Then: The call is rejected as API_RATE_LIMIT and never attempted
    let failure = result.expect_err("exhausted quota must reject");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(classify(&failure).code, ErrorCode::ApiRateLimit);

    // And: The response envelope carries the rate-limit error
    let response: ApiResponse<String> = handle_error(&failure, Some("details"), start());
    assert!(!response.success);
    assert_eq!(response.http_status(), 429);
    let body = serde_json::to_value(&response).expect("serialize envelope");
    assert_eq!(body["error"]["code"], "API_RATE_LIMIT");
    assert_eq!(body["error"]["details"]["provider"], "alphavantage");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn when_operation_fails_usage_is_not_counted() {
    let (tracker, _) = tracker_with(2);

    let result: Result<(), UpstreamError> =
        with_error_handling(&tracker, ProviderId::CoinGecko, "search", || async {
            Err(UpstreamError::Timeout {
                message: String::from("10000ms elapsed"),
            })
        })
        .await;

    assert!(matches!(result, Err(UpstreamError::Timeout { .. })));
    assert_eq!(tracker.all_usage_data()[&ProviderId::CoinGecko].used, 0);
}

#[tokio::test]
async fn when_provider_has_no_policy_calls_are_admitted() {
    // Given: A tracker that only knows about CoinGecko
    let clock = Arc::new(ManualClock::new(start()));
    let tracker = UsageTracker::new(
        HashMap::from([(ProviderId::CoinGecko, UsagePolicy::coingecko_default())]),
        clock,
    );

    // When/Then: Alpha Vantage calls fail open
    for _ in 0..50 {
        let result = with_error_handling(&tracker, ProviderId::AlphaVantage, "quote", || async {
            Ok::<_, UpstreamError>(())
        })
        .await;
        assert!(result.is_ok());
    }
    assert!(!tracker.all_usage_data().contains_key(&ProviderId::AlphaVantage));
}
