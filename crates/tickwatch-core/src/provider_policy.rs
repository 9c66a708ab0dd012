use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{ProviderId, UtcDateTime};

/// Cadence at which a provider's call counter resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageWindow {
    Daily,
    Minute,
}

impl UsageWindow {
    /// First instant of the window following the one containing `now`.
    pub fn next_reset(self, now: UtcDateTime) -> UtcDateTime {
        match self {
            Self::Daily => now.start_of_next_day(),
            Self::Minute => now.start_of_next_minute(),
        }
    }
}

/// Quota ceiling for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePolicy {
    pub limit: u32,
    pub window: UsageWindow,
}

impl UsagePolicy {
    /// Alpha Vantage free tier: 25 requests per day.
    pub const fn alphavantage_default() -> Self {
        Self {
            limit: 25,
            window: UsageWindow::Daily,
        }
    }

    /// CoinGecko demo tier: 30 requests per minute.
    pub const fn coingecko_default() -> Self {
        Self {
            limit: 30,
            window: UsageWindow::Minute,
        }
    }

    pub const fn default_for(provider: ProviderId) -> Self {
        match provider {
            ProviderId::AlphaVantage => Self::alphavantage_default(),
            ProviderId::CoinGecko => Self::coingecko_default(),
        }
    }

    /// Policies for every known provider.
    pub fn defaults() -> HashMap<ProviderId, Self> {
        ProviderId::ALL
            .into_iter()
            .map(|provider| (provider, Self::default_for(provider)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphavantage_policy_is_daily() {
        let policy = UsagePolicy::alphavantage_default();
        assert_eq!(policy.limit, 25);
        assert_eq!(policy.window, UsageWindow::Daily);
    }

    #[test]
    fn coingecko_policy_is_per_minute() {
        let policy = UsagePolicy::coingecko_default();
        assert_eq!(policy.limit, 30);
        assert_eq!(policy.window, UsageWindow::Minute);
    }

    #[test]
    fn next_reset_depends_on_window() {
        let now = UtcDateTime::parse("2024-06-01T08:15:30Z").expect("timestamp");
        assert_eq!(
            UsageWindow::Daily.next_reset(now),
            UtcDateTime::parse("2024-06-02T00:00:00Z").expect("timestamp")
        );
        assert_eq!(
            UsageWindow::Minute.next_reset(now),
            UtcDateTime::parse("2024-06-01T08:16:00Z").expect("timestamp")
        );
    }
}
