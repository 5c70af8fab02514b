//! Upstream account usage snapshot.
//!
//! A snapshot is immutable once built; trackers replace it wholesale on
//! refresh.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credits consumed per upstream operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationBreakdown {
    /// Search credits
    #[serde(default)]
    pub search: u64,
    /// Extract credits
    #[serde(default)]
    pub extract: u64,
    /// Crawl credits
    #[serde(default)]
    pub crawl: u64,
    /// Map credits
    #[serde(default)]
    pub map: u64,
    /// Research credits
    #[serde(default)]
    pub research: u64,
}

/// Usage of the API key the gateway calls with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyUsage {
    /// Credits used
    pub usage: u64,
    /// Credit limit
    pub limit: u64,
    /// Per-operation split
    pub breakdown: OperationBreakdown,
}

impl KeyUsage {
    /// Credits left on the key
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.usage)
    }

    /// Percentage of the key limit consumed
    #[must_use]
    pub fn usage_percent(&self) -> f64 {
        if self.limit == 0 {
            0.0
        } else {
            self.usage as f64 / self.limit as f64 * 100.0
        }
    }
}

/// Usage of the account owning the key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUsage {
    /// Plan name
    pub current_plan: String,
    /// Plan credits used
    pub plan_usage: u64,
    /// Plan credit limit
    pub plan_limit: u64,
    /// Pay-as-you-go credits used
    pub paygo_usage: u64,
    /// Pay-as-you-go credit limit
    pub paygo_limit: u64,
    /// Per-operation split
    pub breakdown: OperationBreakdown,
}

impl Default for AccountUsage {
    fn default() -> Self {
        Self {
            current_plan: "unknown".to_string(),
            plan_usage: 0,
            plan_limit: 0,
            paygo_usage: 0,
            paygo_limit: 0,
            breakdown: OperationBreakdown::default(),
        }
    }
}

impl AccountUsage {
    /// Plan credits left
    #[must_use]
    pub fn plan_remaining(&self) -> u64 {
        self.plan_limit.saturating_sub(self.plan_usage)
    }

    /// Pay-as-you-go credits left
    #[must_use]
    pub fn paygo_remaining(&self) -> u64 {
        self.paygo_limit.saturating_sub(self.paygo_usage)
    }

    /// Percentage of the plan consumed
    #[must_use]
    pub fn plan_usage_percent(&self) -> f64 {
        if self.plan_limit == 0 {
            0.0
        } else {
            self.plan_usage as f64 / self.plan_limit as f64 * 100.0
        }
    }
}

/// Point-in-time view of key and account consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Key usage
    pub key: KeyUsage,
    /// Account usage
    pub account: AccountUsage,
    /// When the snapshot was fetched
    pub fetched_at: DateTime<Utc>,
}

impl UsageSnapshot {
    /// Remaining credits derived from this snapshot
    #[must_use]
    pub fn remaining(&self) -> RemainingCredits {
        RemainingCredits {
            key_remaining: self.key.remaining(),
            plan_remaining: self.account.plan_remaining(),
            paygo_remaining: self.account.paygo_remaining(),
        }
    }

    /// Per-operation breakdown derived from this snapshot
    #[must_use]
    pub fn breakdown(&self) -> UsageBreakdown {
        UsageBreakdown {
            key: self.key.breakdown,
            account: self.account.breakdown,
        }
    }
}

/// Remaining credits across key, plan and pay-as-you-go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingCredits {
    /// Credits left on the key
    pub key_remaining: u64,
    /// Plan credits left
    pub plan_remaining: u64,
    /// Pay-as-you-go credits left
    pub paygo_remaining: u64,
}

/// Per-operation usage for key and account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageBreakdown {
    /// Key split
    pub key: OperationBreakdown,
    /// Account split
    pub account: OperationBreakdown,
}
