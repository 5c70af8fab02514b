//! Tavily account usage client.

use async_trait::async_trait;
use chrono::Utc;
use gateway_core::{
    AccountUsage, GatewayError, GatewayResult, KeyUsage, OperationBreakdown, UsageSnapshot,
    UsageSource,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::tavily::DEFAULT_BASE_URL;

/// Async client for `GET /usage`
pub struct TavilyUsageClient {
    api_key: SecretString,
    base_url: String,
    client: Client,
}

impl TavilyUsageClient {
    /// Create a usage client with a 10s request timeout
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created
    pub fn new(api_key: SecretString) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl UsageSource for TavilyUsageClient {
    async fn fetch_usage(&self) -> GatewayResult<UsageSnapshot> {
        debug!("Fetching Tavily usage");

        let response = self
            .client
            .get(format!("{}/usage", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| {
                GatewayError::provider(
                    "tavily-usage",
                    format!("Request failed: {e}"),
                    None,
                    e.is_timeout() || e.is_connect(),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, error = %error_body, "Tavily usage endpoint error");
            return Err(GatewayError::provider(
                "tavily-usage",
                error_body,
                Some(status.as_u16()),
                false,
            ));
        }

        let wire: WireUsage = response.json().await.map_err(|e| {
            GatewayError::provider(
                "tavily-usage",
                format!("Failed to parse response: {e}"),
                None,
                false,
            )
        })?;

        Ok(wire.into_snapshot())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireUsage {
    key: WireKey,
    account: WireAccount,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireBreakdown {
    search_usage: u64,
    extract_usage: u64,
    crawl_usage: u64,
    map_usage: u64,
    research_usage: u64,
}

impl From<WireBreakdown> for OperationBreakdown {
    fn from(wire: WireBreakdown) -> Self {
        Self {
            search: wire.search_usage,
            extract: wire.extract_usage,
            crawl: wire.crawl_usage,
            map: wire.map_usage,
            research: wire.research_usage,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireKey {
    usage: u64,
    #[serde(deserialize_with = "null_as_zero")]
    limit: u64,
    #[serde(flatten)]
    breakdown: WireBreakdown,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct WireAccount {
    current_plan: String,
    plan_usage: u64,
    #[serde(deserialize_with = "null_as_zero")]
    plan_limit: u64,
    paygo_usage: u64,
    #[serde(deserialize_with = "null_as_zero")]
    paygo_limit: u64,
    #[serde(flatten)]
    breakdown: WireBreakdown,
}

/// Unlimited plans report `null` limits
fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or(0))
}

impl Default for WireAccount {
    fn default() -> Self {
        Self {
            current_plan: "unknown".to_string(),
            plan_usage: 0,
            plan_limit: 0,
            paygo_usage: 0,
            paygo_limit: 0,
            breakdown: WireBreakdown::default(),
        }
    }
}

impl WireUsage {
    fn into_snapshot(self) -> UsageSnapshot {
        UsageSnapshot {
            key: KeyUsage {
                usage: self.key.usage,
                limit: self.key.limit,
                breakdown: self.key.breakdown.into(),
            },
            account: AccountUsage {
                current_plan: self.account.current_plan,
                plan_usage: self.account.plan_usage,
                plan_limit: self.account.plan_limit,
                paygo_usage: self.account.paygo_usage,
                paygo_limit: self.account.paygo_limit,
                breakdown: self.account.breakdown.into(),
            },
            fetched_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default() {
        let wire: WireUsage =
            serde_json::from_str(r#"{"key": {"usage": 12, "search_usage": 7}}"#).expect("json");
        let snapshot = wire.into_snapshot();

        assert_eq!(snapshot.key.usage, 12);
        assert_eq!(snapshot.key.limit, 0);
        assert_eq!(snapshot.key.breakdown.search, 7);
        assert_eq!(snapshot.account.current_plan, "unknown");
        assert_eq!(snapshot.account.plan_limit, 0);
    }

    #[test]
    fn test_null_limits_read_as_zero() {
        let wire: WireUsage = serde_json::from_str(
            r#"{"key": {"usage": 3, "limit": null}, "account": {"current_plan": "Researcher", "plan_limit": 1000, "paygo_limit": null}}"#,
        )
        .expect("json");
        let snapshot = wire.into_snapshot();
        assert_eq!(snapshot.key.limit, 0);
        assert_eq!(snapshot.account.plan_limit, 1000);
        assert_eq!(snapshot.account.paygo_limit, 0);
    }
}
