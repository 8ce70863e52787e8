//! Alpha Vantage client - the market-data source wrapper
//!
//! Thin HTTP wrapper over the Alpha Vantage query API behind the
//! `MarketData` trait. Responses come back provider-shaped; field
//! extraction belongs to the aggregator.

use crate::error::ChatError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Response keys Alpha Vantage uses for throttle/notice bodies instead of
/// data. These still arrive with HTTP 200.
const NOTICE_KEYS: [&str; 3] = ["Note", "Information", "Error Message"];

/// Market-data lookups used by the aggregator.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn quote(&self, symbol: &str) -> crate::Result<Value>;
    async fn overview(&self, symbol: &str) -> crate::Result<Value>;
    async fn ticker_news(&self, symbol: &str, limit: usize) -> crate::Result<Value>;
    async fn market_news(&self, limit: usize) -> crate::Result<Value>;
}

pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Build from `ALPHA_VANTAGE_API_KEY`. A missing credential is a fatal
    /// configuration error, surfaced once at startup.
    pub fn from_env() -> crate::Result<Self> {
        let api_key = env::var("ALPHA_VANTAGE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ChatError::ConfigError("ALPHA_VANTAGE_API_KEY is not set".to_string())
            })?;

        Ok(Self::new(api_key))
    }

    /// Issue one query-API request. The API key never enters log output.
    async fn get(&self, function: &str, params: &[(&str, &str)]) -> crate::Result<Value> {
        debug!(function, ?params, "Alpha Vantage request");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("function", function)])
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::DataSourceError(format!(
                "Alpha Vantage returned {} for {}",
                status, function
            )));
        }

        let data: Value = response.json().await?;

        let notices = notice_keys(&data);
        if !notices.is_empty() {
            warn!(function, keys = ?notices, "Alpha Vantage API notice");
        }

        Ok(data)
    }
}

/// Notice keys present in a provider body, if any.
fn notice_keys(data: &Value) -> Vec<&'static str> {
    NOTICE_KEYS
        .iter()
        .copied()
        .filter(|k| data.get(k).is_some())
        .collect()
}

#[async_trait]
impl MarketData for AlphaVantageClient {
    async fn quote(&self, symbol: &str) -> crate::Result<Value> {
        self.get("GLOBAL_QUOTE", &[("symbol", symbol)]).await
    }

    async fn overview(&self, symbol: &str) -> crate::Result<Value> {
        self.get("OVERVIEW", &[("symbol", symbol)]).await
    }

    async fn ticker_news(&self, symbol: &str, limit: usize) -> crate::Result<Value> {
        let limit = limit.to_string();
        self.get("NEWS_SENTIMENT", &[("tickers", symbol), ("limit", &limit)])
            .await
    }

    async fn market_news(&self, limit: usize) -> crate::Result<Value> {
        let limit = limit.to_string();
        self.get(
            "NEWS_SENTIMENT",
            &[("topics", "financial_markets"), ("limit", &limit)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_keys_detected() {
        let body = serde_json::json!({
            "Note": "Thank you for using Alpha Vantage! Our standard API rate limit is 25 requests per day."
        });
        assert_eq!(notice_keys(&body), vec!["Note"]);

        let body = serde_json::json!({"Global Quote": {"05. price": "245.30"}});
        assert!(notice_keys(&body).is_empty());
    }

    #[test]
    fn test_from_env_requires_credential() {
        env::remove_var("ALPHA_VANTAGE_API_KEY");
        let result = AlphaVantageClient::from_env();
        assert!(matches!(result, Err(ChatError::ConfigError(_))));
    }
}
