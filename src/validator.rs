//! Remote token validation
//!
//! Validates local token estimates against the vendor count-tokens endpoint.
//! Each call is one authenticated request with a bounded timeout; there are
//! no retries. Consecutive failures are tracked and, once the configured
//! threshold is crossed, the validator marks itself unavailable for the
//! remainder of the run so a degraded dependency is never hammered. The
//! caller falls back to local estimation on any failure.

use crate::config::get_config;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct CountTokensResponse {
    input_tokens: u64,
}

pub struct RemoteTokenValidator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    failure_threshold: u32,
    consecutive_failures: AtomicU32,
    disabled: AtomicBool,
    api_calls: AtomicU64,
    in_flight: Semaphore,
}

impl RemoteTokenValidator {
    pub fn new(api_key: String) -> Result<Self> {
        let config = get_config();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.remote.timeout_secs))
            .build()
            .context("Failed to build HTTP client for token validation")?;

        Ok(Self {
            client,
            endpoint: config.remote.endpoint.clone(),
            model: config.remote.model.clone(),
            api_key,
            failure_threshold: config.remote.failure_threshold,
            consecutive_failures: AtomicU32::new(0),
            disabled: AtomicBool::new(false),
            api_calls: AtomicU64::new(0),
            in_flight: Semaphore::new(config.remote.max_in_flight),
        })
    }

    /// Like [`new`](Self::new), but pointed at a specific endpoint instead
    /// of the configured one. Used against local or staging stand-ins for
    /// the vendor API.
    pub fn with_endpoint(api_key: String, endpoint: String) -> Result<Self> {
        let mut validator = Self::new(api_key)?;
        validator.endpoint = endpoint;
        Ok(validator)
    }

    /// Whether the validator is still usable in this run. Flips to false
    /// permanently once the consecutive-failure threshold is crossed.
    pub fn is_available(&self) -> bool {
        !self.disabled.load(Ordering::Relaxed)
    }

    pub fn api_calls_made(&self) -> u64 {
        self.api_calls.load(Ordering::Relaxed)
    }

    /// Count tokens for `text` via the remote endpoint. One request, bounded
    /// timeout, no retry; any failure returns `Err` so the caller can fall
    /// back to the local estimator.
    pub async fn count_tokens(&self, text: &str, system: Option<&str>) -> Result<u64> {
        if !self.is_available() {
            anyhow::bail!("remote validation disabled for the remainder of this run");
        }

        let _permit = self
            .in_flight
            .acquire()
            .await
            .context("validation semaphore closed")?;

        self.api_calls.fetch_add(1, Ordering::Relaxed);

        match self.request(text, system).await {
            Ok(count) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                Ok(count)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }

    async fn request(&self, text: &str, system: Option<&str>) -> Result<u64> {
        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": text}],
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .context("count_tokens request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("count_tokens returned {}: {}", status, body);
        }

        let counted: CountTokensResponse = response
            .json()
            .await
            .context("Failed to parse count_tokens response")?;

        debug!(tokens = counted.input_tokens, "remote token count succeeded");
        Ok(counted.input_tokens)
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.failure_threshold && !self.disabled.swap(true, Ordering::Relaxed) {
            warn!(
                consecutive_failures = failures,
                threshold = self.failure_threshold,
                "remote validation failure threshold crossed, \
                 falling back to local estimation for the rest of the run"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> RemoteTokenValidator {
        RemoteTokenValidator::new("test-key".to_string()).unwrap()
    }

    #[test]
    fn test_starts_available() {
        let v = validator();
        assert!(v.is_available());
        assert_eq!(v.api_calls_made(), 0);
    }

    #[test]
    fn test_failure_threshold_disables() {
        let v = validator();
        for _ in 0..v.failure_threshold {
            v.record_failure();
        }
        assert!(!v.is_available());
    }

    #[test]
    fn test_below_threshold_stays_available() {
        let v = validator();
        for _ in 0..v.failure_threshold - 1 {
            v.record_failure();
        }
        assert!(v.is_available());
    }

    #[tokio::test]
    async fn test_disabled_validator_makes_no_calls() {
        let v = validator();
        for _ in 0..v.failure_threshold {
            v.record_failure();
        }
        let calls_before = v.api_calls_made();
        let result = v.count_tokens("some text", None).await;
        assert!(result.is_err());
        assert_eq!(v.api_calls_made(), calls_before);
    }
}
