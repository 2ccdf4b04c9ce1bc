//! Retrying, decoding front end to the [`Fetcher`].
//!
//! Connectors never call the fetcher directly. They go through a
//! [`FetchClient`], whose default implementation [`RetryingClient`] runs the
//! blocking fetch on tokio's blocking pool, decodes the body as JSON or
//! text, and retries any failure with a deterministic exponential backoff.
//!
//! # Retry Strategy
//!
//! - Every failure is retried, whatever its cause.
//! - Default budget: 3 attempts in total.
//! - Backoff: `base_delay × 2^attempt` between attempts (0.5s, 1s by
//!   default). No jitter.
//! - After the last attempt the error is returned to the connector.
//! - With a call deadline, no attempt starts and no backoff sleeps past it,
//!   and each fetch's transport timeout is capped at the time remaining.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::config::RetryConfig;
use crate::fetcher::{FetchError, FetchResult, Fetcher};

/// Attempt budget and backoff schedule.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt with zero-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.min(16))
    }
}

/// Run `op` until it succeeds or the policy's attempts are exhausted.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_until(policy, None, op).await
}

/// [`with_retry`], giving up early when the next backoff would end past
/// `deadline`.
pub async fn with_retry_until<T, F, Fut>(
    policy: &RetryPolicy,
    deadline: Option<Instant>,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 >= policy.attempts => return Err(err),
            Err(err) => {
                let delay = policy.delay_for(attempt);
                if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                    tracing::debug!(attempt, error = %err, "deadline reached, not retrying");
                    return Err(err);
                }
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying fetch");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Decoded fetches on behalf of a connector. `host` is the single host the
/// connector trusts; it becomes the fetcher's allow-list. `deadline` is the
/// end of the connector call, if the caller set one.
#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn fetch_json(&self, url: &str, host: &str, deadline: Option<Instant>)
        -> Result<Value>;
    async fn fetch_text(&self, url: &str, host: &str, deadline: Option<Instant>)
        -> Result<String>;
}

/// [`FetchClient`] backed by a shared [`Fetcher`] and a [`RetryPolicy`].
pub struct RetryingClient {
    fetcher: Arc<Fetcher>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(fetcher: Arc<Fetcher>, policy: RetryPolicy) -> Self {
        Self { fetcher, policy }
    }

    async fn fetch_once(
        &self,
        url: &str,
        host: &str,
        deadline: Option<Instant>,
    ) -> Result<FetchResult> {
        let budget = match deadline {
            Some(d) => match d.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => Some(left),
                _ => return Err(FetchError::DeadlineExceeded.into()),
            },
            None => None,
        };

        let fetcher = self.fetcher.clone();
        let url = url.to_string();
        let host = host.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let allowed = [host.as_str()];
            fetcher.fetch_within(&url, Some(&allowed[..]), budget)
        })
        .await
        .context("fetch task panicked")??;
        Ok(result)
    }
}

#[async_trait]
impl FetchClient for RetryingClient {
    async fn fetch_json(
        &self,
        url: &str,
        host: &str,
        deadline: Option<Instant>,
    ) -> Result<Value> {
        with_retry_until(&self.policy, deadline, || async move {
            let res = self.fetch_once(url, host, deadline).await?;
            let value = serde_json::from_slice(&res.content)
                .with_context(|| format!("invalid JSON from {}", url))?;
            Ok(value)
        })
        .await
    }

    async fn fetch_text(
        &self,
        url: &str,
        host: &str,
        deadline: Option<Instant>,
    ) -> Result<String> {
        with_retry_until(&self.policy, deadline, || async move {
            let res = self.fetch_once(url, host, deadline).await?;
            let text = String::from_utf8(res.content)
                .with_context(|| format!("response from {} is not UTF-8", url))?;
            Ok(text)
        })
        .await
    }
}
