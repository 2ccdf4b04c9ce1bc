//! Supervisory wrapper applied to every connector.
//!
//! [`SupervisedConnector::search`] never fails. Around each call it:
//!
//! - waits on the connector's own gate (one permit, so at most one call
//!   per source is in flight no matter how many requests are running),
//! - bounds the whole call, gate wait included, by `timeout_ms`, and hands
//!   the resulting deadline down to the fetch layer,
//! - logs any failure or panic and returns an empty list instead,
//! - records exactly one metric: 200 on success, otherwise the upstream
//!   HTTP status if the error carries one, else 0.
//!
//! The inner call runs on its own task, which owns the gate permit. When
//! the deadline fires the caller stops waiting, but the permit is only
//! released once that task, and any blocking fetch it started, has
//! finished.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tokio::sync::Semaphore;

use crate::extract::redact;
use crate::fetcher::FetchError;
use crate::metrics::Metrics;
use crate::models::RawDocument;
use crate::traits::{Connector, SearchParams};

pub struct SupervisedConnector {
    inner: Arc<dyn Connector>,
    gate: Arc<Semaphore>,
    metrics: Arc<Metrics>,
}

impl SupervisedConnector {
    pub fn new(inner: Box<dyn Connector>, metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Arc::from(inner),
            gate: Arc::new(Semaphore::new(1)),
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn inner(&self) -> &dyn Connector {
        self.inner.as_ref()
    }

    pub async fn search(
        &self,
        query: &str,
        kind: Option<&str>,
        params: &SearchParams,
    ) -> Vec<RawDocument> {
        let start = Instant::now();
        let budget = Duration::from_millis(params.timeout_ms);
        let params = params.with_deadline(start + budget);

        let outcome = tokio::time::timeout(budget, self.run(query, kind, params)).await;

        let (docs, status) = match outcome {
            Ok(Ok(docs)) => (docs, 200),
            Ok(Err(err)) => {
                tracing::error!(
                    connector = self.name(),
                    error = %redact(&format!("{:#}", err)),
                    "connector_error"
                );
                (Vec::new(), status_of(&err))
            }
            Err(_) => {
                tracing::error!(
                    connector = self.name(),
                    error = %format!("timed out after {}ms", params.timeout_ms),
                    "connector_error"
                );
                (Vec::new(), 0)
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        self.metrics
            .record_connector_metric(self.name(), status, latency_ms);
        tracing::debug!(
            connector = self.name(),
            status,
            latency_ms,
            docs = docs.len(),
            "connector finished"
        );
        docs
    }

    /// Take the gate, then run the inner call on a task that holds the
    /// permit until it returns. A panic in the connector becomes an error.
    async fn run(
        &self,
        query: &str,
        kind: Option<&str>,
        params: SearchParams,
    ) -> Result<Vec<RawDocument>> {
        let permit = self
            .gate
            .clone()
            .acquire_owned()
            .await
            .context("connector gate closed")?;

        let inner = self.inner.clone();
        let query = query.to_string();
        let kind = kind.map(str::to_string);
        let handle = tokio::spawn(async move {
            let _permit = permit;
            inner.search(&query, kind.as_deref(), &params).await
        });

        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(anyhow!("connector panicked")),
            Err(e) => Err(anyhow!("connector task cancelled: {}", e)),
        }
    }
}

/// HTTP-like status carried anywhere in the error chain, else 0.
fn status_of(err: &anyhow::Error) -> u16 {
    err.chain()
        .find_map(|e| e.downcast_ref::<FetchError>())
        .and_then(FetchError::status_code)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::FetcherConfig;
    use crate::connector_wiki::MediaWikiConnector;
    use crate::fetcher::{Fetcher, PinnedRequest, Resolve, Transport, TransportResponse};
    use crate::models::RawPayload;
    use crate::retry::{RetryPolicy, RetryingClient};
    use std::net::SocketAddr;
    use std::sync::Mutex;

    struct Failing;

    #[async_trait]
    impl Connector for Failing {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn search(&self, _q: &str, _k: Option<&str>, _p: &SearchParams) -> Result<Vec<RawDocument>> {
            bail!("boom")
        }
    }

    struct RateLimited;

    #[async_trait]
    impl Connector for RateLimited {
        fn name(&self) -> &str {
            "limited"
        }
        fn description(&self) -> &str {
            "upstream returns 429"
        }
        async fn search(&self, _q: &str, _k: Option<&str>, _p: &SearchParams) -> Result<Vec<RawDocument>> {
            Err(anyhow::Error::new(FetchError::HttpStatus(429)).context("fetching feed"))
        }
    }

    struct Panics;

    #[async_trait]
    impl Connector for Panics {
        fn name(&self) -> &str {
            "panics"
        }
        fn description(&self) -> &str {
            "panics mid-call"
        }
        async fn search(&self, _q: &str, _k: Option<&str>, _p: &SearchParams) -> Result<Vec<RawDocument>> {
            panic!("connector bug")
        }
    }

    struct Slow {
        in_flight: AtomicUsize,
        max_in_flight: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl Slow {
        fn new(delay: Duration) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
                delay,
            }
        }
    }

    #[async_trait]
    impl Connector for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps before answering"
        }
        async fn search(&self, q: &str, _k: Option<&str>, _p: &SearchParams) -> Result<Vec<RawDocument>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![RawDocument {
                title: q.to_string(),
                summary: String::new(),
                url: format!("https://example.com/{}", q),
                source: "slow".to_string(),
                fetched_at: Utc::now(),
                raw: RawPayload::text(q),
            }])
        }
    }

    #[tokio::test]
    async fn test_failure_becomes_empty_and_one_metric() {
        let metrics = Arc::new(Metrics::new());
        let c = SupervisedConnector::new(Box::new(Failing), metrics.clone());
        let docs = c.search("alice", None, &SearchParams::default()).await;
        assert!(docs.is_empty());

        let snap = metrics.snapshot();
        assert_eq!(snap.connector_calls["fail"], 1);
        assert!(snap.connector_success.get("fail").is_none());
        assert_eq!(snap.connector_status["fail"][&0], 1);
    }

    #[tokio::test]
    async fn test_status_code_found_through_context() {
        let metrics = Arc::new(Metrics::new());
        let c = SupervisedConnector::new(Box::new(RateLimited), metrics.clone());
        assert!(c.search("x", None, &SearchParams::default()).await.is_empty());
        assert_eq!(metrics.snapshot().connector_status["limited"][&429], 1);
    }

    #[tokio::test]
    async fn test_timeout_is_absorbed() {
        let metrics = Arc::new(Metrics::new());
        let c = SupervisedConnector::new(
            Box::new(Slow::new(Duration::from_millis(500))),
            metrics.clone(),
        );
        let params = SearchParams {
            timeout_ms: 20,
            ..SearchParams::default()
        };
        let start = Instant::now();
        assert!(c.search("x", None, &params).await.is_empty());
        assert!(start.elapsed() < Duration::from_millis(400));
        assert_eq!(metrics.snapshot().connector_status["slow"][&0], 1);
    }

    #[tokio::test]
    async fn test_gate_serializes_calls() {
        let metrics = Arc::new(Metrics::new());
        let slow = Slow::new(Duration::from_millis(20));
        let max_in_flight = slow.max_in_flight.clone();
        let c = Arc::new(SupervisedConnector::new(Box::new(slow), metrics.clone()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let c = c.clone();
            handles.push(tokio::spawn(async move {
                c.search(&format!("q{}", i), None, &SearchParams::default())
                    .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().len(), 1);
        }

        assert_eq!(metrics.snapshot().connector_success["slow"], 4);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panic_is_recorded_as_failure() {
        let metrics = Arc::new(Metrics::new());
        let c = SupervisedConnector::new(Box::new(Panics), metrics.clone());
        assert!(c.search("x", None, &SearchParams::default()).await.is_empty());

        let snap = metrics.snapshot();
        assert_eq!(snap.connector_calls["panics"], 1);
        assert_eq!(snap.connector_status["panics"][&0], 1);
    }

    #[tokio::test]
    async fn test_gate_held_until_timed_out_call_finishes() {
        let metrics = Arc::new(Metrics::new());
        let slow = Slow::new(Duration::from_millis(150));
        let max_in_flight = slow.max_in_flight.clone();
        let c = SupervisedConnector::new(Box::new(slow), metrics.clone());

        let short = SearchParams {
            timeout_ms: 20,
            ..SearchParams::default()
        };
        assert!(c.search("a", None, &short).await.is_empty());
        assert_eq!(c.search("b", None, &SearchParams::default()).await.len(), 1);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    struct PublicResolver;

    impl Resolve for PublicResolver {
        fn resolve(&self, _host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
            Ok(vec![SocketAddr::new("93.184.216.34".parse().unwrap(), port)])
        }
    }

    /// Blocks like a slow upstream, ignoring the request timeout.
    #[derive(Default)]
    struct StallingTransport {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        timeouts: Mutex<Vec<Duration>>,
    }

    impl Transport for StallingTransport {
        fn get(&self, request: &PinnedRequest) -> Result<TransportResponse, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.timeouts.lock().unwrap().push(request.timeout);
            std::thread::sleep(Duration::from_millis(300));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Err(FetchError::Transport("stalled".to_string()))
        }
    }

    #[tokio::test]
    async fn test_timed_out_fetch_blocks_next_call() {
        let transport = Arc::new(StallingTransport::default());
        let fetcher = Fetcher::with_backends(
            &FetcherConfig::default(),
            Arc::new(PublicResolver),
            transport.clone(),
        );
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let client = Arc::new(RetryingClient::new(Arc::new(fetcher), policy));
        let metrics = Arc::new(Metrics::new());
        let c = SupervisedConnector::new(Box::new(MediaWikiConnector::new(client)), metrics.clone());

        let params = SearchParams {
            timeout_ms: 50,
            ..SearchParams::default()
        };
        for q in ["a", "b", "c"] {
            assert!(c.search(q, None, &params).await.is_empty());
        }

        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
        let timeouts = transport.timeouts.lock().unwrap();
        assert!(!timeouts.is_empty());
        assert!(timeouts.iter().all(|t| *t <= Duration::from_millis(50)));
        assert_eq!(metrics.snapshot().connector_status["wikipedia"][&0], 3);
    }
}
