//! The `search` and `profile` operations.
//!
//! Both run the orchestrator, normalize and deduplicate the results, and
//! bracket the work with `*_start` / `*_end` audit events. The end event
//! carries the result count and the elapsed milliseconds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audit::AuditLog;
use crate::config::Config;
use crate::extract::{extract_events, extract_signals, Signals, TimelineEvent};
use crate::fetcher::Fetcher;
use crate::metrics::Metrics;
use crate::models::{AuditAction, AuditEvent, CanonicalDocument};
use crate::normalize;
use crate::orchestrator::Orchestrator;
use crate::retry::{RetryPolicy, RetryingClient};
use crate::traits::{ConnectorRegistry, SearchParams};

/// Documents a profile needs for full confidence.
const PROFILE_CONFIDENT_AT: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub count: usize,
    pub docs: Vec<CanonicalDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub query: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Most frequent document title, or the query when nothing was found.
    pub name: String,
    /// `min(1, count / 5)`.
    pub confidence: f64,
    pub count: usize,
    pub docs: Vec<CanonicalDocument>,
    pub signals: Signals,
    pub events: Vec<TimelineEvent>,
}

pub struct Pipeline {
    orchestrator: Orchestrator,
    audit: Arc<AuditLog>,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(orchestrator: Orchestrator, audit: Arc<AuditLog>, metrics: Arc<Metrics>) -> Self {
        Self {
            orchestrator,
            audit,
            metrics,
        }
    }

    /// Wire the full stack from configuration: one shared fetcher behind a
    /// retrying client, every enabled connector, and the audit log (durable
    /// when `audit.dir` is set).
    pub fn from_config(config: &Config) -> Result<Self> {
        let metrics = Arc::new(Metrics::new());
        let fetcher = Arc::new(Fetcher::new(&config.fetcher));
        let client = Arc::new(RetryingClient::new(
            fetcher,
            RetryPolicy::from(&config.retry),
        ));
        let registry = ConnectorRegistry::from_config(config, client, metrics.clone())?;
        let orchestrator = Orchestrator::new(&registry, SearchParams::from(&config.connectors));

        let audit = match &config.audit.dir {
            Some(dir) => AuditLog::open(dir)?,
            None => AuditLog::new(),
        };

        Ok(Self::new(orchestrator, Arc::new(audit), metrics))
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    async fn collect(&self, query: &str, kind: Option<&str>) -> Vec<CanonicalDocument> {
        let raw = self.orchestrator.collect(query, kind).await;
        normalize::pipeline(raw, &self.metrics)
    }

    pub async fn search(&self, query: &str, kind: Option<&str>) -> SearchResponse {
        let start = Instant::now();
        self.audit
            .append(&AuditEvent::system(AuditAction::SearchStart, query).with("type", kind));

        let docs = self.collect(query, kind).await;

        let latency_ms = start.elapsed().as_millis() as u64;
        self.audit.append(
            &AuditEvent::system(AuditAction::SearchEnd, query)
                .with("count", docs.len())
                .with("latency_ms", latency_ms),
        );
        tracing::info!(query, count = docs.len(), latency_ms, "search complete");

        SearchResponse {
            query: query.to_string(),
            count: docs.len(),
            docs,
        }
    }

    pub async fn profile(&self, query: &str, kind: Option<&str>) -> ProfileResponse {
        let start = Instant::now();
        self.audit
            .append(&AuditEvent::system(AuditAction::ProfileStart, query).with("type", kind));

        let docs = self.collect(query, kind).await;

        let mut signals = Signals::default();
        let mut events = Vec::new();
        for doc in &docs {
            let content = doc.raw.content();
            signals.merge(extract_signals(&content));
            events.extend(extract_events(&content, &doc.url));
        }

        let count = docs.len();
        let latency_ms = start.elapsed().as_millis() as u64;
        self.audit.append(
            &AuditEvent::system(AuditAction::ProfileEnd, query)
                .with("count", count)
                .with("latency_ms", latency_ms),
        );
        tracing::info!(query, count, latency_ms, "profile complete");

        ProfileResponse {
            query: query.to_string(),
            kind: kind.map(str::to_string),
            name: display_name(&docs).unwrap_or_else(|| query.to_string()),
            confidence: profile_confidence(count),
            count,
            docs,
            signals,
            events,
        }
    }
}

/// Most frequent non-empty title; ties go to the title seen first.
pub fn display_name(docs: &[CanonicalDocument]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for doc in docs {
        let title = doc.title.trim();
        if title.is_empty() {
            continue;
        }
        let n = counts.entry(title).or_insert(0);
        if *n == 0 {
            order.push(title);
        }
        *n += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for title in order {
        let n = counts[title];
        match best {
            Some((_, m)) if m >= n => {}
            _ => best = Some((title, n)),
        }
    }
    best.map(|(title, _)| title.to_string())
}

pub fn profile_confidence(count: usize) -> f64 {
    (count as f64 / PROFILE_CONFIDENT_AT).min(1.0)
}
