//! End-to-end tests for the collection pipeline.
//!
//! In-memory connectors are registered through the public `Connector` trait
//! and driven through `Pipeline::search` / `Pipeline::profile`, exercising
//! supervision, fan-out, normalization, dedup, metrics and the audit log.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use evidence_harness::audit::AuditLog;
use evidence_harness::fetcher::FetchError;
use evidence_harness::metrics::Metrics;
use evidence_harness::models::{RawDocument, RawPayload};
use evidence_harness::orchestrator::Orchestrator;
use evidence_harness::pipeline::Pipeline;
use evidence_harness::traits::{Connector, ConnectorRegistry, SearchParams};

// ─── Test Connectors ────────────────────────────────────────────────

/// Returns a fixed list of `(title, url, content)` documents.
struct Static {
    name: &'static str,
    docs: Vec<(&'static str, &'static str, &'static str)>,
}

#[async_trait]
impl Connector for Static {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Static test connector"
    }

    async fn search(
        &self,
        _query: &str,
        _kind: Option<&str>,
        _params: &SearchParams,
    ) -> Result<Vec<RawDocument>> {
        Ok(self
            .docs
            .iter()
            .map(|(title, url, content)| RawDocument {
                title: title.to_string(),
                summary: String::new(),
                url: url.to_string(),
                source: self.name.to_string(),
                fetched_at: Utc::now(),
                raw: RawPayload::text(*content),
            })
            .collect())
    }
}

struct Broken;

#[async_trait]
impl Connector for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    async fn search(
        &self,
        _query: &str,
        _kind: Option<&str>,
        _params: &SearchParams,
    ) -> Result<Vec<RawDocument>> {
        Err(FetchError::HttpStatus(503).into())
    }
}

struct Unreachable;

#[async_trait]
impl Connector for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn description(&self) -> &str {
        "Fails without a status"
    }

    async fn search(
        &self,
        _query: &str,
        _kind: Option<&str>,
        _params: &SearchParams,
    ) -> Result<Vec<RawDocument>> {
        bail!("connection reset")
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn pipeline_with(connectors: Vec<Box<dyn Connector>>) -> (Pipeline, Arc<AuditLog>, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new());
    let mut registry = ConnectorRegistry::new(metrics.clone());
    for connector in connectors {
        registry.register(connector);
    }
    let orchestrator = Orchestrator::new(&registry, SearchParams::default());
    let audit = Arc::new(AuditLog::new());
    (
        Pipeline::new(orchestrator, audit.clone(), metrics.clone()),
        audit,
        metrics,
    )
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_duplicate_documents_collapse() {
    let (pipeline, _, metrics) = pipeline_with(vec![Box::new(Static {
        name: "dup",
        docs: vec![
            ("t", "https://example.com/a", "x"),
            ("t", "https://example.com/a", "x"),
        ],
    })]);

    let response = pipeline.search("x", None).await;
    assert_eq!(response.count, 1);
    assert_eq!(response.docs.len(), 1);
    assert_eq!(metrics.snapshot().dedupe_ratio, 0.5);
}

#[tokio::test]
async fn test_failing_connector_is_tolerated() {
    let (pipeline, _, metrics) = pipeline_with(vec![
        Box::new(Broken),
        Box::new(Static {
            name: "ok",
            docs: vec![("t", "https://example.com/ok", "fine")],
        }),
        Box::new(Unreachable),
    ]);

    let response = pipeline.search("x", None).await;
    assert_eq!(response.count, 1);
    assert_eq!(response.docs[0].source, "ok");

    let snap = metrics.snapshot();
    assert_eq!(snap.connector_calls["broken"], 1);
    assert_eq!(snap.connector_status["broken"][&503], 1);
    assert_eq!(snap.connector_status["unreachable"][&0], 1);
    assert_eq!(snap.connector_success["ok"], 1);
    assert!(!snap.connector_success.contains_key("broken"));
}

#[tokio::test]
async fn test_profile_extracts_signals() {
    let (pipeline, audit, _) = pipeline_with(vec![Box::new(Static {
        name: "mail",
        docs: vec![(
            "X",
            "https://example.com/x",
            "Contact alice@example.com for more on X.",
        )],
    })]);

    let profile = pipeline.profile("X", Some("person")).await;
    assert!(profile
        .signals
        .emails
        .contains(&"alice@example.com".to_string()));
    assert_eq!(profile.name, "X");
    assert_eq!(profile.count, 1);
    assert!((profile.confidence - 0.2).abs() < 1e-9);

    let today = Utc::now().date_naive();
    let actions: Vec<String> = audit
        .events(today)
        .iter()
        .map(|line| {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            v["action"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(actions, vec!["profile_start", "profile_end"]);
    assert_ne!(audit.merkle_root(today), "");
}

#[tokio::test]
async fn test_profile_collects_timeline_events() {
    let (pipeline, _, _) = pipeline_with(vec![Box::new(Static {
        name: "news",
        docs: vec![(
            "Acme",
            "https://news.example/acme",
            "On 1 Jan 2020, Alice founded Acme in Sydney.",
        )],
    })]);

    let profile = pipeline.profile("Acme", Some("organization")).await;
    assert_eq!(profile.events.len(), 1);
    assert_eq!(profile.events[0].who, "Alice");
    assert_eq!(profile.events[0].source, "https://news.example/acme");
}

#[tokio::test]
async fn test_output_order_is_deterministic() {
    let build = || {
        pipeline_with(vec![
            Box::new(Static {
                name: "first",
                docs: vec![
                    ("a", "https://one.example/a", "1"),
                    ("b", "https://one.example/b", "2"),
                ],
            }),
            Box::new(Broken),
            Box::new(Static {
                name: "second",
                docs: vec![
                    ("c", "https://two.example/c", "3"),
                    ("dup", "https://ONE.example/a/", "4"),
                ],
            }),
        ])
    };

    let (p1, _, _) = build();
    let (p2, _, _) = build();
    let urls = |docs: &[evidence_harness::models::CanonicalDocument]| {
        docs.iter().map(|d| d.url.clone()).collect::<Vec<_>>()
    };

    let r1 = p1.search("q", None).await;
    let r2 = p2.search("q", None).await;
    assert_eq!(urls(&r1.docs), urls(&r2.docs));
    assert_eq!(
        urls(&r1.docs),
        vec![
            "https://one.example/a",
            "https://one.example/b",
            "https://two.example/c"
        ]
    );
}
