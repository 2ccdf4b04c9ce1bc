//! Connector trait and registry.
//!
//! Every external source implements [`Connector`]. The registry wraps each
//! one in a [`SupervisedConnector`], which owns that source's concurrency
//! gate and turns any failure into an empty result, and keeps them in
//! configuration order so the orchestrator can fan results back in
//! deterministically.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               ConnectorRegistry              │
//! │  ┌───────────┐ ┌───────────┐ ┌────────────┐  │
//! │  │ wikipedia │ │ news/rdap │ │ placeholder│  │
//! │  │           │ │ github    │ │ sources    │  │
//! │  └───────────┘ └───────────┘ └────────────┘  │
//! │   each wrapped in SupervisedConnector        │
//! └──────────────┬───────────────────────────────┘
//!                ▼
//!        Orchestrator::collect() → normalize
//! ```
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use evidence_harness::metrics::Metrics;
//! use evidence_harness::traits::ConnectorRegistry;
//!
//! let mut connectors = ConnectorRegistry::new(Arc::new(Metrics::new()));
//! // connectors.register(Box::new(MyConnector::new()));
//! assert!(connectors.is_empty());
//! ```

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::{Config, ConnectorsConfig};
use crate::connector_github::GitHubUsersConnector;
use crate::connector_news::GoogleNewsConnector;
use crate::connector_placeholder::PlaceholderConnector;
use crate::connector_rdap::RdapConnector;
use crate::connector_wiki::MediaWikiConnector;
use crate::metrics::Metrics;
use crate::models::RawDocument;
use crate::retry::FetchClient;
use crate::supervisor::SupervisedConnector;

/// Names of every built-in connector, in default fan-in order.
pub const BUILTIN_CONNECTORS: &[&str] = &[
    "wikipedia",
    "google_news",
    "rdap",
    "github_users",
    "wikidata",
    "openalex",
    "abn_lookup",
    "sec_edgar",
    "companies_house",
    "open_corporates",
    "gdelt",
    "crt_sh",
    "wayback",
];

/// Per-call knobs passed to every connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    /// Maximum number of documents to return.
    pub limit: usize,
    /// Wall-clock budget for the whole call, retries included.
    pub timeout_ms: u64,
    /// Absolute end of the current call. Set by the supervisor and passed
    /// down to the fetch layer.
    pub deadline: Option<Instant>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            limit: 5,
            timeout_ms: 10_000,
            deadline: None,
        }
    }
}

impl SearchParams {
    pub fn with_deadline(self, deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..self
        }
    }
}

impl From<&ConnectorsConfig> for SearchParams {
    fn from(config: &ConnectorsConfig) -> Self {
        Self {
            limit: config.limit,
            timeout_ms: config.timeout_ms,
            deadline: None,
        }
    }
}

/// A data source that turns a `(query, type)` pair into raw documents.
///
/// Implementations may fail freely; the [`SupervisedConnector`] wrapper
/// converts failures into an empty list before anything reaches the
/// orchestrator.
///
/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use chrono::Utc;
/// use evidence_harness::models::{RawDocument, RawPayload};
/// use evidence_harness::traits::{Connector, SearchParams};
///
/// pub struct StaticConnector;
///
/// #[async_trait]
/// impl Connector for StaticConnector {
///     fn name(&self) -> &str { "static" }
///     fn description(&self) -> &str { "Always returns one document" }
///
///     async fn search(
///         &self,
///         query: &str,
///         _kind: Option<&str>,
///         _params: &SearchParams,
///     ) -> Result<Vec<RawDocument>> {
///         Ok(vec![RawDocument {
///             title: query.to_string(),
///             summary: String::new(),
///             url: "https://example.com/".to_string(),
///             source: self.name().to_string(),
///             fetched_at: Utc::now(),
///             raw: RawPayload::text(query),
///         }])
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connector identifier, used as the document `source`.
    fn name(&self) -> &str;

    /// One-line description, shown by `evh sources`.
    fn description(&self) -> &str;

    /// Whether this source is not implemented yet and always returns
    /// nothing.
    fn is_placeholder(&self) -> bool {
        false
    }

    async fn search(
        &self,
        query: &str,
        kind: Option<&str>,
        params: &SearchParams,
    ) -> Result<Vec<RawDocument>>;
}

/// Build the built-in connector called `name`.
pub fn builtin_connector(name: &str, client: Arc<dyn FetchClient>) -> Result<Box<dyn Connector>> {
    let connector: Box<dyn Connector> = match name {
        "wikipedia" => Box::new(MediaWikiConnector::new(client)),
        "google_news" => Box::new(GoogleNewsConnector::new(client)),
        "rdap" => Box::new(RdapConnector::new(client)),
        "github_users" => Box::new(GitHubUsersConnector::new(client)),
        "wikidata" => Box::new(PlaceholderConnector::new("wikidata", "Wikidata entity search")),
        "openalex" => Box::new(PlaceholderConnector::new("openalex", "OpenAlex scholarly works")),
        "abn_lookup" => Box::new(PlaceholderConnector::new(
            "abn_lookup",
            "Australian Business Number register",
        )),
        "sec_edgar" => Box::new(PlaceholderConnector::new("sec_edgar", "SEC EDGAR filings")),
        "companies_house" => Box::new(PlaceholderConnector::new(
            "companies_house",
            "UK Companies House register",
        )),
        "open_corporates" => Box::new(PlaceholderConnector::new(
            "open_corporates",
            "OpenCorporates company search",
        )),
        "gdelt" => Box::new(PlaceholderConnector::new("gdelt", "GDELT event database")),
        "crt_sh" => Box::new(PlaceholderConnector::new(
            "crt_sh",
            "Certificate transparency logs",
        )),
        "wayback" => Box::new(PlaceholderConnector::new("wayback", "Wayback Machine snapshots")),
        other => bail!(
            "Unknown connector: '{}'. Available: {}",
            other,
            BUILTIN_CONNECTORS.join(", ")
        ),
    };
    Ok(connector)
}

/// Ordered set of supervised connectors.
pub struct ConnectorRegistry {
    connectors: Vec<Arc<SupervisedConnector>>,
    metrics: Arc<Metrics>,
}

impl ConnectorRegistry {
    /// Create an empty registry whose connectors report to `metrics`.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            connectors: Vec::new(),
            metrics,
        }
    }

    /// Create a registry holding every connector in `connectors.enabled`,
    /// in that order.
    pub fn from_config(
        config: &Config,
        client: Arc<dyn FetchClient>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let mut registry = Self::new(metrics);
        for name in &config.connectors.enabled {
            registry.register(builtin_connector(name, client.clone())?);
        }
        Ok(registry)
    }

    /// Wrap `connector` in its own gate and append it.
    pub fn register(&mut self, connector: Box<dyn Connector>) {
        self.connectors.push(Arc::new(SupervisedConnector::new(
            connector,
            self.metrics.clone(),
        )));
    }

    pub fn connectors(&self) -> &[Arc<SupervisedConnector>] {
        &self.connectors
    }

    pub fn find(&self, name: &str) -> Option<&Arc<SupervisedConnector>> {
        self.connectors.iter().find(|c| c.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }
}
