//! Core data models used throughout Evidence Harness.
//!
//! These types represent the documents and audit records that flow through
//! the collection pipeline: connectors produce [`RawDocument`]s, the
//! normalizer turns them into [`CanonicalDocument`]s, and every pipeline
//! boundary is recorded as an [`AuditEvent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Classification stamped on every document produced by this pipeline.
pub const CLASSIFICATION: &str = "OFFICIAL";

/// Raw item produced by a connector before normalization. Untrusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub title: String,
    pub summary: String,
    pub url: String,
    /// Connector identifier (e.g. `"wikipedia"`).
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub raw: RawPayload,
}

/// Source-specific payload carried alongside a raw document.
///
/// Every variant yields a `content` string (the hashed body) and optional
/// language/region hints, so normalization stays total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawPayload {
    /// One hit from the MediaWiki search API.
    Wiki {
        snippet: String,
        #[serde(default)]
        pageid: Option<u64>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    /// One `<item>` from an RSS news feed.
    News {
        description: String,
        #[serde(default)]
        pub_date: Option<String>,
        #[serde(default)]
        region: Option<String>,
    },
    /// An RDAP domain record, kept verbatim.
    Rdap { record: Value },
    /// A code-hosting user profile.
    Profile {
        login: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        bio: Option<String>,
        #[serde(default)]
        company: Option<String>,
        #[serde(default)]
        location: Option<String>,
        #[serde(default)]
        blog: Option<String>,
    },
    /// Anything else: free text plus optional hints and extra fields.
    Opaque {
        #[serde(default)]
        content: String,
        #[serde(default)]
        lang: Option<String>,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        extra: Map<String, Value>,
    },
}

impl RawPayload {
    /// Shorthand for an [`RawPayload::Opaque`] payload with only content.
    pub fn text(content: impl Into<String>) -> Self {
        RawPayload::Opaque {
            content: content.into(),
            lang: None,
            region: None,
            extra: Map::new(),
        }
    }

    /// The textual body that is hashed and scanned for signals.
    pub fn content(&self) -> String {
        match self {
            RawPayload::Wiki { snippet, .. } => snippet.clone(),
            RawPayload::News { description, .. } => description.clone(),
            // serde_json objects serialize with sorted keys, so this is stable.
            RawPayload::Rdap { record } => record.to_string(),
            RawPayload::Profile { bio, .. } => bio.clone().unwrap_or_default(),
            RawPayload::Opaque { content, .. } => content.clone(),
        }
    }

    pub fn lang(&self) -> Option<&str> {
        match self {
            RawPayload::Wiki { .. } | RawPayload::News { .. } => Some("en"),
            RawPayload::Opaque { lang, .. } => lang.as_deref(),
            RawPayload::Rdap { .. } | RawPayload::Profile { .. } => None,
        }
    }

    pub fn region(&self) -> Option<&str> {
        match self {
            RawPayload::News { region, .. } | RawPayload::Opaque { region, .. } => {
                region.as_deref()
            }
            _ => None,
        }
    }
}

/// Where a canonical document came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// The URL exactly as the connector reported it.
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub content_hash: String,
    pub connector: String,
}

/// Normalized, content-addressed document. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    /// First 8 hex characters of [`hash`](Self::hash).
    pub id: String,
    pub title: String,
    pub summary: String,
    /// Canonical URL; the deduplication key.
    pub url: String,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub raw: RawPayload,
    /// SHA-256 hex of `raw.content()`.
    pub hash: String,
    pub classification: String,
    pub provenance: Provenance,
}

/// Kind of action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SearchStart,
    SearchEnd,
    ProfileStart,
    ProfileEnd,
    Backup,
    Restore,
}

/// One immutable entry in the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: AuditAction,
    pub target: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AuditEvent {
    /// An event performed by the pipeline itself (`actor = "system"`).
    pub fn system(action: AuditAction, target: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            actor: "system".to_string(),
            action,
            target: target.into(),
            metadata: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}
