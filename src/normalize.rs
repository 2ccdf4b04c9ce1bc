//! Normalization and deduplication of raw connector output.
//!
//! [`normalize`] is total: every [`RawDocument`] becomes a content-addressed
//! [`CanonicalDocument`]. [`dedupe`] then keeps the first document for each
//! canonical URL, preserving input order.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use url::Url;

use crate::metrics::Metrics;
use crate::models::{CanonicalDocument, Provenance, RawDocument, CLASSIFICATION};

/// Canonical form of `raw` used as the deduplication key.
///
/// The scheme and host are lower-cased, a non-default port is kept, the
/// trailing slash is stripped from the path, and the query and fragment are
/// discarded. Strings that do not parse as URLs get the same treatment
/// textually.
pub fn canonical_url(raw: &str) -> String {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(url) if url.host_str().is_some() => {
            let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
            let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
            format!(
                "{}://{}{}{}",
                url.scheme(),
                host,
                port,
                url.path().trim_end_matches('/')
            )
        }
        _ => canonical_fallback(raw),
    }
}

fn canonical_fallback(raw: &str) -> String {
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    let without_query = &raw[..end];

    let canonical = match without_query.split_once("://") {
        Some((scheme, rest)) => {
            let (authority, path) = match rest.find('/') {
                Some(i) => rest.split_at(i),
                None => (rest, ""),
            };
            format!(
                "{}://{}{}",
                scheme.to_ascii_lowercase(),
                authority.to_ascii_lowercase(),
                path
            )
        }
        None => without_query.to_string(),
    };
    canonical.trim_end_matches('/').to_string()
}

/// SHA-256 of `content`, lower-case hex (64 characters).
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the canonical form of one raw document.
pub fn normalize(raw: RawDocument) -> CanonicalDocument {
    let hash = content_hash(&raw.raw.content());
    let provenance = Provenance {
        url: raw.url.clone(),
        fetched_at: raw.fetched_at,
        content_hash: hash.clone(),
        connector: raw.source.clone(),
    };

    CanonicalDocument {
        id: hash[..8].to_string(),
        title: raw.title,
        summary: raw.summary,
        url: canonical_url(&raw.url),
        source: raw.source,
        fetched_at: raw.fetched_at,
        raw: raw.raw,
        hash,
        classification: CLASSIFICATION.to_string(),
        provenance,
    }
}

/// Keep the first document for each canonical URL, in input order.
pub fn dedupe(docs: Vec<CanonicalDocument>) -> Vec<CanonicalDocument> {
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter(|doc| seen.insert(doc.url.clone()))
        .collect()
}

/// Normalize every raw document, drop duplicates, and report the source mix
/// and dedupe ratio to `metrics`.
pub fn pipeline(raw_docs: Vec<RawDocument>, metrics: &Metrics) -> Vec<CanonicalDocument> {
    let total = raw_docs.len();
    let normalized: Vec<CanonicalDocument> = raw_docs
        .into_iter()
        .map(|raw| {
            metrics.record_source(raw.raw.lang(), raw.raw.region());
            normalize(raw)
        })
        .collect();

    let unique = dedupe(normalized);
    metrics.record_dedupe_ratio(total, unique.len());
    tracing::debug!(total, unique = unique.len(), "normalized documents");
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::Map;

    use crate::models::RawPayload;

    fn raw(url: &str, content: &str) -> RawDocument {
        RawDocument {
            title: "T".to_string(),
            summary: "S".to_string(),
            url: url.to_string(),
            source: "x".to_string(),
            fetched_at: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            raw: RawPayload::text(content),
        }
    }

    #[test]
    fn test_canonical_url_equivalences() {
        let base = canonical_url("https://example.com/foo");
        assert_eq!(base, "https://example.com/foo");
        assert_eq!(canonical_url("https://EXAMPLE.com/foo/"), base);
        assert_eq!(canonical_url("HTTPS://Example.COM/foo"), base);
        assert_eq!(canonical_url("https://example.com/foo?utm=1#top"), base);
        assert_eq!(canonical_url("https://example.com/"), "https://example.com");
        assert_eq!(canonical_url("https://example.com"), "https://example.com");
    }

    #[test]
    fn test_canonical_url_keeps_path_case_and_port() {
        assert_eq!(
            canonical_url("https://example.com:8443/Foo/"),
            "https://example.com:8443/Foo"
        );
        assert_eq!(canonical_url("https://example.com:443/a"), "https://example.com/a");
    }

    #[test]
    fn test_canonical_url_fallback_for_unparseable() {
        assert_eq!(canonical_url(""), "");
        assert_eq!(canonical_url("not a url/"), "not a url");
        assert_eq!(canonical_url("/relative/path/?q=1"), "/relative/path");
    }

    #[test]
    fn test_normalize_doc() {
        let doc = normalize(raw("https://example.com/foo/", "hi"));
        assert_eq!(
            doc.hash,
            "8f434346648f6b96df89dda901c5176b10a6d83961dd3c1ac88b59b2dc327aa4"
        );
        assert_eq!(doc.id, "8f434346");
        assert_eq!(doc.url, "https://example.com/foo");
        assert_eq!(doc.provenance.url, "https://example.com/foo/");
        assert_eq!(doc.provenance.content_hash, doc.hash);
        assert_eq!(doc.provenance.connector, "x");
        assert_eq!(doc.classification, "OFFICIAL");
    }

    #[test]
    fn test_normalize_is_idempotent_and_total() {
        assert_eq!(normalize(raw("u", "body")), normalize(raw("u", "body")));

        let mut empty = raw("https://example.com", "");
        empty.raw = RawPayload::Opaque {
            content: String::new(),
            lang: None,
            region: None,
            extra: Map::new(),
        };
        let doc = normalize(empty);
        assert_eq!(doc.hash, content_hash(""));
        assert_eq!(doc.hash.len(), 64);
    }

    #[test]
    fn test_pipeline_keeps_first_of_each_url() {
        let metrics = Metrics::new();
        let docs = pipeline(
            vec![
                raw("https://example.com/a", "first"),
                raw("https://example.com/b", "other"),
                raw("https://EXAMPLE.com/a/", "second"),
            ],
            &metrics,
        );
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].raw.content(), "first");
        assert_eq!(docs[1].url, "https://example.com/b");

        let snap = metrics.snapshot();
        assert!((snap.dedupe_ratio - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(snap.source_mix.get("unknown-unknown"), Some(&3));
    }

    #[test]
    fn test_pipeline_empty_input() {
        let metrics = Metrics::new();
        assert!(pipeline(Vec::new(), &metrics).is_empty());
        assert_eq!(metrics.snapshot().dedupe_ratio, 0.0);
    }
}
