//! MediaWiki (Wikipedia) search connector.
//!
//! Queries the English Wikipedia search API and turns each hit into a
//! [`RawDocument`] whose summary is the hit's snippet with the search
//! highlighting markup removed.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use url::Url;

use crate::extract::strip_tags;
use crate::models::{RawDocument, RawPayload};
use crate::retry::FetchClient;
use crate::traits::{Connector, SearchParams};

const HOST: &str = "en.wikipedia.org";

pub struct MediaWikiConnector {
    client: Arc<dyn FetchClient>,
}

impl MediaWikiConnector {
    pub fn new(client: Arc<dyn FetchClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for MediaWikiConnector {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn description(&self) -> &str {
        "Wikipedia full-text search"
    }

    async fn search(
        &self,
        query: &str,
        _kind: Option<&str>,
        params: &SearchParams,
    ) -> Result<Vec<RawDocument>> {
        let limit = params.limit.to_string();
        let url = Url::parse_with_params(
            &format!("https://{}/w/api.php", HOST),
            &[
                ("action", "query"),
                ("list", "search"),
                ("format", "json"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
            ],
        )?;

        let data = self.client.fetch_json(url.as_str(), HOST, params.deadline).await?;
        Ok(parse_search_response(&data, params.limit))
    }
}

/// Turn a `list=search` response into documents.
pub fn parse_search_response(data: &Value, limit: usize) -> Vec<RawDocument> {
    let hits = match data.pointer("/query/search").and_then(Value::as_array) {
        Some(hits) => hits,
        None => return Vec::new(),
    };

    hits.iter()
        .take(limit)
        .map(|hit| {
            let title = hit["title"].as_str().unwrap_or_default().to_string();
            let snippet = strip_tags(hit["snippet"].as_str().unwrap_or_default());
            RawDocument {
                url: format!("https://{}/wiki/{}", HOST, title.replace(' ', "_")),
                title,
                summary: snippet.clone(),
                source: "wikipedia".to_string(),
                fetched_at: Utc::now(),
                raw: RawPayload::Wiki {
                    snippet,
                    pageid: hit["pageid"].as_u64(),
                    timestamp: hit["timestamp"].as_str().map(str::to_string),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Instant;

    struct CannedJson {
        body: Value,
        requests: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl FetchClient for CannedJson {
        async fn fetch_json(
            &self,
            url: &str,
            host: &str,
            _deadline: Option<Instant>,
        ) -> Result<Value> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), host.to_string()));
            Ok(self.body.clone())
        }
        async fn fetch_text(
            &self,
            _url: &str,
            _host: &str,
            _deadline: Option<Instant>,
        ) -> Result<String> {
            anyhow::bail!("not used")
        }
    }

    #[tokio::test]
    async fn test_mediawiki_connector() {
        let client = Arc::new(CannedJson {
            body: json!({
                "query": {"search": [
                    {"title": "Alice Smith", "snippet": "Alice <span class=\"searchmatch\">Smith</span> is", "pageid": 42}
                ]}
            }),
            requests: Mutex::new(Vec::new()),
        });
        let connector = MediaWikiConnector::new(client.clone());
        let docs = connector
            .search("alice smith", None, &SearchParams::default())
            .await
            .unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "wikipedia");
        assert_eq!(docs[0].summary, "Alice Smith is");
        assert_eq!(docs[0].url, "https://en.wikipedia.org/wiki/Alice_Smith");
        assert_eq!(docs[0].raw.content(), "Alice Smith is");

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].1, "en.wikipedia.org");
        assert!(requests[0].0.contains("srsearch=alice+smith"));
        assert!(requests[0].0.contains("srlimit=5"));
    }

    #[test]
    fn test_missing_search_block_is_empty() {
        assert!(parse_search_response(&json!({"error": "x"}), 5).is_empty());
    }
}
