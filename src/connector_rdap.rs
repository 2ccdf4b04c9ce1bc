//! RDAP domain registration connector.
//!
//! Only activates when the query looks like a domain name; any other
//! query returns no documents without touching the network.

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;

use crate::models::{RawDocument, RawPayload};
use crate::retry::FetchClient;
use crate::traits::{Connector, SearchParams};

const HOST: &str = "rdap.org";

pub struct RdapConnector {
    client: Arc<dyn FetchClient>,
}

impl RdapConnector {
    pub fn new(client: Arc<dyn FetchClient>) -> Self {
        Self { client }
    }
}

/// Label characters, dots, and a final alphabetic TLD of two or more letters.
pub fn is_domain(query: &str) -> bool {
    static DOMAIN: OnceLock<Regex> = OnceLock::new();
    DOMAIN
        .get_or_init(|| {
            Regex::new(r"^[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("domain regex is valid")
        })
        .is_match(query)
}

#[async_trait]
impl Connector for RdapConnector {
    fn name(&self) -> &str {
        "rdap"
    }

    fn description(&self) -> &str {
        "RDAP domain registration lookup"
    }

    async fn search(
        &self,
        query: &str,
        _kind: Option<&str>,
        params: &SearchParams,
    ) -> Result<Vec<RawDocument>> {
        if !is_domain(query) {
            return Ok(Vec::new());
        }

        let url = format!("https://{}/domain/{}", HOST, query);
        let record = self.client.fetch_json(&url, HOST, params.deadline).await?;
        let summary = record["name"]
            .as_str()
            .or_else(|| record["ldhName"].as_str())
            .unwrap_or_default()
            .to_string();

        Ok(vec![RawDocument {
            title: format!("RDAP data for {}", query),
            summary,
            url,
            source: "rdap".to_string(),
            fetched_at: Utc::now(),
            raw: RawPayload::Rdap { record },
        }])
    }
}
