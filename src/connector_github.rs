//! GitHub user profile connector.
//!
//! Looks up exactly one account by login. A missing profile (HTTP 404 or an
//! empty body) is not an error; it simply yields no documents.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::fetcher::FetchError;
use crate::models::{RawDocument, RawPayload};
use crate::retry::FetchClient;
use crate::traits::{Connector, SearchParams};

const HOST: &str = "api.github.com";

pub struct GitHubUsersConnector {
    client: Arc<dyn FetchClient>,
}

impl GitHubUsersConnector {
    pub fn new(client: Arc<dyn FetchClient>) -> Self {
        Self { client }
    }
}

/// GitHub logins: alphanumerics and single hyphens, at most 39 characters.
fn is_login(query: &str) -> bool {
    !query.is_empty()
        && query.len() <= 39
        && !query.starts_with('-')
        && !query.ends_with('-')
        && query.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|e| e.downcast_ref::<FetchError>())
        .any(|e| e.status_code() == Some(404))
}

#[async_trait]
impl Connector for GitHubUsersConnector {
    fn name(&self) -> &str {
        "github_users"
    }

    fn description(&self) -> &str {
        "GitHub user profile lookup"
    }

    async fn search(
        &self,
        query: &str,
        _kind: Option<&str>,
        params: &SearchParams,
    ) -> Result<Vec<RawDocument>> {
        // Anything else could not be a login and would alter the API path.
        if !is_login(query) {
            return Ok(Vec::new());
        }

        let url = format!("https://{}/users/{}", HOST, query);
        let data = match self.client.fetch_json(&url, HOST, params.deadline).await {
            Ok(data) => data,
            Err(err) if is_not_found(&err) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        Ok(profile_to_document(&data).into_iter().collect())
    }
}

fn field(data: &Value, key: &str) -> Option<String> {
    data[key]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Build a document from a `GET /users/{login}` body; `None` when the body
/// carries no login.
pub fn profile_to_document(data: &Value) -> Option<RawDocument> {
    let login = field(data, "login")?;
    let bio = field(data, "bio");
    Some(RawDocument {
        title: login.clone(),
        summary: bio.clone().unwrap_or_default(),
        url: field(data, "html_url").unwrap_or_default(),
        source: "github_users".to_string(),
        fetched_at: Utc::now(),
        raw: RawPayload::Profile {
            login,
            name: field(data, "name"),
            bio,
            company: field(data, "company"),
            location: field(data, "location"),
            blog: field(data, "blog"),
        },
    })
}
