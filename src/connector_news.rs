//! Google News RSS connector.
//!
//! Fetches the Google News search feed for the query and reads each
//! `<item>`'s title, link, description and publication date. The payload
//! keeps the description as published; only the summary is tag-stripped.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use quick_xml::events::Event;
use url::Url;

use crate::extract::strip_tags;
use crate::models::{RawDocument, RawPayload};
use crate::retry::FetchClient;
use crate::traits::{Connector, SearchParams};

const HOST: &str = "news.google.com";
const REGION: &str = "AU";

pub struct GoogleNewsConnector {
    client: Arc<dyn FetchClient>,
}

impl GoogleNewsConnector {
    pub fn new(client: Arc<dyn FetchClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for GoogleNewsConnector {
    fn name(&self) -> &str {
        "google_news"
    }

    fn description(&self) -> &str {
        "Google News RSS search"
    }

    async fn search(
        &self,
        query: &str,
        _kind: Option<&str>,
        params: &SearchParams,
    ) -> Result<Vec<RawDocument>> {
        let url = Url::parse_with_params(
            &format!("https://{}/rss/search", HOST),
            &[
                ("q", query),
                ("hl", "en-AU"),
                ("gl", REGION),
                ("ceid", "AU:en"),
            ],
        )?;
        let text = self.client.fetch_text(url.as_str(), HOST, params.deadline).await?;

        let docs = parse_feed(&text, params.limit)?
            .into_iter()
            .map(|item| {
                let summary = strip_tags(&item.description);
                RawDocument {
                    title: item.title,
                    summary,
                    url: item.link,
                    source: "google_news".to_string(),
                    fetched_at: Utc::now(),
                    raw: RawPayload::News {
                        description: item.description,
                        pub_date: item.pub_date,
                        region: Some(REGION.to_string()),
                    },
                }
            })
            .collect();
        Ok(docs)
    }
}

/// One `<item>` of an RSS channel.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: Option<String>,
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl FeedItem {
    fn push(&mut self, field: Field, text: &str) {
        match field {
            Field::Title => self.title.push_str(text),
            Field::Link => self.link.push_str(text),
            Field::Description => self.description.push_str(text),
            Field::PubDate => self.pub_date.get_or_insert_with(String::new).push_str(text),
        }
    }
}

/// Parse up to `limit` items from an RSS document. An empty body yields no
/// items; malformed XML is an error.
pub fn parse_feed(xml: &str, limit: usize) -> Result<Vec<FeedItem>> {
    let mut items = Vec::new();
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current: Option<FeedItem> = None;
    let mut field: Option<Field> = None;

    while items.len() < limit {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"item" => current = Some(FeedItem::default()),
                b"title" => field = Some(Field::Title),
                b"link" => field = Some(Field::Link),
                b"description" => field = Some(Field::Description),
                b"pubDate" => field = Some(Field::PubDate),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.push(f, &t.unescape()?);
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.push(f, &String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"item" => {
                    if let Some(item) = current.take() {
                        items.push(item);
                    }
                }
                b"title" | b"link" | b"description" | b"pubDate" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(anyhow!(
                    "malformed feed at byte {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
    }
    Ok(items)
}
