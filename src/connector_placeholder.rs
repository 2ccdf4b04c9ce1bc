//! Sources that are registered but not implemented yet.
//!
//! A placeholder always succeeds with no documents, so it can sit in the
//! fan-out without affecting results or error metrics.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::RawDocument;
use crate::traits::{Connector, SearchParams};

pub struct PlaceholderConnector {
    name: &'static str,
    description: &'static str,
}

impl PlaceholderConnector {
    pub fn new(name: &'static str, description: &'static str) -> Self {
        Self { name, description }
    }
}

#[async_trait]
impl Connector for PlaceholderConnector {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn is_placeholder(&self) -> bool {
        true
    }

    async fn search(
        &self,
        _query: &str,
        _kind: Option<&str>,
        _params: &SearchParams,
    ) -> Result<Vec<RawDocument>> {
        Ok(Vec::new())
    }
}
