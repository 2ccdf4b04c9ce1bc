//! Concurrent fan-out over all registered connectors.
//!
//! Every connector runs as its own task; results are concatenated in
//! registration order, independent of completion order. A connector that
//! fails, times out, or panics contributes nothing.

use std::sync::Arc;

use crate::models::RawDocument;
use crate::supervisor::SupervisedConnector;
use crate::traits::{ConnectorRegistry, SearchParams};

#[derive(Clone)]
pub struct Orchestrator {
    connectors: Vec<Arc<SupervisedConnector>>,
    params: SearchParams,
}

impl Orchestrator {
    pub fn new(registry: &ConnectorRegistry, params: SearchParams) -> Self {
        Self {
            connectors: registry.connectors().to_vec(),
            params,
        }
    }

    pub fn params(&self) -> SearchParams {
        self.params
    }

    pub fn connectors(&self) -> &[Arc<SupervisedConnector>] {
        &self.connectors
    }

    /// Query every connector concurrently and gather their documents.
    pub async fn collect(&self, query: &str, kind: Option<&str>) -> Vec<RawDocument> {
        let handles: Vec<_> = self
            .connectors
            .iter()
            .map(|connector| {
                let connector = connector.clone();
                let query = query.to_string();
                let kind = kind.map(str::to_string);
                let params = self.params;
                tokio::spawn(async move {
                    connector.search(&query, kind.as_deref(), &params).await
                })
            })
            .collect();

        let mut docs = Vec::new();
        for (connector, handle) in self.connectors.iter().zip(handles) {
            match handle.await {
                Ok(found) => docs.extend(found),
                Err(e) => {
                    tracing::error!(
                        connector = connector.name(),
                        error = %e,
                        "connector_error"
                    );
                }
            }
        }

        tracing::info!(
            query,
            connectors = self.connectors.len(),
            docs = docs.len(),
            "collection finished"
        );
        docs
    }
}
