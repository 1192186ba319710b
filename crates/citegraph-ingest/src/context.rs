//! The handle every ingestion component is built from.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use citegraph_core::config::GraphBackend;
use citegraph_core::{AppConfig, GraphStore, Paper, RawPaper, SqliteGraph, normalize};
use tracing::info;

use crate::error::Result;
use crate::expand::ReferenceExpander;
use crate::http::{RateLimitedClient, ReqwestTransport, Transport};
use crate::rate_limit::{FixedWindowLimiter, RetryPolicy};
use crate::refresh::BulkRefreshScheduler;
use crate::sources::SemanticScholarSource;
use crate::upsert::{GraphUpsertClient, UpsertStats};

/// Configuration, graph store, metadata source and upsert client, wired once at startup.
///
/// The API and the graph store each get their own limiter with the configured quota.
pub struct IngestContext {
    pub config: AppConfig,
    pub source: Arc<SemanticScholarSource>,
    pub upsert: Arc<GraphUpsertClient>,
}

impl IngestContext {
    /// Validate the config, open the configured graph store and check that it answers.
    /// Every error here is fatal for the process.
    pub async fn connect(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let store = open_store(&config).await?;
        store.verify_connectivity().await?;
        info!(backend = ?config.graph.backend, "graph store connected");

        let transport = ReqwestTransport::new(
            &config.api.user_agent,
            Duration::from_secs(config.api.timeout_secs),
        )?;
        Ok(Self::with_parts(config, store, Arc::new(transport)))
    }

    /// Assemble a context from an already-open store and a transport.
    pub fn with_parts(
        config: AppConfig,
        store: Arc<dyn GraphStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);

        let api_limiter = Arc::new(FixedWindowLimiter::from_config(&config.rate_limit));
        let client =
            RateLimitedClient::new(transport, api_limiter, retry.clone(), "semantic_scholar");
        let source = Arc::new(SemanticScholarSource::new(Arc::new(client), &config.api));

        let graph_limiter = Arc::new(FixedWindowLimiter::from_config(&config.rate_limit));
        let upsert = Arc::new(
            GraphUpsertClient::new(store, graph_limiter, retry)
                .with_keywords(config.keywords.enabled),
        );

        Self {
            config,
            source,
            upsert,
        }
    }

    pub fn expander(&self) -> ReferenceExpander {
        ReferenceExpander::new(self.source.clone(), Arc::clone(&self.upsert))
    }

    pub fn scheduler(&self, workers: Option<usize>) -> BulkRefreshScheduler {
        BulkRefreshScheduler::new(
            Arc::new(self.expander()),
            Arc::clone(&self.upsert),
            workers.unwrap_or(self.config.refresh.workers),
        )
        .with_retry_passes(self.config.refresh.retry_passes)
    }

    /// Normalize and write one record. `None` when the record has no usable title.
    pub async fn add_paper(&self, raw: &RawPaper) -> Result<Option<(Paper, UpsertStats)>> {
        let Some(paper) = normalize(raw) else {
            return Ok(None);
        };
        let stats = self.upsert.upsert_paper(&paper).await?;
        Ok(Some((paper, stats)))
    }
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn GraphStore>> {
    match config.graph.backend {
        GraphBackend::Sqlite => {
            let store = SqliteGraph::open(Path::new(&config.graph.sqlite_path))?;
            Ok(Arc::new(store))
        }
        GraphBackend::Neo4j => open_neo4j(config).await,
    }
}

#[cfg(feature = "neo4j")]
async fn open_neo4j(config: &AppConfig) -> Result<Arc<dyn GraphStore>> {
    let uri = config.graph.neo4j_uri.as_deref().unwrap_or_default();
    let password = config.graph.neo4j_password.as_deref().unwrap_or_default();
    let store = citegraph_core::Neo4jGraph::connect(uri, &config.graph.neo4j_user, password).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "neo4j"))]
async fn open_neo4j(_config: &AppConfig) -> Result<Arc<dyn GraphStore>> {
    Err(citegraph_core::CiteGraphError::ConfigError(
        "graph.backend = \"neo4j\" requires a build with the `neo4j` feature".to_string(),
    )
    .into())
}
