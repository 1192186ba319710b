//! Merge-by-key writes against the graph store, behind their own call quota and retry policy.

use std::future::Future;
use std::ops::{Add, AddAssign};
use std::sync::Arc;

use citegraph_core::keywords::paper_keywords;
use citegraph_core::{
    Author, Direction, GraphCounts, GraphStore, GraphWrite, Label, NodeKey, Paper, Properties,
    RelKind, WriteSummary,
};
use serde::Serialize;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::rate_limit::{Attempt, FixedWindowLimiter, RetryPolicy};

const SERVICE: &str = "graph";

/// Entities actually created by one or more upserts. Zero on a repeated identical upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertStats {
    pub nodes_created: u64,
    pub relationships_created: u64,
}

impl From<WriteSummary> for UpsertStats {
    fn from(summary: WriteSummary) -> Self {
        Self {
            nodes_created: summary.nodes_created,
            relationships_created: summary.relationships_created,
        }
    }
}

impl Add for UpsertStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            nodes_created: self.nodes_created + rhs.nodes_created,
            relationships_created: self.relationships_created + rhs.relationships_created,
        }
    }
}

impl AddAssign for UpsertStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

pub struct GraphUpsertClient {
    store: Arc<dyn GraphStore>,
    limiter: Arc<FixedWindowLimiter>,
    retry: RetryPolicy,
    keywords: bool,
}

impl GraphUpsertClient {
    pub fn new(
        store: Arc<dyn GraphStore>,
        limiter: Arc<FixedWindowLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            limiter,
            retry,
            keywords: false,
        }
    }

    /// Also write `Keyword` nodes and `HAS_KEYWORD` edges with every paper.
    pub fn with_keywords(mut self, enabled: bool) -> Self {
        self.keywords = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Merge a paper together with its authors, venue and (optionally) keywords.
    ///
    /// Node attributes are overwritten with the values in `paper` (last write wins). An
    /// unknown summary keeps whatever is stored.
    pub async fn upsert_paper(&self, paper: &Paper) -> Result<UpsertStats> {
        let paper_key = paper.node_key();
        let mut writes = vec![GraphWrite::node_with_defaults(
            paper_key.clone(),
            paper.properties(),
            paper.defaults(),
        )];

        for author in &paper.authors {
            writes.push(GraphWrite::node(author.node_key(), author.properties()));
            writes.push(GraphWrite::relationship(
                paper_key.clone(),
                RelKind::AuthoredBy,
                author.node_key(),
            ));
        }

        if let Some(venue) = paper.venue_key() {
            writes.push(GraphWrite::node(venue.clone(), Properties::new()));
            writes.push(GraphWrite::relationship(
                paper_key.clone(),
                RelKind::PublishedIn,
                venue,
            ));
        }

        if self.keywords {
            for keyword in paper_keywords(paper) {
                let key = NodeKey::new(Label::Keyword, keyword);
                writes.push(GraphWrite::node(key.clone(), Properties::new()));
                writes.push(GraphWrite::relationship(
                    paper_key.clone(),
                    RelKind::HasKeyword,
                    key,
                ));
            }
        }

        let stats = self.write(&writes).await?;
        debug!(
            paper = %paper.id,
            nodes = stats.nodes_created,
            rels = stats.relationships_created,
            "upserted paper"
        );
        Ok(stats)
    }

    pub async fn upsert_author(&self, author: &Author) -> Result<UpsertStats> {
        self.write(&[GraphWrite::node(author.node_key(), author.properties())])
            .await
    }

    /// Merge one directed relationship between two existing nodes.
    ///
    /// Fails with [`IngestError::MissingEndpoint`] when either endpoint has not been upserted;
    /// nothing is written in that case.
    pub async fn upsert_edge(
        &self,
        from: &NodeKey,
        kind: RelKind,
        to: &NodeKey,
    ) -> Result<UpsertStats> {
        let writes = [GraphWrite::relationship(from.clone(), kind, to.clone())];
        let summary = self.call(|| self.store.apply(&writes)).await?;
        if summary.missing_endpoints > 0 {
            return Err(IngestError::MissingEndpoint {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(summary.into())
    }

    /// `citing -REFERENCES-> cited`.
    pub async fn upsert_reference(&self, citing_id: &str, cited_id: &str) -> Result<UpsertStats> {
        self.upsert_edge(
            &NodeKey::paper(citing_id),
            RelKind::References,
            &NodeKey::paper(cited_id),
        )
        .await
    }

    /// Every paper id in the graph, sorted.
    pub async fn paper_ids(&self) -> Result<Vec<String>> {
        self.call(|| {
            self.store
                .distinct_values(Label::Paper, Label::Paper.key_property())
        })
        .await
    }

    /// Ids of the papers `id` references.
    pub async fn references_of(&self, id: &str) -> Result<Vec<String>> {
        let node = NodeKey::paper(id);
        self.call(|| {
            self.store
                .related(&node, RelKind::References, Direction::Outgoing)
        })
        .await
    }

    /// Ids of the papers that cite `id`, read by walking `REFERENCES` backwards.
    pub async fn citations_of(&self, id: &str) -> Result<Vec<String>> {
        let node = NodeKey::paper(id);
        self.call(|| {
            self.store
                .related(&node, RelKind::References, Direction::Incoming)
        })
        .await
    }

    pub async fn paper(&self, id: &str) -> Result<Option<Properties>> {
        let node = NodeKey::paper(id);
        self.call(|| self.store.node(&node)).await
    }

    pub async fn stats(&self) -> Result<GraphCounts> {
        self.call(|| self.store.counts()).await
    }

    async fn write(&self, writes: &[GraphWrite]) -> Result<UpsertStats> {
        let summary = self.call(|| self.store.apply(writes)).await?;
        Ok(summary.into())
    }

    /// One store call under the quota, retrying transient store errors.
    async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = citegraph_core::Result<T>>,
    {
        self.retry
            .run(&self.limiter, SERVICE, |_| {
                let fut = op();
                async move { Attempt::from_result(fut.await.map_err(IngestError::from)) }
            })
            .await
    }
}
