//! One-hop expansion of a paper: its citing and cited papers, written as `REFERENCES` edges.

use std::sync::Arc;

use async_trait::async_trait;
use citegraph_core::{Paper, normalize};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::sources::{CitationSource, NeighborKind};
use crate::upsert::{GraphUpsertClient, UpsertStats};

/// A neighbor or a whole direction that could not be written.
#[derive(Debug, Clone, Serialize)]
pub struct ExpansionFailure {
    pub kind: NeighborKind,
    /// `None` when listing the direction itself failed.
    pub paper_id: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpansionReport {
    pub paper_id: String,
    pub stats: UpsertStats,
    /// Neighbors written together with their edge.
    pub neighbors: usize,
    /// Records dropped by normalization (no usable title).
    pub skipped: usize,
    pub failures: Vec<ExpansionFailure>,
}

impl ExpansionReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Unit of work the refresh scheduler runs per paper.
#[async_trait]
pub trait PaperExpander: Send + Sync {
    async fn expand(&self, paper_id: &str) -> Result<ExpansionReport>;
}

pub struct ReferenceExpander {
    source: Arc<dyn CitationSource>,
    upsert: Arc<GraphUpsertClient>,
}

impl ReferenceExpander {
    pub fn new(source: Arc<dyn CitationSource>, upsert: Arc<GraphUpsertClient>) -> Self {
        Self { source, upsert }
    }

    /// Look up the origin and write it. Any failure here aborts the expansion.
    async fn origin(&self, paper_id: &str) -> Result<(Paper, UpsertStats)> {
        let raw = self.source.fetch_paper(paper_id).await?;
        let paper =
            normalize(&raw).ok_or_else(|| IngestError::InvalidRecord(paper_id.to_string()))?;
        let stats = self.upsert.upsert_paper(&paper).await?;
        Ok((paper, stats))
    }

    /// Write one neighbor, then the edge in canonical direction.
    async fn link(
        &self,
        origin: &Paper,
        neighbor: &Paper,
        kind: NeighborKind,
    ) -> Result<UpsertStats> {
        let mut stats = self.upsert.upsert_paper(neighbor).await?;
        let (citing, cited) = match kind {
            NeighborKind::Citations => (&neighbor.id, &origin.id),
            NeighborKind::References => (&origin.id, &neighbor.id),
        };
        stats += self.upsert.upsert_reference(citing, cited).await?;
        Ok(stats)
    }

    async fn expand_direction(
        &self,
        origin: &Paper,
        kind: NeighborKind,
        report: &mut ExpansionReport,
    ) {
        let raws = match self.source.neighbors(&origin.id, kind).await {
            Ok(raws) => raws,
            Err(e) => {
                warn!(
                    source = self.source.name(),
                    paper = %origin.id,
                    %kind,
                    error = %e,
                    "could not list neighbors"
                );
                report.failures.push(ExpansionFailure {
                    kind,
                    paper_id: None,
                    error: e.to_string(),
                });
                return;
            }
        };

        for raw in &raws {
            let Some(neighbor) = normalize(raw) else {
                report.skipped += 1;
                continue;
            };
            match self.link(origin, &neighbor, kind).await {
                Ok(stats) => {
                    report.stats += stats;
                    report.neighbors += 1;
                }
                Err(e) => {
                    warn!(
                        paper = %origin.id,
                        neighbor = %neighbor.id,
                        %kind,
                        error = %e,
                        "could not write neighbor"
                    );
                    report.failures.push(ExpansionFailure {
                        kind,
                        paper_id: Some(neighbor.id),
                        error: e.to_string(),
                    });
                }
            }
        }
        debug!(
            source = self.source.name(),
            paper = %origin.id,
            %kind,
            listed = raws.len(),
            "direction done"
        );
    }
}

#[async_trait]
impl PaperExpander for ReferenceExpander {
    /// Citations first, then references. A failed direction or neighbor is recorded in the
    /// report and does not stop the rest.
    async fn expand(&self, paper_id: &str) -> Result<ExpansionReport> {
        let (origin, origin_stats) = self.origin(paper_id).await?;

        let mut report = ExpansionReport {
            paper_id: origin.id.clone(),
            stats: origin_stats,
            ..ExpansionReport::default()
        };
        for kind in NeighborKind::ALL {
            self.expand_direction(&origin, kind, &mut report).await;
        }

        info!(
            paper = %report.paper_id,
            neighbors = report.neighbors,
            skipped = report.skipped,
            failures = report.failures.len(),
            nodes_created = report.stats.nodes_created,
            relationships_created = report.stats.relationships_created,
            "expanded paper"
        );
        Ok(report)
    }
}
