use std::fmt;

use async_trait::async_trait;
use citegraph_core::RawPaper;
use serde::Serialize;

use crate::error::Result;

pub mod semantic_scholar;

pub use semantic_scholar::SemanticScholarSource;

/// Which one-hop neighborhood of a paper to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborKind {
    /// Papers that cite the origin.
    Citations,
    /// Papers the origin cites.
    References,
}

impl NeighborKind {
    pub const ALL: [NeighborKind; 2] = [NeighborKind::Citations, NeighborKind::References];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Citations => "citations",
            Self::References => "references",
        }
    }
}

impl fmt::Display for NeighborKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The part of a metadata provider the expander depends on.
#[async_trait]
pub trait CitationSource: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Metadata for one paper by provider id.
    async fn fetch_paper(&self, id: &str) -> Result<RawPaper>;

    /// Every neighbor of `id` in provider order, walking all pages.
    async fn neighbors(&self, id: &str, kind: NeighborKind) -> Result<Vec<RawPaper>>;
}
