pub mod sqlite;

#[cfg(feature = "neo4j")]
pub mod neo4j;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Direction, GraphCounts, GraphWrite, Label, NodeKey, Properties, RelKind, WriteSummary,
};

pub use sqlite::SqliteGraph;

#[cfg(feature = "neo4j")]
pub use neo4j::Neo4jGraph;

/// A labeled property graph that supports merge-by-key writes.
///
/// Merge writes are commutative and idempotent, so callers never lock graph state
/// themselves; backends serialize conflicting writes internally.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Fails when the backend cannot be reached.
    async fn verify_connectivity(&self) -> Result<()>;

    /// Apply a batch of merge writes as one unit and report what was actually created.
    async fn apply(&self, writes: &[GraphWrite]) -> Result<WriteSummary>;

    /// All distinct values of `property` across nodes with `label`, sorted.
    async fn distinct_values(&self, label: Label, property: &str) -> Result<Vec<String>>;

    /// Keys of the nodes one `kind` hop away from `node` in `direction`, sorted.
    async fn related(
        &self,
        node: &NodeKey,
        kind: RelKind,
        direction: Direction,
    ) -> Result<Vec<String>>;

    /// Non-key properties of a node, or `None` if it does not exist.
    async fn node(&self, node: &NodeKey) -> Result<Option<Properties>>;

    async fn counts(&self) -> Result<GraphCounts>;
}
