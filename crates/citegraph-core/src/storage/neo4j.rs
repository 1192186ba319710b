//! Neo4j backend over Bolt.
//!
//! Labels, relationship types and property names come from the closed vocabulary in
//! [`crate::models::graph`] and are validated before being spliced into Cypher; every
//! value is passed as a query parameter.

use async_trait::async_trait;
use neo4rs::{Graph, Query, Txn, query};
use tracing::debug;

use super::GraphStore;
use crate::error::{CiteGraphError, Result};
use crate::models::{
    Direction, GraphCounts, GraphWrite, Label, NodeKey, Properties, PropertyValue, RelKind,
    WriteSummary,
};

pub struct Neo4jGraph {
    graph: Graph,
}

fn backend(e: impl std::fmt::Display) -> CiteGraphError {
    CiteGraphError::Graph(e.to_string())
}

fn checked_property(name: &str) -> Result<&str> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(CiteGraphError::InvalidQuery(format!(
            "invalid property name: {name}"
        )))
    }
}

fn bind(q: Query, name: &str, value: &PropertyValue) -> Query {
    match value {
        PropertyValue::Int(n) => q.param(name, *n),
        PropertyValue::Text(s) => q.param(name, s.as_str()),
    }
}

fn merge_node_query(
    node: &NodeKey,
    properties: &Properties,
    defaults: &Properties,
) -> Result<Query> {
    let mut cypher = format!(
        "MERGE (n:{} {{{}: $key}}) ON CREATE SET n.__created = true",
        node.label,
        node.label.key_property()
    );
    for (i, name) in defaults.keys().enumerate() {
        cypher.push_str(&format!(", n.`{}` = $d{i}", checked_property(name)?));
    }
    for (i, name) in properties.keys().enumerate() {
        cypher.push_str(&format!(" SET n.`{}` = $p{i}", checked_property(name)?));
    }
    cypher.push_str(
        " WITH n, coalesce(n.__created, false) AS created REMOVE n.__created RETURN created",
    );

    let mut q = query(&cypher).param("key", node.key.as_str());
    for (i, value) in defaults.values().enumerate() {
        q = bind(q, &format!("d{i}"), value);
    }
    for (i, value) in properties.values().enumerate() {
        q = bind(q, &format!("p{i}"), value);
    }
    Ok(q)
}

fn merge_relationship_query(from: &NodeKey, kind: RelKind, to: &NodeKey) -> Result<Query> {
    let (from_label, to_label) = kind.endpoints();
    if from.label != from_label || to.label != to_label {
        return Err(CiteGraphError::InvalidQuery(format!(
            "{kind} cannot connect {from} to {to}"
        )));
    }
    let cypher = format!(
        "MATCH (a:{from_label} {{{}: $from}}), (b:{to_label} {{{}: $to}})
         MERGE (a)-[r:{kind}]->(b)
         ON CREATE SET r.__created = true
         WITH r, coalesce(r.__created, false) AS created
         REMOVE r.__created
         RETURN created",
        from_label.key_property(),
        to_label.key_property(),
    );
    Ok(query(&cypher)
        .param("from", from.key.as_str())
        .param("to", to.key.as_str()))
}

/// First row's `created` flag, or `None` when the query matched nothing.
async fn created_flag(txn: &mut Txn, q: Query) -> Result<Option<bool>> {
    let mut stream = txn.execute(q).await.map_err(backend)?;
    let flag = match stream.next(txn.handle()).await.map_err(backend)? {
        Some(row) => Some(row.get::<bool>("created").map_err(backend)?),
        None => None,
    };
    while stream.next(txn.handle()).await.map_err(backend)?.is_some() {}
    Ok(flag)
}

/// Every write of a batch inside one open transaction; the caller commits.
async fn apply_in(txn: &mut Txn, writes: &[GraphWrite]) -> Result<WriteSummary> {
    let mut summary = WriteSummary::default();
    for write in writes {
        match write {
            GraphWrite::MergeNode {
                node,
                properties,
                defaults,
            } => {
                let q = merge_node_query(node, properties, defaults)?;
                if created_flag(txn, q).await? == Some(true) {
                    summary.nodes_created += 1;
                }
            }
            GraphWrite::MergeRelationship { from, kind, to } => {
                let q = merge_relationship_query(from, *kind, to)?;
                match created_flag(txn, q).await? {
                    Some(true) => summary.relationships_created += 1,
                    Some(false) => {}
                    None => {
                        debug!(%from, %to, kind = %kind, "relationship endpoint missing");
                        summary.missing_endpoints += 1;
                    }
                }
            }
        }
    }
    Ok(summary)
}

impl Neo4jGraph {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password).await.map_err(backend)?;
        let store = Self { graph };
        store.ensure_constraints().await?;
        Ok(store)
    }

    async fn ensure_constraints(&self) -> Result<()> {
        for label in Label::ALL {
            let cypher = format!(
                "CREATE CONSTRAINT {}_key IF NOT EXISTS FOR (n:{label}) REQUIRE n.{} IS UNIQUE",
                label.as_str().to_lowercase(),
                label.key_property()
            );
            self.graph.run(query(&cypher)).await.map_err(backend)?;
        }
        Ok(())
    }

    async fn count(&self, cypher: &str) -> Result<u64> {
        let mut stream = self.graph.execute(query(cypher)).await.map_err(backend)?;
        let mut total = 0;
        while let Some(row) = stream.next().await.map_err(backend)? {
            total = row.get::<i64>("c").map_err(backend)?.max(0) as u64;
        }
        Ok(total)
    }

    async fn strings(&self, q: Query, column: &str) -> Result<Vec<String>> {
        let mut stream = self.graph.execute(q).await.map_err(backend)?;
        let mut out = Vec::new();
        while let Some(row) = stream.next().await.map_err(backend)? {
            out.push(row.get::<String>(column).map_err(backend)?);
        }
        Ok(out)
    }
}

#[async_trait]
impl GraphStore for Neo4jGraph {
    async fn verify_connectivity(&self) -> Result<()> {
        self.graph.run(query("RETURN 1")).await.map_err(backend)
    }

    async fn apply(&self, writes: &[GraphWrite]) -> Result<WriteSummary> {
        let mut txn = self.graph.start_txn().await.map_err(backend)?;
        match apply_in(&mut txn, writes).await {
            Ok(summary) => {
                txn.commit().await.map_err(backend)?;
                Ok(summary)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    debug!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn distinct_values(&self, label: Label, property: &str) -> Result<Vec<String>> {
        let property = checked_property(property)?;
        let cypher = format!(
            "MATCH (n:{label}) WHERE n.`{property}` IS NOT NULL
             RETURN DISTINCT toString(n.`{property}`) AS value ORDER BY value"
        );
        self.strings(query(&cypher), "value").await
    }

    async fn related(
        &self,
        node: &NodeKey,
        kind: RelKind,
        direction: Direction,
    ) -> Result<Vec<String>> {
        let (from_label, to_label) = kind.endpoints();
        let cypher = match direction {
            Direction::Outgoing => format!(
                "MATCH (a:{from_label} {{{}: $key}})-[:{kind}]->(b:{to_label})
                 RETURN b.{} AS key ORDER BY key",
                from_label.key_property(),
                to_label.key_property()
            ),
            Direction::Incoming => format!(
                "MATCH (a:{from_label})-[:{kind}]->(b:{to_label} {{{}: $key}})
                 RETURN a.{} AS key ORDER BY key",
                to_label.key_property(),
                from_label.key_property()
            ),
        };
        self.strings(query(&cypher).param("key", node.key.as_str()), "key")
            .await
    }

    async fn node(&self, node: &NodeKey) -> Result<Option<Properties>> {
        let cypher = format!(
            "MATCH (n:{} {{{}: $key}}) RETURN properties(n) AS props",
            node.label,
            node.label.key_property()
        );
        let mut stream = self
            .graph
            .execute(query(&cypher).param("key", node.key.as_str()))
            .await
            .map_err(backend)?;
        let Some(row) = stream.next().await.map_err(backend)? else {
            return Ok(None);
        };
        let mut props = row.get::<Properties>("props").map_err(backend)?;
        props.remove(node.label.key_property());
        while stream.next().await.map_err(backend)?.is_some() {}
        Ok(Some(props))
    }

    async fn counts(&self) -> Result<GraphCounts> {
        let mut counts = GraphCounts::default();
        for label in Label::ALL {
            let n = self
                .count(&format!("MATCH (n:{label}) RETURN count(n) AS c"))
                .await?;
            counts.nodes.insert(label.as_str().to_string(), n);
        }
        for kind in RelKind::ALL {
            let n = self
                .count(&format!("MATCH ()-[r:{kind}]->() RETURN count(r) AS c"))
                .await?;
            counts.relationships.insert(kind.as_str().to_string(), n);
        }
        Ok(counts)
    }
}
