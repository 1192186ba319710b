//! Embedded property graph on SQLite.
//!
//! Nodes live in one table keyed by `(label, key)` with a JSON property bag; relationships
//! live in a second table keyed by kind and both endpoints, so a repeated merge is a no-op.

mod connection;
mod schema;

pub use connection::ConnectionPool;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, Transaction, params};

use super::GraphStore;
use crate::error::{CiteGraphError, Result};
use crate::models::{
    Direction, GraphCounts, GraphWrite, Label, NodeKey, Properties, RelKind, WriteSummary,
};

pub struct SqliteGraph {
    pool: ConnectionPool,
}

impl SqliteGraph {
    pub fn open(path: &Path) -> Result<Self> {
        let pool = ConnectionPool::open(path)?;
        Ok(Self { pool })
    }

    pub fn open_in_memory() -> Result<Self> {
        let pool = ConnectionPool::open_in_memory()?;
        Ok(Self { pool })
    }

    pub fn path(&self) -> Option<&str> {
        self.pool.path()
    }
}

fn merge_node(
    tx: &Transaction<'_>,
    node: &NodeKey,
    properties: &Properties,
    defaults: &Properties,
    now: &str,
) -> Result<bool> {
    let json = serde_json::to_string(properties)?;
    let mut initial = defaults.clone();
    initial.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO nodes(label, key, properties, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![
            node.label.as_str(),
            node.key,
            serde_json::to_string(&initial)?,
            now
        ],
    )?;
    if inserted == 0 {
        tx.execute(
            "UPDATE nodes SET properties = json_patch(properties, ?3), updated_at = ?4
             WHERE label = ?1 AND key = ?2",
            params![node.label.as_str(), node.key, json, now],
        )?;
    }
    Ok(inserted == 1)
}

fn node_exists(tx: &Transaction<'_>, node: &NodeKey) -> Result<bool> {
    let exists = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM nodes WHERE label = ?1 AND key = ?2)",
        params![node.label.as_str(), node.key],
        |row| row.get::<_, bool>(0),
    )?;
    Ok(exists)
}

/// `None` when an endpoint is missing; otherwise whether the relationship was new.
fn merge_relationship(
    tx: &Transaction<'_>,
    from: &NodeKey,
    kind: RelKind,
    to: &NodeKey,
    now: &str,
) -> Result<Option<bool>> {
    let (from_label, to_label) = kind.endpoints();
    if from.label != from_label || to.label != to_label {
        return Err(CiteGraphError::InvalidQuery(format!(
            "{kind} cannot connect {from} to {to}"
        )));
    }
    if !node_exists(tx, from)? || !node_exists(tx, to)? {
        return Ok(None);
    }
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO relationships
             (kind, from_label, from_key, to_label, to_key, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            kind.as_str(),
            from.label.as_str(),
            from.key,
            to.label.as_str(),
            to.key,
            now
        ],
    )?;
    Ok(Some(inserted == 1))
}

fn sql_value_to_string(value: SqlValue) -> Option<String> {
    match value {
        SqlValue::Text(s) => Some(s),
        SqlValue::Integer(n) => Some(n.to_string()),
        SqlValue::Real(f) => Some(f.to_string()),
        SqlValue::Null | SqlValue::Blob(_) => None,
    }
}

#[async_trait]
impl GraphStore for SqliteGraph {
    async fn verify_connectivity(&self) -> Result<()> {
        let conn = self.pool.get_connection().await;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    async fn apply(&self, writes: &[GraphWrite]) -> Result<WriteSummary> {
        let mut conn = self.pool.get_connection().await;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let mut summary = WriteSummary::default();

        for write in writes {
            match write {
                GraphWrite::MergeNode {
                    node,
                    properties,
                    defaults,
                } => {
                    if merge_node(&tx, node, properties, defaults, &now)? {
                        summary.nodes_created += 1;
                    }
                }
                GraphWrite::MergeRelationship { from, kind, to } => {
                    match merge_relationship(&tx, from, *kind, to, &now)? {
                        Some(true) => summary.relationships_created += 1,
                        Some(false) => {}
                        None => summary.missing_endpoints += 1,
                    }
                }
            }
        }

        tx.commit()?;
        Ok(summary)
    }

    async fn distinct_values(&self, label: Label, property: &str) -> Result<Vec<String>> {
        let conn = self.pool.get_connection().await;

        if property == label.key_property() {
            let mut stmt = conn.prepare("SELECT key FROM nodes WHERE label = ?1 ORDER BY key")?;
            let rows = stmt.query_map(params![label.as_str()], |row| row.get::<_, String>(0))?;
            let mut keys = Vec::new();
            for row in rows {
                keys.push(row?);
            }
            return Ok(keys);
        }

        if !property.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CiteGraphError::InvalidQuery(format!(
                "invalid property name: {property}"
            )));
        }

        let path = format!("$.{property}");
        let mut stmt = conn.prepare(
            "SELECT DISTINCT json_extract(properties, ?2) FROM nodes
             WHERE label = ?1 AND json_extract(properties, ?2) IS NOT NULL
             ORDER BY 1",
        )?;
        let rows = stmt.query_map(params![label.as_str(), path], |row| row.get::<_, SqlValue>(0))?;
        let mut values = Vec::new();
        for row in rows {
            if let Some(value) = sql_value_to_string(row?) {
                values.push(value);
            }
        }
        Ok(values)
    }

    async fn related(
        &self,
        node: &NodeKey,
        kind: RelKind,
        direction: Direction,
    ) -> Result<Vec<String>> {
        let conn = self.pool.get_connection().await;
        let sql = match direction {
            Direction::Outgoing => {
                "SELECT to_key FROM relationships
                 WHERE kind = ?1 AND from_label = ?2 AND from_key = ?3 ORDER BY to_key"
            }
            Direction::Incoming => {
                "SELECT from_key FROM relationships
                 WHERE kind = ?1 AND to_label = ?2 AND to_key = ?3 ORDER BY from_key"
            }
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(
            params![kind.as_str(), node.label.as_str(), node.key],
            |row| row.get::<_, String>(0),
        )?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    async fn node(&self, node: &NodeKey) -> Result<Option<Properties>> {
        let conn = self.pool.get_connection().await;
        let json: Option<String> = conn
            .query_row(
                "SELECT properties FROM nodes WHERE label = ?1 AND key = ?2",
                params![node.label.as_str(), node.key],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn counts(&self) -> Result<GraphCounts> {
        let conn = self.pool.get_connection().await;
        let mut counts = GraphCounts::default();
        for label in Label::ALL {
            counts.nodes.insert(label.as_str().to_string(), 0);
        }
        for kind in RelKind::ALL {
            counts.relationships.insert(kind.as_str().to_string(), 0);
        }

        let mut stmt = conn.prepare("SELECT label, COUNT(*) FROM nodes GROUP BY label")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (label, n) = row?;
            counts.nodes.insert(label, n.max(0) as u64);
        }

        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM relationships GROUP BY kind")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (kind, n) = row?;
            counts.relationships.insert(kind, n.max(0) as u64);
        }

        Ok(counts)
    }
}
