//! citegraph core: paper models, normalization, configuration and graph storage.

pub mod config;
pub mod error;
pub mod keywords;
pub mod models;
pub mod normalize;
pub mod storage;

pub use config::{AppConfig, GraphBackend};
pub use error::{CiteGraphError, Result};
pub use models::*;
pub use normalize::{content_hash, escape_html, normalize, normalize_author};
pub use storage::{GraphStore, SqliteGraph};

#[cfg(feature = "neo4j")]
pub use storage::Neo4jGraph;
