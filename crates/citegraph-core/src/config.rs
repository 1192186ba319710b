use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CiteGraphError, Result};

/// Largest page the citation/reference endpoints accept.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Root application configuration, loaded from `~/.config/citegraph/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub graph: GraphConfig,
    pub api: ApiConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub refresh: RefreshConfig,
    pub keywords: KeywordConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphBackend {
    #[default]
    Sqlite,
    Neo4j,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub backend: GraphBackend,
    pub sqlite_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neo4j_uri: Option<String>,
    pub neo4j_user: String,
    pub neo4j_password_env: String,

    /// Resolved from `neo4j_password_env`, never written back to disk.
    #[serde(skip)]
    pub neo4j_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub page_size: u32,
    pub search_limit: u32,
    pub timeout_secs: u64,
    pub user_agent: String,

    #[serde(skip)]
    pub api_key: Option<String>,
}

/// Fixed-window call quota shared by every worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_calls: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub workers: usize,
    pub retry_passes: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub enabled: bool,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for GraphConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("citegraph");

        Self {
            backend: GraphBackend::Sqlite,
            sqlite_path: data_dir.join("citegraph.db").to_string_lossy().to_string(),
            neo4j_uri: None,
            neo4j_user: "neo4j".to_string(),
            neo4j_password_env: "NEO4J_PASSWORD".to_string(),
            neo4j_password: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.semanticscholar.org/graph/v1".to_string(),
            api_key_env: "SEMANTIC_SCHOLAR_API_KEY".to_string(),
            page_size: MAX_PAGE_SIZE,
            search_limit: 10,
            timeout_secs: 30,
            user_agent: "citegraph/0.1".to_string(),
            api_key: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 5000,
            window_secs: 60,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            retry_passes: 0,
        }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/citegraph/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CITEGRAPH_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("citegraph")
            .join("config.toml")
    }

    /// Load config from disk and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = Self::load_from(&path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load config from a specific path, falling back to defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Overlay values taken from the environment. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(&self.api.api_key_env) {
            self.api.api_key = Some(key);
        }
        if let Some(password) = non_empty(&self.graph.neo4j_password_env) {
            self.graph.neo4j_password = Some(password);
        }
        if let Some(uri) = non_empty("NEO4J_CONNECTION_STRING") {
            self.graph.neo4j_uri = Some(uri);
            self.graph.backend = GraphBackend::Neo4j;
        }
        if let Some(path) = non_empty("CITEGRAPH_DB") {
            self.graph.sqlite_path = path;
        }
    }

    /// Startup check. Any error here is fatal: nothing is ingested with a bad config.
    pub fn validate(&self) -> Result<()> {
        if self.graph.backend == GraphBackend::Neo4j {
            if self.graph.neo4j_uri.as_deref().is_none_or(str::is_empty) {
                return Err(CiteGraphError::ConfigError(
                    "NEO4J_CONNECTION_STRING environment variable not set".to_string(),
                ));
            }
            if self.graph.neo4j_password.is_none() {
                return Err(CiteGraphError::ConfigError(format!(
                    "{} environment variable not set",
                    self.graph.neo4j_password_env
                )));
            }
        } else if self.graph.sqlite_path.trim().is_empty() {
            return Err(CiteGraphError::ConfigError(
                "graph.sqlite_path must not be empty".to_string(),
            ));
        }

        if self.api.page_size == 0 || self.api.page_size > MAX_PAGE_SIZE {
            return Err(CiteGraphError::ConfigError(format!(
                "api.page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if self.rate_limit.max_calls == 0 || self.rate_limit.window_secs == 0 {
            return Err(CiteGraphError::ConfigError(
                "rate_limit.max_calls and rate_limit.window_secs must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(CiteGraphError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.refresh.workers == 0 {
            return Err(CiteGraphError::ConfigError(
                "refresh.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.rate_limit.max_calls, 5000);
        assert_eq!(cfg.retry.max_attempts, 8);
        assert_eq!(cfg.refresh.workers, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = AppConfig::default();
        cfg.refresh.workers = 4;
        cfg.keywords.enabled = true;
        cfg.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.refresh.workers, 4);
        assert!(loaded.keywords.enabled);
        assert_eq!(loaded.api.base_url, cfg.api.base_url);
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let mut cfg = AppConfig::default();
        cfg.api.api_key = Some("secret-key".to_string());
        cfg.graph.neo4j_password = Some("hunter2".to_string());
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        assert!(!toml_str.contains("secret-key"));
        assert!(!toml_str.contains("hunter2"));
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let cfg =
            AppConfig::load_from(Path::new("/tmp/nonexistent_citegraph_config.toml")).unwrap();
        assert_eq!(cfg.graph.backend, GraphBackend::Sqlite);
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = AppConfig::default();
        cfg.apply_env(env(&[
            ("SEMANTIC_SCHOLAR_API_KEY", "abc"),
            ("NEO4J_CONNECTION_STRING", "bolt://localhost:7687"),
            ("NEO4J_PASSWORD", "pw"),
        ]));
        assert_eq!(cfg.api.api_key.as_deref(), Some("abc"));
        assert_eq!(cfg.graph.backend, GraphBackend::Neo4j);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_neo4j_without_password_is_fatal() {
        let mut cfg = AppConfig::default();
        cfg.apply_env(env(&[("NEO4J_CONNECTION_STRING", "bolt://localhost:7687")]));
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("NEO4J_PASSWORD"));
    }

    #[test]
    fn test_page_size_over_limit_rejected() {
        let mut cfg = AppConfig::default();
        cfg.api.page_size = 500;
        assert!(cfg.validate().is_err());
    }
}
