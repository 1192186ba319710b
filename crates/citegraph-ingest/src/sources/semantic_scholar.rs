use std::sync::Arc;

use async_trait::async_trait;
use citegraph_core::config::{ApiConfig, MAX_PAGE_SIZE};
use citegraph_core::{RawAuthorProfile, RawPaper};
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{IngestError, Result};
use crate::http::RateLimitedClient;
use crate::pagination::fetch_all;
use crate::sources::{CitationSource, NeighborKind};

const PAPER_FIELDS: &str =
    "paperId,title,authors,year,venue,abstract,tldr,citationCount,referenceCount,url";
// List endpoints reject `tldr` in the projection.
const LIST_FIELDS: &str =
    "paperId,title,authors,year,venue,abstract,citationCount,referenceCount,url";
const AUTHOR_FIELDS: &str = "authorId,name,url,paperCount,citationCount,hIndex";
const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

pub struct SemanticScholarSource {
    client: Arc<RateLimitedClient>,
    base_url: String,
    api_key: Option<String>,
    page_size: u32,
}

impl SemanticScholarSource {
    pub fn new(client: Arc<RateLimitedClient>, config: &ApiConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            page_size: config.page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Keyword search; one page of at most `limit` results.
    pub async fn search_papers(&self, query: &str, limit: u32) -> Result<Vec<RawPaper>> {
        let mut url = self.endpoint(&["paper", "search"])?;
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("limit", &limit.clamp(1, MAX_PAGE_SIZE).to_string())
            .append_pair("fields", LIST_FIELDS);

        let json = self.client.get_json(&url, &self.auth_headers()?).await?;
        Ok(decode_rows(data_rows(json), None))
    }

    /// Authors whose name matches `name`, best match first.
    pub async fn search_authors(&self, name: &str, limit: u32) -> Result<Vec<RawAuthorProfile>> {
        let mut url = self.endpoint(&["author", "search"])?;
        url.query_pairs_mut()
            .append_pair("query", name)
            .append_pair("limit", &limit.clamp(1, MAX_PAGE_SIZE).to_string())
            .append_pair("fields", AUTHOR_FIELDS);

        let json = self.client.get_json(&url, &self.auth_headers()?).await?;
        Ok(decode_rows(data_rows(json), None))
    }

    pub async fn fetch_author(&self, id: &str) -> Result<RawAuthorProfile> {
        let mut url = self.endpoint(&["author", id])?;
        url.query_pairs_mut().append_pair("fields", AUTHOR_FIELDS);

        let json = self
            .client
            .get_json(&url, &self.auth_headers()?)
            .await
            .map_err(|e| not_found(e, "author", id))?;
        serde_json::from_value(json).map_err(|e| IngestError::Parse(e.to_string()))
    }

    /// Every paper listed for an author, across all pages.
    pub async fn author_papers(&self, author_id: &str) -> Result<Vec<RawPaper>> {
        let mut url = self.endpoint(&["author", author_id, "papers"])?;
        url.query_pairs_mut().append_pair("fields", LIST_FIELDS);

        let rows = fetch_all(&self.client, &url, &self.auth_headers()?, self.page_size)
            .await
            .map_err(|e| not_found(e, "author", author_id))?;
        Ok(decode_rows(rows, None))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| IngestError::Parse(format!("invalid URL {}: {e}", self.base_url)))?;
        {
            let mut segs = url.path_segments_mut().map_err(|_| {
                IngestError::Parse("invalid Semantic Scholar base URL".to_string())
            })?;
            segs.pop_if_empty();
            segs.extend(segments);
        }
        Ok(url)
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let value =
                HeaderValue::from_str(key).map_err(|e| IngestError::Parse(e.to_string()))?;
            headers.insert(API_KEY_HEADER, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl CitationSource for SemanticScholarSource {
    fn name(&self) -> &str {
        "semantic_scholar"
    }

    async fn fetch_paper(&self, id: &str) -> Result<RawPaper> {
        let mut url = self.endpoint(&["paper", id])?;
        url.query_pairs_mut().append_pair("fields", PAPER_FIELDS);

        let json = self
            .client
            .get_json(&url, &self.auth_headers()?)
            .await
            .map_err(|e| not_found(e, "paper", id))?;
        serde_json::from_value(json).map_err(|e| IngestError::Parse(e.to_string()))
    }

    async fn neighbors(&self, id: &str, kind: NeighborKind) -> Result<Vec<RawPaper>> {
        let mut url = self.endpoint(&["paper", id, kind.as_str()])?;
        url.query_pairs_mut().append_pair("fields", LIST_FIELDS);

        let rows = fetch_all(&self.client, &url, &self.auth_headers()?, self.page_size).await?;
        let wrapper = match kind {
            NeighborKind::Citations => "citingPaper",
            NeighborKind::References => "citedPaper",
        };
        let papers = decode_rows(rows, Some(wrapper));
        debug!(paper = id, %kind, count = papers.len(), "listed neighbors");
        Ok(papers)
    }
}

fn not_found(err: IngestError, what: &str, id: &str) -> IngestError {
    match err.status() {
        Some(404) => IngestError::NotFound(format!("{what} {id}")),
        _ => err,
    }
}

fn data_rows(json: Value) -> Vec<Value> {
    match json {
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        },
        Value::Array(rows) => rows,
        _ => Vec::new(),
    }
}

/// Decode list rows one by one. Rows that do not fit the record shape are dropped.
fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, wrapper: Option<&str>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|mut row| {
            let record = match wrapper {
                Some(field) => row.get_mut(field).map(Value::take)?,
                None => row,
            };
            if record.is_null() {
                return None;
            }
            match serde_json::from_value(record) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    warn!(error = %e, "skipping malformed record");
                    None
                }
            }
        })
        .collect()
}
