//! Offset/limit pagination over list endpoints.

use reqwest::Url;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::http::RateLimitedClient;

/// One page of a list endpoint. An absent `next` marks the last page.
#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub next: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
}

fn page_url(endpoint: &Url, offset: u64, page_size: u32) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .append_pair("offset", &offset.to_string())
        .append_pair("limit", &page_size.to_string());
    url
}

/// Walk `endpoint` from offset 0 to the last page and return every row in provider order.
///
/// `endpoint` carries the fixed query parameters (e.g. `fields`); `offset` and `limit` are
/// added per page. Pagination stops at the first page without a `next` indicator, at an
/// empty page, or at the first error, which is returned. Not resumable: call again to
/// restart from offset 0.
pub async fn fetch_all(
    client: &RateLimitedClient,
    endpoint: &Url,
    headers: &HeaderMap,
    page_size: u32,
) -> Result<Vec<Value>> {
    let page_size = page_size.max(1);
    let mut offset = 0u64;
    let mut rows = Vec::new();

    loop {
        let url = page_url(endpoint, offset, page_size);
        let json = client.get_json(&url, headers).await?;
        let page: Page =
            serde_json::from_value(json).map_err(|e| IngestError::Parse(e.to_string()))?;

        debug!(
            endpoint = %endpoint,
            offset,
            rows = page.data.len(),
            total = ?page.total,
            has_next = page.next.is_some(),
            "fetched page"
        );

        let empty = page.data.is_empty();
        rows.extend(page.data);
        if page.next.is_none() || empty {
            break;
        }
        offset += u64::from(page_size);
    }

    Ok(rows)
}
