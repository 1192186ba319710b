use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::rate_limit::{Attempt, FixedWindowLimiter, RetryPolicy};

const TOO_MANY_REQUESTS: u16 = 429;

/// A response reduced to what the retry logic and decoders need.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            retry_after: None,
            body: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Raw request transport; swapped for a scripted fake in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<HttpResponse>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<HttpResponse> {
        let resp = self
            .client
            .get(url.clone())
            .headers(headers.clone())
            .send()
            .await?;
        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = resp.text().await?;
        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Transport wrapped with the shared call quota and retry policy.
///
/// 429 responses and transport failures back off and retry; any other non-success status
/// fails immediately.
pub struct RateLimitedClient {
    transport: Arc<dyn Transport>,
    limiter: Arc<FixedWindowLimiter>,
    retry: RetryPolicy,
    service: String,
}

impl RateLimitedClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: Arc<FixedWindowLimiter>,
        retry: RetryPolicy,
        service: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry,
            service: service.into(),
        }
    }

    pub async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<String> {
        let transport = &self.transport;
        self.retry
            .run(&self.limiter, &self.service, |attempt| async move {
                debug!(url = %url, attempt, "GET");
                match transport.get(url, headers).await {
                    Ok(resp) if resp.status == TOO_MANY_REQUESTS => Attempt::Retry {
                        after: resp.retry_after,
                        error: None,
                    },
                    Ok(resp) if !resp.is_success() => Attempt::Fail(IngestError::Api {
                        url: url.to_string(),
                        status: resp.status,
                        message: resp.body,
                    }),
                    Ok(resp) => Attempt::Done(resp.body),
                    Err(e) => Attempt::from_result(Err(e)),
                }
            })
            .await
    }

    pub async fn get_json(&self, url: &Url, headers: &HeaderMap) -> Result<Value> {
        let text = self.get(url, headers).await?;
        serde_json::from_str(&text).map_err(|e| IngestError::Parse(e.to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;

    fn client(transport: Arc<ScriptedTransport>, max_attempts: u32) -> RateLimitedClient {
        RateLimitedClient::new(
            transport,
            Arc::new(FixedWindowLimiter::new(1000, Duration::from_secs(60))),
            RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(10)),
            "test",
        )
    }

    fn url() -> Url {
        Url::parse("http://localhost/paper/x").unwrap()
    }

    #[tokio::test]
    async fn recovers_after_two_rate_limit_rejections() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            HttpResponse::status(429),
            HttpResponse::status(429),
            HttpResponse::ok(r#"{"data": []}"#),
        ]));

        let json = client(Arc::clone(&transport), 8)
            .get_json(&url(), &HeaderMap::new())
            .await
            .unwrap();

        assert_eq!(json["data"], serde_json::json!([]));
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn exhausting_retries_surfaces_rate_limit_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![HttpResponse::status(429); 5]));

        let err = client(Arc::clone(&transport), 3)
            .get(&url(), &HeaderMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::RateLimited { attempts: 3, .. }));
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn permanent_status_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![HttpResponse {
            status: 404,
            retry_after: None,
            body: "Paper not found".to_string(),
        }]));

        let err = client(Arc::clone(&transport), 8)
            .get(&url(), &HeaderMap::new())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert!(!err.is_transient());
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn invalid_json_is_a_parse_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![HttpResponse::ok("not json")]));
        let err = client(transport, 8)
            .get_json(&url(), &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Parse(_)));
    }
}
