// HTTP client for the content extraction service
use crate::condense::{DEFAULT_MAX_CHARS, condense_page};
use crate::error::{Result, ScanError};
use crate::extraction::{Extracted, ExtractionService, PagePurpose};
use crate::fetcher::{Fetcher, retry, transient_or_http};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Serialize)]
struct ExtractionRequest<'a> {
    url: &'a str,
    purpose: PagePurpose,
    content: &'a str,
}

/// Fetches the page with [`Fetcher`], condenses it, and posts it to an
/// extraction endpoint that answers with JSON.
pub struct HttpExtractor {
    fetcher: Fetcher,
    endpoint: Url,
    token: Option<String>,
    max_chars: usize,
}

impl HttpExtractor {
    pub fn new(fetcher: Fetcher, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        Ok(Self {
            fetcher,
            endpoint,
            token: None,
            max_chars: DEFAULT_MAX_CHARS,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call_once(&self, body: &ExtractionRequest<'_>, attempt: u32) -> Result<Value> {
        let policy = self.fetcher.policy();
        let mut request = self
            .fetcher
            .client()
            .post(self.endpoint.clone())
            .timeout(policy.attempt_timeout(attempt))
            .json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let endpoint = self.endpoint.as_str();
        let response = request
            .send()
            .await
            .map_err(|e| transient_or_http(endpoint, e))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ScanError::Transient {
                url: endpoint.to_string(),
                attempts: 1,
                message: format!("extraction service returned HTTP {}", status.as_u16()),
            });
        }
        // A 404 from the service means a bad endpoint, not a vanished page.
        if !status.is_success() {
            return Err(ScanError::Status {
                url: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| transient_or_http(endpoint, e))?;
        serde_json::from_str(&text).map_err(|e| {
            ScanError::Extraction(format!("extraction service returned invalid JSON: {}", e))
        })
    }
}

#[async_trait]
impl ExtractionService for HttpExtractor {
    async fn extract(&self, url: &str, purpose: PagePurpose) -> Result<Extracted> {
        let page = self.fetcher.fetch(url).await?;
        let content = condense_page(&page.body, purpose, self.max_chars);
        debug!(
            "Condensed {} from {} to {} bytes for {}",
            url,
            page.body.len(),
            content.len(),
            purpose
        );

        let body = ExtractionRequest {
            url: &page.final_url,
            purpose,
            content: &content,
        };
        let value = retry(self.fetcher.policy(), self.endpoint.as_str(), |attempt| {
            let body = &body;
            async move { self.call_once(body, attempt).await.map(|v| (v, attempt)) }
        })
        .await?;

        let extracted = Extracted::from_response(purpose, value)?;
        info!("Extracted {} from {}", extracted.kind(), url);
        Ok(extracted)
    }
}
