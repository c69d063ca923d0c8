use crate::error::{Result, ScanError};
use crate::result::FetchedPage;
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; shelfsync/0.1; +https://github.com/trapdoorsec/shelfsync)";

/// Timeout and retry budget applied to every outbound call.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Timeout of the first attempt; each retry gets 50% more.
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Sleep before retry `n` is `backoff_base * 2^n`.
    pub backoff_base: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl FetchPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn attempt_timeout(&self, attempt: u32) -> Duration {
        self.timeout + self.timeout.mul_f64(attempt as f64 * 0.5)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Runs `op` until it succeeds, fails permanently, or the attempt budget is
/// spent. Only errors for which [`ScanError::is_transient`] holds are retried.
pub async fn retry<T, F, Fut>(policy: &FetchPolicy, url: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(T, u32)>>,
{
    let attempts = policy.attempts();
    let mut last_error = String::new();

    for attempt in 0..attempts {
        match op(attempt).await {
            Ok((value, _)) => return Ok(value),
            Err(e) if e.is_transient() => {
                warn!(
                    "Attempt {}/{} for {} failed: {}",
                    attempt + 1,
                    attempts,
                    url,
                    e
                );
                last_error = match e {
                    ScanError::Transient { message, .. } => message,
                    other => other.to_string(),
                };
                if attempt + 1 < attempts {
                    let wait = policy.backoff(attempt);
                    debug!("Waiting {:?} before retrying {}", wait, url);
                    tokio::time::sleep(wait).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(ScanError::Transient {
        url: url.to_string(),
        attempts,
        message: last_error,
    })
}

pub struct Fetcher {
    client: Client,
    policy: FetchPolicy,
}

impl Fetcher {
    pub fn new(policy: FetchPolicy) -> Result<Self> {
        Self::with_user_agent(policy, DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(policy: FetchPolicy, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(policy.timeout / 2)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client, policy })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// GET a page, retrying transient failures. A 404 surfaces immediately as
    /// [`ScanError::NotFound`].
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let parsed =
            Url::parse(url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;

        let page = retry(&self.policy, url, |attempt| {
            let target = parsed.clone();
            async move {
                let mut page = self.fetch_once(target, attempt).await?;
                page.attempts = attempt + 1;
                Ok((page, attempt))
            }
        })
        .await?;

        info!(
            "Fetched {} ({} bytes, {:?}, attempt {})",
            url,
            page.body.len(),
            page.response_time,
            page.attempts
        );
        Ok(page)
    }

    async fn fetch_once(&self, url: Url, attempt: u32) -> Result<FetchedPage> {
        let timeout = self.policy.attempt_timeout(attempt);
        debug!("Fetching {} (timeout {:?})", url, timeout);

        let start = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transient_or_http(url.as_str(), e))?;
        let response_time = start.elapsed();

        let status = response.status();
        check_status(url.as_str(), status)?;

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let final_url = response.url().to_string();

        let body = response
            .text()
            .await
            .map_err(|e| transient_or_http(url.as_str(), e))?;

        let mut page = FetchedPage::new(url.to_string());
        page.final_url = final_url;
        page.status_code = status.as_u16();
        page.content_type = content_type;
        page.body = body;
        page.response_time = response_time;
        Ok(page)
    }
}

/// Maps a response status to the error taxonomy: 404 is final, 429 and 5xx
/// are worth another attempt, any other failure status is final.
pub(crate) fn check_status(url: &str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ScanError::NotFound(url.to_string()));
    }
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ScanError::Transient {
            url: url.to_string(),
            attempts: 1,
            message: format!("HTTP {}", status.as_u16()),
        });
    }
    Err(ScanError::Status {
        url: url.to_string(),
        status: status.as_u16(),
    })
}

pub(crate) fn transient_or_http(url: &str, error: reqwest::Error) -> ScanError {
    if error.is_timeout() {
        ScanError::Transient {
            url: url.to_string(),
            attempts: 1,
            message: format!("timed out: {}", error),
        }
    } else if error.is_connect() || error.is_request() || error.is_body() {
        ScanError::Transient {
            url: url.to_string(),
            attempts: 1,
            message: error.to_string(),
        }
    } else {
        ScanError::HttpError(error)
    }
}
