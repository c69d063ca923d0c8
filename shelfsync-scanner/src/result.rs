use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A page body retrieved by the [`Fetcher`](crate::Fetcher).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub final_url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub body: String,
    pub response_time: Duration,
    pub attempts: u32,
}

impl FetchedPage {
    pub fn new(url: String) -> Self {
        Self {
            final_url: url.clone(),
            url,
            status_code: 0,
            content_type: None,
            body: String::new(),
            response_time: Duration::from_secs(0),
            attempts: 0,
        }
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_ref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(true)
    }
}
