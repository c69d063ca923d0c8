// Settings file stored next to the database in the config directory
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use shelfsync_scanner::FetchPolicy;
use shelfsync_scanner::condense::DEFAULT_MAX_CHARS;
use shelfsync_scanner::fetcher::DEFAULT_USER_AGENT;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_DIR: &str = "~/.config/shelfsync/";
pub const DB_FILE: &str = "shelfsync.db";
pub const SETTINGS_FILE: &str = "settings.json";

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

fn default_token_env() -> String {
    "SHELFSYNC_EXTRACTION_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_page_chars() -> usize {
    DEFAULT_MAX_CHARS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Where condensed pages are posted for extraction.
    #[serde(default)]
    pub extraction_endpoint: Option<String>,
    /// Environment variable holding the bearer token, if the endpoint needs one.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            extraction_endpoint: None,
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            user_agent: default_user_agent(),
            log_level: default_log_level(),
            max_page_chars: default_max_page_chars(),
        }
    }
}

impl Settings {
    /// Read and validate a settings file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Check every field and report all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if let Some(endpoint) = &self.extraction_endpoint {
            match url::Url::parse(endpoint) {
                Ok(u) if matches!(u.scheme(), "http" | "https") => {}
                _ => errors.push(format!(
                    "extraction_endpoint '{}' is not an http(s) URL",
                    endpoint
                )),
            }
        }
        if self.token_env.trim().is_empty() {
            errors.push("token_env must not be empty".to_string());
        }
        if self.timeout_secs == 0 {
            errors.push("timeout_secs must be positive".to_string());
        }
        if self.max_attempts == 0 {
            errors.push("max_attempts must be positive".to_string());
        }
        if self.max_attempts > 10 {
            errors.push("max_attempts must be <= 10".to_string());
        }
        if self.user_agent.trim().is_empty() {
            errors.push("user_agent must not be empty".to_string());
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!(
                "log_level '{}' must be one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            ));
        }
        if self.max_page_chars < 1000 {
            errors.push("max_page_chars must be >= 1000".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "invalid settings:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_secs(self.timeout_secs),
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }

    /// The configured endpoint; jobs cannot run without one.
    pub fn require_endpoint(&self) -> Result<&str> {
        self.extraction_endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                CoreError::Invariant(
                    "no extraction endpoint configured (set extraction_endpoint in settings.json \
                     or pass --endpoint)"
                        .to_string(),
                )
            })
    }

    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}
