//! File and environment configuration for [`WaspClient`](crate::WaspClient).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, RetryPolicy, WaspClient, WaspClientBuilder};

/// Connection settings for a WASP deployment.
///
/// Loaded from TOML:
///
/// ```toml
/// server_urls = ["wasp-a.example.com:2233", "https://wasp-b.example.com"]
/// upload_urls = ["https://wasp-ingest.example.com"]
/// timeout_secs = 60
/// retry_rounds = 4
/// retry_delay_secs = 4
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaspConfig {
    /// Read (and, by default, upload) endpoints in preference order.
    pub server_urls: Vec<String>,
    /// Upload-only endpoints. Empty means uploads use `server_urls`.
    pub upload_urls: Vec<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Bearer token sent with every request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Number of passes over the URL list before giving up.
    pub retry_rounds: Option<u32>,
    /// Pause between passes, in seconds.
    pub retry_delay_secs: Option<u64>,
    /// Buffer size for file transfers, in bytes.
    pub chunk_size: Option<usize>,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
}

impl WaspConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(document: &str) -> Result<Self, Error> {
        toml::from_str(document).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&document)
    }

    /// Configuration from environment variables only.
    ///
    /// Reads:
    /// - `WASP_SERVER_URLS` (comma separated)
    /// - `WASP_UPLOAD_URLS` (comma separated)
    /// - `WASP_TIMEOUT_SECS`
    /// - `WASP_TOKEN`
    /// - `WASP_RETRY_ROUNDS`
    /// - `WASP_RETRY_DELAY_SECS`
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Override fields with any `WASP_*` environment variables that are set.
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn split(list: &str) -> Vec<String> {
            list.split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect()
        }

        if let Some(urls) = lookup("WASP_SERVER_URLS") {
            self.server_urls = split(&urls);
        }
        if let Some(urls) = lookup("WASP_UPLOAD_URLS") {
            self.upload_urls = split(&urls);
        }
        if let Some(secs) = lookup("WASP_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.timeout_secs = Some(secs);
        }
        if let Some(token) = lookup("WASP_TOKEN") {
            self.token = Some(token);
        }
        if let Some(rounds) = lookup("WASP_RETRY_ROUNDS").and_then(|s| s.parse().ok()) {
            self.retry_rounds = Some(rounds);
        }
        if let Some(secs) = lookup("WASP_RETRY_DELAY_SECS").and_then(|s| s.parse().ok()) {
            self.retry_delay_secs = Some(secs);
        }
        self
    }

    /// Builder preloaded with this configuration.
    pub fn builder(&self) -> WaspClientBuilder {
        let mut builder = WaspClientBuilder::new(self.server_urls.clone())
            .upload_urls(self.upload_urls.clone())
            .accept_invalid_certs(self.accept_invalid_certs);

        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if self.retry_rounds.is_some() || self.retry_delay_secs.is_some() {
            let default = RetryPolicy::default();
            builder = builder.retry(RetryPolicy::new(
                self.retry_rounds.unwrap_or(default.rounds()),
                self.retry_delay_secs
                    .map_or(default.delay(), Duration::from_secs),
            ));
        }
        if let Some(size) = self.chunk_size {
            builder = builder.chunk_size(size);
        }
        if let Some(token) = &self.token {
            builder = builder.bearer_token(token);
        }
        builder
    }

    /// Build a client from this configuration.
    pub fn build(&self) -> Result<WaspClient, Error> {
        self.builder().build()
    }
}
