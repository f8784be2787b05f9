//! WASP HTTP Client
//!
//! A native Rust client for the WASP (Conduit) record service: versioned,
//! schema-described records grouped into collections, with file attachments,
//! references between records, and server-side actions.
//!
//! # Quick Start
//!
//! ```no_run
//! use wasp_client::{Record, RecordSpec, WaspClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), wasp_client::Error> {
//!     let client = WaspClient::new("http://localhost:2233")?;
//!
//!     let record = Record::new().with("platform", "SKL").with("cores", 4);
//!     let stored = client.add_record("traces", &record).await?;
//!     println!("Stored as {:?}", stored.id());
//!
//!     let matches = client
//!         .find_records("traces", &RecordSpec::Match(record), true)
//!         .await?;
//!     println!("{} matching record(s)", matches.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Failover
//!
//! A client holds an ordered list of server URLs (and optionally a separate
//! list for uploads). Each request walks the list until one server answers;
//! transport failures and 5xx responses move on to the next URL. See
//! [`RetryPolicy`] for repeated passes.
//!
//! # Configuration
//!
//! ```no_run
//! use std::time::Duration;
//! use wasp_client::{RetryPolicy, WaspClientBuilder};
//!
//! let client = WaspClientBuilder::new(["wasp-a.example.com:2233", "wasp-b.example.com:2233"])
//!     .timeout(Duration::from_secs(60))
//!     .retry(RetryPolicy::new(4, Duration::from_secs(4)))
//!     .bearer_token("secret")
//!     .build()
//!     .unwrap();
//! ```
//!
//! Settings can also be loaded from TOML and `WASP_*` variables with
//! [`WaspConfig`].

mod actions;
pub mod auth;
mod config;
mod error;
pub mod file;
mod files;
mod marshal;
mod record;
mod records;
mod reference;
mod retry;
mod schema;
mod value;

pub use actions::ActionParams;
pub use auth::{Authenticator, BasicAuth, BearerToken};
pub use config::WaspConfig;
pub use error::Error;
pub use file::{FileReader, FileValue};
pub use record::Record;
pub use reference::ReferenceValue;
pub use retry::{DEFAULT_RETRY_DELAY, RetryPolicy};
pub use schema::DEFAULT_VIEW;
pub use value::Value;

// Re-export schema types so callers don't need a direct `wasp_core` dependency.
pub use wasp_core::{Column, SystemInfo, TagSchema, ViewConfig};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, Url};
use tracing::{debug, warn};
use wasp_core::ID_TAG;

use crate::error::ErrorContext;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for a WASP deployment.
///
/// Cheap to clone; clones share the connection pool and configuration.
/// Values decoded by the client (stored files, references) keep a clone so
/// they can fetch their content later.
#[derive(Debug, Clone)]
pub struct WaspClient {
    client: Client,
    server_urls: Arc<[Url]>,
    upload_urls: Arc<[Url]>,
    authenticator: Option<Arc<dyn Authenticator>>,
    retry: RetryPolicy,
    chunk_size: usize,
}

/// Builder for configuring a [`WaspClient`].
#[derive(Debug)]
pub struct WaspClientBuilder {
    server_urls: Vec<String>,
    upload_urls: Vec<String>,
    timeout: Duration,
    retry: RetryPolicy,
    authenticator: Option<Arc<dyn Authenticator>>,
    accept_invalid_certs: bool,
    chunk_size: usize,
    client: Option<Client>,
}

impl WaspClientBuilder {
    /// Create a new builder with the given server URLs, in preference order.
    ///
    /// URLs without a scheme are treated as `http://`.
    pub fn new<I, S>(server_urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            server_urls: server_urls.into_iter().map(Into::into).collect(),
            upload_urls: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            authenticator: None,
            accept_invalid_certs: false,
            chunk_size: file::DEFAULT_CHUNK_SIZE,
            client: None,
        }
    }

    /// Send uploads (record creation, updates, actions) to these URLs instead.
    #[must_use]
    pub fn upload_urls<I, S>(mut self, upload_urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.upload_urls = upload_urls.into_iter().map(Into::into).collect();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how failed requests are retried.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Authenticate every request with `authenticator`.
    #[must_use]
    pub fn authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Shorthand for a [`BearerToken`] authenticator.
    #[must_use]
    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.authenticator(BearerToken::new(token))
    }

    /// Shorthand for a [`BasicAuth`] authenticator.
    #[must_use]
    pub fn basic_auth(self, username: impl Into<String>, password: Option<String>) -> Self {
        self.authenticator(BasicAuth::new(username, password))
    }

    /// Skip TLS certificate verification. Ignored when a custom client is set.
    #[must_use]
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Buffer size used when streaming file content.
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Use a custom reqwest Client.
    ///
    /// Useful for configuring TLS, proxies, or negotiated authentication.
    #[must_use]
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<WaspClient, Error> {
        let server_urls = parse_urls(&self.server_urls)?;
        if server_urls.is_empty() {
            return Err(Error::Configuration("no server URL configured".into()));
        }
        let upload_urls = match parse_urls(&self.upload_urls)? {
            urls if urls.is_empty() => server_urls.clone(),
            urls => urls,
        };

        let client = match self.client {
            Some(c) => c,
            None => Client::builder()
                .timeout(self.timeout)
                .danger_accept_invalid_certs(self.accept_invalid_certs)
                .build()
                .map_err(|e| Error::Configuration(e.to_string()))?,
        };

        Ok(WaspClient {
            client,
            server_urls: server_urls.into(),
            upload_urls: upload_urls.into(),
            authenticator: self.authenticator,
            retry: self.retry,
            chunk_size: self.chunk_size,
        })
    }
}

fn parse_urls(raw: &[String]) -> Result<Vec<Url>, Error> {
    raw.iter()
        .map(|url| url.trim())
        .filter(|url| !url.is_empty())
        .map(|url| {
            let absolute = if url.contains("://") {
                url.to_string()
            } else {
                format!("http://{url}")
            };
            let parsed = Url::parse(&absolute)
                .map_err(|e| Error::Configuration(format!("invalid server URL '{url}': {e}")))?;
            if parsed.cannot_be_a_base() {
                return Err(Error::Configuration(format!(
                    "invalid server URL '{url}': not a base URL"
                )));
            }
            Ok(parsed)
        })
        .collect()
}

/// Which URL list a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Read,
    Upload,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("server"),
            Self::Upload => f.write_str("upload"),
        }
    }
}

/// Which records a search selects.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RecordSpec {
    /// Every record in the collection.
    #[default]
    All,
    /// The record with this identifier.
    Id(String),
    /// Records whose tags match every tag of this partial record.
    Match(Record),
}

impl From<Record> for RecordSpec {
    fn from(record: Record) -> Self {
        Self::Match(record)
    }
}

impl From<&str> for RecordSpec {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl WaspClient {
    /// Create a client for a single server with default configuration.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use wasp_client::WaspClient;
    ///
    /// let client = WaspClient::new("http://localhost:2233").unwrap();
    /// ```
    pub fn new(server_url: impl Into<String>) -> Result<Self, Error> {
        let server_url: String = server_url.into();
        WaspClientBuilder::new([server_url]).build()
    }

    /// Create a builder for advanced configuration.
    pub fn builder<I, S>(server_urls: I) -> WaspClientBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WaspClientBuilder::new(server_urls)
    }

    /// Create a client from a [`WaspConfig`].
    pub fn from_config(config: &WaspConfig) -> Result<Self, Error> {
        config.build()
    }

    /// The first configured server URL, as shown to users.
    pub fn public_url(&self) -> Option<&str> {
        self.server_urls.first().map(Url::as_str)
    }

    pub fn server_urls(&self) -> &[Url] {
        &self.server_urls
    }

    pub fn upload_urls(&self) -> &[Url] {
        &self.upload_urls
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Identifier of a stored record.
    ///
    /// Fails with [`Error::Validation`] when the record was never stored.
    pub fn get_record_id(record: &Record) -> Result<&str, Error> {
        record
            .id()
            .ok_or_else(|| Error::Validation(format!("record has no '{ID_TAG}' tag")))
    }

    // =========================================================================
    // Transport
    // =========================================================================

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.authenticator {
            Some(authenticator) => authenticator.authenticate(request),
            None => request,
        }
    }

    /// Send a request, failing over across the target's URLs.
    ///
    /// `build` is called once per attempt with the full endpoint URL, so
    /// request bodies (multipart forms in particular) are rebuilt for every
    /// attempt. Any response below 500 is returned as is.
    async fn send<F, Fut>(
        &self,
        target: Target,
        segments: &[&str],
        rounds: u32,
        mut build: F,
    ) -> Result<Response, Error>
    where
        F: FnMut(Url) -> Fut,
        Fut: Future<Output = Result<RequestBuilder, Error>>,
    {
        let bases = match target {
            Target::Read => &self.server_urls,
            Target::Upload => &self.upload_urls,
        };
        if bases.is_empty() {
            return Err(Error::Configuration(format!("no {target} URL configured")));
        }

        let mut last_error = None;
        for round in 0..rounds.max(1) {
            if round > 0 {
                debug!(round, delay = ?self.retry.delay(), "all URLs failed, retrying");
                tokio::time::sleep(self.retry.delay()).await;
            }
            for base in bases.iter() {
                let url = endpoint(base, segments)?;
                let request = self.authorize(build(url.clone()).await?);
                debug!(%url, "sending request");
                match request.send().await {
                    Ok(response) if response.status().is_server_error() => {
                        let status = response.status();
                        let message = response.text().await.unwrap_or_default();
                        warn!(%url, %status, "server error, trying next URL");
                        last_error = Some(Error::Http {
                            status: status.as_u16(),
                            message,
                        });
                    }
                    Ok(response) => return Ok(response),
                    Err(e) => {
                        warn!(%url, error = %e, "request failed, trying next URL");
                        last_error = Some(Error::Transport(e.to_string()));
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Transport("no request was sent".into())))
    }

    /// Decode a JSON response body, binding files and references to this client.
    async fn read_value(&self, response: Response, context: ErrorContext) -> Result<Value, Error> {
        let json = read_json(response, context).await?;
        Ok(marshal::decode(json, Some(self)))
    }
}

/// `base` with `segments` appended as path segments (each percent-encoded).
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, Error> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| Error::Configuration(format!("invalid server URL '{base}'")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// An already built request, for [`WaspClient::send`] callers without async work.
fn ready(request: RequestBuilder) -> std::future::Ready<Result<RequestBuilder, Error>> {
    std::future::ready(Ok(request))
}

/// Pass successful responses through; turn the rest into errors.
async fn expect_success(response: Response, context: ErrorContext) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(Error::from_status(status, message, context))
}

async fn read_json(response: Response, context: ErrorContext) -> Result<serde_json::Value, Error> {
    let body = expect_success(response, context).await?.bytes().await;
    let body = body.map_err(|e| Error::Transport(e.to_string()))?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(&body).map_err(|e| Error::Deserialization(e.to_string()))
}
