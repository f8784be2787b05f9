//! Request authentication.
//!
//! Deployments put the service behind different front doors (tokens, basic
//! auth, Kerberos-aware proxies). The client only knows the [`Authenticator`]
//! seam; transports that negotiate credentials themselves can instead be
//! injected as a preconfigured `reqwest::Client`.

use std::fmt;

use reqwest::RequestBuilder;

/// Decorates every outgoing request with credentials.
pub trait Authenticator: fmt::Debug + Send + Sync {
    /// Attach credentials to `request`.
    fn authenticate(&self, request: RequestBuilder) -> RequestBuilder;
}

/// `Authorization: Bearer <token>`.
#[derive(Clone)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken").field("token", &"***").finish()
    }
}

impl Authenticator for BearerToken {
    fn authenticate(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }
}

/// HTTP basic authentication.
#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    password: Option<String>,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Authenticator for BasicAuth {
    fn authenticate(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, self.password.as_ref())
    }
}
