//! Bearer-token providers.
//!
//! The fetcher only needs a token string per request; where it comes from
//! is behind the [`TokenProvider`] trait. Two providers are included:
//!
//! - [`StaticToken`] - a pre-issued token, never refreshed
//! - [`ClientSecretCredential`] - OAuth 2.0 client credentials grant against
//!   a Microsoft identity platform style endpoint
//!   (`{authority}/{tenant}/oauth2/v2.0/token`), with in-memory caching

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

/// Default authority host for [`ClientSecretCredential`].
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Errors that can occur while acquiring a token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token endpoint could not be reached.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The token endpoint answered with a non-success status.
    #[error("Token request rejected (HTTP {status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The token response could not be parsed.
    #[error("Failed to parse token response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The authority host or tenant does not form a valid URL.
    #[error("Invalid token endpoint: {0}")]
    InvalidEndpoint(String),
}

/// A bearer token and, when known, the instant it stops being valid.
#[derive(Clone)]
pub struct AccessToken {
    token: String,
    expires_at: Option<Instant>,
}

impl AccessToken {
    /// A token without a known expiry.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// A token that expires `lifetime` from now.
    ///
    /// A lifetime too large to represent as an `Instant` is treated as no
    /// known expiry.
    pub fn expiring_in(token: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            token: token.into(),
            expires_at: Instant::now().checked_add(lifetime),
        }
    }

    /// The raw token value for the `Authorization` header.
    pub fn secret(&self) -> &str {
        &self.token
    }

    /// When the token expires, if known.
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Whether the token is still usable for at least `margin`.
    pub fn is_fresh(&self, margin: Duration) -> bool {
        match self.expires_at {
            Some(at) => Instant::now()
                .checked_add(margin)
                .is_some_and(|deadline| deadline < at),
            None => true,
        }
    }

    /// A short form safe for logs: first and last four characters.
    pub fn preview(&self) -> String {
        let t = &self.token;
        if t.len() > 12 && t.is_char_boundary(4) && t.is_char_boundary(t.len() - 4) {
            format!("{}...{}", &t[..4], &t[t.len() - 4..])
        } else {
            "***".to_string()
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &self.preview())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of bearer tokens.
///
/// Called once per page, so implementations that cache should return the
/// cached token cheaply while it remains valid.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a token valid for the next request.
    async fn token(&self) -> Result<AccessToken, AuthError>;
}

/// A fixed, pre-issued token.
#[derive(Debug, Clone)]
pub struct StaticToken(AccessToken);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(AccessToken::new(token))
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<AccessToken, AuthError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth 2.0 client credentials grant with token caching.
///
/// A cached token is reused until it is within `refresh_margin` of its
/// expiry (5 minutes by default).
pub struct ClientSecretCredential {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    scope: String,
    refresh_margin: Duration,
    cached: Mutex<Option<AccessToken>>,
}

impl ClientSecretCredential {
    /// Create a credential against the default authority host.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidEndpoint`] if the tenant id does not form
    /// a valid token URL.
    pub fn new(
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            http: reqwest::Client::new(),
            token_url: token_url(DEFAULT_AUTHORITY_HOST, tenant_id)?,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
            refresh_margin: Duration::from_secs(300),
            cached: Mutex::new(None),
        })
    }

    /// Use a different authority host (sovereign clouds, local test servers).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidEndpoint`] if the host is not a valid URL.
    pub fn with_authority_host(
        mut self,
        host: &str,
        tenant_id: &str,
    ) -> Result<Self, AuthError> {
        self.token_url = token_url(host, tenant_id)?;
        Ok(self)
    }

    /// Sets how long before expiry a cached token is replaced.
    #[must_use]
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Use a preconfigured HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// The token endpoint this credential posts to.
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    async fn request_token(&self) -> Result<AccessToken, AuthError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("scope", &self.scope)
            .finish();

        let resp = self
            .http
            .post(self.token_url.clone())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status, endpoint = %self.token_url, "Token request rejected");
            return Err(AuthError::Rejected { status, body });
        }

        let bytes = resp.bytes().await?;
        let parsed: TokenResponse = serde_json::from_slice(&bytes)?;
        let token = match parsed.expires_in {
            Some(secs) => AccessToken::expiring_in(parsed.access_token, Duration::from_secs(secs)),
            None => AccessToken::new(parsed.access_token),
        };

        tracing::debug!(
            client_id = %self.client_id,
            token = %token.preview(),
            expires_in = ?parsed.expires_in,
            "Acquired access token"
        );

        Ok(token)
    }
}

impl fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenProvider for ClientSecretCredential {
    async fn token(&self) -> Result<AccessToken, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && token.is_fresh(self.refresh_margin)
        {
            return Ok(token.clone());
        }

        let token = self.request_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

fn token_url(host: &str, tenant_id: &str) -> Result<Url, AuthError> {
    let raw = format!(
        "{}/{}/oauth2/v2.0/token",
        host.trim_end_matches('/'),
        tenant_id.trim_matches('/')
    );
    Url::parse(&raw).map_err(|e| AuthError::InvalidEndpoint(format!("{raw}: {e}")))
}
