//! The pagination state machine.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use url::Url;

use crate::auth::TokenProvider;
use crate::bundle::BundlePage;
use crate::{FHIR_JSON, FetchError, Result};

/// Configuration for a [`ResourceFetcher`].
#[derive(Debug, Clone, Default)]
pub struct FetcherConfig {
    /// Per-request timeout. `None` keeps the HTTP client default.
    pub request_timeout: Option<Duration>,

    /// Stop after this many successful pages. `None` follows every link.
    pub max_pages: Option<usize>,
}

impl FetcherConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the page limit.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }
}

/// Why pagination stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The last page had no `next` link.
    Exhausted,

    /// The server answered with a status other than 200.
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body (lossy UTF-8).
        body: String,
    },

    /// The configured page limit was reached.
    PageLimit {
        /// Number of pages fetched.
        pages: usize,
    },
}

impl Termination {
    /// Whether every page reachable from the start URL was collected.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Exhausted)
    }
}

/// State of a [`Pagination`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    /// The next request goes to this URL.
    Fetching(Url),
    /// Pagination has stopped.
    Done(Termination),
}

/// Entries accumulated across pages, in retrieval order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceCollection(Vec<Value>);

impl ResourceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    /// The `resource` member of each entry that has one.
    pub fn resources(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().filter_map(|e| e.get("resource"))
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }

    fn append(&mut self, entries: Vec<Value>) {
        self.0.extend(entries);
    }
}

impl IntoIterator for ResourceCollection {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResourceCollection {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Result of a finished pagination.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// All collected entries.
    pub entries: ResourceCollection,
    /// Number of 200 pages consumed.
    pub pages: usize,
    /// Why pagination stopped.
    pub termination: Termination,
}

enum PageResponse {
    Page(BundlePage),
    Failed { status: u16, body: String },
}

/// Fetches FHIR search results page by page.
pub struct ResourceFetcher {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    config: FetcherConfig,
}

impl ResourceFetcher {
    /// Create a fetcher that authenticates with `tokens`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the HTTP client cannot be built.
    pub fn new(tokens: Arc<dyn TokenProvider>, config: FetcherConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(FetchError::Client)?;

        Ok(Self {
            http,
            tokens,
            config,
        })
    }

    /// The fetcher's configuration.
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Start a pagination at `endpoint` without issuing any request.
    pub fn paginate(&self, endpoint: Url) -> Pagination<'_> {
        Pagination {
            fetcher: self,
            state: FetchState::Fetching(endpoint),
            collection: ResourceCollection::new(),
            pages: 0,
        }
    }

    /// Follow `next` links from `endpoint` until pagination stops.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL, a token cannot
    /// be obtained, a request fails at the transport level, or a 200 page
    /// cannot be parsed. Non-200 responses are not errors.
    pub async fn fetch_all(&self, endpoint: &str) -> Result<FetchOutcome> {
        let url = Url::parse(endpoint).map_err(|source| FetchError::InvalidUrl {
            url: endpoint.to_string(),
            source,
        })?;
        self.paginate(url).run().await
    }

    async fn fetch_page(&self, url: &Url) -> Result<PageResponse> {
        let token = self.tokens.token().await?;

        let network = |source| FetchError::Network {
            url: url.to_string(),
            source,
        };

        let resp = self
            .http
            .get(url.clone())
            .bearer_auth(token.secret())
            .header(ACCEPT, FHIR_JSON)
            .header(CONTENT_TYPE, FHIR_JSON)
            .send()
            .await
            .map_err(network)?;

        let status = resp.status();
        tracing::info!(status = status.as_u16(), url = %url, "Fetched page");

        let bytes = resp.bytes().await.map_err(network)?;

        if status != StatusCode::OK {
            return Ok(PageResponse::Failed {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let page = serde_json::from_slice(&bytes).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })?;
        Ok(PageResponse::Page(page))
    }
}

/// An in-progress walk over a Bundle chain.
///
/// Starts in [`FetchState::Fetching`]; each [`advance`](Self::advance)
/// fetches one page and either moves to the next URL or to
/// [`FetchState::Done`], which is terminal.
pub struct Pagination<'a> {
    fetcher: &'a ResourceFetcher,
    state: FetchState,
    collection: ResourceCollection,
    pages: usize,
}

impl Pagination<'_> {
    pub fn state(&self) -> &FetchState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, FetchState::Done(_))
    }

    /// Entries collected so far.
    pub fn collection(&self) -> &ResourceCollection {
        &self.collection
    }

    /// Number of 200 pages consumed so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Fetch one page. Does nothing once done.
    ///
    /// # Errors
    ///
    /// See [`ResourceFetcher::fetch_all`]. The state is left unchanged on
    /// error.
    pub async fn advance(&mut self) -> Result<&FetchState> {
        let url = match &self.state {
            FetchState::Fetching(url) => url.clone(),
            FetchState::Done(_) => return Ok(&self.state),
        };

        if let Some(max) = self.fetcher.config.max_pages
            && self.pages >= max
        {
            tracing::info!(pages = self.pages, "Page limit reached");
            self.state = FetchState::Done(Termination::PageLimit { pages: self.pages });
            return Ok(&self.state);
        }

        match self.fetcher.fetch_page(&url).await? {
            PageResponse::Page(page) => {
                let next = page.next_link().map(|href| resolve_link(&url, href)).transpose()?;
                let entries = page.into_entries();
                tracing::debug!(entries = entries.len(), has_next = next.is_some(), "Page parsed");

                self.pages += 1;
                self.collection.append(entries);
                self.state = match next {
                    Some(next) => FetchState::Fetching(next),
                    None => FetchState::Done(Termination::Exhausted),
                };
            }
            PageResponse::Failed { status, body } => {
                tracing::warn!(
                    status,
                    url = %url,
                    body = %body,
                    collected = self.collection.len(),
                    "Failed to fetch page; returning partial results"
                );
                self.state = FetchState::Done(Termination::HttpStatus { status, body });
            }
        }

        Ok(&self.state)
    }

    /// Advance until done and return the outcome.
    ///
    /// # Errors
    ///
    /// See [`ResourceFetcher::fetch_all`].
    pub async fn run(mut self) -> Result<FetchOutcome> {
        while !self.is_done() {
            self.advance().await?;
        }
        Ok(self.finish())
    }

    /// Stop here and return what has been collected.
    ///
    /// If pagination is not done yet, the termination is reported as
    /// [`Termination::PageLimit`] with the pages consumed so far.
    pub fn finish(self) -> FetchOutcome {
        let termination = match self.state {
            FetchState::Done(t) => t,
            FetchState::Fetching(_) => Termination::PageLimit { pages: self.pages },
        };
        FetchOutcome {
            entries: self.collection,
            pages: self.pages,
            termination,
        }
    }
}

fn resolve_link(current: &Url, href: &str) -> Result<Url> {
    current.join(href).map_err(|source| FetchError::InvalidUrl {
        url: href.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("https://fhir.example.com/fhir/Patient?_count=2").unwrap();

        let absolute = resolve_link(&base, "https://other.example.com/Patient?page=2").unwrap();
        assert_eq!(absolute.as_str(), "https://other.example.com/Patient?page=2");

        let relative = resolve_link(&base, "Patient?page=2").unwrap();
        assert_eq!(relative.as_str(), "https://fhir.example.com/fhir/Patient?page=2");

        let rooted = resolve_link(&base, "/fhir/Patient?ct=x").unwrap();
        assert_eq!(rooted.as_str(), "https://fhir.example.com/fhir/Patient?ct=x");
    }

    #[test]
    fn test_config_builder() {
        let config = FetcherConfig::new()
            .with_request_timeout(Duration::from_secs(5))
            .with_max_pages(3);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.max_pages, Some(3));
        assert!(FetcherConfig::default().max_pages.is_none());
    }

    #[test]
    fn test_initial_state_is_fetching() {
        let fetcher =
            ResourceFetcher::new(Arc::new(StaticToken::new("t")), FetcherConfig::default())
                .unwrap();
        let url = Url::parse("https://fhir.example.com/Patient").unwrap();
        let pagination = fetcher.paginate(url.clone());

        assert_eq!(pagination.state(), &FetchState::Fetching(url));
        assert!(!pagination.is_done());
        assert!(pagination.collection().is_empty());

        let outcome = pagination.finish();
        assert_eq!(outcome.pages, 0);
        assert_eq!(outcome.termination, Termination::PageLimit { pages: 0 });
    }

    #[tokio::test]
    async fn test_invalid_endpoint() {
        let fetcher =
            ResourceFetcher::new(Arc::new(StaticToken::new("t")), FetcherConfig::default())
                .unwrap();
        let err = fetcher.fetch_all("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[test]
    fn test_collection_resources() {
        let mut c = ResourceCollection::new();
        c.append(vec![
            serde_json::json!({"resource": {"id": "1"}}),
            serde_json::json!({"search": {"mode": "include"}}),
        ]);
        assert_eq!(c.len(), 2);
        assert_eq!(c.resources().count(), 1);
    }
}
