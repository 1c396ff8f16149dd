//! Paginated retrieval of FHIR search results.
//!
//! # Overview
//!
//! [`ResourceFetcher`] walks a FHIR searchset Bundle chain: it GETs the
//! starting URL, collects the page's `entry` list, follows the `link` whose
//! relation is `next`, and stops when no such link remains or the server
//! answers with anything other than `200 OK`. Non-200 answers end the walk
//! without an error; whatever was collected so far is returned together
//! with the [`Termination`] reason.
//!
//! Bearer tokens come from a [`TokenProvider`], which is asked for a token
//! before every page so long walks can pick up refreshed credentials.
//!
//! # Components
//!
//! - [`auth`] - token providers ([`StaticToken`], [`ClientSecretCredential`])
//! - [`BundlePage`] - the subset of a Bundle needed for pagination
//! - [`ResourceFetcher`] / [`Pagination`] - the fetch state machine
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fhirlake_fetch::{FetcherConfig, ResourceFetcher, StaticToken};
//!
//! let fetcher = ResourceFetcher::new(Arc::new(StaticToken::new(token)), FetcherConfig::default())?;
//! let outcome = fetcher.fetch_all("https://fhir.example.com/Patient").await?;
//! println!("{} entries in {} pages", outcome.entries.len(), outcome.pages);
//! ```

pub mod auth;
mod bundle;
mod fetcher;

pub use auth::{AccessToken, AuthError, ClientSecretCredential, StaticToken, TokenProvider};
pub use bundle::{BundleLink, BundlePage};
pub use fetcher::{
    FetchOutcome, FetchState, FetcherConfig, Pagination, ResourceCollection, ResourceFetcher,
    Termination,
};

use thiserror::Error;

/// MIME type sent in `Accept` and `Content-Type` headers.
pub const FHIR_JSON: &str = "application/fhir+json";

/// Errors that abort pagination.
///
/// A non-200 response is not an error; see [`Termination::HttpStatus`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The token provider could not supply a bearer token.
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The request could not be sent or the response body could not be read.
    #[error("Network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A 200 response did not contain a valid Bundle page.
    #[error("Failed to parse page from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The starting URL or a `next` link is not a valid URL.
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The HTTP client could not be built.
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, FetchError>;
