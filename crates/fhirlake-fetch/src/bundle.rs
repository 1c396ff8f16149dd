//! The parts of a FHIR Bundle that drive pagination.

use serde::Deserialize;
use serde_json::Value;

/// Relation name of the link pointing at the following page.
pub const NEXT_RELATION: &str = "next";

/// One page of a searchset Bundle.
///
/// Only `entry` and `link` are read; everything else in the Bundle is
/// ignored. Both may be absent or `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BundlePage {
    #[serde(default)]
    entry: Option<Vec<Value>>,
    #[serde(default)]
    link: Option<Vec<BundleLink>>,
}

/// A Bundle `link` element.
///
/// Either field may be missing on links the fetcher does not follow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BundleLink {
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl BundlePage {
    /// The page's entries, in document order.
    pub fn entries(&self) -> &[Value] {
        self.entry.as_deref().unwrap_or_default()
    }

    /// Consume the page, returning its entries.
    pub fn into_entries(self) -> Vec<Value> {
        self.entry.unwrap_or_default()
    }

    /// The page's links.
    pub fn links(&self) -> &[BundleLink] {
        self.link.as_deref().unwrap_or_default()
    }

    /// URL of the first link whose relation is `next`.
    pub fn next_link(&self) -> Option<&str> {
        self.links()
            .iter()
            .find(|l| l.relation.as_deref() == Some(NEXT_RELATION))
            .and_then(|l| l.url.as_deref())
    }
}
