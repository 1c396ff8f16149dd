//! Deterministic hashing of text and JSON records.
//!
//! Inputs are first reduced to a canonical string and then digested with
//! SHA-256. Text is hashed as-is; JSON objects are serialized with their
//! keys sorted at every level and without insignificant whitespace, so two
//! records holding the same pairs always produce the same digest no matter
//! how they were built.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//!
//! let a = json!({"name": "John", "age": 19});
//! let b = json!({"age": 19, "name": "John"});
//!
//! assert_eq!(
//!     fhirlake_hash::digest_hex(&a).unwrap(),
//!     fhirlake_hash::digest_hex(&b).unwrap(),
//! );
//! assert_eq!(fhirlake_hash::digest("hello world").unwrap().as_bytes().len(), 32);
//! ```

mod canonical;
mod digest;

pub use canonical::{CanonicalInput, Hashable, canonicalize};
pub use digest::{DIGEST_LEN, Digest, digest, digest_hex};

use thiserror::Error;

/// Errors produced while canonicalizing or hashing input.
#[derive(Debug, Error)]
pub enum HashError {
    /// The input is neither text nor a JSON object.
    #[error("Data must be either a string or a JSON object, got {0}")]
    InvalidInputKind(&'static str),

    /// A record could not be serialized to its canonical form.
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Wraps any failure raised while computing a digest.
    #[error("Failed to hash data: {source}")]
    Hashing {
        #[source]
        source: Box<HashError>,
    },
}

impl HashError {
    pub(crate) fn hashing(source: HashError) -> Self {
        Self::Hashing {
            source: Box::new(source),
        }
    }

    /// Returns the failure that caused this error, looking through the
    /// `Hashing` wrapper.
    pub fn root_cause(&self) -> &HashError {
        match self {
            Self::Hashing { source } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, HashError>;
