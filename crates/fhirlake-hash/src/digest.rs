//! SHA-256 digests over canonical input.

use std::fmt;

use sha2::{Digest as _, Sha256};

use crate::canonical::Hashable;
use crate::{HashError, Result};

/// Length of a SHA-256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// A SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Hash raw bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }

    /// The raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Digest length in bytes; always [`DIGEST_LEN`].
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Consume the digest, returning the raw bytes.
    #[must_use]
    pub fn into_bytes(self) -> [u8; DIGEST_LEN] {
        self.0
    }

    /// Lowercase hexadecimal encoding (64 characters).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Digest> for [u8; DIGEST_LEN] {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// Canonicalize `input` and compute its SHA-256 digest over the UTF-8 bytes.
///
/// # Errors
///
/// Any failure is reported as [`HashError::Hashing`] wrapping the original
/// cause (for example [`HashError::InvalidInputKind`]).
pub fn digest<T: Hashable + ?Sized>(input: &T) -> Result<Digest> {
    let canonical = input.canonical_form().map_err(HashError::hashing)?;
    Ok(Digest::of_bytes(canonical.as_bytes()))
}

/// Like [`digest`], returning the lowercase hexadecimal encoding.
///
/// # Errors
///
/// See [`digest`].
pub fn digest_hex<T: Hashable + ?Sized>(input: &T) -> Result<String> {
    digest(input).map(|d| d.to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_digest_length() {
        let d = digest("anything").unwrap();
        assert_eq!(d.as_bytes().len(), DIGEST_LEN);
        assert_eq!(d.len(), 32);
        assert_eq!(d.to_hex().len(), 64);
    }

    #[test]
    fn test_display_matches_hex() {
        let d = digest("abc").unwrap();
        assert_eq!(d.to_string(), d.to_hex());
        assert!(format!("{d:?}").starts_with("Digest("));
    }

    #[test]
    fn test_text_and_string_value_agree() {
        assert_eq!(
            digest("hello").unwrap(),
            digest(&json!("hello")).unwrap()
        );
    }

    #[test]
    fn test_invalid_kind_is_wrapped() {
        let err = digest(&json!(3.5)).unwrap_err();
        assert!(matches!(err, HashError::Hashing { .. }));
        assert!(matches!(err.root_cause(), HashError::InvalidInputKind("number")));
        assert!(err.to_string().starts_with("Failed to hash data:"));

        let source = std::error::Error::source(&err).expect("source is kept");
        assert!(source.to_string().contains("number"));
    }
}
