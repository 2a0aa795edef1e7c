//! Segment identity and cache key derivation.
//!
//! A segment is one fixed-length window of an audio stream. Its identity is
//! the tuple (source url, total data size, offset, SHA-256 of the segment
//! bytes). Key derivation is a pure function: equal inputs always produce the
//! identical key, and distinct content bytes map to distinct keys with
//! overwhelming probability.
//!
//! # Key format
//!
//! ```text
//! sourceUrl--totalDataSize--offsetSeconds--hex(sha256(contentBytes))
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity of one evaluated audio segment.
///
/// Two identities are equal iff all four fields match exactly. The content
/// hash stands in for the raw bytes so identities stay cheap to clone and
/// compare.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentIdentity {
    /// URL of the audio stream the segment was cut from.
    pub source_url: String,
    /// Total size of the stream payload in bytes.
    pub total_data_size: u64,
    /// Offset of the segment within the stream, as supplied by the caller.
    pub offset_seconds: String,
    /// Hex-encoded SHA-256 digest of the segment's audio bytes.
    pub content_hash: String,
}

impl SegmentIdentity {
    /// Derive an identity from a raw segment description and its content bytes.
    pub fn derive(
        source_url: &str,
        total_data_size: u64,
        offset_seconds: &str,
        content: &[u8],
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self {
            source_url: source_url.to_string(),
            total_data_size,
            offset_seconds: offset_seconds.to_string(),
            content_hash: hex::encode(hasher.finalize()),
        }
    }

    /// Render the identity as its cache key.
    pub fn cache_key(&self) -> String {
        format!(
            "{}--{}--{}--{}",
            self.source_url, self.total_data_size, self.offset_seconds, self.content_hash
        )
    }
}

/// Derive a cache key directly from a raw segment description.
///
/// Convenience wrapper over [`SegmentIdentity::derive`] + [`SegmentIdentity::cache_key`].
pub fn derive_key(
    source_url: &str,
    total_data_size: u64,
    offset_seconds: &str,
    content: &[u8],
) -> String {
    SegmentIdentity::derive(source_url, total_data_size, offset_seconds, content).cache_key()
}
