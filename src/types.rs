//! Domain types shared across the evaluation core.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use std::collections::HashMap;

use crate::identity::SegmentIdentity;

/// Upper bound of the accepted match score range.
///
/// Candidates scoring above this are treated as non-matches by the calling
/// layer. Threshold application itself happens outside this core; the
/// constants are part of the provider contract surface.
pub const SCORE_MAX_THRESHOLD: f64 = 0.0021;

/// Lower bound of the accepted similarity range.
pub const SIMILARITY_MIN_THRESHOLD: f64 = -0.25;

/// Upper bound of the accepted similarity range.
pub const SIMILARITY_MAX_THRESHOLD: f64 = 0.25;

/// A labeled marker associated with a recognized audio segment.
///
/// Catalog attributes beyond `id` and `description` are opaque to this layer
/// and carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Catalog identifier of the marker.
    pub id: i64,
    /// Free-form description text. Cached under its own sub-key and excluded
    /// from the serialized tag body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Remaining catalog attributes, passed through opaquely.
    #[serde(flatten)]
    pub attributes: HashMap<String, JsonValue>,
}

impl Tag {
    /// Construct a tag with just an id and description.
    pub fn new(id: i64, description: impl Into<String>) -> Self {
        Self {
            id,
            description: Some(description.into()),
            attributes: HashMap::new(),
        }
    }
}

/// One candidate returned by the external matching provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub tag: Tag,
    /// Match score reported by the provider.
    pub score: f64,
    /// Similarity reported by the provider.
    pub similarity: f64,
}

impl MatchCandidate {
    /// Whether this candidate falls inside the accepted score and similarity
    /// ranges of the provider contract.
    pub fn within_thresholds(&self) -> bool {
        self.score >= 0.0
            && self.score <= SCORE_MAX_THRESHOLD
            && self.similarity >= SIMILARITY_MIN_THRESHOLD
            && self.similarity <= SIMILARITY_MAX_THRESHOLD
    }
}

/// Outcome of evaluating one segment, as stored in and served from the cache.
///
/// `tags` holds at most one entry: the cache wire layout has room for exactly
/// one serialized tag, so the store keeps the first matched tag and drops the
/// rest. `match_count` still reports the full number of matches found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Total number of tags the provider matched for this segment.
    pub match_count: u64,
    /// The first matched tag, when any matched.
    pub tags: Vec<Tag>,
}

impl MatchRecord {
    /// A confirmed zero-match outcome. Cached identically to a positive one.
    pub fn no_match() -> Self {
        Self {
            match_count: 0,
            tags: Vec::new(),
        }
    }

    /// Build a record from the full list of matched tags, applying the
    /// one-tag storage cap.
    pub fn capped(tags: Vec<Tag>) -> Self {
        let match_count = tags.len() as u64;
        let mut tags = tags;
        if tags.len() > 1 {
            debug!(
                dropped = tags.len() - 1,
                "capping stored tags to the first match"
            );
            tags.truncate(1);
        }
        Self { match_count, tags }
    }
}

/// Raw description of a segment as supplied by the request-handling layer.
#[derive(Debug, Clone)]
pub struct SegmentDescriptor {
    /// URL of the audio stream.
    pub source_url: String,
    /// Total size of the stream payload in bytes.
    pub total_data_size: u64,
    /// Offset of the segment within the stream.
    pub offset_seconds: String,
    /// The segment's audio bytes.
    pub content: Vec<u8>,
    /// Segment duration handed to the matching provider.
    pub duration_seconds: f64,
}

impl SegmentDescriptor {
    /// Describe a standard one-second segment window.
    pub fn new(
        source_url: impl Into<String>,
        total_data_size: u64,
        offset_seconds: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            total_data_size,
            offset_seconds: offset_seconds.into(),
            content,
            duration_seconds: 1.0,
        }
    }

    /// Derive the stable identity of this segment.
    pub fn identity(&self) -> SegmentIdentity {
        SegmentIdentity::derive(
            &self.source_url,
            self.total_data_size,
            &self.offset_seconds,
            &self.content,
        )
    }
}
