//! Shared result cache with per-entry time-to-live.
//!
//! The store is strictly an optimization: evaluation correctness never
//! depends on it. An unreachable backend degrades reads to Absent and writes
//! to a no-op; a corrupted entry is treated as Absent and self-heals on the
//! next successful write.
//!
//! # Entry layout
//!
//! One evaluated segment occupies three sub-entries under its cache key `K`
//! (see [`SegmentIdentity::cache_key`]), all written with the same TTL:
//!
//! | sub-key                  | value                                      |
//! |--------------------------|--------------------------------------------|
//! | `K+count`                | decimal match count                        |
//! | `K+liveTags`             | serialized first tag, description excluded |
//! | `K+liveTagsDescription`  | raw description text of that tag           |
//!
//! A zero count is cached like any other outcome so segments already known
//! to have no matches never hit the external matcher again.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::identity::SegmentIdentity;
use crate::types::{MatchRecord, Tag};

const SUB_COUNT: &str = "+count";
const SUB_LIVE_TAGS: &str = "+liveTags";
const SUB_LIVE_TAGS_DESCRIPTION: &str = "+liveTagsDescription";

/// Key-value backend seam with per-entry TTL.
///
/// Reads never mutate TTLs (lazy expiry only) and writes overwrite any prior
/// entry for the same key.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a live entry, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write an entry with the given TTL, replacing any prior value.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process [`KvStore`] backed by a concurrent map.
///
/// Expiry is lazy: an entry past its deadline is simply treated as absent on
/// read. No eviction thread runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, including not-yet-collected expired
    /// ones. For tests and diagnostics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Expired entries are dropped on the read path.
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        Ok(None)
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

/// Cache of prior match outcomes, keyed by [`SegmentIdentity`].
///
/// Owns the sub-entry layout and the failure policy. Constructed explicitly
/// and passed by handle to the coordinator; there is no process-wide
/// singleton.
#[derive(Clone)]
pub struct ResultStore {
    backend: Arc<dyn KvStore>,
}

impl ResultStore {
    pub fn new(backend: Arc<dyn KvStore>) -> Self {
        Self { backend }
    }

    /// Convenience constructor over an in-process [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Look up the cached outcome for a segment.
    ///
    /// Returns `None` when no entry exists, the entry expired, the backend is
    /// unreachable, or the stored record is malformed. Never mutates TTLs and
    /// never triggers backend writes.
    pub async fn get(&self, identity: &SegmentIdentity) -> Option<MatchRecord> {
        let key = identity.cache_key();

        let raw_count = match self.backend.get(&format!("{key}{SUB_COUNT}")).await {
            Ok(Some(v)) => v,
            Ok(None) => return None,
            Err(err) => {
                warn!(%key, error = %err, "cache read degraded to miss");
                return None;
            }
        };

        let count: u64 = match raw_count.parse() {
            Ok(c) => c,
            Err(_) => {
                let err = StoreError::MalformedEntry {
                    key: format!("{key}{SUB_COUNT}"),
                    reason: format!("not a decimal count: {raw_count:?}"),
                };
                warn!(error = %err, "treating malformed cache entry as absent");
                return None;
            }
        };

        if count == 0 {
            debug!(%key, "negative-result cache hit");
            return Some(MatchRecord::no_match());
        }

        let raw_tag = match self.backend.get(&format!("{key}{SUB_LIVE_TAGS}")).await {
            Ok(Some(v)) => v,
            Ok(None) => {
                // The tag sub-entry expired or was never written; without it
                // the record cannot be served.
                debug!(%key, "count present without live tag; treating as miss");
                return None;
            }
            Err(err) => {
                warn!(%key, error = %err, "cache read degraded to miss");
                return None;
            }
        };

        let mut tag: Tag = match serde_json::from_str(&raw_tag) {
            Ok(t) => t,
            Err(err) => {
                let err = StoreError::MalformedEntry {
                    key: format!("{key}{SUB_LIVE_TAGS}"),
                    reason: err.to_string(),
                };
                warn!(error = %err, "treating malformed cache entry as absent");
                return None;
            }
        };

        // The description lives under its own sub-key and expires separately;
        // a missing description does not invalidate the record.
        if let Ok(Some(description)) = self
            .backend
            .get(&format!("{key}{SUB_LIVE_TAGS_DESCRIPTION}"))
            .await
        {
            tag.description = Some(description);
        }

        debug!(%key, count, "cache hit");
        Some(MatchRecord {
            match_count: count,
            tags: vec![tag],
        })
    }

    /// Write the outcome for a segment with the given TTL.
    ///
    /// Overwrites any prior entry for the same identity. A zero-match record
    /// is written identically to a positive one. Backend failures make this a
    /// no-op: the cache never gates evaluation.
    pub async fn put(&self, identity: &SegmentIdentity, record: &MatchRecord, ttl: Duration) {
        let key = identity.cache_key();

        if let Some(tag) = record.tags.first() {
            let mut body = tag.clone();
            let description = body.description.take();

            let serialized = match serde_json::to_string(&body) {
                Ok(s) => s,
                Err(err) => {
                    warn!(%key, error = %err, "skipping cache write for unserializable tag");
                    return;
                }
            };

            if let Err(err) = self
                .backend
                .put(&format!("{key}{SUB_LIVE_TAGS}"), serialized, ttl)
                .await
            {
                warn!(%key, error = %err, "cache write dropped");
                return;
            }

            if let Some(description) = description {
                if let Err(err) = self
                    .backend
                    .put(&format!("{key}{SUB_LIVE_TAGS_DESCRIPTION}"), description, ttl)
                    .await
                {
                    warn!(%key, error = %err, "cache write dropped");
                    return;
                }
            }
        }

        if let Err(err) = self
            .backend
            .put(&format!("{key}{SUB_COUNT}"), record.match_count.to_string(), ttl)
            .await
        {
            warn!(%key, error = %err, "cache write dropped");
        }
    }
}
