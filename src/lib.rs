//! Result cache and admission control for audio tag matching.
//!
//! This crate sits in front of an external, expensive, rate-constrained
//! matching provider. It evaluates short windows ("segments") of an audio
//! stream for previously registered markers ("tags") and makes three
//! guarantees:
//!
//! - segments already evaluated — including confirmed zero-match outcomes —
//!   are answered from a TTL'd result cache without touching the provider;
//! - each caller is held to a daily call budget and a minimum spacing
//!   between calls;
//! - concurrent requests for the same not-yet-cached segment collapse into
//!   exactly one provider call, with every waiter receiving its outcome.
//!
//! Catalog CRUD, authentication, HTTP routing, and the matching algorithm
//! itself are external collaborators, reached only through the seams defined
//! here ([`TagMatcher`], [`KvStore`]).
//!
//! # Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use tagmatch::{
//!     EvaluatorConfig, MatchCandidate, MatchCoordinator, MatcherFault, ResultStore,
//!     SegmentDescriptor, TagMatcher,
//! };
//!
//! struct CorpusMatcher; // wraps the real provider client
//!
//! #[async_trait]
//! impl TagMatcher for CorpusMatcher {
//!     async fn match_segment(
//!         &self,
//!         _content: &[u8],
//!         _duration_seconds: f64,
//!     ) -> Result<Vec<MatchCandidate>, MatcherFault> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let coordinator = MatchCoordinator::new(
//!         ResultStore::in_memory(),
//!         Arc::new(CorpusMatcher),
//!         EvaluatorConfig::default(),
//!     );
//!
//!     let segment = SegmentDescriptor::new("clip.mp3", 1_048_576, "12", vec![0u8; 11_025]);
//!     match coordinator.evaluate(&segment, "caller-42").await {
//!         Ok(record) => println!("{} tag(s) matched", record.match_count),
//!         Err(err) => eprintln!("evaluation rejected: {err}"),
//!     }
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod matcher;
pub mod quota;
pub mod singleflight;
pub mod store;
pub mod types;

mod serde_secs;

pub use crate::config::EvaluatorConfig;
pub use crate::coordinator::MatchCoordinator;
pub use crate::error::{EvaluateError, StoreError};
pub use crate::identity::{derive_key, SegmentIdentity};
pub use crate::matcher::{MatcherFault, TagMatcher};
pub use crate::quota::{Admission, QuotaConfig, QuotaLimiter, QuotaUsage};
pub use crate::singleflight::{FlightOutcome, SingleFlight};
pub use crate::store::{KvStore, MemoryStore, ResultStore};
pub use crate::types::{
    MatchCandidate, MatchRecord, SegmentDescriptor, Tag, SCORE_MAX_THRESHOLD,
    SIMILARITY_MAX_THRESHOLD, SIMILARITY_MIN_THRESHOLD,
};
