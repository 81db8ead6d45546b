//! Hash ledger and board storage contracts
//!
//! The protocol only ever reads and appends digests through [`ChainStore`].
//! Posts and reactions live behind [`BoardStore`], which the request layer
//! uses. Implementations:
//! - [`MemoryChain`]: in-process, for tests and throwaway runs
//! - [`SqliteChain`]: rusqlite-backed, for real deployments

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{
    Digest, Position, Post, PostRecord, ReactionRecord, ReactionTotal, Result, CANDIDATE_COUNT,
};

pub use memory::MemoryChain;
pub use sqlite::SqliteChain;

/// Conflict message for a duplicate post title
pub const TITLE_TAKEN: &str = "a post with this title already exists";

/// Number of recent digests in a candidate set (genesis fills the last slot)
pub const RECENT_COUNT: usize = CANDIDATE_COUNT - 1;

/// The five digests that can authorize a write or reaction right now.
///
/// Slots 0-3 are the newest digests, newest first; slot 4 is always the
/// genesis digest. On a chain shorter than five digests some slots are
/// empty and others repeat (genesis is also slot 0 while only one digest
/// exists). Lookups skip empty slots and the first matching slot wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    slots: [Option<Digest>; CANDIDATE_COUNT],
}

impl CandidateSet {
    /// Build from up to four recent digests (newest first) and the genesis digest.
    pub fn new(recent: impl IntoIterator<Item = Digest>, genesis: Option<Digest>) -> Self {
        let mut slots: [Option<Digest>; CANDIDATE_COUNT] = Default::default();
        for (slot, digest) in slots.iter_mut().zip(recent.into_iter().take(RECENT_COUNT)) {
            *slot = Some(digest);
        }
        slots[Position::GENESIS.index()] = genesis;
        Self { slots }
    }

    /// Build from the sentinel form, where an empty string marks an unfilled slot.
    pub fn from_sentinels(slots: [&str; CANDIDATE_COUNT]) -> Self {
        Self {
            slots: slots.map(|s| (!s.is_empty()).then(|| Digest::new(s))),
        }
    }

    /// Position of `digest`, first match wins. Empty digests never match.
    pub fn position_of(&self, digest: &Digest) -> Option<Position> {
        if digest.is_empty() {
            return None;
        }
        self.slots
            .iter()
            .position(|slot| slot.as_ref() == Some(digest))
            .and_then(Position::new)
    }

    pub fn get(&self, position: Position) -> Option<&Digest> {
        self.slots[position.index()].as_ref()
    }

    pub fn latest(&self) -> Option<&Digest> {
        self.get(Position::LATEST)
    }

    pub fn genesis(&self) -> Option<&Digest> {
        self.get(Position::GENESIS)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

/// Digest ledger operations the authorization protocol depends on.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Timestamp of the most recently appended digest, `None` on an empty chain.
    async fn latest_write_timestamp(&self) -> Result<Option<DateTime<Utc>>>;

    /// Current candidate set.
    async fn candidate_digests(&self) -> Result<CandidateSet>;

    /// Digests already spent on reactions to `post_id`.
    async fn reaction_digests_for(&self, post_id: i64) -> Result<Vec<Digest>>;

    /// Append a freshly minted digest, written at `at`.
    ///
    /// The append is what moves the chain past genesis: afterwards
    /// [`latest_write_timestamp`](Self::latest_write_timestamp) reports `at`.
    async fn append_digest(&self, digest: &Digest, at: DateTime<Utc>) -> Result<()>;

    /// Number of anonymous reactions on `post_id`.
    async fn anonymous_reaction_count(&self, post_id: i64) -> Result<u32>;
}

/// Post and reaction storage used by the request layer.
#[async_trait]
pub trait BoardStore: ChainStore {
    /// Insert a post and append the next digest as one atomic step.
    async fn record_write(&self, post: &PostRecord, next_digest: &Digest) -> Result<Post>;

    async fn insert_reaction(&self, reaction: &ReactionRecord) -> Result<()>;

    /// All posts, newest first.
    async fn posts(&self) -> Result<Vec<Post>>;

    /// Descriptor set of a post, `None` if the post does not exist.
    async fn post_descriptors(&self, post_id: i64) -> Result<Option<Vec<String>>>;

    /// Reaction gravitas summed per descriptor, highest first.
    async fn reaction_totals(&self, post_id: i64) -> Result<Vec<ReactionTotal>>;

    /// Remove everything. Test teardown only.
    async fn clear(&self) -> Result<()>;
}
