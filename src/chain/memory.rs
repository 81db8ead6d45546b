//! In-memory chain store.
//!
//! Same semantics as the SQLite store, held behind one async mutex so each
//! call sees a consistent snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{BoardStore, CandidateSet, ChainStore, RECENT_COUNT, TITLE_TAKEN};
use crate::types::{
    Digest, Gravitas, Post, PostRecord, ReactionRecord, ReactionTotal, RelayError, Result,
};

#[derive(Debug, Default)]
struct MemoryState {
    digests: Vec<Digest>,
    posts: Vec<Post>,
    reactions: Vec<ReactionRecord>,
    last_write: Option<DateTime<Utc>>,
}

/// Chain and board held in process memory.
#[derive(Debug, Default)]
pub struct MemoryChain {
    state: Mutex<MemoryState>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain that already holds `digests` (oldest first), last written at `last_write`.
    pub fn with_history(digests: Vec<Digest>, last_write: Option<DateTime<Utc>>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                digests,
                last_write,
                ..MemoryState::default()
            }),
        }
    }

    /// Move the last-write timestamp, e.g. to age the chain in tests.
    pub async fn set_last_write(&self, at: DateTime<Utc>) {
        self.state.lock().await.last_write = Some(at);
    }

    /// Number of digests on the chain.
    pub async fn len(&self) -> usize {
        self.state.lock().await.digests.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.digests.is_empty()
    }
}

#[async_trait]
impl ChainStore for MemoryChain {
    async fn latest_write_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.state.lock().await.last_write)
    }

    async fn candidate_digests(&self) -> Result<CandidateSet> {
        let state = self.state.lock().await;
        let recent = state.digests.iter().rev().take(RECENT_COUNT).cloned();
        Ok(CandidateSet::new(recent, state.digests.first().cloned()))
    }

    async fn reaction_digests_for(&self, post_id: i64) -> Result<Vec<Digest>> {
        let state = self.state.lock().await;
        Ok(state
            .reactions
            .iter()
            .filter(|r| r.post_id == post_id)
            .filter_map(|r| r.gravitas_hash.clone())
            .collect())
    }

    async fn append_digest(&self, digest: &Digest, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.digests.push(digest.clone());
        state.last_write = Some(at);
        Ok(())
    }

    async fn anonymous_reaction_count(&self, post_id: i64) -> Result<u32> {
        let state = self.state.lock().await;
        let count = state
            .reactions
            .iter()
            .filter(|r| r.post_id == post_id && r.gravitas == Gravitas::ANONYMOUS)
            .count();
        Ok(count as u32)
    }
}

#[async_trait]
impl BoardStore for MemoryChain {
    async fn record_write(&self, post: &PostRecord, next_digest: &Digest) -> Result<Post> {
        let mut state = self.state.lock().await;

        if state.posts.iter().any(|p| p.title == post.title) {
            return Err(RelayError::Conflict(TITLE_TAKEN.to_string()));
        }

        let stored = Post {
            id: state.posts.len() as i64 + 1,
            title: post.title.clone(),
            author: post.author.clone(),
            contents: post.contents.clone(),
            tag: post.tag,
            descriptors: post.descriptors.clone(),
            time: post.created_at,
            hash: post.hash.clone(),
        };
        state.posts.push(stored.clone());
        state.digests.push(next_digest.clone());
        state.last_write = Some(post.created_at);

        Ok(stored)
    }

    async fn insert_reaction(&self, reaction: &ReactionRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.posts.iter().any(|p| p.id == reaction.post_id) {
            return Err(RelayError::NotFound(format!("post {}", reaction.post_id)));
        }
        state.reactions.push(reaction.clone());
        Ok(())
    }

    async fn posts(&self) -> Result<Vec<Post>> {
        let state = self.state.lock().await;
        Ok(state.posts.iter().rev().cloned().collect())
    }

    async fn post_descriptors(&self, post_id: i64) -> Result<Option<Vec<String>>> {
        let state = self.state.lock().await;
        Ok(state
            .posts
            .iter()
            .find(|p| p.id == post_id)
            .map(|p| p.descriptors.clone()))
    }

    async fn reaction_totals(&self, post_id: i64) -> Result<Vec<ReactionTotal>> {
        let state = self.state.lock().await;
        let mut totals: Vec<ReactionTotal> = Vec::new();
        for reaction in state.reactions.iter().filter(|r| r.post_id == post_id) {
            let weight = u32::from(reaction.gravitas.value());
            match totals.iter_mut().find(|t| t.descriptor == reaction.descriptor) {
                Some(total) => total.gravitas += weight,
                None => totals.push(ReactionTotal {
                    descriptor: reaction.descriptor.clone(),
                    gravitas: weight,
                }),
            }
        }
        totals.sort_by(|a, b| {
            b.gravitas
                .cmp(&a.gravitas)
                .then_with(|| a.descriptor.cmp(&b.descriptor))
        });
        Ok(totals)
    }

    async fn clear(&self) -> Result<()> {
        *self.state.lock().await = MemoryState::default();
        Ok(())
    }
}
