//! Chain service - request-level orchestration.
//!
//! Ties the authorizer, relay minting and storage together for the three
//! things a client can do: write a post, react to one, read the chain.
//! Mutating requests hold one async lock across read-validate-mutate so two
//! writers can never both pass against the same candidate set.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::authorizer::{authorize_reaction, authorize_write, ReactionVerdict, WriteVerdict};
use crate::chain::BoardStore;
use crate::descriptors::{check_descriptor, DescriptorPool, DESCRIPTORS_PER_POST};
use crate::relay::Relay;
use crate::types::{
    Ciphertext, Gravitas, NewPost, NewReaction, Post, PostRecord, ReactionRecord, ReactionTotal,
    Rejection, RelayError, Result,
};
use crate::window;

/// Maximum anonymous (and unrecognized) reactions per post
pub const MAX_ANON_REACTIONS: u32 = 6;

pub const MAX_TITLE_LEN: usize = 40;
pub const MAX_AUTHOR_LEN: usize = 10;
pub const MAX_CONTENTS_LEN: usize = 1500;
/// Tags run 0..8; 0 marks genesis
pub const TAG_LIMIT: u8 = 8;

/// Result of an accepted post.
#[derive(Debug, Clone)]
pub struct PostReceipt {
    pub post: Post,
    pub ciphertext: Ciphertext,
    pub genesis: bool,
}

/// Result of an accepted reaction.
#[derive(Debug, Clone)]
pub struct ReactionReceipt {
    pub gravitas: Gravitas,
    /// A freshly drawn descriptor, returned as a small gift
    pub flourish: String,
}

/// A post with its reaction totals.
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub reactions: Vec<ReactionTotal>,
}

/// The whole chain, newest post first.
#[derive(Debug, Clone, Serialize)]
pub struct ChainView {
    pub days_since: i64,
    pub chain: Vec<PostView>,
}

/// Chain service shared across request handlers
pub struct ChainService {
    store: Arc<dyn BoardStore>,
    relay: Relay,
    descriptors: DescriptorPool,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for ChainService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainService")
            .field("relay", &self.relay)
            .field("descriptors", &self.descriptors.len())
            .finish_non_exhaustive()
    }
}

impl ChainService {
    pub fn new(store: Arc<dyn BoardStore>, relay: Relay) -> Self {
        Self::with_descriptors(store, relay, DescriptorPool::embedded())
    }

    pub fn with_descriptors(
        store: Arc<dyn BoardStore>,
        relay: Relay,
        descriptors: DescriptorPool,
    ) -> Self {
        Self {
            store,
            relay,
            descriptors,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn BoardStore> {
        &self.store
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Write a post, authorized by the digest it carries.
    pub async fn add_post(&self, post: NewPost) -> Result<PostReceipt> {
        self.add_post_at(post, Utc::now()).await
    }

    /// [`add_post`](Self::add_post) with an explicit clock.
    pub async fn add_post_at(&self, post: NewPost, now: DateTime<Utc>) -> Result<PostReceipt> {
        validate_post(&post)?;

        let _guard = self.write_lock.lock().await;

        let verdict = authorize_write(self.store.as_ref(), &post.hash, now).await?;
        let (genesis, tag, hash) = match verdict {
            WriteVerdict::Genesis => (true, 0, None),
            WriteVerdict::Accepted { position } => {
                if post.tag == 0 {
                    return Err(Rejection::ReservedTag.into());
                }
                debug!(%position, "Write authorized");
                (false, post.tag, Some(post.hash.clone()))
            }
            WriteVerdict::Rejected(rejection) => return Err(rejection.into()),
        };

        let record = PostRecord {
            title: post.title,
            author: post.author,
            contents: post.contents,
            tag,
            descriptors: self.descriptors.draw(DESCRIPTORS_PER_POST),
            hash,
            created_at: now,
        };
        let (stored, ciphertext) = self
            .relay
            .complete_post(self.store.as_ref(), &record, genesis, &post.hash)
            .await?;

        info!(post_id = stored.id, genesis, "Post added to chain");

        Ok(PostReceipt {
            post: stored,
            ciphertext,
            genesis,
        })
    }

    /// React to a post, weighted by the digest supplied (if any).
    pub async fn add_reaction(&self, reaction: NewReaction) -> Result<ReactionReceipt> {
        let _guard = self.write_lock.lock().await;

        let descriptors = self
            .store
            .post_descriptors(reaction.post_id)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("post {}", reaction.post_id)))?;
        if !check_descriptor(&reaction.descriptor, &descriptors) {
            return Err(Rejection::InvalidDescriptor.into());
        }

        let verdict =
            authorize_reaction(self.store.as_ref(), &reaction.gravitas_hash, reaction.post_id)
                .await?;
        let gravitas = match (&verdict, verdict.gravitas()) {
            (ReactionVerdict::Rejected(rejection), _) => return Err(rejection.clone().into()),
            (_, Some(gravitas)) => gravitas,
            (_, None) => return Err(RelayError::Internal("verdict without gravitas".into())),
        };

        if verdict.uses_anonymous_slot() {
            let count = self.store.anonymous_reaction_count(reaction.post_id).await?;
            if count >= MAX_ANON_REACTIONS {
                return Err(Rejection::AnonymousCapReached.into());
            }
        }

        self.store
            .insert_reaction(&ReactionRecord {
                post_id: reaction.post_id,
                descriptor: reaction.descriptor,
                gravitas,
                gravitas_hash: verdict.claimed_digest().cloned(),
            })
            .await?;

        info!(post_id = reaction.post_id, gravitas = gravitas.value(), "Reaction added");

        Ok(ReactionReceipt {
            gravitas,
            flourish: self.descriptors.draw_one().unwrap_or_default(),
        })
    }

    /// Read the chain with reaction totals.
    pub async fn chain(&self) -> Result<ChainView> {
        self.chain_at(Utc::now()).await
    }

    /// [`chain`](Self::chain) with an explicit clock.
    pub async fn chain_at(&self, now: DateTime<Utc>) -> Result<ChainView> {
        let posts = self.store.posts().await?;

        let days_since = posts
            .first()
            .map(|latest| window::days_between(latest.time, now))
            .unwrap_or(0);

        let mut chain = Vec::with_capacity(posts.len());
        for post in posts {
            let reactions = self.store.reaction_totals(post.id).await?;
            chain.push(PostView { post, reactions });
        }

        Ok(ChainView { days_since, chain })
    }
}

/// Shape checks on a submitted post, before any chain lookup.
fn validate_post(post: &NewPost) -> Result<()> {
    let invalid = |msg: String| -> Result<()> { Err(Rejection::InvalidPost(msg).into()) };

    let title_len = post.title.chars().count();
    if title_len == 0 || title_len > MAX_TITLE_LEN {
        return invalid(format!("title must be 1 to {MAX_TITLE_LEN} characters"));
    }
    if post.author.chars().count() > MAX_AUTHOR_LEN {
        return invalid(format!("author must be at most {MAX_AUTHOR_LEN} characters"));
    }
    let contents_len = post.contents.chars().count();
    if contents_len == 0 || contents_len > MAX_CONTENTS_LEN {
        return invalid(format!("contents must be 1 to {MAX_CONTENTS_LEN} characters"));
    }
    if post.tag >= TAG_LIMIT {
        return invalid(format!("tag must be below {TAG_LIMIT}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::{ReactionRejection, WriteRejection};
    use crate::chain::MemoryChain;
    use crate::config::CryptoArgs;
    use crate::secrecy::SecrecyCodec;
    use crate::types::Digest;
    use chrono::Duration;

    fn service() -> ChainService {
        let relay = CryptoArgs::default().build_relay().unwrap();
        ChainService::new(Arc::new(MemoryChain::new()), relay)
    }

    fn new_post(title: &str, tag: u8, hash: &Digest) -> NewPost {
        NewPost {
            title: title.to_string(),
            author: "tester".to_string(),
            contents: "testing is so cool".to_string(),
            tag,
            hash: hash.clone(),
        }
    }

    /// Decrypt a receipt's ciphertext with the key the writer holds.
    fn next_digest(svc: &ChainService, receipt: &PostReceipt, key: &Digest) -> Digest {
        let secret = svc.relay().codec().decrypt(&receipt.ciphertext, key).unwrap();
        SecrecyCodec::digest(&secret)
    }

    #[tokio::test]
    async fn test_genesis_post_forces_tag_zero() {
        let svc = service();
        let receipt = svc
            .add_post(new_post("genesis", 5, &Digest::default()))
            .await
            .unwrap();
        assert!(receipt.genesis);
        assert_eq!(receipt.post.tag, 0);
        assert_eq!(receipt.post.hash, None);
        assert_eq!(receipt.post.descriptors.len(), DESCRIPTORS_PER_POST);
    }

    #[tokio::test]
    async fn test_relay_hands_off() {
        let svc = service();
        let genesis = svc
            .add_post(new_post("genesis", 0, &Digest::default()))
            .await
            .unwrap();
        let mut held = next_digest(&svc, &genesis, svc.relay().genesis_key());

        for n in 1..=3 {
            let receipt = svc
                .add_post(new_post(&format!("post {n}"), 3, &held))
                .await
                .unwrap();
            assert!(!receipt.genesis);
            held = next_digest(&svc, &receipt, &held);
        }

        let view = svc.chain().await.unwrap();
        assert_eq!(view.chain.len(), 4);
        assert_eq!(view.chain[0].post.title, "post 3");
        assert_eq!(view.days_since, 0);
    }

    #[tokio::test]
    async fn test_reserved_tag_rejected_after_genesis() {
        let svc = service();
        let genesis = svc
            .add_post(new_post("genesis", 0, &Digest::default()))
            .await
            .unwrap();
        let held = next_digest(&svc, &genesis, svc.relay().genesis_key());

        let err = svc.add_post(new_post("sneaky", 0, &held)).await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::ReservedTag));

        // Nothing was written, so the same digest still works
        assert!(svc.add_post(new_post("honest", 1, &held)).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_and_stale_writes() {
        let svc = service();
        let genesis = svc
            .add_post(new_post("genesis", 0, &Digest::default()))
            .await
            .unwrap();
        let first = next_digest(&svc, &genesis, svc.relay().genesis_key());
        let second_receipt = svc.add_post(new_post("one", 1, &first)).await.unwrap();
        let _second = next_digest(&svc, &second_receipt, &first);

        let err = svc
            .add_post(new_post("nope", 1, &Digest::new("INVALID")))
            .await
            .unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::Write(WriteRejection::Unknown)));

        // `first` is now position 1: stale until day 5
        let err = svc.add_post(new_post("early", 1, &first)).await.unwrap_err();
        assert!(matches!(
            err.rejection(),
            Some(Rejection::Write(WriteRejection::Stale { .. }))
        ));

        let later = Utc::now() + Duration::days(5) + Duration::minutes(1);
        assert!(svc.add_post_at(new_post("late", 1, &first), later).await.is_ok());
    }

    #[tokio::test]
    async fn test_post_validation() {
        let svc = service();
        let long_author = NewPost {
            author: "a very long author".into(),
            ..new_post("t", 1, &Digest::default())
        };
        let empty_title = new_post("", 1, &Digest::default());
        let bad_tag = new_post("t", 8, &Digest::default());

        for post in [long_author, empty_title, bad_tag] {
            let err = svc.add_post(post).await.unwrap_err();
            assert!(matches!(err.rejection(), Some(Rejection::InvalidPost(_))));
        }
        assert!(svc.chain().await.unwrap().chain.is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_cap() {
        let svc = service();
        let genesis = svc
            .add_post(new_post("genesis", 0, &Digest::default()))
            .await
            .unwrap();
        let descriptor = genesis.post.descriptors[0].clone();
        let react = || NewReaction {
            post_id: genesis.post.id,
            descriptor: descriptor.clone(),
            gravitas_hash: Digest::default(),
        };

        for _ in 0..MAX_ANON_REACTIONS {
            let receipt = svc.add_reaction(react()).await.unwrap();
            assert_eq!(receipt.gravitas, Gravitas::ANONYMOUS);
            assert!(!receipt.flourish.is_empty());
        }
        let err = svc.add_reaction(react()).await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::AnonymousCapReached));

        let view = svc.chain().await.unwrap();
        assert_eq!(view.chain[0].reactions[0].gravitas, 12);
    }

    #[tokio::test]
    async fn test_reaction_checks() {
        let svc = service();
        let genesis = svc
            .add_post(new_post("genesis", 0, &Digest::default()))
            .await
            .unwrap();
        let held = next_digest(&svc, &genesis, svc.relay().genesis_key());
        let post = svc.add_post(new_post("target", 2, &held)).await.unwrap();
        let newest = next_digest(&svc, &post, &held);
        let descriptor = post.post.descriptors[0].clone();

        let err = svc
            .add_reaction(NewReaction {
                post_id: 999,
                descriptor: descriptor.clone(),
                gravitas_hash: Digest::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));

        let err = svc
            .add_reaction(NewReaction {
                post_id: post.post.id,
                descriptor: "not-a-descriptor".into(),
                gravitas_hash: Digest::default(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::InvalidDescriptor));

        // The writer's own newest digest cannot react
        let err = svc
            .add_reaction(NewReaction {
                post_id: post.post.id,
                descriptor: descriptor.clone(),
                gravitas_hash: newest,
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.rejection(),
            Some(&Rejection::Reaction(ReactionRejection::SelfReaction))
        );

        // The previous digest reacts once with full weight
        let endorsed = NewReaction {
            post_id: post.post.id,
            descriptor,
            gravitas_hash: held,
        };
        let receipt = svc.add_reaction(endorsed.clone()).await.unwrap();
        assert_eq!(receipt.gravitas, Gravitas::TRUSTED);
        let err = svc.add_reaction(endorsed).await.unwrap_err();
        assert_eq!(
            err.rejection(),
            Some(&Rejection::Reaction(ReactionRejection::AlreadyUsed))
        );
    }
}
