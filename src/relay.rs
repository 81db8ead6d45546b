//! Relay minting - hand the next passcode to the writer who just proved theirs.
//!
//! A new passcode is minted, only its digest is kept, and the passcode itself
//! leaves encrypted under the digest the writer submitted. Nobody else holds
//! that digest's key window, so only the writer can open it and become the
//! newest holder.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::chain::{BoardStore, ChainStore};
use crate::secrecy::SecrecyCodec;
use crate::types::{Ciphertext, Digest, Post, PostRecord, Result};

/// Digest of the next passcode and the ciphertext carrying it.
#[derive(Debug, Clone)]
pub struct MintedRelay {
    pub digest: Digest,
    pub ciphertext: Ciphertext,
}

/// Mints successor passcodes.
#[derive(Debug, Clone)]
pub struct Relay {
    codec: SecrecyCodec,
    genesis_key: Digest,
}

impl Relay {
    /// `genesis_seed` stands in for the missing prior passcode of the first write.
    pub fn new(codec: SecrecyCodec, genesis_seed: &str) -> Self {
        Self {
            codec,
            genesis_key: SecrecyCodec::digest_str(genesis_seed),
        }
    }

    pub fn codec(&self) -> &SecrecyCodec {
        &self.codec
    }

    /// Well-known key material for the genesis write.
    pub fn genesis_key(&self) -> &Digest {
        &self.genesis_key
    }

    /// Key material the relay ciphertext is encrypted under.
    pub fn key_material<'a>(&'a self, is_genesis: bool, prior: &'a Digest) -> &'a Digest {
        if is_genesis {
            &self.genesis_key
        } else {
            prior
        }
    }

    /// Mint the next passcode without touching the chain.
    ///
    /// The plaintext is dropped (and wiped) before this returns.
    pub fn mint(&self, is_genesis: bool, prior: &Digest) -> Result<MintedRelay> {
        let secret = SecrecyCodec::mint();
        let ciphertext = self
            .codec
            .encrypt(&secret, self.key_material(is_genesis, prior))?;
        let digest = SecrecyCodec::digest(&secret);
        Ok(MintedRelay { digest, ciphertext })
    }

    /// Mint the next passcode, append its digest at `now`, return the ciphertext.
    ///
    /// Encryption happens before the append, so a failure leaves the chain untouched.
    pub async fn complete_write<S>(
        &self,
        store: &S,
        is_genesis: bool,
        prior: &Digest,
        now: DateTime<Utc>,
    ) -> Result<Ciphertext>
    where
        S: ChainStore + ?Sized,
    {
        let minted = self.mint(is_genesis, prior)?;
        store.append_digest(&minted.digest, now).await?;
        debug!(digest = minted.digest.short(), is_genesis, "Relay minted");
        Ok(minted.ciphertext)
    }

    /// [`complete_write`](Self::complete_write) for a post: the post and the
    /// next digest are stored together, stamped with the post's time.
    pub async fn complete_post<S>(
        &self,
        store: &S,
        post: &PostRecord,
        is_genesis: bool,
        prior: &Digest,
    ) -> Result<(Post, Ciphertext)>
    where
        S: BoardStore + ?Sized,
    {
        let minted = self.mint(is_genesis, prior)?;
        let stored = store.record_write(post, &minted.digest).await?;
        debug!(post_id = stored.id, digest = minted.digest.short(), is_genesis, "Relay minted");
        Ok((stored, minted.ciphertext))
    }
}
