//! Chain authorization - who may write next, and how much a reaction weighs.
//!
//! Both checks read the current [`CandidateSet`](crate::chain::CandidateSet)
//! and never mutate the chain. Business refusals come back as verdicts inside
//! `Ok`; only store failures are errors.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::chain::ChainStore;
use crate::types::{Digest, Gravitas, Position, Result, CANDIDATE_COUNT};
use crate::window;

/// Gravitas granted by each candidate position. `None` marks the writer's
/// own newest digest, which may not react.
const POSITION_GRAVITAS: [Option<Gravitas>; CANDIDATE_COUNT] = [
    None,
    Some(Gravitas::TRUSTED),
    Some(Gravitas::TRUSTED),
    Some(Gravitas::TRUSTED),
    Some(Gravitas::GENESIS),
];

// =============================================================================
// Writes
// =============================================================================

/// Why a write was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum WriteRejection {
    /// The digest is not a candidate and can never be used to write.
    #[error("passcode will never have ability to make post")]
    Unknown,

    /// The digest is a candidate whose window has not opened yet.
    #[error("passcode not yet eligible: position {position} opens in {opens_in_days} day(s)")]
    Stale {
        position: Position,
        days_since: i64,
        opens_in_days: i64,
    },
}

/// Outcome of a write authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteVerdict {
    /// Empty chain: the first write is always allowed.
    Genesis,
    /// Digest found at `position` and its window is open.
    Accepted { position: Position },
    Rejected(WriteRejection),
}

impl WriteVerdict {
    pub fn is_authorized(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    pub fn is_genesis(&self) -> bool {
        matches!(self, Self::Genesis)
    }
}

/// Decide whether `submitted` may write at `now`.
pub async fn authorize_write<S>(store: &S, submitted: &Digest, now: DateTime<Utc>) -> Result<WriteVerdict>
where
    S: ChainStore + ?Sized,
{
    let Some(last_write) = store.latest_write_timestamp().await? else {
        return Ok(WriteVerdict::Genesis);
    };
    let candidates = store.candidate_digests().await?;

    let Some(position) = candidates.position_of(submitted) else {
        debug!(digest = submitted.short(), "Write digest is not a candidate");
        return Ok(WriteVerdict::Rejected(WriteRejection::Unknown));
    };

    let days_since = window::days_between(last_write, now);
    if !window::is_eligible(days_since, position) {
        debug!(%position, days_since, "Write digest not yet eligible");
        return Ok(WriteVerdict::Rejected(WriteRejection::Stale {
            position,
            days_since,
            opens_in_days: window::days_until_open(days_since, position),
        }));
    }

    Ok(WriteVerdict::Accepted { position })
}

// =============================================================================
// Reactions
// =============================================================================

/// Why a reaction was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ReactionRejection {
    /// This digest has already reacted to this post.
    #[error("passcode has already reacted to this post")]
    AlreadyUsed,

    /// The newest digest belongs to whoever just wrote.
    #[error("you do not have gravitas to react on your own post")]
    SelfReaction,
}

/// Outcome of a reaction authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionVerdict {
    /// No digest (or a truncated one) was supplied.
    Anonymous,
    /// A full-width digest that is not a candidate.
    Unrecognized,
    /// A candidate digest, weighted by its position.
    Endorsed {
        position: Position,
        gravitas: Gravitas,
        digest: Digest,
    },
    Rejected(ReactionRejection),
}

impl ReactionVerdict {
    /// Whether the supplied credential was accepted.
    ///
    /// Anonymous reactions are accepted without a credential; unrecognized
    /// digests are not, though both may still react at the lowest tier.
    pub fn accepted(&self) -> bool {
        matches!(self, Self::Anonymous | Self::Endorsed { .. })
    }

    /// Weight the reaction carries, if it may be recorded at all.
    pub fn gravitas(&self) -> Option<Gravitas> {
        match self {
            Self::Anonymous | Self::Unrecognized => Some(Gravitas::ANONYMOUS),
            Self::Endorsed { gravitas, .. } => Some(*gravitas),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&ReactionRejection> {
        match self {
            Self::Rejected(r) => Some(r),
            _ => None,
        }
    }

    /// Reactions without a recognized credential count against the per-post cap.
    pub fn uses_anonymous_slot(&self) -> bool {
        matches!(self, Self::Anonymous | Self::Unrecognized)
    }

    /// Digest to record so it cannot be claimed again on the same post.
    pub fn claimed_digest(&self) -> Option<&Digest> {
        match self {
            Self::Endorsed { digest, .. } => Some(digest),
            _ => None,
        }
    }
}

/// Decide how much weight a reaction on `post_id` backed by `submitted` carries.
pub async fn authorize_reaction<S>(store: &S, submitted: &Digest, post_id: i64) -> Result<ReactionVerdict>
where
    S: ChainStore + ?Sized,
{
    if !submitted.is_full() {
        return Ok(ReactionVerdict::Anonymous);
    }

    let candidates = store.candidate_digests().await?;
    let used = store.reaction_digests_for(post_id).await?;

    if used.contains(submitted) {
        debug!(post_id, digest = submitted.short(), "Reaction digest already used");
        return Ok(ReactionVerdict::Rejected(ReactionRejection::AlreadyUsed));
    }

    let Some(position) = candidates.position_of(submitted) else {
        return Ok(ReactionVerdict::Unrecognized);
    };

    Ok(match POSITION_GRAVITAS[position.index()] {
        None => ReactionVerdict::Rejected(ReactionRejection::SelfReaction),
        Some(gravitas) => ReactionVerdict::Endorsed {
            position,
            gravitas,
            digest: submitted.clone(),
        },
    })
}
