//! Shared domain types
//!
//! Digests are the only persisted form of a passcode. Because a digest is
//! what a writer submits, it is treated as a credential: it is never
//! serialized back out and only a short prefix ever reaches the logs.

pub mod error;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::{Rejection, RelayError, Result};

/// Width of a hex-encoded SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Number of slots in a candidate set (four newest plus genesis)
pub const CANDIDATE_COUNT: usize = 5;

/// Hex-encoded SHA-256 digest of a passcode.
///
/// Submitted values are wrapped as-is, so a `Digest` may be malformed;
/// [`Digest::is_full`] tells whether it has the width of a real one.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this value is at least as long as a real digest.
    pub fn is_full(&self) -> bool {
        self.0.len() >= DIGEST_HEX_LEN
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}..)", self.short())
    }
}

/// Hex-encoded relay ciphertext handed to a successful writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ciphertext(String);

impl Ciphertext {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index of a digest within the candidate set.
///
/// 0 is the newest digest, 3 the fourth newest, 4 always the genesis digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position(usize);

impl Position {
    pub const LATEST: Position = Position(0);
    pub const GENESIS: Position = Position(CANDIDATE_COUNT - 1);

    /// All positions, newest first.
    pub const ALL: [Position; CANDIDATE_COUNT] =
        [Position(0), Position(1), Position(2), Position(3), Position(4)];

    pub fn new(index: usize) -> Option<Self> {
        (index < CANDIDATE_COUNT).then_some(Self(index))
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trust weight carried by a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gravitas(u8);

impl Gravitas {
    /// Genesis digest holders
    pub const GENESIS: Gravitas = Gravitas(1);
    /// Anonymous or unrecognized reactors
    pub const ANONYMOUS: Gravitas = Gravitas(2);
    /// Recent, but not latest, digest holders
    pub const TRUSTED: Gravitas = Gravitas(6);

    pub fn value(self) -> u8 {
        self.0
    }
}

/// Post body submitted by a writer.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub contents: String,
    #[serde(default)]
    pub tag: u8,
    /// Digest of the passcode the writer holds
    #[serde(default)]
    pub hash: Digest,
}

/// Post ready to be persisted alongside the next digest.
#[derive(Debug, Clone)]
pub struct PostRecord {
    pub title: String,
    pub author: String,
    pub contents: String,
    pub tag: u8,
    pub descriptors: Vec<String>,
    /// Digest that authorized the write; `None` for genesis
    pub hash: Option<Digest>,
    pub created_at: DateTime<Utc>,
}

/// A stored post.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub contents: String,
    pub tag: u8,
    pub descriptors: Vec<String>,
    pub time: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub hash: Option<Digest>,
}

impl Post {
    pub fn is_genesis(&self) -> bool {
        self.tag == 0
    }
}

/// Reaction body submitted by a reader.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReaction {
    #[serde(alias = "postId")]
    pub post_id: i64,
    pub descriptor: String,
    #[serde(default, alias = "gravitasHash")]
    pub gravitas_hash: Digest,
}

/// Reaction ready to be persisted.
#[derive(Debug, Clone)]
pub struct ReactionRecord {
    pub post_id: i64,
    pub descriptor: String,
    pub gravitas: Gravitas,
    /// Authorizing digest, kept so it can never be claimed twice on this post
    pub gravitas_hash: Option<Digest>,
}

/// Summed gravitas for one descriptor on one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionTotal {
    pub descriptor: String,
    pub gravitas: u32,
}
