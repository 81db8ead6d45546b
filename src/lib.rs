//! relay-chain: an append-only public chain where the right to write is
//! relayed from writer to writer by one-time passcodes.
//!
//! Every accepted write mints a fresh passcode, keeps only its SHA-256
//! digest, and returns the passcode encrypted under the digest the writer
//! submitted. Whoever decrypts it holds the newest passcode. Older holders
//! regain the right to write as days pass without a new post, so the chain
//! never stalls on one absent holder.
//!
//! ## Modules
//!
//! - [`secrecy`] - passcode minting, digests and the relay cipher
//! - [`window`] - eligibility by candidate position and idle days
//! - [`chain`] - digest ledger and board storage (memory and SQLite)
//! - [`authorizer`] - write and reaction verdicts
//! - [`relay`] - minting the successor passcode for a writer
//! - [`service`] / [`routes`] - request orchestration and HTTP surface

pub mod authorizer;
pub mod chain;
pub mod config;
pub mod descriptors;
pub mod relay;
pub mod routes;
pub mod secrecy;
pub mod service;
pub mod types;
pub mod window;

pub use authorizer::{ReactionVerdict, WriteVerdict};
pub use chain::{BoardStore, ChainStore, MemoryChain, SqliteChain};
pub use config::Args;
pub use relay::Relay;
pub use routes::create_router;
pub use secrecy::SecrecyCodec;
pub use service::ChainService;
pub use types::{RelayError, Result};
