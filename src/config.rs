//! Configuration for relay-chain
//!
//! CLI arguments and environment variable handling using clap.
//!
//! The crypto settings (IV, splice index, genesis seed) decide how every
//! digest key and ciphertext is computed. All instances that validate the
//! same chain must agree on them, and changing them orphans every relay
//! ciphertext already handed out.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::relay::Relay;
use crate::secrecy::SecrecyCodec;
use crate::types::Result;

/// Relay Chain - an append-only public chain written by passcode relay
#[derive(Parser, Debug, Clone)]
#[command(name = "relay-chain")]
#[command(about = "Append-only public chain where the right to write is relayed by one-time passcodes")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// SQLite database file
    #[arg(long, env = "DB_FILEPATH", default_value = "./data/chain.db")]
    pub db_path: PathBuf,

    /// Keep the chain in memory only (lost on exit)
    #[arg(long, env = "IN_MEMORY", default_value = "false")]
    pub in_memory: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Allow cross-origin requests from any origin (`--cors-allow-any false` to disable)
    #[arg(long, env = "CORS_ALLOW_ANY", default_value = "true", action = clap::ArgAction::Set)]
    pub cors_allow_any: bool,

    /// Relay crypto settings
    #[command(flatten)]
    pub crypto: CryptoArgs,
}

/// Relay crypto settings
#[derive(clap::Args, Debug, Clone)]
pub struct CryptoArgs {
    /// Fixed CBC initialization vector, exactly 16 bytes
    #[arg(long, env = "AES_IV", default_value = "snooping6is9bad0")]
    pub aes_iv: String,

    /// Offset of the 32-character key window inside a digest (0-32)
    #[arg(long, env = "AES_SPLICE_INDEX", default_value = "28")]
    pub aes_splice_index: usize,

    /// Seed whose digest keys the genesis relay ciphertext
    #[arg(long, env = "GENESIS_SEED", default_value = "gen6si9")]
    pub genesis_seed: String,
}

impl Default for CryptoArgs {
    fn default() -> Self {
        Self {
            aes_iv: "snooping6is9bad0".to_string(),
            aes_splice_index: 28,
            genesis_seed: "gen6si9".to_string(),
        }
    }
}

impl CryptoArgs {
    /// Build the relay, failing on settings that could not key the cipher.
    pub fn build_relay(&self) -> Result<Relay> {
        let codec = SecrecyCodec::new(&self.aes_iv, self.aes_splice_index)?;
        Ok(Relay::new(codec, &self.genesis_seed))
    }
}

impl Args {
    /// Validate configuration at startup.
    pub fn validate(&self) -> Result<()> {
        self.crypto.build_relay().map(|_| ())
    }
}
