//! SQLite-backed chain store.
//!
//! One connection behind an async mutex; multi-statement writes run inside
//! a transaction so a failure never leaves a post without its digest.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{BoardStore, CandidateSet, ChainStore, RECENT_COUNT, TITLE_TAKEN};
use crate::types::{
    Digest, Gravitas, Post, PostRecord, ReactionRecord, ReactionTotal, RelayError, Result,
};

/// Separator used to store a post's descriptors in one column
const DESCRIPTOR_SEPARATOR: &str = ";";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS post (
        id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
        title TEXT NOT NULL UNIQUE,
        author TEXT NOT NULL DEFAULT '',
        contents TEXT NOT NULL,
        tag INTEGER NOT NULL,
        descriptors TEXT NOT NULL,
        hash TEXT,
        created_at INTEGER NOT NULL,
        CHECK (tag >= 0 AND tag < 8)
    );
    CREATE TABLE IF NOT EXISTS passcode (
        id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
        hash TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS reaction (
        id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
        post_id INTEGER NOT NULL REFERENCES post(id),
        descriptor TEXT NOT NULL,
        gravitas INTEGER NOT NULL,
        gravitas_hash TEXT,
        CHECK (gravitas <= 6)
    );
    CREATE INDEX IF NOT EXISTS reaction_post ON reaction(post_id);
";

/// Chain and board persisted in SQLite.
pub struct SqliteChain {
    db: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteChain").finish_non_exhaustive()
    }
}

impl SqliteChain {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Connection::open(path)?;

        // WAL for concurrent readers
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::init(db)?;

        info!(path = %path.display(), "Chain database initialized");
        Ok(store)
    }

    /// Fresh in-memory SQLite database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self> {
        db.execute_batch("PRAGMA foreign_keys=ON;")?;
        db.execute_batch(SCHEMA)?;
        Ok(Self { db: Mutex::new(db) })
    }
}

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Post, i64)> {
    let descriptors: String = row.get(5)?;
    let hash: Option<String> = row.get(6)?;
    let created_at: i64 = row.get(7)?;
    Ok((
        Post {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            contents: row.get(3)?,
            tag: row.get(4)?,
            descriptors: split_descriptors(&descriptors),
            time: DateTime::<Utc>::UNIX_EPOCH,
            hash: hash.map(Digest::new),
        },
        created_at,
    ))
}

fn split_descriptors(joined: &str) -> Vec<String> {
    joined
        .split(DESCRIPTOR_SEPARATOR)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

/// Constraint violations become `mapped()`; anything else converts as usual.
fn constraint_or(err: rusqlite::Error, mapped: impl FnOnce() -> RelayError) -> RelayError {
    match err {
        rusqlite::Error::SqliteFailure(ref code, _)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            debug!(error = %err, "Constraint violation");
            mapped()
        }
        other => other.into(),
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| RelayError::Database(format!("invalid stored timestamp {secs}")))
}

#[async_trait]
impl ChainStore for SqliteChain {
    async fn latest_write_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let db = self.db.lock().await;
        let secs: Option<i64> = db
            .query_row(
                "SELECT created_at FROM passcode ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        secs.map(timestamp).transpose()
    }

    async fn candidate_digests(&self) -> Result<CandidateSet> {
        let db = self.db.lock().await;

        let mut stmt = db.prepare_cached("SELECT hash FROM passcode ORDER BY id DESC LIMIT ?1")?;
        let recent = stmt
            .query_map([RECENT_COUNT as i64], |row| row.get::<_, String>(0))?
            .map(|r| r.map(Digest::new))
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let genesis: Option<String> = db
            .query_row(
                "SELECT hash FROM passcode ORDER BY id ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(CandidateSet::new(recent, genesis.map(Digest::new)))
    }

    async fn reaction_digests_for(&self, post_id: i64) -> Result<Vec<Digest>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare_cached(
            "SELECT DISTINCT gravitas_hash FROM reaction
             WHERE post_id = ?1 AND gravitas_hash IS NOT NULL",
        )?;
        let digests = stmt
            .query_map([post_id], |row| row.get::<_, String>(0))?
            .map(|r| r.map(Digest::new))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(digests)
    }

    async fn append_digest(&self, digest: &Digest, at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO passcode (hash, created_at) VALUES (?1, ?2)",
            params![digest.as_str(), at.timestamp()],
        )?;
        debug!(digest = digest.short(), "Appended digest");
        Ok(())
    }

    async fn anonymous_reaction_count(&self, post_id: i64) -> Result<u32> {
        let db = self.db.lock().await;
        let count: u32 = db.query_row(
            "SELECT count(*) FROM reaction WHERE post_id = ?1 AND gravitas = ?2",
            params![post_id, Gravitas::ANONYMOUS.value()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[async_trait]
impl BoardStore for SqliteChain {
    async fn record_write(&self, post: &PostRecord, next_digest: &Digest) -> Result<Post> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;

        tx.execute(
            "INSERT INTO post (title, author, contents, tag, descriptors, hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                post.title,
                post.author,
                post.contents,
                post.tag,
                post.descriptors.join(DESCRIPTOR_SEPARATOR),
                post.hash.as_ref().map(Digest::as_str),
                post.created_at.timestamp(),
            ],
        )
        .map_err(|e| constraint_or(e, || RelayError::Conflict(TITLE_TAKEN.to_string())))?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO passcode (hash, created_at) VALUES (?1, ?2)",
            params![next_digest.as_str(), post.created_at.timestamp()],
        )?;
        tx.commit()?;

        debug!(post_id = id, digest = next_digest.short(), "Recorded write");

        Ok(Post {
            id,
            title: post.title.clone(),
            author: post.author.clone(),
            contents: post.contents.clone(),
            tag: post.tag,
            descriptors: post.descriptors.clone(),
            // Stored at second precision
            time: timestamp(post.created_at.timestamp())?,
            hash: post.hash.clone(),
        })
    }

    async fn insert_reaction(&self, reaction: &ReactionRecord) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO reaction (post_id, descriptor, gravitas, gravitas_hash)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                reaction.post_id,
                reaction.descriptor,
                reaction.gravitas.value(),
                reaction.gravitas_hash.as_ref().map(Digest::as_str),
            ],
        )
        .map_err(|e| {
            constraint_or(e, || RelayError::NotFound(format!("post {}", reaction.post_id)))
        })?;
        Ok(())
    }

    async fn posts(&self) -> Result<Vec<Post>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare_cached(
            "SELECT id, title, author, contents, tag, descriptors, hash, created_at
             FROM post ORDER BY id DESC",
        )?;
        let rows = stmt
            .query_map([], post_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(mut post, created_at)| {
                post.time = timestamp(created_at)?;
                Ok(post)
            })
            .collect()
    }

    async fn post_descriptors(&self, post_id: i64) -> Result<Option<Vec<String>>> {
        let db = self.db.lock().await;
        let joined: Option<String> = db
            .query_row(
                "SELECT descriptors FROM post WHERE id = ?1",
                [post_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(joined.map(|j| split_descriptors(&j)))
    }

    async fn reaction_totals(&self, post_id: i64) -> Result<Vec<ReactionTotal>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare_cached(
            "SELECT descriptor, sum(gravitas) AS total FROM reaction
             WHERE post_id = ?1 GROUP BY descriptor
             ORDER BY total DESC, descriptor ASC",
        )?;
        let totals = stmt
            .query_map([post_id], |row| {
                Ok(ReactionTotal {
                    descriptor: row.get(0)?,
                    gravitas: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(totals)
    }

    async fn clear(&self) -> Result<()> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        tx.execute_batch(
            "DELETE FROM reaction;
             DELETE FROM post;
             DELETE FROM passcode;",
        )?;
        tx.commit()?;
        info!("Chain database cleared");
        Ok(())
    }
}
