//! Crash-recovery snapshots.
//!
//! The pipeline writes its working state to a handful of store hashes so an
//! operator can inspect or recover it after a crash. Nothing in the hot path
//! reads the store; losing a write is logged and forgotten.
//!
//! TODO: restore-on-restart — iterate `PROCESS_TASK` and
//! `SRS_ACCIDENT_M3U8_WORKING` at boot, rebuild the in-memory processors and
//! groups, and resume. Until then the snapshots are write-only.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;

use crate::error::Result;

/// Active publishers, keyed by canonical stream key.
pub const STREAM_ACTIVE_HASH: &str = "SRS_STREAM_ACTIVE";
/// Open incident groups, keyed by `stream/category`.
pub const INCIDENT_WORKING_HASH: &str = "SRS_ACCIDENT_M3U8_WORKING";
/// Incident VoD artifacts, keyed by group uuid.
pub const INCIDENT_ARTIFACT_HASH: &str = "SRS_ACCIDENT_M3U8_ARTIFACT";
/// Per-stream processor snapshots, keyed by processor uuid.
pub const PROCESS_TASK_HASH: &str = "PROCESS_TASK";

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn hash_set(&self, hash: &str, field: &str, value: String) -> Result<()>;
    async fn hash_delete(&self, hash: &str, field: &str) -> Result<()>;
}

/// Serialize and store a snapshot, logging (never propagating) failures.
pub async fn persist<T: Serialize + ?Sized>(
    store: &dyn SnapshotStore,
    hash: &str,
    field: &str,
    value: &T,
) {
    let body = match serde_json::to_string(value) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(hash, field, "failed to serialize snapshot: {e}");
            return;
        }
    };
    if let Err(e) = store.hash_set(hash, field, body).await {
        tracing::warn!(hash, field, "failed to persist snapshot: {e}");
    }
}

/// Delete a snapshot entry, logging (never propagating) failures.
pub async fn forget(store: &dyn SnapshotStore, hash: &str, field: &str) {
    if let Err(e) = store.hash_delete(hash, field).await {
        tracing::warn!(hash, field, "failed to delete snapshot: {e}");
    }
}

/// Redis-backed store used in production.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect and ping, so an unreachable store fails bootstrap instead of
    /// surfacing later as a stream of snapshot warnings.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_connection_manager().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl SnapshotStore for RedisStore {
    async fn hash_set(&self, hash: &str, field: &str, value: String) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(hash, field, value).await?;
        Ok(())
    }

    async fn hash_delete(&self, hash: &str, field: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(hash, field).await?;
        Ok(())
    }
}

/// In-memory store for tests and store-less development runs.
#[derive(Default)]
pub struct MemoryStore {
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, hash: &str, field: &str) -> Option<String> {
        self.hashes.lock().get(hash)?.get(field).cloned()
    }

    #[must_use]
    pub fn fields(&self, hash: &str) -> Vec<String> {
        self.hashes
            .lock()
            .get(hash)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn hash_set(&self, hash: &str, field: &str, value: String) -> Result<()> {
        self.hashes
            .lock()
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hash_delete(&self, hash: &str, field: &str) -> Result<()> {
        if let Some(entries) = self.hashes.lock().get_mut(hash) {
            entries.remove(field);
        }
        Ok(())
    }
}
