use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;
use pinger::error::{CacheError, PersistenceError};
use pinger::{IncidentRecord, IncidentStore, SnapshotCache};

use crate::pool::{LibsqlManager, LibsqlPool};

type PooledConnection = deadpool::managed::Object<LibsqlManager>;

async fn get_conn(pool: &LibsqlPool) -> Result<PooledConnection> {
    Ok(pool.get().await?)
}

fn to_millis(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_millis()
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| anyhow!("timestamp {millis} out of range"))
}

/// Incident history in the `incidents` table.
pub struct LibsqlIncidentStore {
    pool: LibsqlPool,
}

impl LibsqlIncidentStore {
    pub fn new(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn insert_record(&self, record: &IncidentRecord) -> Result<i64> {
        let conn = get_conn(&self.pool).await?;
        conn.execute(
            "INSERT INTO incidents (name, pretty_name, reason, started_at, stopped_at, failure_count)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                record.name.clone(),
                record.pretty_name.clone(),
                record.reason.clone(),
                to_millis(record.started_at),
                to_millis(record.stopped_at),
                i64::from(record.failure_count)
            ],
        )
        .await
        .context("Failed to insert incident")?;

        Ok(conn.last_insert_rowid())
    }

    async fn select_recent(&self, limit: usize) -> Result<Vec<IncidentRecord>> {
        let conn = get_conn(&self.pool).await?;
        let mut rows = conn
            .query(
                "SELECT id, name, pretty_name, reason, started_at, stopped_at, failure_count
                 FROM incidents ORDER BY stopped_at DESC, id DESC LIMIT ?",
                params![limit as i64],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(IncidentRecord {
                id: Some(row.get(0)?),
                name: row.get(1)?,
                pretty_name: row.get(2)?,
                reason: row.get(3)?,
                started_at: from_millis(row.get(4)?)?,
                stopped_at: from_millis(row.get(5)?)?,
                failure_count: u32::try_from(row.get::<i64>(6)?)?,
            });
        }

        Ok(records)
    }

    async fn delete_all(&self) -> Result<()> {
        let conn = get_conn(&self.pool).await?;
        let deleted = conn.execute("DELETE FROM incidents", ()).await?;
        tracing::debug!(deleted, "Deleted incident rows");
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for LibsqlIncidentStore {
    async fn insert(&self, record: &IncidentRecord) -> Result<i64, PersistenceError> {
        Ok(self.insert_record(record).await?)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<IncidentRecord>, PersistenceError> {
        Ok(self.select_recent(limit).await?)
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        Ok(self.delete_all().await?)
    }
}

/// Snapshot blobs in the `snapshot_cache` table, keyed by site identifier.
pub struct LibsqlSnapshotCache {
    pool: LibsqlPool,
}

impl LibsqlSnapshotCache {
    pub fn new(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn select(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = get_conn(&self.pool).await?;
        let mut rows =
            conn.query("SELECT blob FROM snapshot_cache WHERE key = ?", params![key]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<Vec<u8>>(0)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, key: &str, blob: Vec<u8>) -> Result<()> {
        let conn = get_conn(&self.pool).await?;
        conn.execute(
            "INSERT INTO snapshot_cache (key, blob, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET blob = excluded.blob, updated_at = excluded.updated_at",
            params![key, blob, Utc::now().timestamp()],
        )
        .await
        .context("Failed to store snapshot")?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let conn = get_conn(&self.pool).await?;
        conn.execute("DELETE FROM snapshot_cache WHERE key = ?", params![key]).await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotCache for LibsqlSnapshotCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.select(key).await?)
    }

    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<(), CacheError> {
        Ok(self.upsert(key, blob).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        Ok(self.remove(key).await?)
    }
}
