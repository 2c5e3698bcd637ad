//! SQLite store backend.
//!
//! SQLite is a single-writer engine with no skip-locked read mode, so the
//! claim statement relies on the exclusive database write lock instead: the
//! whole select-and-delete runs as one write statement, and concurrent
//! claimers queue up behind the busy timeout rather than racing for rows.
//! All writers serialize, which is the price of the fallback strategy.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::constants::{
    COUNT_ENTRIES, DELETE_ALL_ENTRIES, DELETE_ALL_RESPONSES, DELETE_QUEUE_ENTRIES,
    DELETE_QUEUE_RESPONSES, ENTRIES_EXIST, EXPIRE_RESPONSES, INSERT_ENTRY, INSERT_RESPONSE,
    SELECT_RESPONSES, SQLITE_CLAIM_ENTRY, SQLITE_SCHEMA,
};
use crate::error::Result;
use crate::queue::Response;
use crate::store::{EntryRow, NewEntry, NewResponse, Store};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Store backed by a SQLite database file.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and create if missing) a SQLite database.
    ///
    /// WAL mode keeps readers off the write lock; the busy timeout makes
    /// concurrent claimers wait for the lock instead of failing.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(dsn)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self { pool })
    }

    /// Build a store from an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_schema(&self) -> Result<()> {
        for statement in SQLITE_SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn insert_entry(&self, entry: NewEntry<'_>) -> Result<i64> {
        let entry_id = sqlx::query_scalar::<_, i64>(INSERT_ENTRY)
            .bind(entry.queue_name)
            .bind(entry.enqueued_at)
            .bind(entry.schedule_at)
            .bind(entry.priority)
            .bind(entry.data)
            .fetch_one(&self.pool)
            .await?;
        Ok(entry_id)
    }

    async fn claim_entry(
        &self,
        queue_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<EntryRow>> {
        let row = sqlx::query_as::<_, EntryRow>(SQLITE_CLAIM_ENTRY)
            .bind(queue_name)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count_entries(&self, queue_name: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(COUNT_ENTRIES)
            .bind(queue_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn has_entries(&self, queue_name: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(ENTRIES_EXIST)
            .bind(queue_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn clear_queue(&self, queue_name: &str) -> Result<()> {
        sqlx::query(DELETE_QUEUE_ENTRIES)
            .bind(queue_name)
            .execute(&self.pool)
            .await?;
        sqlx::query(DELETE_QUEUE_RESPONSES)
            .bind(queue_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        sqlx::query(DELETE_ALL_ENTRIES).execute(&self.pool).await?;
        sqlx::query(DELETE_ALL_RESPONSES)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_response(&self, response: NewResponse<'_>) -> Result<Response> {
        let stored = sqlx::query_as::<_, Response>(INSERT_RESPONSE)
            .bind(response.queue_name)
            .bind(response.entry_id)
            .bind(response.delivered_at)
            .bind(response.cleanup_at)
            .bind(response.data)
            .fetch_one(&self.pool)
            .await?;
        Ok(stored)
    }

    async fn expire_responses(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(EXPIRE_RESPONSES)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn fetch_responses(&self, queue_name: &str, entry_id: i64) -> Result<Vec<Response>> {
        let responses = sqlx::query_as::<_, Response>(SELECT_RESPONSES)
            .bind(queue_name)
            .bind(entry_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(responses)
    }
}
