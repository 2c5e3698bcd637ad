//! PostgreSQL store backend.
//!
//! Claims use a `FOR UPDATE SKIP LOCKED` subselect inside a single
//! delete-returning statement: the selected row is locked for the statement's
//! transaction and invisible to concurrent claimers, so each entry is claimed
//! by exactly one caller system-wide.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::constants::{
    COUNT_ENTRIES, DELETE_ALL_ENTRIES, DELETE_ALL_RESPONSES, DELETE_QUEUE_ENTRIES,
    DELETE_QUEUE_RESPONSES, ENTRIES_EXIST, EXPIRE_RESPONSES, INSERT_ENTRY, INSERT_RESPONSE,
    PG_CLAIM_ENTRY, PG_SCHEMA, SELECT_RESPONSES,
};
use crate::error::Result;
use crate::queue::Response;
use crate::store::{EntryRow, NewEntry, NewResponse, Store};

/// Store backed by a PostgreSQL connection pool.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to PostgreSQL and build a pooled store.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().connect(dsn).await?;
        Ok(Self { pool })
    }

    /// Build a store from an existing pool, e.g. one shared with the
    /// application's own tables.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_schema(&self) -> Result<()> {
        for statement in PG_SCHEMA {
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
        let row = sqlx::query_as::<_, EntryRow>(PG_CLAIM_ENTRY)
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
