//! Store abstraction for relq.
//!
//! This module defines the [`Store`] trait, the seam between the queue
//! engine and the relational backend that persists entries and responses.
//!
//! ## What
//!
//! - [`Store`] covers schema creation, entry insertion and claiming,
//!   counting, clearing, and the response lifecycle.
//! - [`connect`] picks a backend from the DSN scheme once, at startup.
//!
//! ## How
//!
//! Two implementations exist. [`postgres::PgStore`] claims entries with a
//! `FOR UPDATE SKIP LOCKED` subselect, so concurrent claimers never block on
//! or observe each other's rows. [`sqlite::SqliteStore`] has no skip-locked
//! read mode; its claim statement is serialized by SQLite's database-wide
//! write lock instead, which costs writer concurrency but preserves the
//! one-claimer-per-entry guarantee. Which strategy is in effect is decided
//! entirely by [`connect`]; everything above this trait is backend-agnostic.

pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::queue::Response;

pub use postgres::PgStore;
pub use sqlite::SqliteStore;

/// A raw entry row, as claimed from the store. Fields are captured before
/// the row is deleted; the payload is still encoded.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EntryRow {
    pub entry_id: i64,
    pub queue_name: String,
    pub enqueued_at: DateTime<Utc>,
    pub schedule_at: Option<DateTime<Utc>>,
    pub priority: i32,
    pub data: serde_json::Value,
}

/// Input for inserting one entry row.
#[derive(Debug)]
pub struct NewEntry<'a> {
    pub queue_name: &'a str,
    pub enqueued_at: DateTime<Utc>,
    pub schedule_at: Option<DateTime<Utc>>,
    pub priority: i32,
    pub data: &'a serde_json::Value,
}

/// Input for inserting one response row.
#[derive(Debug)]
pub struct NewResponse<'a> {
    pub queue_name: &'a str,
    pub entry_id: i64,
    pub delivered_at: DateTime<Utc>,
    pub cleanup_at: Option<DateTime<Utc>>,
    pub data: &'a serde_json::Value,
}

/// Backend interface for the queue engine.
///
/// Every method is a single store transaction; the engine performs no
/// retries of its own, and store failures propagate to the caller.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create both tables and their indexes. Idempotent.
    async fn create_schema(&self) -> Result<()>;

    /// Insert one entry row and return its store-assigned id.
    async fn insert_entry(&self, entry: NewEntry<'_>) -> Result<i64>;

    /// Atomically select, lock, and delete the next eligible entry for
    /// `queue_name`: highest priority first, then lowest entry id. Entries
    /// whose `schedule_at` lies after `now` are invisible. Returns `None`
    /// when no eligible entry exists.
    async fn claim_entry(&self, queue_name: &str, now: DateTime<Utc>)
        -> Result<Option<EntryRow>>;

    /// Count all entries for `queue_name`, including not-yet-visible ones.
    async fn count_entries(&self, queue_name: &str) -> Result<i64>;

    /// Bounded existence check, cheaper than a full count.
    async fn has_entries(&self, queue_name: &str) -> Result<bool>;

    /// Delete all entries and responses for one queue. Not atomic with
    /// concurrent claims or response inserts.
    async fn clear_queue(&self, queue_name: &str) -> Result<()>;

    /// Delete all rows of both tables, store-wide.
    async fn clear_all(&self) -> Result<()>;

    /// Insert one response row and return the stored record.
    async fn insert_response(&self, response: NewResponse<'_>) -> Result<Response>;

    /// Delete all responses store-wide whose `cleanup_at` has passed.
    /// Returns the number of rows removed.
    async fn expire_responses(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Fetch all responses for `(queue_name, entry_id)` in insertion order.
    async fn fetch_responses(&self, queue_name: &str, entry_id: i64) -> Result<Vec<Response>>;
}

/// Connect to a store, selecting the backend (and with it the claim
/// strategy) from the DSN scheme.
///
/// # Arguments
/// * `dsn` - `postgres://...` / `postgresql://...` or `sqlite:...`
///
/// # Errors
/// Returns [`Error::UnsupportedDsn`] for any other scheme, and
/// [`Error::Database`] when the connection cannot be established.
pub async fn connect(dsn: &str) -> Result<Arc<dyn Store>> {
    if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
        Ok(Arc::new(PgStore::connect(dsn).await?))
    } else if dsn.starts_with("sqlite:") {
        Ok(Arc::new(SqliteStore::connect(dsn).await?))
    } else {
        Err(Error::UnsupportedDsn {
            dsn: dsn.to_string(),
        })
    }
}
