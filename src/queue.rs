//! Queue operations: the producer and consumer interface for relq.
//!
//! This module defines the [`Queue`] struct, a handle on one named queue
//! within a shared store, with methods for enqueuing, claiming, and
//! delivering responses.
//!
//! ## What
//!
//! - [`Queue::put`] / [`Queue::put_with`] insert entries, optionally with a
//!   priority and a scheduling delay.
//! - [`Queue::get`] claims the next eligible entry: highest priority first,
//!   arrival order as the tie-break. Claiming consumes the row; there is no
//!   in-flight lease state and no re-delivery.
//! - [`Queue::respond`] / [`Queue::responses`] correlate results back to the
//!   entry that produced them, with optional lazy expiry.
//!
//! ## How
//!
//! Obtain handles through [`crate::Queues`], which caches one handle per
//! name. Handles are cheap to clone and safe to share across tasks.
//!
//! ### Example
//!
//! ```no_run
//! use relq::{Queues, store};
//!
//! # async fn example() -> relq::Result<()> {
//! let store = store::connect("sqlite:queue.db").await?;
//! let queues = Queues::new(store);
//! queues.create_all().await?;
//!
//! let queue = queues.get("emails");
//! let receipt = queue.put(&serde_json::json!({"to": "user@example.com"})).await?;
//! println!("enqueued entry {}", receipt.entry_id);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{NewEntry, NewResponse, Store};

/// Receipt for one enqueued entry.
#[derive(Debug, Clone, Copy)]
pub struct Enqueued {
    /// Store-assigned id, unique and monotonically increasing
    pub entry_id: i64,
    /// Insertion timestamp
    pub enqueued_at: DateTime<Utc>,
}

/// Options for [`Queue::put_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PutOptions {
    /// Entry is invisible to claimers until this instant passes
    pub schedule_at: Option<DateTime<Utc>>,
    /// Higher values are claimed first; defaults to 0
    pub priority: i32,
}

/// A claimed entry, detached from the store. The row it came from no longer
/// exists; the fields were captured before deletion.
#[derive(Debug, Clone)]
pub struct Entry<T> {
    pub entry_id: i64,
    pub enqueued_at: DateTime<Utc>,
    pub schedule_at: Option<DateTime<Utc>>,
    pub priority: i32,
    /// The payload, decoded back to the producer-supplied value
    pub data: T,
}

/// A delivered result correlated to an originating entry.
///
/// Multiple responses may exist for the same entry id, e.g. one per retry
/// attempt; readers see them in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Response {
    pub response_id: i64,
    pub queue_name: String,
    /// The entry that produced this response; the entry itself may already
    /// be gone
    pub entry_id: i64,
    pub delivered_at: DateTime<Utc>,
    /// Once this passes, the row is eligible for the lazy expiry sweep
    pub cleanup_at: Option<DateTime<Utc>>,
    pub data: serde_json::Value,
}

impl Response {
    /// Decode the response payload back to its original type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// A handle on one named queue. Not constructed directly; go through
/// [`crate::Queues`].
#[derive(Clone)]
pub struct Queue {
    store: Arc<dyn Store>,
    name: Arc<str>,
}

impl Queue {
    pub(crate) fn new(store: Arc<dyn Store>, name: Arc<str>) -> Self {
        Self { store, name }
    }

    /// The name of the queue.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Put an entry into the queue with default options.
    pub async fn put<T: Serialize>(&self, item: &T) -> Result<Enqueued> {
        self.put_with(item, PutOptions::default()).await
    }

    /// Put an entry into the queue.
    ///
    /// # Arguments
    /// * `item` - Payload; serialized via serde_json and decoded on claim
    /// * `options` - Scheduling delay and priority
    ///
    /// # Returns
    /// The store-assigned entry id and the insertion timestamp.
    pub async fn put_with<T: Serialize>(&self, item: &T, options: PutOptions) -> Result<Enqueued> {
        let data = serde_json::to_value(item)?;
        let enqueued_at = Utc::now();
        let entry_id = self
            .store
            .insert_entry(NewEntry {
                queue_name: &self.name,
                enqueued_at,
                schedule_at: options.schedule_at,
                priority: options.priority,
                data: &data,
            })
            .await?;
        Ok(Enqueued {
            entry_id,
            enqueued_at,
        })
    }

    /// Claim the next eligible entry, or `None` if no entry is currently
    /// visible.
    ///
    /// The claim selects the entry with the highest priority, breaking ties
    /// by arrival order, skipping entries scheduled in the future, and
    /// deletes it in the same transaction. Each entry is claimed by exactly
    /// one caller, system-wide, no matter how many handles or processes
    /// consume the queue concurrently.
    pub async fn get<T: DeserializeOwned>(&self) -> Result<Option<Entry<T>>> {
        let Some(row) = self.store.claim_entry(&self.name, Utc::now()).await? else {
            return Ok(None);
        };
        let data = serde_json::from_value(row.data)?;
        Ok(Some(Entry {
            entry_id: row.entry_id,
            enqueued_at: row.enqueued_at,
            schedule_at: row.schedule_at,
            priority: row.priority,
            data,
        }))
    }

    /// Count of entries in this queue. Approximate in the sense that
    /// not-yet-visible scheduled entries are included.
    pub async fn qsize(&self) -> Result<i64> {
        self.store.count_entries(&self.name).await
    }

    /// True iff the queue holds no entries. A bounded existence check, not
    /// a full count.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(!self.store.has_entries(&self.name).await?)
    }

    /// Delete all entries and responses belonging to this queue.
    ///
    /// Not atomic with concurrent `put`/`get`/`respond`: a racing claim or
    /// response insert may be lost or survive. Intended for tests and
    /// resets, not for correctness under load.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear_queue(&self.name).await
    }

    /// Deliver a response for the entry that produced it.
    ///
    /// # Arguments
    /// * `entry_id` - Originating entry; must be positive, validated before
    ///   any store access
    /// * `payload` - Result or failure description
    /// * `cleanup_at` - Optional expiry; once passed, the response is
    ///   removed by the sweep in [`Queue::responses`]
    pub async fn respond<T: Serialize>(
        &self,
        entry_id: i64,
        payload: &T,
        cleanup_at: Option<DateTime<Utc>>,
    ) -> Result<Response> {
        validate_entry_id(entry_id)?;
        let data = serde_json::to_value(payload)?;
        self.store
            .insert_response(NewResponse {
                queue_name: &self.name,
                entry_id,
                delivered_at: Utc::now(),
                cleanup_at,
                data: &data,
            })
            .await
    }

    /// Return all responses delivered for `entry_id`, oldest first.
    ///
    /// Expired responses are swept store-wide before reading; there is no
    /// background sweeper, so expiry only happens here.
    pub async fn responses(&self, entry_id: i64) -> Result<Vec<Response>> {
        validate_entry_id(entry_id)?;
        self.store.expire_responses(Utc::now()).await?;
        self.store.fetch_responses(&self.name, entry_id).await
    }
}

fn validate_entry_id(entry_id: i64) -> Result<()> {
    if entry_id <= 0 {
        return Err(Error::InvalidEntryId { id: entry_id });
    }
    Ok(())
}
