//! Queue registry: one handle per queue name over a shared store.
//!
//! [`Queues`] owns the store and a name-to-handle cache so repeated lookups
//! of the same name share one allocation. The store is bound at
//! construction; there is no post-hoc rebinding to guard against.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::queue::Queue;
use crate::store::Store;

/// The entrypoint to relq: a registry of named queues over one store.
///
/// ### Example
///
/// ```no_run
/// use relq::{Queues, store};
///
/// # async fn example() -> relq::Result<()> {
/// let store = store::connect("sqlite:queue.db").await?;
/// let queues = Queues::new(store);
/// queues.create_all().await?;
/// let jobs = queues.get("jobs");
/// # Ok(())
/// # }
/// ```
pub struct Queues {
    store: Arc<dyn Store>,
    queues: Mutex<HashMap<String, Queue>>,
}

impl Queues {
    /// Bind a store. The backend, and with it the claim strategy, was
    /// already selected by [`crate::store::connect`].
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Create the entry and response tables. Idempotent; call this alongside
    /// the application's own schema creation.
    pub async fn create_all(&self) -> Result<()> {
        self.store.create_schema().await
    }

    /// Delete all entries and responses from all queues, store-wide.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear_all().await
    }

    /// Get-or-create the handle for a named queue. Handles returned for the
    /// same name share their name allocation and store reference.
    pub fn get(&self, name: &str) -> Queue {
        let mut queues = self.queues.lock().expect("queue cache poisoned");
        queues
            .entry(name.to_string())
            .or_insert_with(|| Queue::new(Arc::clone(&self.store), Arc::from(name)))
            .clone()
    }
}
