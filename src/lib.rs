/**
 # relq

A work queue layered on a relational database, for applications that already
have one and want queue semantics without a separate broker.

## Features

- **Safe concurrent claims**: PostgreSQL `SKIP LOCKED` (or SQLite's exclusive
  write lock) guarantees each entry is claimed exactly once
- **Ordering**: priority-major, arrival-minor, with delayed visibility via
  `schedule_at`
- **Task dispatch**: schedule named handlers, bounded retries with delay,
  results and failures delivered through a response table
- **At-least-once**: a claim consumes its row; retries re-enqueue new rows,
  idempotency stays with the task author
*/

pub mod error;
pub mod queue;
pub mod registry;
pub mod store;
pub mod tasks;

mod constants;

pub use crate::error::{Error, Result};
pub use crate::queue::{Enqueued, Entry, PutOptions, Queue, Response};
pub use crate::registry::Queues;
