//! SQL constants and default values for relq.
//!
//! All SQL statement templates live here, grouped by backend where the
//! dialects diverge. The entry and response tables are shared by every
//! queue; rows are partitioned by `queue_name`.

use std::time::Duration;

/// Default idle-poll interval for workers
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const INSERT_ENTRY: &str = r#"
    INSERT INTO relq_entries (queue_name, enqueued_at, schedule_at, priority, data)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING entry_id;
"#;

pub const COUNT_ENTRIES: &str = r#"
    SELECT COUNT(*) FROM relq_entries WHERE queue_name = $1;
"#;

pub const ENTRIES_EXIST: &str = r#"
    SELECT EXISTS (SELECT 1 FROM relq_entries WHERE queue_name = $1);
"#;

pub const DELETE_QUEUE_ENTRIES: &str = r#"
    DELETE FROM relq_entries WHERE queue_name = $1;
"#;

pub const DELETE_QUEUE_RESPONSES: &str = r#"
    DELETE FROM relq_responses WHERE queue_name = $1;
"#;

pub const DELETE_ALL_ENTRIES: &str = r#"
    DELETE FROM relq_entries;
"#;

pub const DELETE_ALL_RESPONSES: &str = r#"
    DELETE FROM relq_responses;
"#;

pub const INSERT_RESPONSE: &str = r#"
    INSERT INTO relq_responses (queue_name, entry_id, delivered_at, cleanup_at, data)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING response_id, queue_name, entry_id, delivered_at, cleanup_at, data;
"#;

/// Lazy expiry sweep: responses whose cleanup_at has passed are deleted
/// store-wide, not per queue.
pub const EXPIRE_RESPONSES: &str = r#"
    DELETE FROM relq_responses WHERE cleanup_at IS NOT NULL AND cleanup_at <= $1;
"#;

pub const SELECT_RESPONSES: &str = r#"
    SELECT response_id, queue_name, entry_id, delivered_at, cleanup_at, data
    FROM relq_responses
    WHERE queue_name = $1 AND entry_id = $2
    ORDER BY response_id ASC;
"#;

/// Claim statement for PostgreSQL. The locked subselect skips rows held by
/// concurrent claimers, so two callers never observe the same entry; the
/// delete-returning makes claiming consume the row in one atomic statement.
pub const PG_CLAIM_ENTRY: &str = r#"
    DELETE FROM relq_entries
    WHERE entry_id = (
        SELECT entry_id FROM relq_entries
        WHERE queue_name = $1
          AND (schedule_at IS NULL OR schedule_at <= $2)
        ORDER BY priority DESC, entry_id ASC
        FOR UPDATE SKIP LOCKED
        LIMIT 1
    )
    RETURNING entry_id, queue_name, enqueued_at, schedule_at, priority, data;
"#;

/// Claim statement for SQLite. There is no skip-locked read mode; the single
/// write statement is instead serialized by the database-wide write lock,
/// which gives the same one-claimer-per-entry guarantee.
pub const SQLITE_CLAIM_ENTRY: &str = r#"
    DELETE FROM relq_entries
    WHERE entry_id = (
        SELECT entry_id FROM relq_entries
        WHERE queue_name = $1
          AND (schedule_at IS NULL OR schedule_at <= $2)
        ORDER BY priority DESC, entry_id ASC
        LIMIT 1
    )
    RETURNING entry_id, queue_name, enqueued_at, schedule_at, priority, data;
"#;

pub const PG_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS relq_entries (
        entry_id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        queue_name TEXT NOT NULL,
        enqueued_at TIMESTAMPTZ NOT NULL,
        schedule_at TIMESTAMPTZ,
        priority INTEGER NOT NULL DEFAULT 0,
        data JSONB NOT NULL
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS relq_entries_claim_idx
        ON relq_entries (queue_name, priority DESC, entry_id ASC);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS relq_responses (
        response_id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        queue_name TEXT NOT NULL,
        entry_id BIGINT NOT NULL,
        delivered_at TIMESTAMPTZ NOT NULL,
        cleanup_at TIMESTAMPTZ,
        data JSONB NOT NULL
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS relq_responses_entry_idx
        ON relq_responses (queue_name, entry_id);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS relq_responses_cleanup_idx
        ON relq_responses (cleanup_at);
    "#,
];

// AUTOINCREMENT keeps entry ids monotonic across deletes; plain rowid
// columns may reuse ids of claimed rows, which would break arrival-order
// tie-breaking.
pub const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS relq_entries (
        entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
        queue_name TEXT NOT NULL,
        enqueued_at TEXT NOT NULL,
        schedule_at TEXT,
        priority INTEGER NOT NULL DEFAULT 0,
        data TEXT NOT NULL
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS relq_entries_claim_idx
        ON relq_entries (queue_name, priority DESC, entry_id ASC);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS relq_responses (
        response_id INTEGER PRIMARY KEY AUTOINCREMENT,
        queue_name TEXT NOT NULL,
        entry_id INTEGER NOT NULL,
        delivered_at TEXT NOT NULL,
        cleanup_at TEXT,
        data TEXT NOT NULL
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS relq_responses_entry_idx
        ON relq_responses (queue_name, entry_id);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS relq_responses_cleanup_idx
        ON relq_responses (cleanup_at);
    "#,
];
