use relq::{store, Queues};
use tempfile::TempDir;

/// A hermetic SQLite-backed store for one test; dropping it removes the
/// database file.
pub struct TestStore {
    pub queues: Queues,
    _dir: TempDir,
}

pub async fn sqlite_queues() -> TestStore {
    let dir = tempfile::tempdir().expect("create temp dir");
    let dsn = format!("sqlite://{}/relq.db", dir.path().display());
    let store = store::connect(&dsn).await.expect("connect sqlite store");
    let queues = Queues::new(store);
    queues.create_all().await.expect("create schema");
    TestStore { queues, _dir: dir }
}
