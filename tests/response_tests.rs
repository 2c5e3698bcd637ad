mod common;

use chrono::Utc;

#[tokio::test]
async fn respond_roundtrip() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    q.put(&1_i64).await.unwrap();
    let entry = q.get::<i64>().await.unwrap().unwrap();

    q.respond(entry.entry_id, &"test", None).await.unwrap();

    let responses = q.responses(entry.entry_id).await.unwrap();
    assert_eq!(responses.len(), 1);

    let response = &responses[0];
    assert_eq!(response.entry_id, entry.entry_id);
    assert_eq!(response.decode::<String>().unwrap(), "test");
    assert!(response.delivered_at >= entry.enqueued_at);
    assert!(response.cleanup_at.is_none());
}

#[tokio::test]
async fn responses_come_back_in_insertion_order() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    let receipt = q.put(&1_i64).await.unwrap();
    q.get::<i64>().await.unwrap().unwrap();

    q.respond(receipt.entry_id, &"first", None).await.unwrap();
    q.respond(receipt.entry_id, &"second", None).await.unwrap();
    q.respond(receipt.entry_id, &"third", None).await.unwrap();

    let responses = q.responses(receipt.entry_id).await.unwrap();
    let decoded: Vec<String> = responses
        .iter()
        .map(|r| r.decode::<String>().unwrap())
        .collect();
    assert_eq!(decoded, ["first", "second", "third"]);
}

#[tokio::test]
async fn responding_outlives_the_claimed_entry() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    let receipt = q.put(&1_i64).await.unwrap();
    // Claiming removes the entry row; the response still correlates
    q.get::<i64>().await.unwrap().unwrap();
    assert!(q.is_empty().await.unwrap());

    q.respond(receipt.entry_id, &42_i64, None).await.unwrap();
    let responses = q.responses(receipt.entry_id).await.unwrap();
    assert_eq!(responses[0].decode::<i64>().unwrap(), 42);
}

#[tokio::test]
async fn expired_responses_are_swept_lazily() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    let receipt = q.put(&1_i64).await.unwrap();
    q.get::<i64>().await.unwrap().unwrap();

    let past = Utc::now() - chrono::Duration::seconds(1);
    let future = Utc::now() + chrono::Duration::hours(1);
    q.respond(receipt.entry_id, &"stale", Some(past)).await.unwrap();
    q.respond(receipt.entry_id, &"fresh", Some(future)).await.unwrap();

    let responses = q.responses(receipt.entry_id).await.unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].decode::<String>().unwrap(), "fresh");
}

#[tokio::test]
async fn sweep_covers_other_entries_responses() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    let a = q.put(&1_i64).await.unwrap();
    let b = q.put(&2_i64).await.unwrap();

    let past = Utc::now() - chrono::Duration::seconds(1);
    q.respond(a.entry_id, &"stale", Some(past)).await.unwrap();

    // Reading b's responses sweeps a's expired row too
    assert!(q.responses(b.entry_id).await.unwrap().is_empty());
    assert!(q.responses(a.entry_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn no_responses_for_unknown_entry() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    assert!(q.responses(0xdead).await.unwrap().is_empty());
}

#[tokio::test]
async fn clear_removes_only_this_queues_responses() {
    let ts = common::sqlite_queues().await;
    let q1 = ts.queues.get("test1");
    let q2 = ts.queues.get("test2");

    let a = q1.put(&1_i64).await.unwrap();
    let b = q2.put(&2_i64).await.unwrap();
    q1.respond(a.entry_id, &"a", None).await.unwrap();
    q2.respond(b.entry_id, &"b", None).await.unwrap();

    q1.clear().await.unwrap();

    assert!(q1.responses(a.entry_id).await.unwrap().is_empty());
    assert_eq!(q2.responses(b.entry_id).await.unwrap().len(), 1);
}
