mod common;

use std::time::Duration;

use chrono::Utc;
use relq::{Error, PutOptions};
use serde_json::json;

#[tokio::test]
async fn put_get_roundtrip() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    q.put(&1_i64).await.unwrap();
    let entry = q.get::<i64>().await.unwrap().expect("entry available");

    assert_eq!(entry.data, 1);
    assert!(entry.entry_id > 0);
    assert!(entry.schedule_at.is_none());
}

#[tokio::test]
async fn get_on_empty_returns_none() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    assert!(q.get::<i64>().await.unwrap().is_none());
    q.put(&1_i64).await.unwrap();
    assert!(q.get::<i64>().await.unwrap().is_some());
    assert!(q.get::<i64>().await.unwrap().is_none());
}

#[tokio::test]
async fn entries_claimed_in_arrival_order() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    q.put(&1_i64).await.unwrap();
    q.put(&2_i64).await.unwrap();

    assert_eq!(q.get::<i64>().await.unwrap().unwrap().data, 1);
    assert_eq!(q.get::<i64>().await.unwrap().unwrap().data, 2);
}

#[tokio::test]
async fn higher_priority_claimed_first() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    q.put_with(&1_i64, PutOptions { priority: 2, ..Default::default() })
        .await
        .unwrap();
    q.put_with(&2_i64, PutOptions { priority: 3, ..Default::default() })
        .await
        .unwrap();
    q.put_with(&3_i64, PutOptions { priority: 1, ..Default::default() })
        .await
        .unwrap();
    q.put(&4_i64).await.unwrap();

    assert_eq!(q.get::<i64>().await.unwrap().unwrap().data, 2);
    assert_eq!(q.get::<i64>().await.unwrap().unwrap().data, 1);
    assert_eq!(q.get::<i64>().await.unwrap().unwrap().data, 3);
    assert_eq!(q.get::<i64>().await.unwrap().unwrap().data, 4);
    assert!(q.get::<i64>().await.unwrap().is_none());
}

#[tokio::test]
async fn queues_do_not_mix() {
    let ts = common::sqlite_queues().await;
    let q1 = ts.queues.get("test1");
    let q2 = ts.queues.get("test2");

    q1.put(&1_i64).await.unwrap();
    q2.put(&2_i64).await.unwrap();

    assert_eq!(q2.get::<i64>().await.unwrap().unwrap().data, 2);
    assert_eq!(q1.get::<i64>().await.unwrap().unwrap().data, 1);
}

#[tokio::test]
async fn structured_payload_roundtrips() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    q.put(&json!({"foo": "bar"})).await.unwrap();
    let entry = q.get::<serde_json::Value>().await.unwrap().unwrap();
    assert_eq!(entry.data, json!({"foo": "bar"}));
}

#[tokio::test]
async fn scheduled_entry_invisible_until_due() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    let due = Utc::now() + chrono::Duration::milliseconds(400);
    q.put_with(&1_i64, PutOptions { schedule_at: Some(due), priority: 0 })
        .await
        .unwrap();

    assert!(q.get::<i64>().await.unwrap().is_none(), "not due yet");
    // Still counted while invisible
    assert_eq!(q.qsize().await.unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;

    let entry = q.get::<i64>().await.unwrap().expect("due by now");
    assert_eq!(entry.data, 1);
}

#[tokio::test]
async fn scheduled_entry_follows_priority_once_due() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    let past = Utc::now() - chrono::Duration::seconds(1);
    q.put(&1_i64).await.unwrap();
    q.put_with(
        &2_i64,
        PutOptions { schedule_at: Some(past), priority: 5 },
    )
    .await
    .unwrap();

    // The already-due scheduled entry wins on priority
    assert_eq!(q.get::<i64>().await.unwrap().unwrap().data, 2);
    assert_eq!(q.get::<i64>().await.unwrap().unwrap().data, 1);
}

#[tokio::test]
async fn qsize_and_is_empty() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    assert_eq!(q.qsize().await.unwrap(), 0);
    assert!(q.is_empty().await.unwrap());

    q.put(&1_i64).await.unwrap();
    q.put(&2_i64).await.unwrap();

    assert_eq!(q.qsize().await.unwrap(), 2);
    assert!(!q.is_empty().await.unwrap());

    q.get::<i64>().await.unwrap();
    assert_eq!(q.qsize().await.unwrap(), 1);
}

#[tokio::test]
async fn clear_is_scoped_to_one_queue() {
    let ts = common::sqlite_queues().await;
    let q1 = ts.queues.get("test1");
    let q2 = ts.queues.get("test2");

    q1.put(&1_i64).await.unwrap();
    q2.put(&2_i64).await.unwrap();
    q1.clear().await.unwrap();

    assert!(q1.get::<i64>().await.unwrap().is_none());
    assert_eq!(q2.get::<i64>().await.unwrap().unwrap().data, 2);
}

#[tokio::test]
async fn registry_clear_empties_every_queue() {
    let ts = common::sqlite_queues().await;
    let q1 = ts.queues.get("test1");
    let q2 = ts.queues.get("test2");

    q1.put(&1_i64).await.unwrap();
    q2.put(&2_i64).await.unwrap();
    ts.queues.clear().await.unwrap();

    assert!(q1.is_empty().await.unwrap());
    assert!(q2.is_empty().await.unwrap());
}

#[tokio::test]
async fn registry_caches_handles_per_name() {
    let ts = common::sqlite_queues().await;
    let q1 = ts.queues.get("test");
    let q2 = ts.queues.get("test");

    // Cached handles share one name allocation
    assert!(std::ptr::eq(q1.name(), q2.name()));
    assert!(!std::ptr::eq(q1.name(), ts.queues.get("other").name()));
}

#[tokio::test]
async fn entry_ids_are_monotonic_across_claims() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    let first = q.put(&1_i64).await.unwrap();
    q.get::<i64>().await.unwrap().unwrap();
    let second = q.put(&2_i64).await.unwrap();

    assert!(second.entry_id > first.entry_id);
}

#[tokio::test]
async fn respond_rejects_non_positive_entry_id() {
    let ts = common::sqlite_queues().await;
    let q = ts.queues.get("test");

    assert!(matches!(
        q.respond(0, &"x", None).await,
        Err(Error::InvalidEntryId { id: 0 })
    ));
    assert!(matches!(
        q.responses(-7).await,
        Err(Error::InvalidEntryId { id: -7 })
    ));
}

#[tokio::test]
async fn connect_rejects_unknown_dsn_scheme() {
    assert!(matches!(
        relq::store::connect("mysql://localhost/db").await,
        Err(Error::UnsupportedDsn { .. })
    ));
}
