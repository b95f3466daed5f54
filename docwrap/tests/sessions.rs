//! Connection sharing and session release across success, failure and panics.

use std::sync::Arc;

use docwrap::{
    memory::{InMemoryDialer, InMemoryStore},
    prelude::*,
};

#[derive(Debug, Clone, Serialize, Deserialize, Record)]
#[record(collection = "events")]
struct Event {
    #[record(id)]
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    seq: i64,
}

fn shared() -> (Arc<SessionRegistry<InMemoryDialer>>, InMemoryDialer, InMemoryStore) {
    let store = InMemoryStore::new();
    let dialer = InMemoryDialer::builder().shared_store(store.clone()).build();
    let registry = Arc::new(SessionRegistry::new(dialer.clone()));

    (registry, dialer, store)
}

#[tokio::test]
async fn test_one_dial_per_endpoint() {
    let (registry, dialer, _store) = shared();

    let first = Database::new(Arc::clone(&registry), "memory://a", "one").unwrap();
    let second = Database::new(Arc::clone(&registry), "memory://a", "two").unwrap();
    let other = Database::new(Arc::clone(&registry), "memory://b", "one").unwrap();

    first.count::<Event>(doc! {}).await.unwrap();
    second.count::<Event>(doc! {}).await.unwrap();
    first.count::<Event>(doc! {}).await.unwrap();
    assert_eq!(dialer.dial_count(), 1);

    other.count::<Event>(doc! {}).await.unwrap();
    assert_eq!(dialer.dial_count(), 2);

    let mut endpoints = registry.endpoints().await;
    endpoints.sort();
    assert_eq!(endpoints, vec!["memory://a".to_string(), "memory://b".to_string()]);
}

#[tokio::test]
async fn test_failed_dial_is_not_cached() {
    let (registry, dialer, _store) = shared();
    let db = Database::new(Arc::clone(&registry), "unknown://host", "app").unwrap();

    let error = db.count::<Event>(doc! {}).await.unwrap_err();

    assert!(matches!(error, DocumentStoreError::Initialization(_)));
    assert_eq!(dialer.dial_count(), 0);
    assert!(registry.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_share_one_connection() {
    let (registry, dialer, store) = shared();
    let db = Database::new(registry, "memory://shared", "app").unwrap();

    let handles = (0..32)
        .map(|seq| {
            let db = db.clone();
            tokio::spawn(async move {
                let mut event = Event { id: None, seq };
                db.save(&mut event).await
            })
        })
        .collect::<Vec<_>>();

    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }

    assert_eq!(dialer.dial_count(), 1);
    assert_eq!(db.count::<Event>(doc! {}).await.unwrap(), 32);
    assert_eq!(store.open_sessions(), 0);
}

#[tokio::test]
async fn test_session_released_after_success() {
    let (registry, _dialer, store) = shared();
    let db = Database::new(registry, "memory://shared", "app").unwrap();

    db.save(&mut Event { id: None, seq: 1 }).await.unwrap();
    let _: Vec<Event> = db.find_all(doc! {}, &["seq"]).await.unwrap();

    assert_eq!(store.open_sessions(), 0);
}

#[tokio::test]
async fn test_session_released_after_error() {
    let (registry, _dialer, store) = shared();
    let db = Database::new(registry, "memory://shared", "app").unwrap();

    db.save(&mut Event { id: None, seq: 1 }).await.unwrap();

    let result = db
        .collection_do("events", move |events| async move {
            events.find(FindQuery::new(doc! { "seq": { "$regex": "x" } })).await
        })
        .await;
    assert!(matches!(result, Err(DocumentStoreError::Backend(_))));

    let result = db.update::<Event>(doc! {}, doc! { "$bogus": { "seq": 1 } }).await;
    assert!(result.is_err());

    assert_eq!(store.open_sessions(), 0);
}

#[tokio::test]
async fn test_session_released_after_panic() {
    let (registry, _dialer, store) = shared();
    let db = Database::new(registry, "memory://shared", "app").unwrap();

    let handle = tokio::spawn({
        let db = db.clone();
        async move {
            db.collection_do("events", move |_events| async move {
                if true {
                    panic!("scope body failed");
                }
                Ok::<(), DocumentStoreError>(())
            })
            .await
        }
    });

    let error = handle.await.unwrap_err();
    assert!(error.is_panic());
    assert_eq!(store.open_sessions(), 0);

    db.save(&mut Event { id: None, seq: 2 }).await.unwrap();
    assert_eq!(db.count::<Event>(doc! {}).await.unwrap(), 1);
}
