//! End-to-end CRUD behavior of `Database` on the in-memory backend.

use std::sync::Arc;

use docwrap::{
    memory::{InMemoryDialer, InMemoryStore},
    prelude::*,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
#[record(collection = "users")]
struct User {
    #[record(id)]
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    name: String,
    #[serde(default)]
    age: i32,
    #[record(modified)]
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<DateTime>,
}

impl User {
    fn new(name: &str, age: i32) -> Self {
        Self { id: None, name: name.to_string(), age, modified: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Record)]
#[record(collection = "pets")]
struct Pet {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    species: String,
}

struct Fixture {
    db: Database<InMemoryDialer>,
    dialer: InMemoryDialer,
    store: InMemoryStore,
}

fn fixture() -> Fixture {
    let store = InMemoryStore::new();
    let dialer = InMemoryDialer::builder().shared_store(store.clone()).build();
    let registry = Arc::new(SessionRegistry::new(dialer.clone()));
    let db = Database::new(registry, "memory://test", "app").unwrap();

    Fixture { db, dialer, store }
}

async fn seed(db: &Database<InMemoryDialer>) {
    let mut users = vec![User::new("b", 20), User::new("a", 30), User::new("c", 10)];
    db.save_all(&mut users).await.unwrap();
}

#[tokio::test]
async fn test_handle_rejects_empty_parameters() {
    let registry = Arc::new(SessionRegistry::new(InMemoryDialer::new()));

    let error = Database::new(Arc::clone(&registry), "", "app").unwrap_err();
    assert!(error.is_configuration());

    let error = Database::new(registry, "memory://test", "").unwrap_err();
    assert!(error.is_configuration());
}

#[tokio::test]
async fn test_save_then_find_by_id() {
    let Fixture { db, .. } = fixture();
    let mut user = User::new("alice", 30);

    db.save(&mut user).await.unwrap();

    let id = user.id.expect("save assigns an identity");
    assert!(user.modified.is_some());

    let found: User = db.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(found, user);
}

#[tokio::test]
async fn test_save_is_a_full_replace() {
    let Fixture { db, .. } = fixture();
    let mut user = User::new("alice", 30);
    db.save(&mut user).await.unwrap();

    db.update::<User>(doc! { "_id": user.id }, doc! { "$set": { "nickname": "al" } }).await.unwrap();
    user.age = 31;
    db.save(&mut user).await.unwrap();

    assert_eq!(db.count::<User>(doc! {}).await.unwrap(), 1);
    let raw = db
        .collection_do("users", move |users| async move {
            users.find_one(FindQuery::new(doc! {})).await
        })
        .await
        .unwrap()
        .unwrap();
    assert!(!raw.contains_key("nickname"));
    assert_eq!(raw.get_i32("age").unwrap(), 31);
}

#[tokio::test]
async fn test_save_all_empty_touches_nothing() {
    let Fixture { db, dialer, .. } = fixture();
    let mut users: Vec<User> = Vec::new();

    db.save_all(&mut users).await.unwrap();

    assert_eq!(dialer.dial_count(), 0);
    assert!(db.registry().is_empty().await);
}

#[tokio::test]
async fn test_save_all_assigns_identities() {
    let Fixture { db, .. } = fixture();
    let mut users = vec![User::new("a", 1), User::new("b", 2)];

    db.save_all(&mut users).await.unwrap();

    assert!(users.iter().all(|user| user.id.is_some()));
    assert_eq!(db.count::<User>(doc! {}).await.unwrap(), 2);
}

#[tokio::test]
async fn test_save_all_rejects_duplicate_identity() {
    let Fixture { db, .. } = fixture();
    let mut first = User::new("a", 1);
    db.save(&mut first).await.unwrap();

    let mut batch = vec![first.clone(), User::new("b", 2), User::new("c", 3)];
    let error = db.save_all(&mut batch).await.unwrap_err();

    assert!(matches!(error, DocumentStoreError::DocumentAlreadyExists(_, _)));
    assert_eq!(db.count::<User>(doc! {}).await.unwrap(), 3);
    assert!(db.has_any::<User>(doc! { "name": "c" }).await.unwrap());
}

#[tokio::test]
async fn test_find_without_match_is_none() {
    let Fixture { db, .. } = fixture();
    seed(&db).await;

    let missing: Option<User> = db.find(doc! { "name": "nobody" }).await.unwrap();
    assert!(missing.is_none());

    let none: Vec<User> = db.find_all(doc! { "age": { "$gt": 100 } }, &[]).await.unwrap();
    assert!(none.is_empty());

    let by_id: Option<User> = db.find_by_id(ObjectId::new()).await.unwrap();
    assert!(by_id.is_none());
}

#[tokio::test]
async fn test_find_all_normalizes_sort_fields() {
    let Fixture { db, .. } = fixture();
    seed(&db).await;

    let users: Vec<User> = db.find_all(doc! {}, &["  NAME ", "", "Age"]).await.unwrap();
    let names = users.iter().map(|user| user.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["a", "b", "c"]);

    let users: Vec<User> = db.find_all(doc! {}, &["-AGE"]).await.unwrap();
    let ages = users.iter().map(|user| user.age).collect::<Vec<_>>();
    assert_eq!(ages, vec![30, 20, 10]);
}

#[tokio::test]
async fn test_find_with_limit_and_skip() {
    let Fixture { db, .. } = fixture();
    seed(&db).await;

    let all: Vec<User> = db.find_with_limit(doc! {}, 0, &["name"]).await.unwrap();
    assert_eq!(all.len(), 3);

    let two: Vec<User> = db.find_with_limit(doc! {}, 2, &["name"]).await.unwrap();
    assert_eq!(two.iter().map(|u| u.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

    let page: Vec<User> = db.find_with_skip_and_limit(doc! {}, 1, 1, &["name"]).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].name, "b");

    let rest: Vec<User> = db.find_with_skip_and_limit(doc! {}, 2, -1, &["name"]).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].name, "c");
}

#[tokio::test]
async fn test_find_and_select_projects_fields() {
    let Fixture { db, .. } = fixture();
    seed(&db).await;

    let user: User = db
        .find_and_select(doc! { "name": "a" }, doc! { "name": 1 })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.name, "a");
    assert_eq!(user.age, 0);
    assert!(user.id.is_some());

    let users: Vec<User> = db.find_all_and_select(doc! {}, doc! { "age": 0 }).await.unwrap();
    assert_eq!(users.len(), 3);
    assert!(users.iter().all(|user| user.age == 0));
}

#[tokio::test]
async fn test_find_by_id_hex() {
    let Fixture { db, dialer, .. } = fixture();

    let error = db.find_by_id_hex::<User>("not-hex").await.unwrap_err();
    assert!(matches!(error, DocumentStoreError::InvalidObjectId(ref input) if input == "not-hex"));
    assert_eq!(dialer.dial_count(), 0);

    let mut user = User::new("alice", 1);
    db.save(&mut user).await.unwrap();
    let hex = to_hex(&user.id.unwrap());

    let found: Option<User> = db.find_by_id_hex(&hex).await.unwrap();
    assert_eq!(found.map(|u| u.name), Some("alice".to_string()));
}

#[tokio::test]
async fn test_update_reports_whether_anything_matched() {
    let Fixture { db, .. } = fixture();
    seed(&db).await;

    assert!(!db.update::<User>(doc! { "name": "nobody" }, doc! { "$set": { "age": 1 } }).await.unwrap());
    assert!(db.update::<User>(doc! { "name": "a" }, doc! { "$inc": { "age": 1 } }).await.unwrap());

    let a: User = db.find(doc! { "name": "a" }).await.unwrap().unwrap();
    assert_eq!(a.age, 31);

    let info = db.update_all::<User>(doc! { "age": { "$lt": 25 } }, doc! { "$set": { "age": 0 } }).await.unwrap();
    assert_eq!(info.matched, 2);
    assert_eq!(db.count::<User>(doc! { "age": 0 }).await.unwrap(), 2);
}

#[tokio::test]
async fn test_update_instance_on_missing_record_is_false() {
    let Fixture { db, .. } = fixture();
    let mut unsaved = User::new("ghost", 1);

    let updated = db.update_instance(&mut unsaved, doc! { "$set": { "age": 2 } }).await.unwrap();

    assert!(!updated);
    assert_eq!(db.count::<User>(doc! {}).await.unwrap(), 0);
}

#[tokio::test]
async fn test_update_instance_and_delete_instance() {
    let Fixture { db, .. } = fixture();
    let mut user = User::new("alice", 1);
    db.save(&mut user).await.unwrap();

    assert!(db.update_instance(&mut user, doc! { "$set": { "age": 5 } }).await.unwrap());
    let stored: User = db.find_by_id(user.id.unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.age, 5);

    assert!(db.delete_instance(&mut user).await.unwrap());
    assert!(!db.delete_instance(&mut user).await.unwrap());
}

#[tokio::test]
async fn test_upsert_inserts_when_missing() {
    let Fixture { db, .. } = fixture();

    let info = db.upsert::<User>(doc! { "name": "new" }, doc! { "$set": { "age": 7 } }).await.unwrap();
    assert!(info.upserted_id.is_some());

    let info = db.upsert::<User>(doc! { "name": "new" }, doc! { "$set": { "age": 8 } }).await.unwrap();
    assert_eq!(info.matched, 1);

    let user: User = db.find(doc! { "name": "new" }).await.unwrap().unwrap();
    assert_eq!(user.age, 8);
}

#[tokio::test]
async fn test_delete_count_and_has_any() {
    let Fixture { db, .. } = fixture();
    seed(&db).await;

    assert!(db.has_any::<User>(doc! { "name": "a" }).await.unwrap());
    assert!(!db.delete::<User>(doc! { "name": "nobody" }).await.unwrap());
    assert!(db.delete::<User>(doc! { "name": "a" }).await.unwrap());
    assert!(!db.has_any::<User>(doc! { "name": "a" }).await.unwrap());

    let info = db.delete_all::<User>(doc! {}).await.unwrap();
    assert_eq!(info.removed, 2);
    assert_eq!(db.count::<User>(doc! {}).await.unwrap(), 0);
}

#[tokio::test]
async fn test_find_and_apply() {
    let Fixture { db, .. } = fixture();
    seed(&db).await;

    let (after, info) = db
        .find_and_apply::<User>(doc! { "name": "a" }, Change::update(doc! { "$inc": { "age": 1 } }).with_return_new(true))
        .await
        .unwrap();
    assert_eq!(after.map(|u| u.age), Some(31));
    assert_eq!(info.updated, 1);

    let (missing, info) = db
        .find_and_apply::<User>(doc! { "name": "nobody" }, Change::update(doc! { "$inc": { "age": 1 } }))
        .await
        .unwrap();
    assert!(missing.is_none());
    assert!(!info.affected_any());

    let (removed, info) = db
        .find_and_apply::<User>(doc! { "name": "b" }, Change::remove())
        .await
        .unwrap();
    assert_eq!(removed.map(|u| u.name), Some("b".to_string()));
    assert_eq!(info.removed, 1);
    assert_eq!(db.count::<User>(doc! {}).await.unwrap(), 2);
}

#[tokio::test]
async fn test_drop_collection_leaves_it_empty() {
    let Fixture { db, store, .. } = fixture();
    seed(&db).await;
    db.save(&mut Pet { id: None, species: "cat".to_string() }).await.unwrap();

    db.drop_collection("users").await.unwrap();

    assert_eq!(db.count::<User>(doc! {}).await.unwrap(), 0);
    assert_eq!(store.collection_names("app").await, vec!["pets".to_string()]);

    db.drop_collections(&["pets", "never-created"]).await.unwrap();
    assert!(store.collection_names("app").await.is_empty());
}

#[tokio::test]
async fn test_drop_database() {
    let Fixture { db, store, .. } = fixture();
    seed(&db).await;

    db.drop_database().await.unwrap();

    assert!(store.database_names().await.is_empty());
}

#[tokio::test]
async fn test_ensure_index() {
    let Fixture { db, .. } = fixture();

    db.ensure_index::<User>(&["name", "-age"]).await.unwrap();
    assert!(db.ensure_index::<User>(&[]).await.is_err());
}

#[tokio::test]
async fn test_save_any_and_mixed_batches() {
    let Fixture { db, dialer, store, .. } = fixture();

    let mut mixed = vec![
        User::new("a", 1).into_any_record(),
        Pet { id: None, species: "dog".to_string() }.into_any_record(),
    ];
    let error = db.save_all_any(&mut mixed).await.unwrap_err();
    assert!(matches!(error, DocumentStoreError::InvalidShape(_)));
    assert_eq!(dialer.dial_count(), 0);

    let mut pets = vec![
        Pet { id: None, species: "dog".to_string() }.into_any_record(),
        Pet { id: None, species: "cat".to_string() }.into_any_record(),
    ];
    db.save_all_any(&mut pets).await.unwrap();

    let mut user = User::new("dyn", 3).into_any_record();
    db.save_any(user.as_mut()).await.unwrap();
    assert!(user.downcast_ref::<User>().unwrap().modified.is_some());

    assert_eq!(db.count::<Pet>(doc! {}).await.unwrap(), 2);
    assert_eq!(db.count::<User>(doc! { "name": "dyn" }).await.unwrap(), 1);
    assert_eq!(store.open_sessions(), 0);
}

#[tokio::test]
async fn test_database_and_collections_scopes() {
    let Fixture { db, store, .. } = fixture();
    seed(&db).await;

    let name = db
        .database_do(|scope| async move { Ok(scope.name().to_string()) })
        .await
        .unwrap();
    assert_eq!(name, "app");

    let counts = db
        .collections_do(&["users", "pets"], move |collections| async move {
            let mut counts = Vec::new();
            for collection in collections {
                counts.push(collection.count(doc! {}).await?);
            }
            Ok(counts)
        })
        .await
        .unwrap();
    assert_eq!(counts, vec![3, 0]);
    assert_eq!(store.open_sessions(), 0);
}
