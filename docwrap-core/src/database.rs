//! The [`Database`] handle and its uniform CRUD verbs.
//!
//! Every verb resolves the target collection from the record type, checks out
//! a session clone through the shared [`SessionRegistry`], runs exactly one
//! store operation and releases the session before returning.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use docwrap::{prelude::*, memory::InMemoryDialer};
//! use bson::doc;
//!
//! let registry = Arc::new(SessionRegistry::new(InMemoryDialer::default()));
//! let db = Database::new(registry, "memory://local", "app")?;
//!
//! let mut user = User { id: None, email: "aaron@example.com".into() };
//! db.save(&mut user).await?;
//!
//! let found: Option<User> = db.find(doc! { "email": "aaron@example.com" }).await?;
//! ```

use bson::{DateTime, Document, doc, oid::ObjectId};
use std::{future::Future, sync::Arc};
use tracing::{debug, instrument};

use crate::{
    backend::{StoreCollection, StoreConnection, StoreDialer, StoreSession},
    config::DatabaseConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    object_id::to_object_id,
    query::{Change, ChangeInfo, FindQuery, normalize_sort_fields},
    record::{AnyRecord, Record, RecordExt},
    registry::SessionRegistry,
    resolve::{collection_for_any, collection_for_items, collection_of},
    session::{DatabaseScope, SessionGuard},
};

/// Session clone type produced by a dialer's connections.
pub type SessionOf<D> = <<D as StoreDialer>::Connection as StoreConnection>::Session;

/// Collection handle type resolved on a dialer's sessions.
pub type CollectionOf<D> = <SessionOf<D> as StoreSession>::Collection;

/// A logical database at a connection endpoint.
///
/// The handle is immutable and owns no live connection. Connections come from
/// the shared registry on demand, so handles are cheap to clone and share.
#[derive(Debug)]
pub struct Database<D: StoreDialer> {
    registry: Arc<SessionRegistry<D>>,
    config: DatabaseConfig,
}

impl<D: StoreDialer> Clone for Database<D> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        }
    }
}

impl<D: StoreDialer> Database<D> {
    /// Creates a handle for database `name` at `dial_string`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`](crate::error::DocumentStoreError::Configuration)
    /// if either parameter is empty.
    pub fn new(
        registry: Arc<SessionRegistry<D>>,
        dial_string: impl Into<String>,
        name: impl Into<String>,
    ) -> DocumentStoreResult<Self> {
        Self::from_config(registry, DatabaseConfig::new(dial_string, name))
    }

    /// Creates a handle from a [`DatabaseConfig`].
    pub fn from_config(registry: Arc<SessionRegistry<D>>, config: DatabaseConfig) -> DocumentStoreResult<Self> {
        config.validate()?;

        Ok(Self { registry, config })
    }

    /// Returns the logical database name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the endpoint this database is dialed through.
    pub fn dial_string(&self) -> &str {
        &self.config.dial_string
    }

    /// Returns the registry shared by this handle.
    pub fn registry(&self) -> &Arc<SessionRegistry<D>> {
        &self.registry
    }

    async fn checkout(&self) -> DocumentStoreResult<SessionGuard<SessionOf<D>>> {
        let connection = self
            .registry
            .get_or_dial(&self.config.dial_string)
            .await?;

        Ok(SessionGuard::new(connection.clone_session()?))
    }

    /// Runs `f` against this database on a fresh session clone.
    ///
    /// The session is released when the scope handed to `f` is dropped.
    pub async fn database_do<F, Fut, T>(&self, f: F) -> DocumentStoreResult<T>
    where
        F: FnOnce(DatabaseScope<SessionOf<D>>) -> Fut,
        Fut: Future<Output = DocumentStoreResult<T>>,
    {
        let session = self.checkout().await?;

        f(DatabaseScope::new(session, self.config.name.clone())).await
    }

    /// Runs `f` against collection `name` on a fresh session clone.
    ///
    /// The session is released after `f` completes, fails or panics.
    pub async fn collection_do<F, Fut, T>(&self, name: &str, f: F) -> DocumentStoreResult<T>
    where
        F: FnOnce(CollectionOf<D>) -> Fut,
        Fut: Future<Output = DocumentStoreResult<T>>,
    {
        let session = self.checkout().await?;
        let collection = session.collection(&self.config.name, name);

        let result = f(collection).await;
        drop(session);

        result
    }

    /// Runs `f` once with every named collection resolved on one session clone.
    pub async fn collections_do<F, Fut, T>(&self, names: &[&str], f: F) -> DocumentStoreResult<T>
    where
        F: FnOnce(Vec<CollectionOf<D>>) -> Fut,
        Fut: Future<Output = DocumentStoreResult<T>>,
    {
        let session = self.checkout().await?;
        let collections = names
            .iter()
            .map(|name| session.collection(&self.config.name, name))
            .collect::<Vec<_>>();

        let result = f(collections).await;
        drop(session);

        result
    }

    /// Stamps `record` with the current time and upserts it by identity.
    ///
    /// The stored document is fully replaced, so saving twice with the same
    /// identity keeps only the second payload.
    #[instrument(skip_all, fields(collection = R::collection_name()))]
    pub async fn save<R: Record>(&self, record: &mut R) -> DocumentStoreResult<()> {
        record.stamp_modified(DateTime::now());
        let (id, document) = record.to_identified_document()?;

        self.collection_do(collection_of(record), move |collection| async move {
            collection
                .upsert(doc! { "_id": id }, document)
                .await
                .map(|_| ())
        })
        .await
    }

    /// Type-erased [`save`](Database::save).
    #[instrument(skip_all, fields(collection = record.record_collection()))]
    pub async fn save_any(&self, record: &mut dyn AnyRecord) -> DocumentStoreResult<()> {
        record.stamp_record(DateTime::now());
        let id = record.record_id();
        let mut document = record.to_record_document()?;
        document.insert("_id", id);

        self.collection_do(record.record_collection(), move |collection| async move {
            collection
                .upsert(doc! { "_id": id }, document)
                .await
                .map(|_| ())
        })
        .await
    }

    /// Inserts every record into the element type's collection in one unordered batch.
    ///
    /// An empty slice returns immediately without touching the store. The
    /// batch is not atomic: a failure may leave earlier records persisted.
    #[instrument(skip_all, fields(collection = R::collection_name(), count = records.len()))]
    pub async fn save_all<R: Record>(&self, records: &mut [R]) -> DocumentStoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let documents = records
            .iter_mut()
            .map(|record| record.to_identified_document().map(|(_, document)| document))
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        self.collection_do(collection_for_items(records), move |collection| async move {
            collection.insert(documents).await
        })
        .await
    }

    /// Type-erased [`save_all`](Database::save_all).
    ///
    /// The collection is taken from the first element. A batch mixing
    /// collections is rejected with
    /// [`InvalidShape`](crate::error::DocumentStoreError::InvalidShape) before
    /// any store call.
    #[instrument(skip_all, fields(count = records.len()))]
    pub async fn save_all_any(&self, records: &mut [Box<dyn AnyRecord>]) -> DocumentStoreResult<()> {
        let Some(name) = collection_for_any(records)? else {
            return Ok(());
        };

        let documents = records
            .iter_mut()
            .map(|record| {
                let id = record.record_id();
                let mut document = record.to_record_document()?;
                document.insert("_id", id);
                Ok::<_, DocumentStoreError>(document)
            })
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        self.collection_do(name, move |collection| async move {
            collection.insert(documents).await
        })
        .await
    }

    /// Looks a record up by identity.
    pub async fn find_by_id<R: Record>(&self, id: ObjectId) -> DocumentStoreResult<Option<R>> {
        self.find_one_with(FindQuery::by_id(id)).await
    }

    /// Looks a record up by the hexadecimal form of its identity.
    ///
    /// A malformed identifier fails without querying the store.
    pub async fn find_by_id_hex<R: Record>(&self, id_hex: &str) -> DocumentStoreResult<Option<R>> {
        let id = to_object_id(id_hex)?;

        self.find_by_id(id).await
    }

    /// Returns the first record matching `query`, or `None` when nothing matches.
    #[instrument(skip_all, fields(collection = R::collection_name()))]
    pub async fn find<R: Record>(&self, query: Document) -> DocumentStoreResult<Option<R>> {
        self.find_one_with(FindQuery::new(query)).await
    }

    /// Like [`find`](Database::find), restricting returned fields to `projection`.
    #[instrument(skip_all, fields(collection = R::collection_name()))]
    pub async fn find_and_select<R: Record>(
        &self,
        query: Document,
        projection: Document,
    ) -> DocumentStoreResult<Option<R>> {
        self.find_one_with(
            FindQuery::builder()
                .filter(query)
                .projection(projection)
                .build(),
        )
        .await
    }

    /// Returns every record matching `query`, ordered by `sort_fields`.
    ///
    /// Sort fields are trimmed and lower-cased, and blank entries are dropped.
    #[instrument(skip_all, fields(collection = R::collection_name()))]
    pub async fn find_all<R: Record>(&self, query: Document, sort_fields: &[&str]) -> DocumentStoreResult<Vec<R>> {
        self.find_many_with(
            FindQuery::builder()
                .filter(query)
                .sort(normalize_sort_fields(sort_fields))
                .build(),
        )
        .await
    }

    /// Like [`find_all`](Database::find_all), restricting returned fields to `projection`.
    #[instrument(skip_all, fields(collection = R::collection_name()))]
    pub async fn find_all_and_select<R: Record>(
        &self,
        query: Document,
        projection: Document,
    ) -> DocumentStoreResult<Vec<R>> {
        self.find_many_with(
            FindQuery::builder()
                .filter(query)
                .projection(projection)
                .build(),
        )
        .await
    }

    /// Returns at most `limit` matching records. A `limit` of zero or less returns all of them.
    #[instrument(skip_all, fields(collection = R::collection_name(), limit = limit))]
    pub async fn find_with_limit<R: Record>(
        &self,
        query: Document,
        limit: i64,
        sort_fields: &[&str],
    ) -> DocumentStoreResult<Vec<R>> {
        self.find_with_skip_and_limit(query, 0, limit, sort_fields).await
    }

    /// Returns one page of matching records.
    ///
    /// `skip` and `limit` values of zero or less are treated as unset.
    #[instrument(skip_all, fields(collection = R::collection_name(), skip = skip, limit = limit))]
    pub async fn find_with_skip_and_limit<R: Record>(
        &self,
        query: Document,
        skip: i64,
        limit: i64,
        sort_fields: &[&str],
    ) -> DocumentStoreResult<Vec<R>> {
        self.find_many_with(
            FindQuery::builder()
                .filter(query)
                .sort(normalize_sort_fields(sort_fields))
                .skip(skip)
                .limit(limit)
                .build(),
        )
        .await
    }

    /// Runs a prepared [`FindQuery`] and returns the first match.
    pub async fn find_one_with<R: Record>(&self, query: FindQuery) -> DocumentStoreResult<Option<R>> {
        let found = self
            .collection_do(R::collection_name(), move |collection| async move {
                collection.find_one(query).await
            })
            .await?;

        if found.is_none() {
            debug!("no document matched");
        }

        found.map(R::from_document).transpose()
    }

    /// Runs a prepared [`FindQuery`] and returns every match.
    pub async fn find_many_with<R: Record>(&self, query: FindQuery) -> DocumentStoreResult<Vec<R>> {
        let documents = self
            .collection_do(R::collection_name(), move |collection| async move {
                collection.find(query).await
            })
            .await?;

        debug!(matched = documents.len(), "find completed");

        documents
            .into_iter()
            .map(R::from_document)
            .collect()
    }

    /// Applies `changer` to the first match of `selector`, inserting when nothing matches.
    #[instrument(skip_all, fields(collection = R::collection_name()))]
    pub async fn upsert<R: Record>(&self, selector: Document, changer: Document) -> DocumentStoreResult<ChangeInfo> {
        self.collection_do(R::collection_name(), move |collection| async move {
            collection.upsert(selector, changer).await
        })
        .await
    }

    /// Applies `changer` to the first match of `selector`.
    ///
    /// Returns `false` without error when nothing matched.
    #[instrument(skip_all, fields(collection = R::collection_name()))]
    pub async fn update<R: Record>(&self, selector: Document, changer: Document) -> DocumentStoreResult<bool> {
        let info = self
            .collection_do(R::collection_name(), move |collection| async move {
                collection.update(selector, changer).await
            })
            .await?;

        Ok(info.matched > 0)
    }

    /// Applies `changer` to the stored document with `record`'s identity.
    ///
    /// Returns `false` without error when no such document exists.
    pub async fn update_instance<R: Record>(&self, record: &mut R, changer: Document) -> DocumentStoreResult<bool> {
        let id = record.make_id();

        self.update::<R>(doc! { "_id": id }, changer).await
    }

    /// Applies `changer` to every match of `selector`.
    #[instrument(skip_all, fields(collection = R::collection_name()))]
    pub async fn update_all<R: Record>(&self, selector: Document, changer: Document) -> DocumentStoreResult<ChangeInfo> {
        self.collection_do(R::collection_name(), move |collection| async move {
            collection.update_all(selector, changer).await
        })
        .await
    }

    /// Removes the first match of `selector`.
    ///
    /// Returns `false` without error when nothing matched.
    #[instrument(skip_all, fields(collection = R::collection_name()))]
    pub async fn delete<R: Record>(&self, selector: Document) -> DocumentStoreResult<bool> {
        let info = self
            .collection_do(R::collection_name(), move |collection| async move {
                collection.remove(selector).await
            })
            .await?;

        Ok(info.removed > 0)
    }

    /// Removes the stored document with `record`'s identity.
    pub async fn delete_instance<R: Record>(&self, record: &mut R) -> DocumentStoreResult<bool> {
        let id = record.make_id();

        self.delete::<R>(doc! { "_id": id }).await
    }

    /// Removes every match of `selector`.
    #[instrument(skip_all, fields(collection = R::collection_name()))]
    pub async fn delete_all<R: Record>(&self, selector: Document) -> DocumentStoreResult<ChangeInfo> {
        self.collection_do(R::collection_name(), move |collection| async move {
            collection.remove_all(selector).await
        })
        .await
    }

    /// Counts the matches of `selector`.
    #[instrument(skip_all, fields(collection = R::collection_name()))]
    pub async fn count<R: Record>(&self, selector: Document) -> DocumentStoreResult<u64> {
        self.collection_do(R::collection_name(), move |collection| async move {
            collection.count(selector).await
        })
        .await
    }

    /// Returns `true` if at least one document matches `selector`.
    pub async fn has_any<R: Record>(&self, selector: Document) -> DocumentStoreResult<bool> {
        Ok(self.count::<R>(selector).await? > 0)
    }

    /// Atomically finds one document and applies `change` to it.
    ///
    /// Returns the record before or after the change (per
    /// [`Change::return_new`]) and a receipt. Nothing matching yields
    /// `(None, receipt)` rather than an error.
    #[instrument(skip_all, fields(collection = R::collection_name()))]
    pub async fn find_and_apply<R: Record>(
        &self,
        query: Document,
        change: Change,
    ) -> DocumentStoreResult<(Option<R>, ChangeInfo)> {
        let (found, info) = self
            .collection_do(R::collection_name(), move |collection| async move {
                collection
                    .find_and_modify(FindQuery::new(query), change)
                    .await
            })
            .await?;

        Ok((found.map(R::from_document).transpose()?, info))
    }

    /// Ensures an index over `keys` on the record type's collection.
    #[instrument(skip_all, fields(collection = R::collection_name()))]
    pub async fn ensure_index<R: Record>(&self, keys: &[&str]) -> DocumentStoreResult<()> {
        let keys = keys.iter().map(|key| key.to_string()).collect::<Vec<_>>();

        self.collection_do(R::collection_name(), move |collection| async move {
            collection.ensure_index(&keys).await
        })
        .await
    }

    /// Drops the named collection with all of its documents. Irreversible.
    #[instrument(skip(self))]
    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.collection_do(name, move |collection| async move {
            collection.drop_collection().await
        })
        .await
    }

    /// Drops every named collection on one session, reporting the first failure.
    #[instrument(skip(self))]
    pub async fn drop_collections(&self, names: &[&str]) -> DocumentStoreResult<()> {
        self.collections_do(names, move |collections| async move {
            let mut first_error = None;

            for collection in collections {
                if let Err(err) = collection.drop_collection().await {
                    first_error.get_or_insert(err);
                }
            }

            first_error.map_or(Ok(()), Err)
        })
        .await
    }

    /// Drops this whole logical database. Irreversible.
    #[instrument(skip(self), fields(database = %self.config.name))]
    pub async fn drop_database(&self) -> DocumentStoreResult<()> {
        self.database_do(|scope| async move { scope.drop_database().await })
            .await
    }
}
