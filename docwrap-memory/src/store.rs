//! In-memory storage implementation of the store-client traits.
//!
//! This module provides a simple but complete backend that keeps documents as
//! BSON in nested HashMaps behind async-safe read-write locks. Every dial
//! produces an independent [`InMemoryStore`] unless the dialer was built with
//! a shared one.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document};
use tracing::{debug, trace};

use docwrap_core::{
    backend::{StoreCollection, StoreConnection, StoreDialer, StoreSession},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Change, ChangeInfo, FindQuery},
};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, project, sort_documents},
    update::{DocumentUpdater, with_leading_id},
};

type CollectionData = Vec<Document>;
type DatabaseMap = HashMap<String, CollectionData>;
type StoreMap = HashMap<String, DatabaseMap>;

/// Endpoint scheme accepted by [`InMemoryDialer`].
pub const MEMORY_SCHEME: &str = "memory://";


/// Dialer producing in-memory connections.
///
/// Only endpoints starting with [`MEMORY_SCHEME`] are accepted. The dialer
/// counts how often it was asked to dial, which makes the registry's
/// once-per-endpoint behavior observable.
///
/// # Example
///
/// ```ignore
/// use docwrap_memory::InMemoryDialer;
///
/// let dialer = InMemoryDialer::builder().build();
/// let connection = dialer.dial("memory://local").await?;
/// assert_eq!(dialer.dial_count(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryDialer {
    dials: Arc<AtomicUsize>,
    shared: Option<InMemoryStore>,
}

impl InMemoryDialer {
    /// Creates a dialer that hands out a fresh store per endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing an `InMemoryDialer` with custom options.
    pub fn builder() -> InMemoryDialerBuilder {
        InMemoryDialerBuilder::default()
    }

    /// Returns how many dials have succeeded.
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreDialer for InMemoryDialer {
    type Connection = InMemoryStore;

    async fn dial(&self, endpoint: &str) -> DocumentStoreResult<InMemoryStore> {
        if !endpoint.starts_with(MEMORY_SCHEME) {
            return Err(DocumentStoreError::Initialization(format!(
                "unsupported endpoint {:?}, expected {}<name>",
                endpoint, MEMORY_SCHEME
            )));
        }

        self.dials.fetch_add(1, Ordering::SeqCst);
        debug!(endpoint, "dialed in-memory store");

        Ok(self.shared.clone().unwrap_or_default())
    }
}

/// Builder for [`InMemoryDialer`].
#[derive(Default, Debug)]
pub struct InMemoryDialerBuilder {
    shared: Option<InMemoryStore>,
}

impl InMemoryDialerBuilder {
    /// Makes every dial return a handle to `store`.
    ///
    /// Useful for inspecting or seeding data outside of a [`Database`](docwrap_core::database::Database).
    pub fn shared_store(mut self, store: InMemoryStore) -> Self {
        self.shared = Some(store);
        self
    }

    /// Builds the dialer.
    pub fn build(self) -> InMemoryDialer {
        InMemoryDialer {
            dials: Arc::new(AtomicUsize::new(0)),
            shared: self.shared,
        }
    }
}


/// Thread-safe in-memory document store, the connection type of [`InMemoryDialer`].
///
/// `InMemoryStore` is cloneable and uses `Arc`-wrapped internal state, so
/// clones share the same data and the same session accounting.
///
/// Queries scan every document of a collection; there is no indexing.
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// database -> collection -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
    open_sessions: Arc<AtomicUsize>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of session clones checked out and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Lists collection names of `database`, sorted.
    pub async fn collection_names(&self, database: &str) -> Vec<String> {
        let store = self.store.read().await;
        let mut names = store
            .get(database)
            .map(|collections| collections.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();

        names.sort();
        names
    }

    /// Lists database names, sorted.
    pub async fn database_names(&self) -> Vec<String> {
        let store = self.store.read().await;
        let mut names = store.keys().cloned().collect::<Vec<_>>();

        names.sort();
        names
    }
}

impl StoreConnection for InMemoryStore {
    type Session = InMemorySession;

    fn clone_session(&self) -> DocumentStoreResult<InMemorySession> {
        Ok(InMemorySession::new(self.clone()))
    }
}


/// A session clone of an [`InMemoryStore`].
#[derive(Debug)]
pub struct InMemorySession {
    store: InMemoryStore,
    released: bool,
}

impl InMemorySession {
    fn new(store: InMemoryStore) -> Self {
        let open = store.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(open, "in-memory session opened");

        Self { store, released: false }
    }
}

#[async_trait]
impl StoreSession for InMemorySession {
    type Collection = InMemoryCollection;

    fn collection(&self, database: &str, name: &str) -> InMemoryCollection {
        InMemoryCollection {
            store: self.store.clone(),
            database: database.to_string(),
            name: name.to_string(),
        }
    }

    async fn drop_database(&self, database: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.store.write().await;
        store.remove(database);

        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            let open = self.store.open_sessions.fetch_sub(1, Ordering::SeqCst) - 1;
            trace!(open, "in-memory session released");
        }
    }
}


/// A collection within an [`InMemoryStore`].
#[derive(Debug, Clone)]
pub struct InMemoryCollection {
    store: InMemoryStore,
    database: String,
    name: String,
}

impl InMemoryCollection {
    /// Indexes of documents matching `selector`, in storage order.
    fn matching(documents: &[Document], selector: &Document) -> DocumentStoreResult<Vec<usize>> {
        let mut indexes = Vec::new();

        for (index, document) in documents.iter().enumerate() {
            if DocumentEvaluator::new(document).evaluate(selector)? {
                indexes.push(index);
            }
        }

        Ok(indexes)
    }

    /// Index of the first match under the query's sort order.
    fn first_match(documents: &[Document], query: &FindQuery) -> DocumentStoreResult<Option<usize>> {
        let indexes = Self::matching(documents, &query.filter)?;
        if query.sort.is_empty() {
            return Ok(indexes.into_iter().next());
        }

        let mut candidates = indexes
            .iter()
            .map(|index| &documents[*index])
            .collect::<Vec<_>>();
        sort_documents(&mut candidates, &query.sort);

        Ok(candidates.first().and_then(|first| {
            indexes
                .iter()
                .copied()
                .find(|index| std::ptr::eq(&documents[*index], *first))
        }))
    }

    fn has_id(documents: &[Document], id: &Bson) -> bool {
        let id = Comparable::from(id);

        documents
            .iter()
            .filter_map(|document| document.get("_id"))
            .any(|existing| Comparable::from(existing) == id)
    }

    fn project_optional(document: Document, projection: Option<&Document>) -> Document {
        match projection {
            Some(projection) => project(&document, projection),
            None => document,
        }
    }

    /// Applies `changer` to a copy of `documents[index]`, committing only on success.
    fn modify_at(documents: &mut [Document], index: usize, changer: &Document) -> DocumentStoreResult<bool> {
        let mut modified = documents[index].clone();
        DocumentUpdater::apply(&mut modified, changer, false)?;

        let changed = modified != documents[index];
        documents[index] = modified;

        Ok(changed)
    }

    /// Appends `document`, assigning an `_id` when it has none.
    fn insert_new(&self, documents: &mut CollectionData, document: Document) -> DocumentStoreResult<Bson> {
        let document = with_leading_id(document);
        let id = document.get("_id").cloned().unwrap_or(Bson::Null);

        if Self::has_id(documents, &id) {
            return Err(DocumentStoreError::DocumentAlreadyExists(id.to_string(), self.name.clone()));
        }

        documents.push(document);
        Ok(id)
    }
}

#[async_trait]
impl StoreCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, documents: Vec<Document>) -> DocumentStoreResult<()> {
        let mut store = self.store.store.write().await;
        let collection = store
            .entry(self.database.clone())
            .or_default()
            .entry(self.name.clone())
            .or_default();

        let mut first_error = None;
        for document in documents {
            if let Err(error) = self.insert_new(collection, document) {
                first_error.get_or_insert(error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    async fn find(&self, query: FindQuery) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.store.read().await;
        let collection = match store.get(&self.database).and_then(|db| db.get(&self.name)) {
            Some(collection) => collection,
            None => return Ok(vec![]),
        };

        let mut matched = DocumentEvaluator::filter_documents(collection, &query.filter)?;

        if !query.sort.is_empty() {
            sort_documents(&mut matched, &query.sort);
        }

        let skip = query.skip.unwrap_or(0) as usize;
        let limit = query.limit.map(|n| n as usize).unwrap_or(usize::MAX);

        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| Self::project_optional(document.clone(), query.projection.as_ref()))
            .collect())
    }

    async fn count(&self, selector: Document) -> DocumentStoreResult<u64> {
        let store = self.store.store.read().await;
        let collection = match store.get(&self.database).and_then(|db| db.get(&self.name)) {
            Some(collection) => collection,
            None => return Ok(0),
        };

        Ok(Self::matching(collection, &selector)?.len() as u64)
    }

    async fn update(&self, selector: Document, changer: Document) -> DocumentStoreResult<ChangeInfo> {
        let mut store = self.store.store.write().await;
        let collection = match store.get_mut(&self.database).and_then(|db| db.get_mut(&self.name)) {
            Some(collection) => collection,
            None => return Ok(ChangeInfo::default()),
        };

        let Some(index) = Self::matching(collection, &selector)?.into_iter().next() else {
            return Ok(ChangeInfo::default());
        };
        let changed = Self::modify_at(collection, index, &changer)?;

        Ok(ChangeInfo { matched: 1, updated: changed as u64, ..Default::default() })
    }

    async fn update_all(&self, selector: Document, changer: Document) -> DocumentStoreResult<ChangeInfo> {
        let mut store = self.store.store.write().await;
        let collection = match store.get_mut(&self.database).and_then(|db| db.get_mut(&self.name)) {
            Some(collection) => collection,
            None => return Ok(ChangeInfo::default()),
        };

        let mut info = ChangeInfo::default();

        for index in Self::matching(collection, &selector)? {
            info.matched += 1;
            if Self::modify_at(collection, index, &changer)? {
                info.updated += 1;
            }
        }

        Ok(info)
    }

    async fn upsert(&self, selector: Document, changer: Document) -> DocumentStoreResult<ChangeInfo> {
        let mut store = self.store.store.write().await;
        let collection = store
            .entry(self.database.clone())
            .or_default()
            .entry(self.name.clone())
            .or_default();

        if let Some(index) = Self::matching(collection, &selector)?.into_iter().next() {
            let changed = Self::modify_at(collection, index, &changer)?;
            return Ok(ChangeInfo { matched: 1, updated: changed as u64, ..Default::default() });
        }

        let document = DocumentUpdater::upsert_document(&selector, &changer)?;
        let id = self.insert_new(collection, document)?;

        Ok(ChangeInfo { upserted_id: Some(id), ..Default::default() })
    }

    async fn remove(&self, selector: Document) -> DocumentStoreResult<ChangeInfo> {
        let mut store = self.store.store.write().await;
        let collection = match store.get_mut(&self.database).and_then(|db| db.get_mut(&self.name)) {
            Some(collection) => collection,
            None => return Ok(ChangeInfo::default()),
        };

        match Self::matching(collection, &selector)?.into_iter().next() {
            Some(index) => {
                collection.remove(index);
                Ok(ChangeInfo { matched: 1, removed: 1, ..Default::default() })
            },
            None => Ok(ChangeInfo::default()),
        }
    }

    async fn remove_all(&self, selector: Document) -> DocumentStoreResult<ChangeInfo> {
        let mut store = self.store.store.write().await;
        let collection = match store.get_mut(&self.database).and_then(|db| db.get_mut(&self.name)) {
            Some(collection) => collection,
            None => return Ok(ChangeInfo::default()),
        };

        let indexes = Self::matching(collection, &selector)?;
        for index in indexes.iter().rev() {
            collection.remove(*index);
        }

        let removed = indexes.len() as u64;
        Ok(ChangeInfo { matched: removed, removed, ..Default::default() })
    }

    async fn find_and_modify(
        &self,
        query: FindQuery,
        change: Change,
    ) -> DocumentStoreResult<(Option<Document>, ChangeInfo)> {
        if !change.remove && change.update.is_none() {
            return Err(DocumentStoreError::InvalidShape(
                "a change needs an update document or remove".to_string(),
            ));
        }

        let mut store = self.store.store.write().await;
        let collection = store
            .entry(self.database.clone())
            .or_default()
            .entry(self.name.clone())
            .or_default();
        let projection = query.projection.as_ref();

        let found = Self::first_match(collection, &query)?;

        match (found, &change.update) {
            (Some(index), _) if change.remove => {
                let removed = collection.remove(index);
                let info = ChangeInfo { matched: 1, removed: 1, ..Default::default() };

                Ok((Some(Self::project_optional(removed, projection)), info))
            },
            (Some(index), Some(update)) => {
                let before = collection[index].clone();
                let changed = Self::modify_at(collection, index, update)?;
                let info = ChangeInfo { matched: 1, updated: changed as u64, ..Default::default() };
                let returned = if change.return_new { collection[index].clone() } else { before };

                Ok((Some(Self::project_optional(returned, projection)), info))
            },
            (None, Some(update)) if change.upsert && !change.remove => {
                let inserted = DocumentUpdater::upsert_document(&query.filter, update)?;
                let id = self.insert_new(collection, inserted.clone())?;
                let info = ChangeInfo { upserted_id: Some(id), ..Default::default() };
                let returned = change
                    .return_new
                    .then(|| Self::project_optional(inserted, projection));

                Ok((returned, info))
            },
            _ => Ok((None, ChangeInfo::default())),
        }
    }

    async fn drop_collection(&self) -> DocumentStoreResult<()> {
        let mut store = self.store.store.write().await;
        if let Some(collections) = store.get_mut(&self.database) {
            collections.remove(&self.name);
        }

        Ok(())
    }

    async fn ensure_index(&self, keys: &[String]) -> DocumentStoreResult<()> {
        if keys.is_empty() || keys.iter().any(|key| key.trim_start_matches(['-', '+']).is_empty()) {
            return Err(DocumentStoreError::InvalidShape("index keys must be non-empty".to_string()));
        }

        // Scans only; the collection is created so that it shows up in listings.
        let mut store = self.store.store.write().await;
        store
            .entry(self.database.clone())
            .or_default()
            .entry(self.name.clone())
            .or_default();

        Ok(())
    }
}
