//! No-op store types for unit tests that only exercise lifecycle plumbing.

use async_trait::async_trait;
use bson::Document;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    backend::{StoreCollection, StoreSession},
    error::DocumentStoreResult,
    query::{Change, ChangeInfo, FindQuery},
};

/// A session that only counts how often it was released.
#[derive(Debug, Default)]
pub(crate) struct NullSession {
    pub releases: Arc<AtomicUsize>,
}

#[async_trait]
impl StoreSession for NullSession {
    type Collection = NullCollection;

    fn collection(&self, _database: &str, name: &str) -> NullCollection {
        NullCollection { name: name.to_string() }
    }

    async fn drop_database(&self, _database: &str) -> DocumentStoreResult<()> {
        Ok(())
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub(crate) struct NullCollection {
    name: String,
}

#[async_trait]
impl StoreCollection for NullCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, _documents: Vec<Document>) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn find(&self, _query: FindQuery) -> DocumentStoreResult<Vec<Document>> {
        Ok(vec![])
    }

    async fn count(&self, _selector: Document) -> DocumentStoreResult<u64> {
        Ok(0)
    }

    async fn update(&self, _selector: Document, _changer: Document) -> DocumentStoreResult<ChangeInfo> {
        Ok(ChangeInfo::default())
    }

    async fn update_all(&self, _selector: Document, _changer: Document) -> DocumentStoreResult<ChangeInfo> {
        Ok(ChangeInfo::default())
    }

    async fn upsert(&self, _selector: Document, _changer: Document) -> DocumentStoreResult<ChangeInfo> {
        Ok(ChangeInfo::default())
    }

    async fn remove(&self, _selector: Document) -> DocumentStoreResult<ChangeInfo> {
        Ok(ChangeInfo::default())
    }

    async fn remove_all(&self, _selector: Document) -> DocumentStoreResult<ChangeInfo> {
        Ok(ChangeInfo::default())
    }

    async fn find_and_modify(
        &self,
        _query: FindQuery,
        _change: Change,
    ) -> DocumentStoreResult<(Option<Document>, ChangeInfo)> {
        Ok((None, ChangeInfo::default()))
    }

    async fn drop_collection(&self) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn ensure_index(&self, _keys: &[String]) -> DocumentStoreResult<()> {
        Ok(())
    }
}
