//! Store-client abstraction underneath the CRUD layer.
//!
//! A backend is described by four traits that mirror a networked document
//! store client:
//!
//! - [`StoreDialer`]: establishes a long-lived [`StoreConnection`] for an endpoint
//! - [`StoreConnection`]: a cheaply clonable handle that checks out session clones
//! - [`StoreSession`]: a disposable clone for one unit of work, released afterwards
//! - [`StoreCollection`]: the collection operations executed on a session
//!
//! Selectors, changers and projections are passed through untouched. A
//! selector that matches nothing is reported through the returned
//! [`ChangeInfo`] or `None`, never as an error.
//!
//! # Examples
//!
//! ```ignore
//! use docwrap::backend::*;
//! use bson::doc;
//!
//! let connection = dialer.dial("memory://local").await?;
//! let mut session = connection.clone_session()?;
//! let users = session.collection("app", "users");
//! users.insert(vec![doc! { "name": "Alice" }]).await?;
//! session.release();
//! ```

use async_trait::async_trait;
use bson::Document;
use std::fmt::Debug;

use crate::{
    error::DocumentStoreResult,
    query::{Change, ChangeInfo, FindQuery},
};

/// Factory that dials a store endpoint.
///
/// Dialing is expected to be expensive. The
/// [`SessionRegistry`](crate::registry::SessionRegistry) calls it at most once
/// per distinct endpoint.
#[async_trait]
pub trait StoreDialer: Send + Sync + Debug + 'static {
    /// The long-lived connection type produced by this dialer.
    type Connection: StoreConnection;

    /// Establishes a new connection to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`](crate::error::DocumentStoreError::Initialization)
    /// if the endpoint cannot be reached or parsed.
    async fn dial(&self, endpoint: &str) -> DocumentStoreResult<Self::Connection>;
}

/// A long-lived connection shared by every operation against one endpoint.
///
/// Cloning must be cheap; clones refer to the same underlying connection.
pub trait StoreConnection: Clone + Send + Sync + Debug + 'static {
    /// The session clone type checked out by this connection.
    type Session: StoreSession;

    /// Checks out a session clone for one logical unit of work.
    fn clone_session(&self) -> DocumentStoreResult<Self::Session>;
}

/// A disposable session clone.
///
/// [`release`](StoreSession::release) is called exactly once when the unit of
/// work ends. Implementations must not release again on drop.
#[async_trait]
pub trait StoreSession: Send + Sync + Debug + 'static {
    /// The collection handle type resolved on this session.
    type Collection: StoreCollection;

    /// Resolves the named collection within the named database.
    fn collection(&self, database: &str, name: &str) -> Self::Collection;

    /// Drops the named database with all of its collections.
    async fn drop_database(&self, database: &str) -> DocumentStoreResult<()>;

    /// Returns the session to its connection.
    fn release(&mut self);
}

/// Operations on a single collection.
///
/// All implementations must be thread-safe. Each method is one round trip
/// against the store.
#[async_trait]
pub trait StoreCollection: Send + Sync + Debug + 'static {
    /// Returns the name of this collection.
    fn name(&self) -> &str;

    /// Inserts documents without ordering guarantees.
    ///
    /// A failure part way through may leave earlier documents persisted.
    async fn insert(&self, documents: Vec<Document>) -> DocumentStoreResult<()>;

    /// Returns every document matching `query`, honoring sort, skip, limit and projection.
    async fn find(&self, query: FindQuery) -> DocumentStoreResult<Vec<Document>>;

    /// Returns the first document matching `query`.
    ///
    /// The default implementation runs [`find`](StoreCollection::find) with a limit of one.
    async fn find_one(&self, query: FindQuery) -> DocumentStoreResult<Option<Document>> {
        let query = FindQuery { limit: Some(1), ..query };

        Ok(self.find(query).await?.into_iter().next())
    }

    /// Counts documents matching `selector`.
    async fn count(&self, selector: Document) -> DocumentStoreResult<u64>;

    /// Applies `changer` to the first document matching `selector`.
    async fn update(&self, selector: Document, changer: Document) -> DocumentStoreResult<ChangeInfo>;

    /// Applies `changer` to every document matching `selector`.
    async fn update_all(&self, selector: Document, changer: Document) -> DocumentStoreResult<ChangeInfo>;

    /// Applies `changer` to the first match, inserting a new document if none match.
    async fn upsert(&self, selector: Document, changer: Document) -> DocumentStoreResult<ChangeInfo>;

    /// Removes the first document matching `selector`.
    async fn remove(&self, selector: Document) -> DocumentStoreResult<ChangeInfo>;

    /// Removes every document matching `selector`.
    async fn remove_all(&self, selector: Document) -> DocumentStoreResult<ChangeInfo>;

    /// Atomically finds one document and applies `change` to it.
    ///
    /// Returns the document before or after the change, per
    /// [`Change::return_new`], and a receipt.
    async fn find_and_modify(
        &self,
        query: FindQuery,
        change: Change,
    ) -> DocumentStoreResult<(Option<Document>, ChangeInfo)>;

    /// Drops the entire collection. Dropping a missing collection succeeds.
    async fn drop_collection(&self) -> DocumentStoreResult<()>;

    /// Ensures an index over `keys` exists; `-key` marks a descending key.
    async fn ensure_index(&self, keys: &[String]) -> DocumentStoreResult<()>;
}
