//! Main docwrap crate providing typed CRUD access to document collections.
//!
//! This crate is the primary entry point for users of the docwrap project. It
//! re-exports the core types from the sub-crates and provides access to the
//! available store backends.
//!
//! # Features
//!
//! - **Typed records** - Define data structures with Serde and `#[derive(Record)]`
//! - **One connection per endpoint** - Dialed lazily and shared by every handle
//! - **Scoped sessions** - Every operation checks out a session clone and always releases it
//! - **Pass-through selectors** - Filters and changers use the Mongo operator dialect
//!
//! # Quick Start
//!
//! ```ignore
//! use docwrap::{prelude::*, memory::InMemoryDialer};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Record)]
//! #[record(collection = "users")]
//! pub struct User {
//!     #[record(id)]
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let registry = Arc::new(SessionRegistry::new(InMemoryDialer::new()));
//!     let db = Database::new(registry, "memory://local", "app")?;
//!
//!     let mut user = User { id: None, name: "Alice".to_string() };
//!     db.save(&mut user).await?;
//!
//!     let found: Option<User> = db.find(doc! { "name": "Alice" }).await?;
//!     println!("Found user: {:?}", found);
//!
//!     let updated = db.update::<User>(doc! { "name": "Alice" }, doc! { "$set": { "name": "Alicia" } }).await?;
//!     assert!(updated);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Scoped Access
//!
//! Anything the CRUD verbs do not cover can run on a raw collection handle.
//! The session behind it is released when the closure's future completes,
//! fails or panics.
//!
//! ```ignore
//! let names = db
//!     .collection_do("users", move |users| async move {
//!         users.find(FindQuery::new(doc! {})).await
//!     })
//!     .await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docwrap_core::{backend, config, database, error, object_id, query, record, registry, resolve, session};

// Re-export BSON types for convenience
pub use bson;

pub use docwrap_macros::Record;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docwrap_memory::{InMemoryCollection, InMemoryDialer, InMemoryDialerBuilder, InMemorySession, InMemoryStore, MEMORY_SCHEME};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docwrap_mongodb::{MongoDbCollection, MongoDbConnection, MongoDbDialer, MongoDbDialerBuilder, MongoDbSession, PoolConfig};
}
