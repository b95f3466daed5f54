//! In-memory document store backend for docwrap.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! store-client traits in [`docwrap_core::backend`]. It uses async-aware
//! read-write locks for concurrent access and is intended for development and
//! testing.
//!
//! # Features
//!
//! - **Mongo-style selectors** - Equality, comparison, membership, existence and logical operators
//! - **Update operators** - `$set`, `$unset`, `$inc`, `$push`, `$pull`, `$setOnInsert` and replacements
//! - **Session accounting** - [`InMemoryStore::open_sessions`] reports unreleased session clones
//! - **Dial accounting** - [`InMemoryDialer::dial_count`] reports how often an endpoint was dialed
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
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(SessionRegistry::new(InMemoryDialer::new()));
//!     let db = Database::new(registry, "memory://local", "app")?;
//!
//!     let mut user = User { id: None, name: "Alice".to_string() };
//!     db.save(&mut user).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docwrap_memory;

pub mod store;
mod evaluator;
mod update;

pub use store::{InMemoryCollection, InMemoryDialer, InMemoryDialerBuilder, InMemorySession, InMemoryStore, MEMORY_SCHEME};
