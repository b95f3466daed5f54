//! A thin layer that maps typed records onto untyped document collections.
//!
//! This crate is the core of the docwrap project and provides:
//!
//! - **Record traits** ([`record`]) - The capability contract every persistable type implements
//! - **Collection resolution** ([`resolve`]) - Which collection a value belongs to
//! - **Store client abstraction** ([`backend`]) - Dialer, connection, session and collection traits
//! - **Session registry** ([`registry`]) - One long-lived connection per endpoint
//! - **Scoped sessions** ([`session`]) - Session clones released on every exit path
//! - **CRUD verbs** ([`database`]) - Save, find, update, delete, count, upsert and find-and-apply
//! - **Find and change specifications** ([`query`]) - Sort, skip, limit, projection and receipts
//! - **Object id codec** ([`object_id`]) - Hexadecimal to 12-byte identity conversion
//! - **Configuration** ([`config`]) and **errors** ([`error`])
//!
//! # Example
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
//!     pub email: String,
//! }
//!
//! let registry = Arc::new(SessionRegistry::new(InMemoryDialer::default()));
//! let db = Database::new(registry, "memory://local", "app")?;
//! db.save(&mut User { id: None, email: "aaron@example.com".into() }).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docwrap_core;

pub mod backend;
pub mod config;
pub mod database;
pub mod error;
pub mod object_id;
pub mod query;
pub mod record;
pub mod registry;
pub mod resolve;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;
