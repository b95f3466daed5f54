//! MongoDB backend implementation for docwrap.
//!
//! This crate implements the store-client traits of [`docwrap_core::backend`]
//! on the official async MongoDB driver. Selectors, changers and projections
//! are passed to the server untouched.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docwrap = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Connection pooling** - One pooled client per endpoint, tuned with [`PoolConfig`]
//! - **Fail-fast dialing** - Endpoints are pinged while dialing unless disabled
//! - **Atomic find-and-modify** - Receipts are parsed from the server reply
//! - **Indexing** - Compound and descending index keys
//!
//! # Example
//!
//! ```ignore
//! use docwrap::{prelude::*, mongodb::MongoDbDialer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dialer = MongoDbDialer::builder().max_pool_size(20).build();
//!     let registry = Arc::new(SessionRegistry::new(dialer));
//!     let db = Database::new(registry, "mongodb://localhost:27017", "my_database")?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docwrap_mongodb;

pub mod store;
mod query;

pub use store::{MongoDbCollection, MongoDbConnection, MongoDbDialer, MongoDbDialerBuilder, MongoDbSession, PoolConfig};
