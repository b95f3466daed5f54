//! Convenient re-exports of commonly used types from docwrap.
//!
//! ```ignore
//! use docwrap::prelude::*;
//! ```
//!
//! This provides access to:
//! - The `Record` trait and its derive macro
//! - The `Database` handle and `SessionRegistry`
//! - Find and change specifications
//! - Store-client traits for scoped access
//! - Error types, configuration and the object id codec

pub use docwrap_core::{
    backend::{StoreCollection, StoreConnection, StoreDialer, StoreSession},
    config::DatabaseConfig,
    database::Database,
    error::{DocumentStoreError, DocumentStoreResult},
    object_id::{to_hex, to_object_id},
    query::{Change, ChangeInfo, FindQuery, Sort, SortDirection, normalize_sort_fields},
    record::{AnyRecord, IntoAnyRecord, Record, RecordExt},
    registry::SessionRegistry,
    session::DatabaseScope,
};
pub use docwrap_macros::Record;

pub use bson::{DateTime, Document, doc, oid::ObjectId};
pub use serde::{Deserialize, Serialize};
