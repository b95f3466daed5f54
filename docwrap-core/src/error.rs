//! Error types and result types for document store operations.
//!
//! Every fallible operation in this crate returns [`DocumentStoreResult<T>`].
//! A selector that matches nothing is never reported through this type: reads
//! return `None` or an empty `Vec`, writes return `false` or a zeroed receipt.

use bson::error::Error as BsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
///
/// [`DocumentStoreError::Configuration`] is a contract error: it means the
/// program was wired up wrong and retrying will not help. Every other variant
/// is operational and may be retried at the caller's discretion.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between record and document formats.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The database handle was constructed with an empty dial string or database name.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Dialing the store endpoint failed.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A hexadecimal identifier could not be decoded into a 12-byte object id.
    #[error("Invalid input to ObjectIdHex: {0:?}")]
    InvalidObjectId(String),
    /// A caller argument does not have the shape the operation requires.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),
    /// A document with the given id already exists in the collection.
    /// The first argument is the document id, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Returns `true` for errors that indicate a programming or wiring mistake.
    pub fn is_configuration(&self) -> bool {
        matches!(self, DocumentStoreError::Configuration(_))
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
