//! Core traits for records that can be persisted into a collection.
//!
//! A record is any serde-serializable type that can name the collection it is
//! stored in and produce a stable identity. The store never looks at a record's
//! fields beyond those two capabilities and the optional modification stamp.

use bson::{DateTime, Document, oid::ObjectId, de::deserialize_from_document, ser::serialize_to_document};
use serde::{Serialize, de::DeserializeOwned};
use std::any::Any;

use crate::error::DocumentStoreResult;

/// Capability contract every persistable type implements.
///
/// The identity is stored under the `_id` key, so the id field is normally
/// declared as `#[serde(rename = "_id", skip_serializing_if = "Option::is_none")]`.
///
/// # Example
///
/// ```ignore
/// use docwrap::record::Record;
/// use bson::oid::ObjectId;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     pub id: Option<ObjectId>,
///     pub email: String,
/// }
///
/// impl Record for User {
///     fn collection_name() -> &'static str {
///         "users"
///     }
///
///     fn make_id(&mut self) -> ObjectId {
///         *self.id.get_or_insert_with(ObjectId::new)
///     }
/// }
/// ```
///
/// The same impl can be generated with `#[derive(Record)]`.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the name of the collection this record type belongs to.
    ///
    /// This is an associated function so the collection can be resolved from
    /// the type alone, e.g. for an empty result vector.
    fn collection_name() -> &'static str;

    /// Returns this record's identity, generating and caching one if unset.
    fn make_id(&mut self) -> ObjectId;

    /// Stamps the record with its last-modified time before it is saved.
    ///
    /// The default implementation does nothing.
    fn stamp_modified(&mut self, _at: DateTime) {}
}

/// Extension trait providing conversion utilities for records.
///
/// Automatically implemented for every [`Record`].
pub trait RecordExt: Record {
    /// Converts this record to a BSON document.
    fn to_document(&self) -> DocumentStoreResult<Document>;

    /// Ensures the record has an identity and returns it along with the
    /// record's document, whose `_id` key is guaranteed to hold that identity.
    fn to_identified_document(&mut self) -> DocumentStoreResult<(ObjectId, Document)>;

    /// Creates a record from a BSON document.
    fn from_document(document: Document) -> DocumentStoreResult<Self>;
}

impl<R: Record> RecordExt for R {
    fn to_document(&self) -> DocumentStoreResult<Document> {
        Ok(serialize_to_document(self)?)
    }

    fn to_identified_document(&mut self) -> DocumentStoreResult<(ObjectId, Document)> {
        let id = self.make_id();
        let mut document = self.to_document()?;
        document.insert("_id", id);

        Ok((id, document))
    }

    fn from_document(document: Document) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_document(document)?)
    }
}

/// Type-erased record trait for handling records of different types uniformly.
///
/// Useful when a batch is assembled at runtime from several record types and
/// the concrete type is not known at the call site.
pub trait AnyRecord: Send + Sync {
    /// Returns the name of the collection this record belongs to.
    fn record_collection(&self) -> &'static str;

    /// Returns this record's identity, generating one if unset.
    fn record_id(&mut self) -> ObjectId;

    /// Stamps the record with its last-modified time.
    fn stamp_record(&mut self, at: DateTime);

    /// Converts this record to a BSON document.
    fn to_record_document(&self) -> DocumentStoreResult<Document>;

    /// Returns a reference to the record as a generic `Any` type.
    fn as_any(&self) -> &dyn Any;
}

impl dyn AnyRecord {
    /// Attempts to downcast a reference to a specific record type.
    pub fn downcast_ref<R: Record>(&self) -> Option<&R> {
        self.as_any().downcast_ref::<R>()
    }
}

impl<R: Record> AnyRecord for R {
    fn record_collection(&self) -> &'static str {
        R::collection_name()
    }

    fn record_id(&mut self) -> ObjectId {
        self.make_id()
    }

    fn stamp_record(&mut self, at: DateTime) {
        self.stamp_modified(at)
    }

    fn to_record_document(&self) -> DocumentStoreResult<Document> {
        RecordExt::to_document(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Conversion trait for boxing a record into a type-erased [`AnyRecord`].
pub trait IntoAnyRecord {
    /// Converts this value into a boxed `AnyRecord`.
    fn into_any_record(self) -> Box<dyn AnyRecord>;
}

impl<R: Record> IntoAnyRecord for R {
    fn into_any_record(self) -> Box<dyn AnyRecord> {
        Box::new(self) as Box<dyn AnyRecord>
    }
}

impl IntoAnyRecord for Box<dyn AnyRecord> {
    fn into_any_record(self) -> Box<dyn AnyRecord> {
        self
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        id: Option<ObjectId>,
        body: String,
    }

    impl Record for Note {
        fn collection_name() -> &'static str {
            "notes"
        }

        fn make_id(&mut self) -> ObjectId {
            *self.id.get_or_insert_with(ObjectId::new)
        }
    }

    #[test]
    fn test_make_id_is_stable() {
        let mut note = Note { id: None, body: "hi".into() };
        let first = note.make_id();

        assert_eq!(note.make_id(), first);
        assert_eq!(note.id, Some(first));
    }

    #[test]
    fn test_identified_document_carries_id() {
        let mut note = Note { id: None, body: "hi".into() };
        let (id, document) = note.to_identified_document().unwrap();

        assert_eq!(document.get("_id"), Some(&bson::Bson::ObjectId(id)));
        assert_eq!(Note::from_document(document).unwrap(), note);
    }

    #[test]
    fn test_any_record_downcast() {
        let boxed = Note { id: None, body: "x".into() }.into_any_record();

        assert_eq!(boxed.record_collection(), "notes");
        assert_eq!(boxed.downcast_ref::<Note>().map(|n| n.body.as_str()), Some("x"));
    }
}
