//! Resolution of the collection a value belongs to.
//!
//! Typed values resolve through [`Record::collection_name`], which is read off
//! the type rather than a live instance, so an empty slice still resolves.
//! Read verbs name the record type directly. Type-erased batches resolve through [`AnyRecord`] at runtime and
//! are checked for a consistent shape.

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    record::{AnyRecord, Record},
};

/// Collection for a single record.
pub fn collection_of<R: Record>(_record: &R) -> &'static str {
    R::collection_name()
}

/// Collection for a sequence of records, resolved from the element type.
pub fn collection_for_items<R: Record>(_items: &[R]) -> &'static str {
    R::collection_name()
}

/// Collection for a type-erased batch.
///
/// Returns `Ok(None)` for an empty batch. The collection is taken from the
/// first element; any element that belongs elsewhere is a shape error.
pub fn collection_for_any(records: &[Box<dyn AnyRecord>]) -> DocumentStoreResult<Option<&'static str>> {
    let Some(first) = records.first() else {
        return Ok(None);
    };

    let name = first.record_collection();

    if let Some((index, other)) = records
        .iter()
        .enumerate()
        .find(|(_, record)| record.record_collection() != name)
    {
        return Err(DocumentStoreError::InvalidShape(format!(
            "batch element {} belongs to collection {:?}, expected {:?}",
            index,
            other.record_collection(),
            name,
        )));
    }

    Ok(Some(name))
}

#[cfg(test)]
mod tests {
    use bson::oid::ObjectId;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::record::IntoAnyRecord;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Cat {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        id: Option<ObjectId>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Dog {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        id: Option<ObjectId>,
    }

    impl Record for Cat {
        fn collection_name() -> &'static str {
            "cats"
        }

        fn make_id(&mut self) -> ObjectId {
            *self.id.get_or_insert_with(ObjectId::new)
        }
    }

    impl Record for Dog {
        fn collection_name() -> &'static str {
            "dogs"
        }

        fn make_id(&mut self) -> ObjectId {
            *self.id.get_or_insert_with(ObjectId::new)
        }
    }

    #[test]
    fn test_empty_items_resolve_from_element_type() {
        let items: Vec<Cat> = Vec::new();
        assert_eq!(collection_for_items(&items), "cats");
        assert_eq!(collection_of(&Dog::default()), "dogs");
    }

    #[test]
    fn test_any_batch_resolves_first() {
        let batch = vec![Cat::default().into_any_record(), Cat::default().into_any_record()];
        assert_eq!(collection_for_any(&batch).unwrap(), Some("cats"));
        assert_eq!(collection_for_any(&[]).unwrap(), None);
    }

    #[test]
    fn test_mixed_any_batch_is_shape_error() {
        let batch = vec![Cat::default().into_any_record(), Dog::default().into_any_record()];
        let err = collection_for_any(&batch).unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidShape(_)));
    }
}
