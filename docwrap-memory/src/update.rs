//! Changer application for in-memory documents.
//!
//! A changer is either an operator document (`$set`, `$unset`, `$inc`,
//! `$push`, `$pull`, `$setOnInsert`) or a full replacement document.

use bson::{Bson, Document, oid::ObjectId};

use docwrap_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::is_operator_document,
};

use crate::evaluator::{Comparable, lookup};


/// Applies changers and builds upsert seeds.
pub(crate) struct DocumentUpdater;

impl DocumentUpdater {
    /// Applies `changer` to `target` in place.
    ///
    /// `inserting` enables `$setOnInsert`. A replacement keeps the existing
    /// `_id` and fails if it names a different one.
    pub fn apply(target: &mut Document, changer: &Document, inserting: bool) -> DocumentStoreResult<()> {
        if !is_operator_document(changer) {
            return Self::replace(target, changer);
        }

        for (op, fields) in changer {
            let fields = match fields {
                Bson::Document(fields) => fields,
                _ => return Err(DocumentStoreError::Backend(format!("{} requires a document of fields", op))),
            };

            for (path, value) in fields {
                if path == "_id" && op != "$setOnInsert" && target.contains_key("_id") {
                    return Err(DocumentStoreError::Backend("the _id field cannot be changed".to_string()));
                }

                match op.as_str() {
                    "$set" => set_path(target, path, value.clone())?,
                    "$setOnInsert" => {
                        if inserting {
                            set_path(target, path, value.clone())?;
                        }
                    },
                    "$unset" => {
                        remove_path(target, path);
                    },
                    "$inc" => {
                        let current = get_path(target, path);
                        let sum = increment(current, value, path)?;
                        set_path(target, path, sum)?;
                    },
                    "$push" => match get_path(target, path) {
                        None => set_path(target, path, Bson::Array(vec![value.clone()]))?,
                        Some(Bson::Array(items)) => {
                            let mut items = items.clone();
                            items.push(value.clone());
                            set_path(target, path, Bson::Array(items))?;
                        },
                        Some(_) => {
                            return Err(DocumentStoreError::Backend(format!("cannot $push to non-array field {}", path)));
                        },
                    },
                    "$pull" => {
                        if let Some(Bson::Array(items)) = get_path(target, path) {
                            let unwanted = Comparable::from(value);
                            let kept = items
                                .iter()
                                .filter(|item| Comparable::from(*item) != unwanted)
                                .cloned()
                                .collect::<Vec<_>>();
                            set_path(target, path, Bson::Array(kept))?;
                        }
                    },
                    other => {
                        return Err(DocumentStoreError::Backend(format!("unsupported update operator {}", other)));
                    },
                }
            }
        }

        Ok(())
    }

    /// Builds the document an upsert inserts when nothing matches.
    pub fn upsert_document(selector: &Document, changer: &Document) -> DocumentStoreResult<Document> {
        let mut document = Self::seed(selector)?;

        if is_operator_document(changer) {
            Self::apply(&mut document, changer, true)?;
        } else {
            let id = document
                .get("_id")
                .or_else(|| changer.get("_id"))
                .cloned();
            document = changer.clone();
            if let Some(id) = id {
                document.insert("_id", id);
            }
        }

        Ok(with_leading_id(document))
    }

    fn replace(target: &mut Document, replacement: &Document) -> DocumentStoreResult<()> {
        let existing = target.get("_id").cloned();

        if let (Some(current), Some(proposed)) = (&existing, replacement.get("_id")) {
            if Comparable::from(current) != Comparable::from(proposed) {
                return Err(DocumentStoreError::Backend("the _id field cannot be changed".to_string()));
            }
        }

        let mut replaced = Document::new();
        if let Some(id) = existing.or_else(|| replacement.get("_id").cloned()) {
            replaced.insert("_id", id);
        }
        for (key, value) in replacement {
            if key != "_id" {
                replaced.insert(key.clone(), value.clone());
            }
        }

        *target = replaced;
        Ok(())
    }

    /// Equality clauses of the selector become fields of the inserted document.
    fn seed(selector: &Document) -> DocumentStoreResult<Document> {
        let mut seed = Document::new();

        for (key, condition) in selector {
            if key.starts_with('$') {
                continue;
            }

            match condition {
                Bson::Document(inner) if inner.keys().next().is_some_and(|k| k.starts_with('$')) => {
                    if let Some(value) = inner.get("$eq") {
                        set_path(&mut seed, key, value.clone())?;
                    }
                },
                value => set_path(&mut seed, key, value.clone())?,
            }
        }

        Ok(seed)
    }
}

/// Moves `_id` to the front, generating one if absent.
pub(crate) fn with_leading_id(document: Document) -> Document {
    let mut ordered = Document::new();
    let id = document
        .get("_id")
        .cloned()
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

    ordered.insert("_id", id);
    for (key, value) in document {
        if key != "_id" {
            ordered.insert(key, value);
        }
    }

    ordered
}

fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    lookup(document, path)
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        },
        Some((head, rest)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));

            match child {
                Bson::Document(inner) => set_path(inner, rest, value),
                _ => Err(DocumentStoreError::Backend(format!("cannot create field {} inside a non-document", path))),
            }
        },
    }
}

fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head) {
            Some(Bson::Document(inner)) => remove_path(inner, rest),
            _ => None,
        },
    }
}

fn increment(current: Option<&Bson>, by: &Bson, path: &str) -> DocumentStoreResult<Bson> {
    let non_numeric = || DocumentStoreError::Backend(format!("cannot $inc non-numeric field {}", path));
    let long_sum = |a: i64, b: i64| {
        a.checked_add(b)
            .map(Bson::Int64)
            .ok_or_else(|| DocumentStoreError::Backend(format!("$inc of field {} overflows a 64-bit integer", path)))
    };

    let sum = match (current.unwrap_or(&Bson::Int32(0)), by) {
        (Bson::Int32(a), Bson::Int32(b)) => a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(*a as i64 + *b as i64)),
        (Bson::Int32(a), Bson::Int64(b)) => long_sum(*a as i64, *b)?,
        (Bson::Int64(a), Bson::Int32(b)) => long_sum(*a, *b as i64)?,
        (Bson::Int64(a), Bson::Int64(b)) => long_sum(*a, *b)?,
        (current, by) => {
            let a = as_f64(current).ok_or_else(non_numeric)?;
            let b = as_f64(by).ok_or_else(non_numeric)?;
            Bson::Double(a + b)
        },
    };

    Ok(sum)
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}
