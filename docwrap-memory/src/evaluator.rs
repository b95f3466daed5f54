//! Selector evaluation, projection and ordering for in-memory documents.
//!
//! Selectors use the Mongo operator dialect. Supported: field equality
//! (including array membership), `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`,
//! `$in`, `$nin`, `$exists`, `$not`, and the logical `$and`, `$or`, `$nor`.
//! Dotted paths descend into embedded documents and array indexes.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use docwrap_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Sort, SortDirection},
};


/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so that `1_i32` equals `1.0_f64`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Null, // Other types are not comparable
        }
    }
}

impl<'a> Comparable<'a> {
    /// Canonical cross-type order: null, numbers, strings, documents, arrays,
    /// object ids, booleans, dates.
    fn type_rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting result sets.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.type_rank()
            .cmp(&other.type_rank())
            .then_with(|| self.partial_cmp(other).unwrap_or(Ordering::Equal))
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            _ => None,
        }
    }
}

/// Resolves a dotted path within `document`.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Interprets a projection or flag value the way the store does.
pub(crate) fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

fn is_operator_condition(condition: &Bson) -> bool {
    matches!(
        condition,
        Bson::Document(inner) if inner.keys().next().is_some_and(|key| key.starts_with('$'))
    )
}

fn as_documents<'a>(operator: &str, value: &'a Bson) -> DocumentStoreResult<Vec<&'a Document>> {
    match value {
        Bson::Array(items) => items
            .iter()
            .map(|item| match item {
                Bson::Document(doc) => Ok(doc),
                _ => Err(DocumentStoreError::Backend(format!("{} entries must be documents", operator))),
            })
            .collect(),
        _ => Err(DocumentStoreError::Backend(format!("{} requires an array", operator))),
    }
}


/// Evaluates selectors against one document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns `true` if the document satisfies every clause of `selector`.
    pub fn evaluate(&self, selector: &Document) -> DocumentStoreResult<bool> {
        for (key, condition) in selector {
            let matched = match key.as_str() {
                "$and" => {
                    let mut all = true;
                    for clause in as_documents(key, condition)? {
                        if !self.evaluate(clause)? {
                            all = false;
                            break;
                        }
                    }
                    all
                },
                "$or" => {
                    let mut any = false;
                    for clause in as_documents(key, condition)? {
                        if self.evaluate(clause)? {
                            any = true;
                            break;
                        }
                    }
                    any
                },
                "$nor" => {
                    let mut none = true;
                    for clause in as_documents(key, condition)? {
                        if self.evaluate(clause)? {
                            none = false;
                            break;
                        }
                    }
                    none
                },
                op if op.starts_with('$') => {
                    return Err(DocumentStoreError::Backend(format!("unsupported top-level operator {}", op)));
                },
                field => self.evaluate_field(field, condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Keeps the documents that satisfy `selector`, preserving order.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        selector: &Document,
    ) -> DocumentStoreResult<Vec<&'a Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(document).evaluate(selector)? {
                matched.push(document);
            }
        }

        Ok(matched)
    }

    fn evaluate_field(&self, field: &str, condition: &Bson) -> DocumentStoreResult<bool> {
        let value = lookup(self.document, field);

        match condition {
            Bson::Document(operators) if is_operator_condition(condition) => {
                Self::evaluate_operators(value, operators)
            },
            _ => Ok(Self::equals(value, condition)),
        }
    }

    fn evaluate_operators(value: Option<&Bson>, operators: &Document) -> DocumentStoreResult<bool> {
        for (op, argument) in operators {
            let matched = match op.as_str() {
                "$eq" => Self::equals(value, argument),
                "$ne" => !Self::equals(value, argument),
                "$gt" => Self::compare(value, argument, |o| o == Ordering::Greater),
                "$gte" => Self::compare(value, argument, |o| o != Ordering::Less),
                "$lt" => Self::compare(value, argument, |o| o == Ordering::Less),
                "$lte" => Self::compare(value, argument, |o| o != Ordering::Greater),
                "$in" => match argument {
                    Bson::Array(candidates) => candidates
                        .iter()
                        .any(|candidate| Self::equals(value, candidate)),
                    _ => return Err(DocumentStoreError::Backend("$in requires an array".to_string())),
                },
                "$nin" => match argument {
                    Bson::Array(candidates) => !candidates
                        .iter()
                        .any(|candidate| Self::equals(value, candidate)),
                    _ => return Err(DocumentStoreError::Backend("$nin requires an array".to_string())),
                },
                "$exists" => value.is_some() == is_truthy(argument),
                "$not" => match argument {
                    Bson::Document(inner) => !Self::evaluate_operators(value, inner)?,
                    _ => return Err(DocumentStoreError::Backend("$not requires an operator document".to_string())),
                },
                other => {
                    return Err(DocumentStoreError::Backend(format!("unsupported operator {}", other)));
                },
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Equality with array membership: `{ tags: "a" }` matches `tags: ["a", "b"]`.
    /// A missing field equals `null`.
    fn equals(value: Option<&Bson>, target: &Bson) -> bool {
        let expected = Comparable::from(target);

        match value {
            None => expected == Comparable::Null,
            Some(Bson::Array(items)) if !matches!(target, Bson::Array(_)) => items
                .iter()
                .any(|item| Comparable::from(item) == expected),
            Some(actual) => Comparable::from(actual) == expected,
        }
    }

    fn compare(value: Option<&Bson>, target: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
        let expected = Comparable::from(target);
        let test = |candidate: &Bson| {
            Comparable::from(candidate)
                .partial_cmp(&expected)
                .is_some_and(&accept)
        };

        match value {
            None => false,
            Some(Bson::Array(items)) => items.iter().any(test),
            Some(actual) => test(actual),
        }
    }
}

/// Applies an inclusion or exclusion projection to a top-level document.
///
/// Inclusion keeps `_id` unless it is explicitly excluded.
pub(crate) fn project(document: &Document, projection: &Document) -> Document {
    let inclusive = projection
        .iter()
        .any(|(key, value)| key != "_id" && is_truthy(value));

    if inclusive {
        let keep_id = projection.get("_id").is_none_or(is_truthy);
        let mut projected = Document::new();

        for (key, value) in document {
            let listed = projection
                .get(key)
                .is_some_and(is_truthy);

            if (key == "_id" && keep_id) || (key != "_id" && listed) {
                projected.insert(key.clone(), value.clone());
            }
        }

        projected
    } else {
        let mut projected = document.clone();

        for (key, value) in projection {
            if !is_truthy(value) {
                projected.remove(key);
            }
        }

        projected
    }
}

/// Orders documents by sort directives, missing fields first when ascending.
pub(crate) fn sort_documents(documents: &mut [&Document], directives: &[String]) {
    let sorts = directives
        .iter()
        .map(|directive| Sort::parse(directive))
        .collect::<Vec<_>>();

    documents.sort_by(|a, b| {
        sorts
            .iter()
            .map(|sort| {
                let left = lookup(a, &sort.field)
                    .map(Comparable::from)
                    .unwrap_or(Comparable::Null);
                let right = lookup(b, &sort.field)
                    .map(Comparable::from)
                    .unwrap_or(Comparable::Null);

                match sort.direction {
                    SortDirection::Asc => left.sort_cmp(&right),
                    SortDirection::Desc => right.sort_cmp(&left),
                }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}
