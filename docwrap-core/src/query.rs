//! Find and change specifications passed through to a store collection.
//!
//! Selectors, projections and changers are plain BSON documents in the Mongo
//! operator dialect and are never interpreted here. This module only carries
//! them alongside the sort, skip and limit directives.
//!
//! # Query Building
//!
//! ```ignore
//! use docwrap::query::FindQuery;
//! use bson::doc;
//!
//! let query = FindQuery::builder()
//!     .filter(doc! { "status": "active" })
//!     .sort(["-created_at"])
//!     .limit(10)
//!     .build();
//! ```

use bson::{Bson, Document, doc};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort specification for one field of query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    /// Parses a sort directive where a leading `-` means descending.
    pub fn parse(directive: &str) -> Self {
        match directive.strip_prefix('-') {
            Some(field) => Sort { field: field.to_string(), direction: SortDirection::Desc },
            None => Sort {
                field: directive.strip_prefix('+').unwrap_or(directive).to_string(),
                direction: SortDirection::Asc,
            },
        }
    }
}

/// Trims and lower-cases sort directives, dropping blank entries.
///
/// ```ignore
/// assert_eq!(normalize_sort_fields(["  Name ", "", "Age"]), vec!["name", "age"]);
/// ```
pub fn normalize_sort_fields<I, S>(fields: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .filter_map(|field| {
            let trimmed = field.as_ref().trim();
            (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
        })
        .collect()
}

/// Builds a Mongo-style sort document (`{ field: 1 | -1 }`) from directives.
pub fn sort_document<S: AsRef<str>>(fields: &[S]) -> Document {
    fields
        .iter()
        .map(|field| Sort::parse(field.as_ref()))
        .map(|sort| {
            let order = match sort.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            (sort.field, Bson::Int32(order))
        })
        .collect()
}

/// Returns `true` if any top-level key of `changer` is an update operator.
///
/// A changer without operators is a full replacement document.
pub fn is_operator_document(changer: &Document) -> bool {
    changer.keys().any(|key| key.starts_with('$'))
}

/// A structured find request for one collection.
///
/// Use [`FindQueryBuilder`] for ergonomic construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    /// Selector matching documents. Empty matches everything.
    pub filter: Document,
    /// Optional field projection.
    pub projection: Option<Document>,
    /// Ordered sort directives, `-field` for descending.
    pub sort: Vec<String>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
}

impl FindQuery {
    /// Creates a query matching `filter` with no other directives.
    pub fn new(filter: Document) -> Self {
        FindQuery { filter, ..Default::default() }
    }

    /// Creates a query matching the document with the given `_id`.
    pub fn by_id(id: impl Into<Bson>) -> Self {
        FindQuery::new(doc! { "_id": id.into() })
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> FindQueryBuilder {
        FindQueryBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindQueryBuilder {
    query: FindQuery,
}

impl FindQueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        FindQueryBuilder { query: FindQuery::default() }
    }

    /// Sets the selector for this query.
    pub fn filter(mut self, filter: Document) -> Self {
        self.query.filter = filter;
        self
    }

    /// Restricts returned fields to `projection`.
    pub fn projection(mut self, projection: Document) -> Self {
        self.query.projection = Some(projection);
        self
    }

    /// Sets the sort directives verbatim.
    pub fn sort<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.sort = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the number of documents to skip. Zero or negative leaves it unset.
    pub fn skip(mut self, skip: i64) -> Self {
        self.query.skip = u64::try_from(skip).ok().filter(|n| *n > 0);
        self
    }

    /// Sets the maximum number of documents returned. Zero or negative leaves it unset.
    pub fn limit(mut self, limit: i64) -> Self {
        self.query.limit = u64::try_from(limit).ok().filter(|n| *n > 0);
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> FindQuery {
        self.query
    }
}

/// A find-and-modify change applied atomically by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Change {
    /// Update or replacement applied to the matched document.
    pub update: Option<Document>,
    /// Insert a new document when nothing matches.
    pub upsert: bool,
    /// Remove the matched document instead of updating it.
    pub remove: bool,
    /// Return the document after the change instead of before.
    pub return_new: bool,
}

impl Change {
    /// A change that applies `update` to the matched document.
    pub fn update(update: Document) -> Self {
        Change { update: Some(update), ..Default::default() }
    }

    /// A change that removes the matched document.
    pub fn remove() -> Self {
        Change { remove: true, ..Default::default() }
    }

    /// Inserts a new document when nothing matches.
    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    /// Returns the modified document rather than the original.
    pub fn with_return_new(mut self, return_new: bool) -> Self {
        self.return_new = return_new;
        self
    }
}

/// Receipt describing how many documents a write affected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeInfo {
    /// Number of documents matched by the selector.
    pub matched: u64,
    /// Number of documents updated in place.
    pub updated: u64,
    /// Number of documents removed.
    pub removed: u64,
    /// Identity of the inserted document when an upsert inserted one.
    pub upserted_id: Option<Bson>,
}

impl ChangeInfo {
    /// Returns `true` if the write touched at least one document.
    pub fn affected_any(&self) -> bool {
        self.matched > 0 || self.removed > 0 || self.upserted_id.is_some()
    }
}
