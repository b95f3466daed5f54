//! Command and option translation for the MongoDB driver.
//!
//! Selectors and changers are already in MongoDB's operator dialect, so this
//! module only builds the surrounding command documents and interprets the
//! server's replies.

use bson::{Bson, Document, doc};

use docwrap_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Change, ChangeInfo, FindQuery, sort_document},
};


/// Builds an index key specification from `-field` style directives.
pub(crate) fn index_keys(keys: &[String]) -> DocumentStoreResult<Document> {
    if keys.is_empty() || keys.iter().any(|key| key.trim_start_matches(['-', '+']).is_empty()) {
        return Err(DocumentStoreError::InvalidShape("index keys must be non-empty".to_string()));
    }

    Ok(sort_document(keys))
}

/// Builds a `findAndModify` command for `collection`.
pub(crate) fn find_and_modify_command(
    collection: &str,
    query: &FindQuery,
    change: &Change,
) -> DocumentStoreResult<Document> {
    let mut command = doc! {
        "findAndModify": collection,
        "query": query.filter.clone(),
    };

    if !query.sort.is_empty() {
        command.insert("sort", sort_document(&query.sort));
    }
    if let Some(projection) = &query.projection {
        command.insert("fields", projection.clone());
    }

    match (change.remove, &change.update) {
        (true, _) => {
            command.insert("remove", true);
        },
        (false, Some(update)) => {
            command.insert("update", update.clone());
            command.insert("new", change.return_new);
            command.insert("upsert", change.upsert);
        },
        (false, None) => {
            return Err(DocumentStoreError::InvalidShape(
                "a change needs an update document or remove".to_string(),
            ));
        },
    }

    Ok(command)
}

fn as_count(value: Option<&Bson>) -> u64 {
    match value {
        Some(Bson::Int32(n)) => (*n).max(0) as u64,
        Some(Bson::Int64(n)) => (*n).max(0) as u64,
        Some(Bson::Double(n)) => n.max(0.0) as u64,
        _ => 0,
    }
}

/// Splits a `findAndModify` reply into the returned document and a receipt.
pub(crate) fn parse_find_and_modify_reply(reply: &Document, change: &Change) -> (Option<Document>, ChangeInfo) {
    let value = match reply.get("value") {
        Some(Bson::Document(document)) => Some(document.clone()),
        _ => None,
    };

    let empty = Document::new();
    let last_error = reply.get_document("lastErrorObject").unwrap_or(&empty);
    let n = as_count(last_error.get("n"));
    let updated_existing = last_error.get_bool("updatedExisting").unwrap_or(false);

    let info = if change.remove {
        ChangeInfo { matched: n, removed: n, ..Default::default() }
    } else if change.upsert && !updated_existing {
        ChangeInfo { upserted_id: last_error.get("upserted").cloned(), ..Default::default() }
    } else {
        ChangeInfo { matched: n, updated: n, ..Default::default() }
    };

    (value, info)
}
