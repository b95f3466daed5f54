//! Conversion between hexadecimal identifier strings and 12-byte object ids.

use bson::oid::ObjectId;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Number of raw bytes in a canonical object id.
pub const OBJECT_ID_LEN: usize = 12;

/// Decodes a 24-character hexadecimal string into an [`ObjectId`].
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidObjectId`] carrying the offending input
/// when the string is not hexadecimal or does not decode to exactly 12 bytes.
pub fn to_object_id(id_hex: &str) -> DocumentStoreResult<ObjectId> {
    ObjectId::parse_str(id_hex).map_err(|_| DocumentStoreError::InvalidObjectId(id_hex.to_string()))
}

/// Encodes an [`ObjectId`] as lowercase hexadecimal. Inverse of [`to_object_id`].
pub fn to_hex(id: &ObjectId) -> String {
    id.to_hex()
}

/// Builds an [`ObjectId`] from a raw byte slice that must be exactly 12 bytes long.
pub fn from_slice(bytes: &[u8]) -> DocumentStoreResult<ObjectId> {
    let raw: [u8; OBJECT_ID_LEN] = bytes.try_into().map_err(|_| {
        DocumentStoreError::InvalidObjectId(format!("{} raw bytes", bytes.len()))
    })?;

    Ok(ObjectId::from_bytes(raw))
}
