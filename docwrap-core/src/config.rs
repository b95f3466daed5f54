//! Connection parameters for a [`Database`](crate::database::Database) handle.

use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Where a logical database lives.
///
/// Deserializable so it can be embedded in an application's own configuration.
///
/// ```ignore
/// let config: DatabaseConfig = serde_json::from_str(
///     r#"{ "dial_string": "mongodb://localhost:27017", "name": "app" }"#,
/// )?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Endpoint passed to the store dialer.
    pub dial_string: String,
    /// Logical database name within the endpoint.
    pub name: String,
}

impl DatabaseConfig {
    pub fn new(dial_string: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            dial_string: dial_string.into(),
            name: name.into(),
        }
    }

    /// Checks that both the dial string and the database name are non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] naming the missing parameter.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        if self.dial_string.trim().is_empty() {
            return Err(DocumentStoreError::Configuration(
                "must provide a valid dial string".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(DocumentStoreError::Configuration(
                "must provide a valid database name".to_string(),
            ));
        }

        Ok(())
    }
}
