//! Remote platform capability.
//!
//! The audit core depends on exactly three remote operations: a structured
//! query returning records, a describe of a named object type, and a bulk
//! retrieve of named metadata documents. Transport, authentication and
//! document parsing belong to the implementor.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod cache;

pub use cache::MetadataCache;

/// A single query result row.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// A field on a described object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescribe {
    /// API name of the field.
    pub name: String,
    /// Field type as reported by the platform.
    #[serde(default)]
    pub field_type: String,
}

/// Schema of an object type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescribe {
    /// API name of the object type.
    pub name: String,
    /// Fields available to the connected user.
    pub fields: Vec<FieldDescribe>,
}

impl ObjectDescribe {
    /// Whether the object exposes a field with the given name.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}

/// Errors from remote operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    /// A structured query failed.
    #[error("query failed ({query}): {message}")]
    Query {
        /// Query text.
        query: String,
        /// Failure description.
        message: String,
    },

    /// Describing an object type failed.
    #[error("describe of {object} failed: {message}")]
    Describe {
        /// Object type name.
        object: String,
        /// Failure description.
        message: String,
    },

    /// Retrieving metadata documents failed.
    #[error("retrieve of {metadata_type} metadata failed: {message}")]
    Metadata {
        /// Metadata type name.
        metadata_type: String,
        /// Failure description.
        message: String,
    },

    /// The transport itself failed.
    #[error("transport error: {0}")]
    Transport(String),
}

/// The remote system under audit.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Identifier of the audited system (for example an organisation id).
    fn subject_id(&self) -> &str;

    /// Run a structured query and return all matching records.
    async fn query(&self, soql: &str) -> Result<Vec<Record>, ConnectionError>;

    /// Describe an object type.
    async fn describe(&self, object: &str) -> Result<ObjectDescribe, ConnectionError>;

    /// Retrieve named metadata documents of one type.
    ///
    /// Names that do not exist remotely are absent from the returned map.
    async fn retrieve_metadata(
        &self,
        metadata_type: &str,
        names: &[String],
    ) -> Result<HashMap<String, serde_json::Value>, ConnectionError>;
}

// ---------------------------------------------------------------------------
// Record helpers
// ---------------------------------------------------------------------------

/// Read a string field, following dotted relationship paths (`Profile.Name`).
pub fn record_str<'a>(record: &'a Record, path: &str) -> Option<&'a str> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut value = record.get(first)?;
    for segment in segments {
        value = value.get(segment)?;
    }
    value.as_str()
}

/// Read a boolean field, accepting `"true"`/`"false"` strings.
pub fn record_bool(record: &Record, field: &str) -> Option<bool> {
    match record.get(field)? {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
