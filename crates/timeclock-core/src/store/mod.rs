//! Keyed document storage used as the backing store for attendance logs.
//!
//! Documents are JSON objects addressed by `(collection, id)`. The only write
//! the attendance workflow performs is an array union on one field, which
//! tolerates concurrent appends from other writers without a prior read.

mod libsql_store;
mod memory;
mod migrations;

use std::fmt;
use std::future::Future;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::json_type_name;

pub use libsql_store::LibSqlDocumentStore;
pub use memory::MemoryDocumentStore;

/// Collection holding one document per authenticated user
pub const USERS_COLLECTION: &str = "users";

/// A stored document: a JSON object
pub type Document = Map<String, Value>;

/// Result type for document store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors reported by a document store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed document does not exist
    #[error("Document not found: {0}")]
    NotFound(DocumentKey),

    /// The store could not be reached
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    /// The document (or field) has an unexpected shape
    #[error("Invalid document {key}: {reason}")]
    InvalidDocument { key: DocumentKey, reason: String },

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Address of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    pub collection: String,
    pub id: String,
}

impl DocumentKey {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Key of a user's record: `("users", uid)`
    pub fn user(uid: impl Into<String>) -> Self {
        Self::new(USERS_COLLECTION, uid)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Field-level merge operation applied by [`DocumentStore::update`]
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Append each value that is not already present in the array field
    ArrayUnion(Vec<Value>),
}

impl FieldUpdate {
    /// Union of a single value
    pub fn union_one(value: Value) -> Self {
        Self::ArrayUnion(vec![value])
    }

    /// Apply the update to `field` of `document` in place.
    ///
    /// A missing field is created. Elements are compared by deep equality, so
    /// re-applying the same union is a no-op.
    pub fn apply(&self, key: &DocumentKey, document: &mut Document, field: &str) -> StoreResult<()> {
        match self {
            Self::ArrayUnion(values) => {
                let slot = document
                    .entry(field.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                let Value::Array(items) = slot else {
                    return Err(StoreError::InvalidDocument {
                        key: key.clone(),
                        reason: format!(
                            "field '{field}' is a {}, not an array",
                            json_type_name(slot)
                        ),
                    });
                };
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
                Ok(())
            }
        }
    }
}

/// Trait for keyed document storage operations
///
/// Implementations must be shareable across tasks; the session tracker issues
/// reads and writes from spawned tasks.
pub trait DocumentStore: Send + Sync + 'static {
    /// Read a document, `None` when it does not exist
    fn get(&self, key: &DocumentKey)
        -> impl Future<Output = StoreResult<Option<Document>>> + Send;

    /// Merge `update` into `field` of an existing document
    ///
    /// Fails with [`StoreError::NotFound`] when the document is absent.
    fn update(
        &self,
        key: &DocumentKey,
        field: &str,
        update: FieldUpdate,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Create (or replace) a document. Used for provisioning only.
    fn create(
        &self,
        key: &DocumentKey,
        document: Document,
    ) -> impl Future<Output = StoreResult<()>> + Send;
}
