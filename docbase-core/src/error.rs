//! Error types and result types for document store operations.
//!
//! This module provides the error surface of the primitive service tier. Backends report
//! every failure through [`DocumentStoreError`] and the service forwards it unmodified.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when talking to a document store.
///
/// This enum covers serialization errors, connection setup, malformed documents and
/// backend-specific (driver) errors.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between entities and BSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the same unique key already exists in the collection.
    /// The first argument is the offending key, the second is the collection name.
    #[error("Duplicate key {0} in collection {1}")]
    DuplicateKey(String, String),
    /// The document, filter or update has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The backend does not support the requested operator or stage.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
