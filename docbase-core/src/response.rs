//! Domain errors and the response envelope handed to the HTTP layer.
//!
//! The service layer never talks HTTP itself. It produces a [`DomainError`] carrying a
//! status-like code and a human readable message, and [`ApiResponse`] describes the
//! `{status, message, data}` envelope the excluded HTTP layer serializes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{error::DocumentStoreError, transform::TransformError};

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_FORBIDDEN: u16 = 403;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_INTERNAL_SERVER_ERROR: u16 = 500;

/// An error meant to be shown to the caller of an endpoint.
///
/// # Example
///
/// ```ignore
/// use docbase::response::DomainError;
///
/// let err = DomainError::not_found("Store not found");
/// assert_eq!(err.code, 404);
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct DomainError {
    /// Status-like code (HTTP semantics).
    pub code: u16,
    /// Human readable message.
    pub message: String,
}

impl DomainError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(STATUS_BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(STATUS_UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(STATUS_FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(STATUS_NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(STATUS_INTERNAL_SERVER_ERROR, message)
    }

    /// Returns `true` when this error carries the not-found code.
    pub fn is_not_found(&self) -> bool {
        self.code == STATUS_NOT_FOUND
    }

    /// Builds the response envelope for this error. The payload is always empty.
    pub fn to_response(&self) -> ApiResponse<()> {
        ApiResponse::new(self.code, self.message.clone(), None)
    }
}

impl From<DocumentStoreError> for DomainError {
    fn from(err: DocumentStoreError) -> Self {
        DomainError::internal(err.to_string())
    }
}

impl From<TransformError> for DomainError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Decode(_) => DomainError::bad_request(err.to_string()),
            TransformError::UnknownKind { .. } => DomainError::internal(err.to_string()),
        }
    }
}

/// The `{status, message, data}` envelope every endpoint answers with.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn new(status: u16, message: impl Into<String>, data: Option<T>) -> Self {
        Self { status, message: message.into(), data }
    }

    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self::new(STATUS_OK, message, Some(data))
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self::new(STATUS_CREATED, message, Some(data))
    }
}
