//! Pagination types shared by the pipeline builder and the service layer.
//!
//! [`PaginationQuery`] is the query-string side (`page`, `limit`, `sortBy`, `sortOrder`),
//! [`PaginationResult`] is the shape a paginated aggregation decodes into.

use bson::{Document, de::deserialize_from_document};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    error::DocumentStoreResult,
    transform::{FieldDeclaration, QueryParams},
};

/// Page selection and ordering requested by a caller.
///
/// `page` and `limit` are 1-based. A non-positive value in either disables pagination.
///
/// # Example
///
/// ```ignore
/// use docbase::{page::PaginationQuery, transform::transform};
///
/// let query: PaginationQuery = transform(&raw_params)?;
/// let stages = PipelineBuilder::new().pagination(&query, &[]).build();
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PaginationQuery {
    pub page: i64,
    pub limit: i64,
    pub sort_by: String,
    pub sort_order: i64,
}

impl PaginationQuery {
    pub fn new(page: i64, limit: i64) -> Self {
        Self { page, limit, ..Default::default() }
    }

    pub fn with_sort(mut self, sort_by: impl Into<String>, sort_order: i64) -> Self {
        self.sort_by = sort_by.into();
        self.sort_order = sort_order;
        self
    }

    /// Returns `true` when both page and limit are positive.
    pub fn is_paginated(&self) -> bool {
        self.page > 0 && self.limit > 0
    }

    /// Number of documents to skip, `0` when unpaginated.
    pub fn skip(&self) -> i64 {
        if self.is_paginated() {
            (self.page - 1).saturating_mul(self.limit)
        } else {
            0
        }
    }

    /// Page size, unbounded when unpaginated.
    pub fn page_size(&self) -> i64 {
        if self.is_paginated() { self.limit } else { i64::MAX }
    }
}

impl QueryParams for PaginationQuery {
    fn declarations() -> &'static [FieldDeclaration] {
        &[
            FieldDeclaration { key: "page", kind: "int" },
            FieldDeclaration { key: "limit", kind: "int" },
            FieldDeclaration { key: "sortBy", kind: "string" },
            FieldDeclaration { key: "sortOrder", kind: "int" },
        ]
    }
}

/// A default sort key used when the caller asks for none.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub sort_by: String,
    pub sort_order: i64,
}

impl SortSpec {
    pub fn new(sort_by: impl Into<String>, sort_order: i64) -> Self {
        Self { sort_by: sort_by.into(), sort_order }
    }

    pub fn ascending(sort_by: impl Into<String>) -> Self {
        Self::new(sort_by, 1)
    }

    pub fn descending(sort_by: impl Into<String>) -> Self {
        Self::new(sort_by, -1)
    }
}

/// One page of results together with the total number of matches.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResult<T> {
    #[serde(default)]
    pub total_records: i64,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Default for PaginationResult<T> {
    fn default() -> Self {
        Self { total_records: 0, data: Vec::new() }
    }
}

impl<T: DeserializeOwned> PaginationResult<T> {
    /// Decodes the output of a pipeline ending in a pagination stage.
    ///
    /// An aggregation with no matches yields no document at all; that case decodes to an
    /// empty result.
    ///
    /// # Errors
    ///
    /// Returns an error if the first document does not match the result shape.
    pub fn from_aggregate(documents: Vec<Document>) -> DocumentStoreResult<Self> {
        match documents.into_iter().next() {
            Some(document) => Ok(deserialize_from_document(document)?),
            None => Ok(Self::default()),
        }
    }
}

/// A label/value pair produced by the option-list pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OptionItem<T> {
    pub label: String,
    pub value: T,
}
