//! Convenient re-exports of commonly used types from docbase.
//!
//! ```ignore
//! use docbase::prelude::*;
//! ```
//!
//! This provides access to:
//! - Entity traits and the derive macros
//! - Store backends, builders and tenancy
//! - The generic service and its options
//! - Filters, pipelines, pagination and the query transform
//! - Error and response types

pub use docbase_core::{
    backend::{BulkWriteResult, StoreBackend, StoreBackendBuilder, UpdateOutcome, WriteModel},
    changelog::{Actor, Changelog, ChangelogEntry, ChangelogError, ChangelogUseCase},
    document::{Entity, EntityExt, TimestampFields},
    error::{DocumentStoreError, DocumentStoreResult},
    filter::{self, Fragment},
    identifier::{parse_object_id, strings_to_object_ids},
    options::{AggregateOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    page::{OptionItem, PaginationQuery, PaginationResult, SortSpec},
    pipeline::{Lookup, PipelineBuilder, option_list},
    response::{ApiResponse, DomainError},
    service::{OrFailOptions, Service, ServiceOptions},
    tenant::{DatabaseTarget, NamespaceConfig, TenantScoped},
    transform::{FieldDeclaration, QueryParams, TransformError, TransformKind, transform},
};

pub use docbase_macros::{Entity, QueryParams};
