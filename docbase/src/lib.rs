//! Main docbase crate: a typed data-access layer over MongoDB-style document databases.
//!
//! This crate is the entry point for users of the docbase project. It re-exports the core
//! modules, the derive macros and the storage backends.
//!
//! # Features
//!
//! - **Typed services** - `Service<T, B>` wraps a collection with decoding, timestamping and
//!   or-fail lookups
//! - **Fail-open filters** - Optional request inputs turn into filter fragments that never
//!   break a query
//! - **Pipeline builder** - Pagination, search, lookups and option lists for aggregations
//! - **Query transform** - Raw string parameters decoded into typed query structs
//! - **Multiple backends** - MongoDB for deployments and an in-memory store for tests
//!
//! # Quick Start
//!
//! ```ignore
//! use std::collections::HashMap;
//!
//! use docbase::{prelude::*, memory::InMemoryStore};
//! use bson::{doc, oid::ObjectId, DateTime};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Entity)]
//! #[entity(collection = "products", timestamps)]
//! #[serde(rename_all = "camelCase")]
//! pub struct Product {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//!     pub price: i64,
//!     pub created_at: DateTime,
//!     pub updated_at: DateTime,
//! }
//!
//! #[derive(Debug, Deserialize, QueryParams)]
//! #[serde(rename_all = "camelCase")]
//! pub struct ProductQuery {
//!     #[transform("string")]
//!     pub search: String,
//!     #[transform("int")]
//!     pub page: i64,
//!     #[transform("int")]
//!     pub limit: i64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let products = Service::<Product, _>::new(InMemoryStore::new());
//!     products.insert_one(&product).await?;
//!
//!     let raw: HashMap<String, String> = request_params();
//!     let query: ProductQuery = transform(&raw)?;
//!
//!     let stages = PipelineBuilder::new()
//!         .search(&query.search, &["name"])
//!         .pagination(&PaginationQuery::new(query.page, query.limit), &[])
//!         .build();
//!
//!     let page = PaginationResult::<Product>::from_aggregate(products.aggregate(stages, None).await?)?;
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires the `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as docbase;

pub mod prelude;

pub use docbase_core::{
    backend, changelog, document, error, filter, identifier, options, page, pipeline, response,
    service, tenant, transform,
};

pub use docbase_macros::{Entity, QueryParams};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docbase_memory::{DEFAULT_DATABASE, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docbase_mongodb::{ConnectionConfig, MongoDbStore, MongoDbStoreBuilder};
}
