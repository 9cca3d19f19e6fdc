//! In-memory document storage backend for docbase.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It evaluates the MongoDB filter, update and aggregation dialect the service layer emits,
//! which makes it the backend of choice for tests and local development.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Multi-database** - Handles rebound with `TenantScoped::scoped` share one state
//! - **Query evaluation** - Comparison, membership, regex, logical operators and `$expr`
//! - **Aggregation** - Facets, lookups, grouping, unwinding and window numbering
//! - **Unique indexes** - Duplicate keys are rejected like a real server does
//!
//! # Quick Start
//!
//! ```ignore
//! use bson::doc;
//! use docbase::{backend::StoreBackendBuilder, memory::InMemoryStore, service::Service};
//!
//! let backend = InMemoryStore::builder().database("retail").build().await?;
//! let stores = Service::<Store, _>::new(backend);
//!
//! let id = stores.insert_one(&store).await?;
//! let found = stores.get_one_or_fail(doc! { "_id": id }, None).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbase_memory;

mod aggregate;
mod evaluator;
mod expression;
pub mod store;
mod update;

pub use store::{DEFAULT_DATABASE, InMemoryStore, InMemoryStoreBuilder};
