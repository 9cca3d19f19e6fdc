//! A generic data-access layer over MongoDB-style document databases.
//!
//! This crate is the core of the docbase project and provides:
//!
//! - **Entity traits** ([`document`]) - The entity contract and its timestamp capability
//! - **Store backend abstraction** ([`backend`]) - Collection-scoped raw database operations
//! - **Filter generators** ([`filter`]) - Fail-open filter fragments from optional inputs
//! - **Pipeline builder** ([`pipeline`]) - Fluent aggregation pipelines with pagination and search
//! - **Query transformer** ([`transform`]) - Raw query parameters to typed values
//! - **Generic service** ([`service`]) - Primitive, timestamp-aware and or-fail operations
//! - **Changelog** ([`changelog`]) - Audit trail use case built on the service
//! - **Error handling** ([`error`], [`response`]) - Store errors and domain errors
//! - **Tenancy** ([`tenant`]) - Database selection per tenant
//!
//! # Example
//!
//! ```ignore
//! use docbase::{Entity, service::Service};
//! use bson::{oid::ObjectId, DateTime};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Entity)]
//! #[entity(collection = "stores", timestamps)]
//! #[serde(rename_all = "camelCase")]
//! pub struct Store {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//!     pub created_at: DateTime,
//!     pub updated_at: DateTime,
//! }
//!
//! let stores = Service::<Store, _>::new(backend);
//! let id = stores.insert_one(&store).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbase_core;

pub mod backend;
pub mod changelog;
pub mod document;
pub mod error;
pub mod filter;
pub mod identifier;
pub mod options;
pub mod page;
pub mod pipeline;
pub mod response;
pub mod service;
pub mod tenant;
pub mod transform;
