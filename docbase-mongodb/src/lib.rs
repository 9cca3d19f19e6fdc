//! MongoDB backend implementation for docbase.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait on top of
//! the official async driver. Filters, updates and pipelines built by docbase are passed to
//! the server as is.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docbase = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! [`ConnectionConfig::from_env`] reads `MONGO_URI` and `DOCBASE_DATABASE`. The builder can
//! also be created directly from a connection string.
//!
//! # Example
//!
//! ```ignore
//! use docbase::{backend::StoreBackendBuilder, mongodb::ConnectionConfig, tenant::TenantScoped};
//!
//! let store = ConnectionConfig::from_env().builder().build().await?;
//! let acme = store.scoped("acme_retail");
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbase_mongodb;

pub mod config;
mod convert;
pub mod store;

pub use config::ConnectionConfig;
pub use store::{MongoDbStore, MongoDbStoreBuilder};
