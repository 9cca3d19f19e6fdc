//! Storage backend abstraction for the data-access layer.
//!
//! This module defines the traits that abstract over document database clients, so the
//! [`Service`](crate::service::Service) layer works the same against MongoDB and against the
//! in-memory test double.
//!
//! # Overview
//!
//! The [`StoreBackend`] trait is a collection-scoped async interface over raw
//! [`bson::Document`] values: reads, aggregation, writes, index management and bulk writes.
//! Backends never see entity types. Implementations are required to be thread-safe
//! (`Send + Sync`) and support concurrent access.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use docbase::backend::StoreBackend;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! let id = backend.insert_one("users", doc! { "name": "Alice", "age": 30 }).await?;
//! let alice = backend.find_one("users", doc! { "_id": id }, None).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::{
    error::DocumentStoreResult,
    options::{
        AggregateOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexModel,
        UpdateOptions,
    },
};

/// The result of an `update_one` or `update_many` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Number of documents matched by the filter.
    pub matched_count: u64,
    /// Number of documents actually changed.
    pub modified_count: u64,
    /// Identifier of the inserted document when the update upserted.
    pub upserted_id: Option<Bson>,
}

/// A single operation of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne { document: Document },
    UpdateOne { filter: Document, update: Document, upsert: bool },
    UpdateMany { filter: Document, update: Document, upsert: bool },
    DeleteOne { filter: Document },
    DeleteMany { filter: Document },
}

/// Aggregated counts of a bulk write. Identifier maps are keyed by model index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteResult {
    pub inserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub deleted_count: u64,
    pub upserted_count: u64,
    pub inserted_ids: HashMap<usize, Bson>,
    pub upserted_ids: HashMap<usize, Bson>,
}

/// Abstract interface for document database clients.
///
/// Every operation is scoped to a collection of the database the backend is bound to.
/// Filters, updates and pipeline stages use the MongoDB dialect.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult).
/// Driver failures are reported as [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend),
/// unique index violations as [`DocumentStoreError::DuplicateKey`](crate::error::DocumentStoreError::DuplicateKey)
/// and operators a backend cannot evaluate as
/// [`DocumentStoreError::UnsupportedOperation`](crate::error::DocumentStoreError::UnsupportedOperation).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the first document matching `filter`, if any.
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: Option<FindOneOptions>,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Returns every document matching `filter`.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: Option<FindOptions>,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Runs an aggregation pipeline and collects its output.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        options: Option<AggregateOptions>,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Inserts a document and returns its identifier.
    ///
    /// A document without `_id` receives a fresh `ObjectId`.
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson>;

    /// Inserts documents in order and returns their identifiers in the same order.
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Applies an update document to the first match.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Applies an update document to every match.
    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Applies an update to the first match and returns it, before or after the update.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: Option<FindOneAndUpdateOptions>,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Deletes the first match and returns the number of deleted documents.
    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;

    /// Deletes every match and returns the number of deleted documents.
    async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;

    /// Deletes the first match and returns it.
    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Counts the documents matching `filter`.
    async fn count_documents(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;

    /// Creates an index and returns its name.
    async fn create_index(&self, collection: &str, index: IndexModel) -> DocumentStoreResult<String>;

    /// Executes write models in order, stopping at the first failure.
    ///
    /// The default implementation issues one call per model.
    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> DocumentStoreResult<BulkWriteResult> {
        let mut result = BulkWriteResult::default();

        for (index, model) in models.into_iter().enumerate() {
            match model {
                WriteModel::InsertOne { document } => {
                    let id = self.insert_one(collection, document).await?;
                    result.inserted_count += 1;
                    result.inserted_ids.insert(index, id);
                }
                WriteModel::UpdateOne { filter, update, upsert } => {
                    let outcome = self
                        .update_one(collection, filter, update, Some(UpdateOptions { upsert: Some(upsert) }))
                        .await?;
                    result.record_update(index, outcome);
                }
                WriteModel::UpdateMany { filter, update, upsert } => {
                    let outcome = self
                        .update_many(collection, filter, update, Some(UpdateOptions { upsert: Some(upsert) }))
                        .await?;
                    result.record_update(index, outcome);
                }
                WriteModel::DeleteOne { filter } => {
                    result.deleted_count += self.delete_one(collection, filter).await?;
                }
                WriteModel::DeleteMany { filter } => {
                    result.deleted_count += self.delete_many(collection, filter).await?;
                }
            }
        }

        Ok(result)
    }

    /// Releases the backend's resources.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

impl BulkWriteResult {
    fn record_update(&mut self, index: usize, outcome: UpdateOutcome) {
        self.matched_count += outcome.matched_count;
        self.modified_count += outcome.modified_count;

        if let Some(id) = outcome.upserted_id {
            self.upserted_count += 1;
            self.upserted_ids.insert(index, id);
        }
    }
}

macro_rules! forward_store_backend {
    ($target:ty) => {
        #[async_trait]
        impl<B> StoreBackend for $target
        where
            B: StoreBackend,
        {
            async fn find_one(
                &self,
                collection: &str,
                filter: Document,
                options: Option<FindOneOptions>,
            ) -> DocumentStoreResult<Option<Document>> {
                (**self).find_one(collection, filter, options).await
            }

            async fn find(
                &self,
                collection: &str,
                filter: Document,
                options: Option<FindOptions>,
            ) -> DocumentStoreResult<Vec<Document>> {
                (**self).find(collection, filter, options).await
            }

            async fn aggregate(
                &self,
                collection: &str,
                pipeline: Vec<Document>,
                options: Option<AggregateOptions>,
            ) -> DocumentStoreResult<Vec<Document>> {
                (**self).aggregate(collection, pipeline, options).await
            }

            async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
                (**self).insert_one(collection, document).await
            }

            async fn insert_many(
                &self,
                collection: &str,
                documents: Vec<Document>,
            ) -> DocumentStoreResult<Vec<Bson>> {
                (**self).insert_many(collection, documents).await
            }

            async fn update_one(
                &self,
                collection: &str,
                filter: Document,
                update: Document,
                options: Option<UpdateOptions>,
            ) -> DocumentStoreResult<UpdateOutcome> {
                (**self).update_one(collection, filter, update, options).await
            }

            async fn update_many(
                &self,
                collection: &str,
                filter: Document,
                update: Document,
                options: Option<UpdateOptions>,
            ) -> DocumentStoreResult<UpdateOutcome> {
                (**self).update_many(collection, filter, update, options).await
            }

            async fn find_one_and_update(
                &self,
                collection: &str,
                filter: Document,
                update: Document,
                options: Option<FindOneAndUpdateOptions>,
            ) -> DocumentStoreResult<Option<Document>> {
                (**self)
                    .find_one_and_update(collection, filter, update, options)
                    .await
            }

            async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
                (**self).delete_one(collection, filter).await
            }

            async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
                (**self).delete_many(collection, filter).await
            }

            async fn find_one_and_delete(
                &self,
                collection: &str,
                filter: Document,
            ) -> DocumentStoreResult<Option<Document>> {
                (**self).find_one_and_delete(collection, filter).await
            }

            async fn count_documents(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
                (**self).count_documents(collection, filter).await
            }

            async fn create_index(&self, collection: &str, index: IndexModel) -> DocumentStoreResult<String> {
                (**self).create_index(collection, index).await
            }

            async fn bulk_write(
                &self,
                collection: &str,
                models: Vec<WriteModel>,
            ) -> DocumentStoreResult<BulkWriteResult> {
                (**self).bulk_write(collection, models).await
            }
        }
    };
}

forward_store_backend!(&B);
forward_store_backend!(Arc<B>);

/// Factory trait for backends that need asynchronous setup, such as connecting a client.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
