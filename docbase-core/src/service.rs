//! Generic per-entity data access.
//!
//! A [`Service`] binds an [`Entity`] type to one collection of a [`StoreBackend`] and offers
//! three tiers of operations:
//!
//! - primitives (`find_one`, `insert_one`, `update_many`, ...) that pass straight through
//!   to the backend and return its [`DocumentStoreError`] unmodified;
//! - timestamp-aware writes, which maintain the creation and modification fields of
//!   entities declaring [`Entity::TIMESTAMPS`];
//! - "or fail" reads (`get_one_or_fail`, `find_or_fail`) that answer with a [`DomainError`]
//!   ready for the response layer.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use docbase::{service::Service, tenant::{DatabaseTarget, NamespaceConfig}};
//!
//! let namespaces = NamespaceConfig::new("retail");
//! let stores = Service::<Store, _>::for_target(
//!     &backend,
//!     &namespaces,
//!     &DatabaseTarget::Company("acme".into()),
//! );
//!
//! let store = stores.get_one_or_fail(doc! { "_id": id }, None).await?;
//! ```

use std::{marker::PhantomData, time::Duration};

use bson::{Bson, DateTime, Document, de::deserialize_from_document, doc, oid::ObjectId};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    backend::{BulkWriteResult, StoreBackend, WriteModel},
    document::{Entity, EntityExt, TimestampFields},
    error::{DocumentStoreError, DocumentStoreResult},
    options::{
        AggregateOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexModel,
        IndexOptions, UpdateOptions,
    },
    response::DomainError,
    tenant::{DatabaseTarget, NamespaceConfig, TenantScoped},
};

/// Default messages of the or-fail tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceOptions {
    pub get_one_or_fail_message: String,
    pub find_or_fail_message: String,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            get_one_or_fail_message: "Data not found".to_string(),
            find_or_fail_message: "One or more data not found".to_string(),
        }
    }
}

/// Per-call options of the or-fail tier: a not-found message override and the options of
/// the underlying read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrFailOptions<O> {
    pub message: Option<String>,
    pub options: Option<O>,
}

impl<O> OrFailOptions<O> {
    pub fn message(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), options: None }
    }

    pub fn with_options(mut self, options: O) -> Self {
        self.options = Some(options);
        self
    }
}

/// Data access for one entity type in one collection.
#[derive(Debug, Clone)]
pub struct Service<T, B> {
    backend: B,
    collection: String,
    options: ServiceOptions,
    _entity: PhantomData<fn() -> T>,
}

impl<T, B> Service<T, B>
where
    T: Entity,
    B: StoreBackend,
{
    /// Creates a service over the entity's default collection.
    pub fn new(backend: B) -> Self {
        Self::with_collection(backend, T::collection_name())
    }

    /// Creates a service over an explicitly named collection.
    pub fn with_collection(backend: B, collection: impl Into<String>) -> Self {
        Self {
            backend,
            collection: collection.into(),
            options: ServiceOptions::default(),
            _entity: PhantomData,
        }
    }

    /// Replaces the default or-fail messages.
    pub fn with_options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    /// Creates a service bound to the tenant database selected by `target`.
    pub fn for_target(backend: &B, namespaces: &NamespaceConfig, target: &DatabaseTarget) -> Self
    where
        B: TenantScoped,
    {
        Self::new(backend.scoped(&namespaces.database_name(target)))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    pub async fn find_one(
        &self,
        filter: Document,
        options: Option<FindOneOptions>,
    ) -> DocumentStoreResult<Option<T>> {
        self.backend
            .find_one(&self.collection, filter, options)
            .await?
            .map(T::from_document)
            .transpose()
    }

    pub async fn find(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> DocumentStoreResult<Vec<T>> {
        self.backend
            .find(&self.collection, filter, options)
            .await?
            .into_iter()
            .map(T::from_document)
            .collect()
    }

    /// Runs a pipeline and decodes every output document into `R`.
    ///
    /// Without options, the English collation with tertiary strength is applied.
    pub async fn aggregate<R: DeserializeOwned>(
        &self,
        pipeline: Vec<Document>,
        options: Option<AggregateOptions>,
    ) -> DocumentStoreResult<Vec<R>> {
        let options = options.unwrap_or_else(AggregateOptions::default_collation);

        self.backend
            .aggregate(&self.collection, pipeline, Some(options))
            .await?
            .into_iter()
            .map(|document| deserialize_from_document::<R>(document).map_err(DocumentStoreError::from))
            .collect()
    }

    /// Returns the first match, or a not-found error.
    ///
    /// The not-found message is the per-call override, or the service default. A backend
    /// failure becomes an internal error carrying the backend's message.
    pub async fn get_one_or_fail(
        &self,
        filter: Document,
        options: Option<OrFailOptions<FindOneOptions>>,
    ) -> Result<T, DomainError> {
        let OrFailOptions { message, options } = options.unwrap_or_default();

        match self.find_one(filter, options).await {
            Ok(Some(entity)) => Ok(entity),
            Ok(None) => {
                let message = message.unwrap_or_else(|| self.options.get_one_or_fail_message.clone());
                tracing::debug!(collection = %self.collection, %message, "No document matched");
                Err(DomainError::not_found(message))
            }
            Err(err) => Err(self.internal(err)),
        }
    }

    /// Returns every match if exactly `expected` documents match, or a not-found error.
    ///
    /// The count is checked first: a backend failure yields no documents, so it is reported
    /// as not-found unless `expected` is zero.
    pub async fn find_or_fail(
        &self,
        filter: Document,
        expected: usize,
        options: Option<OrFailOptions<FindOptions>>,
    ) -> Result<Vec<T>, DomainError> {
        let OrFailOptions { message, options } = options.unwrap_or_default();

        let (found, failure) = match self.find(filter, options).await {
            Ok(found) => (found, None),
            Err(err) => (Vec::new(), Some(err)),
        };

        if found.len() != expected {
            let message = message.unwrap_or_else(|| self.options.find_or_fail_message.clone());
            tracing::debug!(
                collection = %self.collection,
                expected,
                found = found.len(),
                %message,
                "Unexpected number of documents"
            );
            return Err(DomainError::not_found(message));
        }

        match failure {
            Some(err) => Err(self.internal(err)),
            None => Ok(found),
        }
    }

    /// Inserts an entity and reads it back.
    pub async fn create(&self, entity: &T) -> DocumentStoreResult<T> {
        let id = self.insert_one(entity).await?;

        self.find_one(doc! { "_id": id }, None).await?.ok_or_else(|| {
            DocumentStoreError::Backend(format!(
                "inserted document {id} not found in collection {}",
                self.collection
            ))
        })
    }

    /// Inserts an entity, stamping its timestamps, and returns the new identifier.
    pub async fn insert_one(&self, entity: &T) -> DocumentStoreResult<ObjectId> {
        let document = entity.to_insert_document(DateTime::now())?;

        match self.backend.insert_one(&self.collection, document).await? {
            Bson::ObjectId(id) => Ok(id),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "inserted id {other} is not an ObjectId"
            ))),
        }
    }

    /// Inserts entities, stamping every one with the same instant.
    pub async fn insert_many(&self, entities: &[T]) -> DocumentStoreResult<Vec<Bson>> {
        let now = DateTime::now();
        let documents = entities
            .iter()
            .map(|entity| entity.to_insert_document(now))
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        self.backend.insert_many(&self.collection, documents).await
    }

    /// Updates the first match and returns the number of modified documents.
    pub async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> DocumentStoreResult<u64> {
        let update = self.timestamped(update)?;
        let outcome = self
            .backend
            .update_one(&self.collection, filter, update, options)
            .await?;

        Ok(outcome.modified_count)
    }

    /// Updates every match and returns the number of modified documents.
    pub async fn update_many(
        &self,
        filter: Document,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> DocumentStoreResult<u64> {
        let update = self.timestamped(update)?;
        self.update_many_raw(filter, update, options).await
    }

    /// Updates every match without touching timestamp fields.
    pub async fn update_many_raw(
        &self,
        filter: Document,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> DocumentStoreResult<u64> {
        let outcome = self
            .backend
            .update_many(&self.collection, filter, update, options)
            .await?;

        Ok(outcome.modified_count)
    }

    /// Updates the first match and returns it, after the update unless options say otherwise.
    pub async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        options: Option<FindOneAndUpdateOptions>,
    ) -> DocumentStoreResult<Option<T>> {
        let update = self.timestamped(update)?;

        self.backend
            .find_one_and_update(&self.collection, filter, update, Some(options.unwrap_or_default()))
            .await?
            .map(T::from_document)
            .transpose()
    }

    pub async fn delete_one(&self, filter: Document) -> DocumentStoreResult<u64> {
        self.backend.delete_one(&self.collection, filter).await
    }

    pub async fn delete_many(&self, filter: Document) -> DocumentStoreResult<u64> {
        self.backend.delete_many(&self.collection, filter).await
    }

    pub async fn find_one_and_delete(&self, filter: Document) -> DocumentStoreResult<Option<T>> {
        self.backend
            .find_one_and_delete(&self.collection, filter)
            .await?
            .map(T::from_document)
            .transpose()
    }

    pub async fn count_documents(&self, filter: Document) -> DocumentStoreResult<u64> {
        self.backend.count_documents(&self.collection, filter).await
    }

    /// Creates a unique index over `keys`.
    pub async fn make_unique(&self, keys: Document) -> DocumentStoreResult<String> {
        let options = IndexOptions { unique: Some(true), ..Default::default() };
        self.create_index(keys, Some(options)).await
    }

    /// Creates a TTL index over a date field: documents expire at the instant it holds.
    pub async fn set_delete_from_database_attribute(
        &self,
        keys: Document,
    ) -> DocumentStoreResult<String> {
        let options = IndexOptions {
            expire_after: Some(Duration::from_secs(0)),
            ..Default::default()
        };
        self.create_index(keys, Some(options)).await
    }

    pub async fn create_index(
        &self,
        keys: Document,
        options: Option<IndexOptions>,
    ) -> DocumentStoreResult<String> {
        let model = IndexModel { keys, options };
        self.backend.create_index(&self.collection, model).await
    }

    pub async fn bulk_write(&self, models: Vec<WriteModel>) -> DocumentStoreResult<BulkWriteResult> {
        self.backend.bulk_write(&self.collection, models).await
    }

    fn timestamped(&self, update: Document) -> DocumentStoreResult<Document> {
        match T::TIMESTAMPS {
            Some(fields) => stamp_update(update, fields, DateTime::now()),
            None => Ok(update),
        }
    }

    fn internal(&self, err: DocumentStoreError) -> DomainError {
        tracing::warn!(collection = %self.collection, error = %err, "Store operation failed");
        DomainError::internal(err.to_string())
    }
}

/// Forces the modification timestamp of an update to `now`.
///
/// The `$set` document is created when missing. A creation timestamp inside `$set` is
/// dropped so updates never rewrite it.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] if `$set` is present but not a document.
pub fn stamp_update(
    mut update: Document,
    fields: TimestampFields,
    now: DateTime,
) -> DocumentStoreResult<Document> {
    let mut set = match update.remove("$set") {
        None | Some(Bson::Null) => Document::new(),
        Some(Bson::Document(set)) => set,
        Some(other) => {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "$set must be a document, got {other}"
            )));
        }
    };

    set.remove(fields.created_at);
    set.insert(fields.updated_at, now);
    update.insert("$set", set);

    Ok(update)
}
