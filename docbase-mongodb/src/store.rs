use async_trait::async_trait;
use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    options::{ClientOptions, ReturnDocument as MongoReturnDocument},
};
use tracing::debug;

use docbase_core::{
    backend::{StoreBackend, StoreBackendBuilder, UpdateOutcome},
    error::{DocumentStoreError, DocumentStoreResult},
    options::{
        AggregateOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexModel,
        ReturnDocument, UpdateOptions,
    },
    tenant::TenantScoped,
};

use crate::{config::ConnectionConfig, convert};

/// A [`StoreBackend`] over a MongoDB deployment.
///
/// The handle wraps a [`mongodb::Client`], which pools connections and is cheap to clone.
/// Every operation runs against the bound database; [`TenantScoped::scoped`] rebinds a clone.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self { client, database: database.into() }
    }

    pub fn builder(uri: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(uri, database)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The database this handle reads and writes.
    pub fn database(&self) -> &str {
        &self.database
    }

    fn get_collection(&self, collection: &str) -> MongoCollection<Document> {
        self.client.database(&self.database).collection(collection)
    }

    fn outcome(result: mongodb::results::UpdateResult) -> UpdateOutcome {
        UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        }
    }
}

impl TenantScoped for MongoDbStore {
    fn scoped(&self, database: &str) -> Self {
        debug!(database, "binding MongoDB store to database");

        Self {
            client: self.client.clone(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: Option<FindOneOptions>,
    ) -> DocumentStoreResult<Option<Document>> {
        self.get_collection(collection)
            .find_one(filter)
            .with_options(options.map(convert::find_one_options))
            .await
            .map_err(|e| convert::store_error(collection, e))
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: Option<FindOptions>,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.get_collection(collection)
            .find(filter)
            .with_options(options.map(convert::find_options))
            .await
            .map_err(|e| convert::store_error(collection, e))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| convert::store_error(collection, e))
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        options: Option<AggregateOptions>,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.get_collection(collection)
            .aggregate(pipeline)
            .with_options(options.map(convert::aggregate_options))
            .await
            .map_err(|e| convert::store_error(collection, e))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| convert::store_error(collection, e))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        Ok(self
            .get_collection(collection)
            .insert_one(document)
            .await
            .map_err(|e| convert::store_error(collection, e))?
            .inserted_id)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let count = documents.len();
        let mut inserted = self
            .get_collection(collection)
            .insert_many(documents)
            .await
            .map_err(|e| convert::store_error(collection, e))?
            .inserted_ids;

        (0..count)
            .map(|index| {
                inserted.remove(&index).ok_or_else(|| {
                    DocumentStoreError::Backend(format!("missing inserted id for document {index}"))
                })
            })
            .collect()
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.get_collection(collection)
            .update_one(filter, update)
            .upsert(options.and_then(|o| o.upsert).unwrap_or(false))
            .await
            .map(Self::outcome)
            .map_err(|e| convert::store_error(collection, e))
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.get_collection(collection)
            .update_many(filter, update)
            .upsert(options.and_then(|o| o.upsert).unwrap_or(false))
            .await
            .map(Self::outcome)
            .map_err(|e| convert::store_error(collection, e))
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: Option<FindOneAndUpdateOptions>,
    ) -> DocumentStoreResult<Option<Document>> {
        let options = options.unwrap_or_default();
        let return_document = match options.return_document {
            ReturnDocument::Before => MongoReturnDocument::Before,
            ReturnDocument::After => MongoReturnDocument::After,
        };

        let coll = self.get_collection(collection);
        let action = coll
            .find_one_and_update(filter, update)
            .return_document(return_document)
            .upsert(options.upsert.unwrap_or(false));

        let updated = match options.sort {
            Some(sort) => action.sort(sort).await,
            None => action.await,
        };

        updated.map_err(|e| convert::store_error(collection, e))
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        Ok(self
            .get_collection(collection)
            .delete_one(filter)
            .await
            .map_err(|e| convert::store_error(collection, e))?
            .deleted_count)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        Ok(self
            .get_collection(collection)
            .delete_many(filter)
            .await
            .map_err(|e| convert::store_error(collection, e))?
            .deleted_count)
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
    ) -> DocumentStoreResult<Option<Document>> {
        self.get_collection(collection)
            .find_one_and_delete(filter)
            .await
            .map_err(|e| convert::store_error(collection, e))
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(filter)
            .await
            .map_err(|e| convert::store_error(collection, e))
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> DocumentStoreResult<String> {
        Ok(self
            .get_collection(collection)
            .create_index(convert::index_model(index))
            .await
            .map_err(|e| convert::store_error(collection, e))?
            .index_name)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// Connects a [`MongoDbStore`] from a connection string and a database name.
#[derive(Debug, Clone)]
pub struct MongoDbStoreBuilder {
    uri: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(uri: &str, database: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database: database.to_string(),
        }
    }
}

impl From<ConnectionConfig> for MongoDbStoreBuilder {
    fn from(config: ConnectionConfig) -> Self {
        Self {
            uri: config.uri,
            database: config.database,
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        debug!(database = %self.database, hosts = ?options.hosts, "connecting to MongoDB");

        Ok(MongoDbStore::new(
            Client::with_options(options).map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
