//! In-memory storage implementation for document stores.
//!
//! Documents are kept as BSON in insertion order, per collection and per database, behind a
//! shared async-aware read-write lock. Queries, updates and aggregations are evaluated by
//! scanning the collection.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use mea::rwlock::RwLock;

use docbase_core::{
    backend::{StoreBackend, StoreBackendBuilder, UpdateOutcome},
    error::{DocumentStoreError, DocumentStoreResult},
    options::{
        AggregateOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexModel,
        ReturnDocument, UpdateOptions,
    },
    tenant::TenantScoped,
};

use crate::{
    aggregate::{self, Aggregator},
    evaluator::{lookup_path, matches, values_equal},
    expression::Variables,
    update::{apply_update, upsert_document},
};

/// The database a store is bound to when none is configured.
pub const DEFAULT_DATABASE: &str = "docbase";

/// A collection's documents, in insertion order, and its indexes.
#[derive(Debug, Clone, Default)]
pub(crate) struct Collection {
    pub documents: Vec<Document>,
    pub indexes: Vec<IndexModel>,
}

impl Collection {
    #[cfg(test)]
    pub fn with_documents(documents: Vec<Document>) -> Self {
        Self { documents, indexes: Vec::new() }
    }

    fn matching(&self, filter: &Document) -> DocumentStoreResult<Vec<usize>> {
        let mut positions = Vec::new();
        for (position, document) in self.documents.iter().enumerate() {
            if matches(document, filter)? {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    fn first_matching(&self, filter: &Document, sort: Option<&Document>) -> DocumentStoreResult<Option<usize>> {
        let mut positions = self.matching(filter)?;

        if let Some(sort) = sort {
            let keys = aggregate::sort_keys(sort)?;
            positions.sort_by(|a, b| {
                aggregate::compare_documents(&self.documents[*a], &self.documents[*b], &keys)
            });
        }

        Ok(positions.first().copied())
    }

    /// Fails when `candidate` collides with another document on `_id` or a unique index.
    /// `replacing` names the position the candidate will overwrite.
    fn check_unique(
        &self,
        name: &str,
        candidate: &Document,
        replacing: Option<usize>,
    ) -> DocumentStoreResult<()> {
        let id_index = IndexModel::new(doc! { "_id": 1 });
        let unique = std::iter::once(&id_index).chain(self.indexes.iter().filter(|index| index.is_unique()));

        for index in unique {
            let key = index_key(index, candidate);

            let collides = self
                .documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != replacing)
                .any(|(_, existing)| {
                    index_key(index, existing)
                        .iter()
                        .zip(&key)
                        .all(|(a, b)| values_equal(a, b))
                });

            if collides {
                let described = index
                    .keys
                    .keys()
                    .cloned()
                    .zip(key)
                    .collect::<Document>();
                return Err(DocumentStoreError::DuplicateKey(described.to_string(), name.to_string()));
            }
        }

        Ok(())
    }

    fn insert(&mut self, name: &str, document: Document) -> DocumentStoreResult<Bson> {
        let (id, document) = with_id_first(document);
        self.check_unique(name, &document, None)?;
        self.documents.push(document);
        Ok(id)
    }

    fn update(
        &mut self,
        name: &str,
        filter: &Document,
        update: &Document,
        upsert: bool,
        many: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let mut positions = self.matching(filter)?;
        if !many {
            positions.truncate(1);
        }

        if positions.is_empty() {
            if !upsert {
                return Ok(UpdateOutcome::default());
            }

            let id = self.insert(name, upsert_document(filter, update)?)?;
            return Ok(UpdateOutcome { upserted_id: Some(id), ..Default::default() });
        }

        let mut outcome = UpdateOutcome::default();

        for position in positions {
            let mut updated = self.documents[position].clone();
            outcome.matched_count += 1;

            if apply_update(&mut updated, update, false)? {
                self.check_unique(name, &updated, Some(position))?;
                self.documents[position] = updated;
                outcome.modified_count += 1;
            }
        }

        Ok(outcome)
    }
}

fn index_key(index: &IndexModel, document: &Document) -> Vec<Bson> {
    index
        .keys
        .keys()
        .map(|field| lookup_path(document, field).unwrap_or(Bson::Null))
        .collect()
}

fn with_id_first(mut document: Document) -> (Bson, Document) {
    let id = document
        .remove("_id")
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

    let mut stored = doc! { "_id": id.clone() };
    stored.extend(document);

    (id, stored)
}

type Database = HashMap<String, Collection>;
type DatabaseMap = HashMap<String, Database>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so clones share
/// the same data. [`TenantScoped::scoped`] returns a handle on another database of the same
/// state.
///
/// The store evaluates the filter, update and aggregation dialect used by the service layer;
/// operators outside it fail with [`DocumentStoreError::UnsupportedOperation`]. Collations
/// and TTL indexes are accepted and ignored.
///
/// # Example
///
/// ```ignore
/// use docbase_memory::InMemoryStore;
/// use docbase::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let id = store.insert_one("users", doc! { "name": "Alice", "age": 30 }).await?;
/// let alice = store.find_one("users", doc! { "_id": id }, None).await?;
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    databases: Arc<RwLock<DatabaseMap>>,
    database: String,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store bound to [`DEFAULT_DATABASE`].
    pub fn new() -> Self {
        Self::with_database(DEFAULT_DATABASE)
    }

    /// Creates an empty store bound to `database`.
    pub fn with_database(database: impl Into<String>) -> Self {
        Self {
            databases: Arc::new(RwLock::new(DatabaseMap::new())),
            database: database.into(),
        }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// The database this handle reads and writes.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Names of the collections known to the bound database, sorted.
    pub async fn list_collections(&self) -> Vec<String> {
        let databases = self.databases.read().await;

        let mut names = databases
            .get(&self.database)
            .map(|database| database.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Indexes of a collection of the bound database, in creation order.
    pub async fn list_indexes(&self, collection: &str) -> Vec<IndexModel> {
        let databases = self.databases.read().await;

        databases
            .get(&self.database)
            .and_then(|database| database.get(collection))
            .map(|stored| stored.indexes.clone())
            .unwrap_or_default()
    }

    /// Removes a collection with its documents and indexes.
    pub async fn drop_collection(&self, collection: &str) {
        let mut databases = self.databases.write().await;

        if let Some(database) = databases.get_mut(&self.database) {
            database.remove(collection);
        }
    }
}

impl TenantScoped for InMemoryStore {
    fn scoped(&self, database: &str) -> Self {
        Self {
            databases: self.databases.clone(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: Option<FindOneOptions>,
    ) -> DocumentStoreResult<Option<Document>> {
        let options = options.unwrap_or_default();
        let find_options = FindOptions {
            sort: options.sort,
            skip: options.skip,
            limit: Some(1),
            projection: options.projection,
        };

        Ok(self
            .find(collection, filter, Some(find_options))
            .await?
            .into_iter()
            .next())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: Option<FindOptions>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let databases = self.databases.read().await;
        let Some(stored) = databases
            .get(&self.database)
            .and_then(|database| database.get(collection))
        else {
            return Ok(Vec::new());
        };

        let options = options.unwrap_or_default();

        let mut documents = stored
            .matching(&filter)?
            .into_iter()
            .map(|position| stored.documents[position].clone())
            .collect::<Vec<_>>();

        if let Some(sort) = &options.sort {
            aggregate::sort_documents(&mut documents, sort)?;
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = match options.limit {
            None | Some(0) => usize::MAX,
            Some(limit) => limit.unsigned_abs() as usize,
        };

        documents
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| match &options.projection {
                Some(projection) => aggregate::project(&document, projection, &Variables::new()),
                None => Ok(document),
            })
            .collect()
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        _options: Option<AggregateOptions>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let databases = self.databases.read().await;
        let empty = Database::new();
        let database = databases.get(&self.database).unwrap_or(&empty);

        Aggregator::new(database).run(collection, &pipeline)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        let mut databases = self.databases.write().await;

        databases
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .insert(collection, document)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        let mut databases = self.databases.write().await;
        let stored = databases
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default();

        documents
            .into_iter()
            .map(|document| stored.insert(collection, document))
            .collect()
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let upsert = options.and_then(|o| o.upsert).unwrap_or(false);
        let mut databases = self.databases.write().await;

        databases
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .update(collection, &filter, &update, upsert, false)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let upsert = options.and_then(|o| o.upsert).unwrap_or(false);
        let mut databases = self.databases.write().await;

        databases
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .update(collection, &filter, &update, upsert, true)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: Option<FindOneAndUpdateOptions>,
    ) -> DocumentStoreResult<Option<Document>> {
        let options = options.unwrap_or_default();
        let mut databases = self.databases.write().await;
        let stored = databases
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default();

        let Some(position) = stored.first_matching(&filter, options.sort.as_ref())? else {
            if !options.upsert.unwrap_or(false) {
                return Ok(None);
            }

            let inserted = upsert_document(&filter, &update)?;
            stored.insert(collection, inserted.clone())?;

            return Ok(match options.return_document {
                ReturnDocument::After => Some(inserted),
                ReturnDocument::Before => None,
            });
        };

        let before = stored.documents[position].clone();
        let mut after = before.clone();

        if apply_update(&mut after, &update, false)? {
            stored.check_unique(collection, &after, Some(position))?;
            stored.documents[position] = after.clone();
        }

        Ok(Some(match options.return_document {
            ReturnDocument::Before => before,
            ReturnDocument::After => after,
        }))
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        Ok(self
            .find_one_and_delete(collection, filter)
            .await?
            .map_or(0, |_| 1))
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        let mut databases = self.databases.write().await;
        let Some(stored) = databases
            .get_mut(&self.database)
            .and_then(|database| database.get_mut(collection))
        else {
            return Ok(0);
        };

        let positions = stored.matching(&filter)?;
        for position in positions.iter().rev() {
            stored.documents.remove(*position);
        }

        Ok(positions.len() as u64)
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
    ) -> DocumentStoreResult<Option<Document>> {
        let mut databases = self.databases.write().await;
        let Some(stored) = databases
            .get_mut(&self.database)
            .and_then(|database| database.get_mut(collection))
        else {
            return Ok(None);
        };

        Ok(stored
            .first_matching(&filter, None)?
            .map(|position| stored.documents.remove(position)))
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        let databases = self.databases.read().await;

        match databases
            .get(&self.database)
            .and_then(|database| database.get(collection))
        {
            Some(stored) => Ok(stored.matching(&filter)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> DocumentStoreResult<String> {
        let name = index.name();
        let mut databases = self.databases.write().await;
        let stored = databases
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default();

        if stored.indexes.iter().any(|existing| existing.name() == name) {
            return Ok(name);
        }

        if index.is_unique() {
            let mut seen: Vec<Vec<Bson>> = Vec::new();
            for document in &stored.documents {
                let key = index_key(&index, document);
                if seen.iter().any(|other| other.iter().zip(&key).all(|(a, b)| values_equal(a, b))) {
                    return Err(DocumentStoreError::DuplicateKey(
                        Bson::Array(key).to_string(),
                        collection.to_string(),
                    ));
                }
                seen.push(key);
            }
        }

        stored.indexes.push(index);
        Ok(name)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docbase_memory::InMemoryStore;
/// use docbase::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().database("acme_retail").build().await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    database: Option<String>,
}

impl InMemoryStoreBuilder {
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(match self.database {
            Some(database) => InMemoryStore::with_database(database),
            None => InMemoryStore::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use docbase_core::{backend::WriteModel, options::IndexOptions};

    use super::*;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_many(
                "products",
                vec![
                    doc! { "_id": 1, "name": "Tea", "price": 4, "code": "T" },
                    doc! { "_id": 2, "name": "Coffee", "price": 6, "code": "C" },
                    doc! { "_id": 3, "name": "Bread", "price": 3, "code": "B" },
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_assigns_id_first() {
        let store = InMemoryStore::new();

        let id = store.insert_one("products", doc! { "name": "Tea" }).await.unwrap();
        let stored = store.find_one("products", doc! {}, None).await.unwrap().unwrap();

        assert!(matches!(id, Bson::ObjectId(_)));
        assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(stored.get("_id"), Some(&id));
    }

    #[tokio::test]
    async fn test_find_sorts_skips_limits_and_projects() {
        let store = seeded().await;

        let found = store
            .find(
                "products",
                doc! { "price": { "$gte": 3 } },
                Some(
                    FindOptions::default()
                        .with_sort(doc! { "price": -1 })
                        .with_skip(1)
                        .with_limit(1)
                        .with_projection(doc! { "name": 1 }),
                ),
            )
            .await
            .unwrap();

        assert_eq!(found, vec![doc! { "_id": 1, "name": "Tea" }]);
    }

    #[tokio::test]
    async fn test_missing_collection_reads_empty() {
        let store = InMemoryStore::new();

        assert!(store.find("nothing", doc! {}, None).await.unwrap().is_empty());
        assert_eq!(store.count_documents("nothing", doc! {}).await.unwrap(), 0);
        assert_eq!(store.delete_many("nothing", doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let store = seeded().await;

        let err = store.insert_one("products", doc! { "_id": 1 }).await.unwrap_err();

        assert!(matches!(err, DocumentStoreError::DuplicateKey(_, collection) if collection == "products"));
    }

    #[tokio::test]
    async fn test_create_index_is_idempotent_by_name() {
        let store = seeded().await;
        let index = IndexModel::new(doc! { "code": 1 });

        assert_eq!(store.create_index("products", index.clone()).await.unwrap(), "code_1");
        assert_eq!(store.create_index("products", index.clone()).await.unwrap(), "code_1");

        assert_eq!(store.list_indexes("products").await, vec![index]);
        assert!(store.list_indexes("orders").await.is_empty());
    }

    #[tokio::test]
    async fn test_unique_index_is_enforced_on_insert_and_update() {
        let store = seeded().await;
        store
            .create_index(
                "products",
                IndexModel::new(doc! { "code": 1 }).with_options(IndexOptions {
                    unique: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        let insert = store.insert_one("products", doc! { "code": "T" }).await;
        let update = store
            .update_one("products", doc! { "_id": 2 }, doc! { "$set": { "code": "B" } }, None)
            .await;

        assert!(matches!(insert, Err(DocumentStoreError::DuplicateKey(..))));
        assert!(matches!(update, Err(DocumentStoreError::DuplicateKey(..))));
        assert_eq!(store.count_documents("products", doc! { "code": "B" }).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_counts_and_upsert() {
        let store = seeded().await;

        let outcome = store
            .update_many("products", doc! { "price": { "$lt": 5 } }, doc! { "$inc": { "price": 1 } }, None)
            .await
            .unwrap();
        assert_eq!((outcome.matched_count, outcome.modified_count), (2, 2));

        let unchanged = store
            .update_one("products", doc! { "_id": 1 }, doc! { "$set": { "name": "Tea" } }, None)
            .await
            .unwrap();
        assert_eq!((unchanged.matched_count, unchanged.modified_count), (1, 0));

        let upserted = store
            .update_one(
                "products",
                doc! { "code": "M" },
                doc! { "$set": { "name": "Milk" } },
                Some(UpdateOptions::upsert()),
            )
            .await
            .unwrap();
        assert!(upserted.upserted_id.is_some());
        assert_eq!(store.count_documents("products", doc! { "code": "M", "name": "Milk" }).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_one_and_update_returns_requested_version() {
        let store = seeded().await;

        let after = store
            .find_one_and_update("products", doc! { "_id": 1 }, doc! { "$set": { "price": 5 } }, None)
            .await
            .unwrap()
            .unwrap();
        let before = store
            .find_one_and_update(
                "products",
                doc! { "_id": 1 },
                doc! { "$set": { "price": 7 } },
                Some(FindOneAndUpdateOptions {
                    return_document: ReturnDocument::Before,
                    ..Default::default()
                }),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(after.get_i32("price").unwrap(), 5);
        assert_eq!(before.get_i32("price").unwrap(), 5);
        assert!(
            store
                .find_one_and_update("products", doc! { "_id": 9 }, doc! { "$set": { "price": 1 } }, None)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_deletes() {
        let store = seeded().await;

        assert_eq!(store.delete_one("products", doc! { "price": { "$gt": 3 } }).await.unwrap(), 1);
        let removed = store.find_one_and_delete("products", doc! { "_id": 3 }).await.unwrap();
        assert_eq!(removed.and_then(|d| d.get_str("name").ok().map(str::to_owned)), Some("Bread".into()));
        assert_eq!(store.delete_many("products", doc! {}).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bulk_write_runs_models_in_order() {
        let store = seeded().await;

        let result = store
            .bulk_write(
                "products",
                vec![
                    WriteModel::InsertOne { document: doc! { "_id": 4, "name": "Milk" } },
                    WriteModel::UpdateMany {
                        filter: doc! {},
                        update: doc! { "$set": { "active": true } },
                        upsert: false,
                    },
                    WriteModel::UpdateOne {
                        filter: doc! { "_id": 5 },
                        update: doc! { "$set": { "name": "Juice" } },
                        upsert: true,
                    },
                    WriteModel::DeleteOne { filter: doc! { "_id": 1 } },
                ],
            )
            .await
            .unwrap();

        assert_eq!(result.inserted_count, 1);
        assert_eq!(result.modified_count, 4);
        assert_eq!(result.upserted_ids.get(&2), Some(&Bson::Int32(5)));
        assert_eq!(result.deleted_count, 1);
        assert_eq!(store.count_documents("products", doc! {}).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_scoped_handles_share_state_per_database() {
        let store = InMemoryStore::builder().database("global").build().await.unwrap();
        let tenant = store.scoped("acme_retail");

        tenant.insert_one("products", doc! { "name": "Tea" }).await.unwrap();

        assert_eq!(store.count_documents("products", doc! {}).await.unwrap(), 0);
        assert_eq!(store.scoped("acme_retail").count_documents("products", doc! {}).await.unwrap(), 1);
        assert_eq!(tenant.list_collections().await, vec!["products".to_string()]);
    }

    #[tokio::test]
    async fn test_aggregate_joins_collections() {
        let store = seeded().await;
        store
            .insert_one("stock", doc! { "productId": 1, "quantity": 12 })
            .await
            .unwrap();

        let joined = store
            .aggregate(
                "products",
                vec![
                    doc! { "$match": { "_id": 1 } },
                    doc! { "$lookup": { "from": "stock", "localField": "_id", "foreignField": "productId", "as": "stock" } },
                    doc! { "$unwind": "$stock" },
                    doc! { "$project": { "name": 1, "quantity": "$stock.quantity" } },
                ],
                None,
            )
            .await
            .unwrap();

        assert_eq!(joined, vec![doc! { "_id": 1, "name": "Tea", "quantity": 12 }]);
    }
}
