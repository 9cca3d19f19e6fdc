use std::time::Duration;

use bson::{DateTime, doc, oid::ObjectId};
use docbase::{memory::InMemoryStore, prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[serde(rename_all = "camelCase")]
#[entity(collection = "products", timestamps)]
struct Product {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    name: String,
    price: i64,
    #[serde(default)]
    active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime>,
}

impl Product {
    fn new(name: &str, price: i64) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            price,
            active: true,
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(collection = "settings")]
struct Setting {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    key: String,
}

async fn seeded() -> Service<Product, InMemoryStore> {
    let products = Service::new(InMemoryStore::new());
    products
        .insert_many(&[
            Product::new("Green Tea", 12),
            Product::new("Black Tea", 9),
            Product::new("Espresso", 15),
            Product::new("Mint Tea", 7),
            Product { active: false, ..Product::new("Decaf", 11) },
        ])
        .await
        .unwrap();
    products
}

#[tokio::test]
async fn test_insert_stamps_both_timestamps_with_same_instant() {
    let products = Service::<Product, _>::new(InMemoryStore::new());

    let id = products.insert_one(&Product::new("Green Tea", 12)).await.unwrap();
    let stored = products.find_one(doc! { "_id": id }, None).await.unwrap().unwrap();

    assert_eq!(stored.id, Some(id));
    assert!(stored.created_at.is_some());
    assert_eq!(stored.created_at, stored.updated_at);
}

#[tokio::test]
async fn test_entities_without_timestamps_are_stored_as_is() {
    let store = InMemoryStore::new();
    let settings = Service::<Setting, _>::new(store.clone());

    let id = settings
        .insert_one(&Setting { id: None, key: "currency".to_string() })
        .await
        .unwrap();

    let raw = store.find_one("settings", doc! { "_id": id }, None).await.unwrap().unwrap();
    assert_eq!(raw, doc! { "_id": id, "key": "currency" });
}

#[tokio::test]
async fn test_update_refreshes_modification_time_only() {
    let products = Service::<Product, _>::new(InMemoryStore::new());
    let id = products.insert_one(&Product::new("Green Tea", 12)).await.unwrap();
    let inserted = products.find_one(doc! { "_id": id }, None).await.unwrap().unwrap();

    let created_override = DateTime::from_millis(1);
    let modified = products
        .update_one(
            doc! { "_id": id },
            doc! { "$set": { "price": 14, "createdAt": created_override } },
            None,
        )
        .await
        .unwrap();
    assert_eq!(modified, 1);

    let updated = products.find_one(doc! { "_id": id }, None).await.unwrap().unwrap();
    assert_eq!(updated.price, 14);
    assert_eq!(updated.created_at, inserted.created_at);
    assert!(updated.updated_at >= inserted.updated_at);
}

#[tokio::test]
async fn test_find_one_and_update_returns_updated_entity() {
    let products = seeded().await;

    let updated = products
        .find_one_and_update(doc! { "name": "Espresso" }, doc! { "$inc": { "price": 1 } }, None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.price, 16);
    assert!(updated.updated_at.is_some());
}

#[tokio::test]
async fn test_create_reads_back_the_inserted_entity() {
    let products = Service::<Product, _>::new(InMemoryStore::new());

    let created = products.create(&Product::new("Oolong", 20)).await.unwrap();

    assert!(created.id.is_some());
    assert_eq!(created.name, "Oolong");
    assert_eq!(products.count_documents(doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn test_get_one_or_fail_messages() {
    let products = seeded().await;

    let found = products.get_one_or_fail(doc! { "name": "Mint Tea" }, None).await.unwrap();
    assert_eq!(found.price, 7);

    let err = products.get_one_or_fail(doc! { "name": "Matcha" }, None).await.unwrap_err();
    assert_eq!(err, DomainError::not_found("Data not found"));

    let err = products
        .get_one_or_fail(
            doc! { "name": "Matcha" },
            Some(OrFailOptions::message("Product not found")),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, 404);
    assert_eq!(err.message, "Product not found");

    let products = products.with_options(ServiceOptions {
        get_one_or_fail_message: "No such product".to_string(),
        ..Default::default()
    });
    let err = products.get_one_or_fail(doc! { "name": "Matcha" }, None).await.unwrap_err();
    assert_eq!(err.message, "No such product");
}

#[tokio::test]
async fn test_find_or_fail_requires_exact_count() {
    let products = seeded().await;
    let filter = doc! { "name": { "$regex": "Tea$" } };

    let teas = products.find_or_fail(filter.clone(), 3, None).await.unwrap();
    assert_eq!(teas.len(), 3);

    let err = products.find_or_fail(filter.clone(), 2, None).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.message, "One or more data not found");

    let err = products
        .find_or_fail(
            filter,
            4,
            Some(OrFailOptions::message("Some products are missing")
                .with_options(FindOptions::default().with_limit(10))),
        )
        .await
        .unwrap_err();
    assert_eq!(err.message, "Some products are missing");
}

#[tokio::test]
async fn test_for_target_binds_tenant_database() {
    let store = InMemoryStore::new();
    let namespaces = NamespaceConfig::new("retail");

    let acme = Service::<Product, _>::for_target(
        &store,
        &namespaces,
        &DatabaseTarget::Company("acme".to_string()),
    );
    let global = Service::<Product, _>::for_target(&store, &namespaces, &DatabaseTarget::Global);

    acme.insert_one(&Product::new("Green Tea", 12)).await.unwrap();

    assert_eq!(acme.backend().database(), "acme_retail");
    assert_eq!(acme.count_documents(doc! {}).await.unwrap(), 1);
    assert_eq!(global.backend().database(), "retail");
    assert_eq!(global.count_documents(doc! {}).await.unwrap(), 0);
}

#[tokio::test]
async fn test_paginated_aggregate() {
    let products = seeded().await;

    let pipeline = PipelineBuilder::new()
        .match_stage(doc! { "active": true })
        .project(doc! { "name": 1, "price": 1, "active": 1 })
        .pagination(&PaginationQuery::new(2, 2).with_sort("price", -1), &[])
        .build();

    let documents = products.aggregate(pipeline, None).await.unwrap();
    let page = PaginationResult::<Product>::from_aggregate(documents).unwrap();

    assert_eq!(page.total_records, 4);
    let names = page.data.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Black Tea", "Mint Tea"]);
}

#[tokio::test]
async fn test_paginated_aggregate_without_matches_is_empty() {
    let products = seeded().await;

    let pipeline = PipelineBuilder::new()
        .match_stage(doc! { "price": { "$gt": 100 } })
        .pagination(&PaginationQuery::new(1, 10), &[SortSpec::ascending("name")])
        .build();

    let documents = products.aggregate(pipeline, None).await.unwrap();
    let page = PaginationResult::<Product>::from_aggregate(documents).unwrap();

    assert_eq!(page, PaginationResult::default());
}

#[tokio::test]
async fn test_search_matches_any_field_case_insensitively() {
    let products = seeded().await;

    let pipeline = PipelineBuilder::new()
        .search("TEA", &["name", "description"])
        .sort(doc! { "name": 1 })
        .build();

    let found: Vec<Product> = products.aggregate(pipeline, None).await.unwrap();
    let names = found.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();

    assert_eq!(names, vec!["Black Tea", "Green Tea", "Mint Tea"]);
}

#[tokio::test]
async fn test_option_list_yields_label_value_pairs() {
    let products = seeded().await;

    let pipeline = PipelineBuilder::new()
        .match_stage(doc! { "price": { "$lt": 12 } })
        .extend(option_list("name", true, "name", "price"))
        .build();
    let options: Vec<OptionItem<i64>> = products.aggregate(pipeline, None).await.unwrap();

    assert_eq!(
        options,
        vec![
            OptionItem { label: "Black Tea".to_string(), value: 9 },
            OptionItem { label: "Decaf".to_string(), value: 11 },
            OptionItem { label: "Mint Tea".to_string(), value: 7 },
        ]
    );

    let disabled = PipelineBuilder::new().extend(option_list("name", false, "name", "price")).build();
    let options: Vec<OptionItem<i64>> = products.aggregate(disabled, None).await.unwrap();
    assert!(options.is_empty());
}

#[tokio::test]
async fn test_unique_index_reports_duplicates() {
    let products = seeded().await;
    products.make_unique(doc! { "name": 1 }).await.unwrap();

    let err = products.insert_one(&Product::new("Espresso", 3)).await.unwrap_err();

    assert!(matches!(err, DocumentStoreError::DuplicateKey(_, _)));
    assert_eq!(DomainError::from(err).code, 500);
}

#[tokio::test]
async fn test_filters_compose_into_queries() {
    let products = seeded().await;

    let filter = doc! {
        "price": filter::range(&[9, 12]),
        "name": filter::search("tea"),
        "active": filter::exact_opt(None::<bool>),
    };

    let found = products
        .find(filter, Some(FindOptions::default().with_sort(doc! { "price": 1 })))
        .await
        .unwrap();
    let names = found.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();

    assert_eq!(names, vec!["Black Tea", "Green Tea"]);
}

#[tokio::test]
async fn test_find_or_fail_reports_count_before_backend_error() {
    let products = seeded().await;
    let unsupported = doc! { "$where": "this.price > 10" };

    let err = products.find_or_fail(unsupported.clone(), 3, None).await.unwrap_err();
    assert_eq!(err, DomainError::not_found("One or more data not found"));

    let err = products.find_or_fail(unsupported, 0, None).await.unwrap_err();
    assert_eq!(err.code, 500);
}

#[tokio::test]
async fn test_get_one_or_fail_maps_backend_error_to_internal() {
    let products = seeded().await;

    let err = products
        .get_one_or_fail(doc! { "$where": "this.price > 10" }, None)
        .await
        .unwrap_err();

    assert_eq!(err.code, 500);
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn test_update_many_stamps_and_raw_update_does_not() {
    let store = InMemoryStore::new();
    let stamped = DateTime::from_millis(1_000);
    store
        .insert_many(
            "products",
            vec![
                doc! { "name": "Green Tea", "price": 12_i64, "active": true, "createdAt": stamped, "updatedAt": stamped },
                doc! { "name": "Black Tea", "price": 9_i64, "active": true, "createdAt": stamped, "updatedAt": stamped },
                doc! { "name": "Espresso", "price": 15_i64, "active": true, "createdAt": stamped, "updatedAt": stamped },
            ],
        )
        .await
        .unwrap();
    let products = Service::<Product, _>::new(store);

    let modified = products
        .update_many(doc! { "name": { "$regex": "Tea" } }, doc! { "$inc": { "price": 1 } }, None)
        .await
        .unwrap();
    assert_eq!(modified, 2);

    let modified = products
        .update_many_raw(doc! { "name": "Espresso" }, doc! { "$inc": { "price": 1 } }, None)
        .await
        .unwrap();
    assert_eq!(modified, 1);

    for tea in products.find(doc! { "name": { "$regex": "Tea" } }, None).await.unwrap() {
        assert_eq!(tea.created_at, Some(stamped));
        assert!(tea.updated_at > Some(stamped));
    }

    let espresso = products.get_one_or_fail(doc! { "name": "Espresso" }, None).await.unwrap();
    assert_eq!(espresso.price, 16);
    assert_eq!(espresso.updated_at, Some(stamped));
}

#[tokio::test]
async fn test_updates_without_timestamps_pass_through() {
    let store = InMemoryStore::new();
    let settings = Service::<Setting, _>::new(store.clone());
    let id = settings
        .insert_one(&Setting { id: None, key: "currency".to_string() })
        .await
        .unwrap();

    settings
        .update_one(doc! { "_id": id }, doc! { "$set": { "key": "locale" } }, None)
        .await
        .unwrap();
    settings
        .update_many(doc! {}, doc! { "$unset": { "note": "" } }, None)
        .await
        .unwrap();

    let raw = store.find_one("settings", doc! { "_id": id }, None).await.unwrap().unwrap();
    assert_eq!(raw, doc! { "_id": id, "key": "locale" });
}

#[tokio::test]
async fn test_delete_from_database_attribute_creates_ttl_index() {
    let store = InMemoryStore::new();
    let products = Service::<Product, _>::new(store.clone());

    products
        .set_delete_from_database_attribute(doc! { "deleteFromDatabaseAt": 1 })
        .await
        .unwrap();

    let indexes = store.list_indexes("products").await;
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].keys, doc! { "deleteFromDatabaseAt": 1 });
    assert_eq!(
        indexes[0].options.as_ref().and_then(|options| options.expire_after),
        Some(Duration::ZERO)
    );
}

#[tokio::test]
async fn test_bulk_write_applies_mixed_models() {
    let products = seeded().await;

    let result = products
        .bulk_write(vec![
            WriteModel::InsertOne {
                document: doc! { "name": "Oolong", "price": 20_i64, "active": true },
            },
            WriteModel::UpdateOne {
                filter: doc! { "name": "Espresso" },
                update: doc! { "$set": { "price": 18_i64 } },
                upsert: false,
            },
            WriteModel::UpdateMany {
                filter: doc! { "name": "Matcha" },
                update: doc! { "$set": { "price": 25_i64, "active": true } },
                upsert: true,
            },
            WriteModel::DeleteMany { filter: doc! { "active": false } },
        ])
        .await
        .unwrap();

    assert_eq!(result.inserted_count, 1);
    assert_eq!(result.matched_count, 1);
    assert_eq!(result.modified_count, 1);
    assert_eq!(result.upserted_count, 1);
    assert_eq!(result.deleted_count, 1);
    assert!(result.inserted_ids.contains_key(&0));
    assert!(result.upserted_ids.contains_key(&2));

    assert_eq!(products.count_documents(doc! {}).await.unwrap(), 6);
    let matcha = products.get_one_or_fail(doc! { "name": "Matcha" }, None).await.unwrap();
    assert_eq!(matcha.price, 25);
    let espresso = products.get_one_or_fail(doc! { "name": "Espresso" }, None).await.unwrap();
    assert_eq!(espresso.price, 18);
}
