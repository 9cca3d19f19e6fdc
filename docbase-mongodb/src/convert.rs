//! Translation of docbase option types and driver errors.

use mongodb::{
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{
        AggregateOptions as MongoAggregateOptions, Collation as MongoCollation, CollationStrength,
        FindOneOptions as MongoFindOneOptions, FindOptions as MongoFindOptions,
        IndexOptions as MongoIndexOptions,
    },
};

use docbase_core::{
    error::DocumentStoreError,
    options::{AggregateOptions, Collation, FindOneOptions, FindOptions, IndexModel},
};

/// Server error code of a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

pub(crate) fn find_options(options: FindOptions) -> MongoFindOptions {
    MongoFindOptions::builder()
        .sort(options.sort)
        .skip(options.skip)
        .limit(options.limit)
        .projection(options.projection)
        .build()
}

pub(crate) fn find_one_options(options: FindOneOptions) -> MongoFindOneOptions {
    MongoFindOneOptions::builder()
        .sort(options.sort)
        .skip(options.skip)
        .projection(options.projection)
        .build()
}

pub(crate) fn collation(collation: Collation) -> MongoCollation {
    let strength = collation.strength.and_then(|strength| match strength {
        1 => Some(CollationStrength::Primary),
        2 => Some(CollationStrength::Secondary),
        3 => Some(CollationStrength::Tertiary),
        4 => Some(CollationStrength::Quaternary),
        5 => Some(CollationStrength::Identical),
        _ => None,
    });

    MongoCollation::builder()
        .locale(collation.locale)
        .strength(strength)
        .build()
}

pub(crate) fn aggregate_options(options: AggregateOptions) -> MongoAggregateOptions {
    MongoAggregateOptions::builder()
        .collation(options.collation.map(collation))
        .allow_disk_use(options.allow_disk_use)
        .build()
}

pub(crate) fn index_model(index: IndexModel) -> mongodb::IndexModel {
    let options = index.options.map(|options| {
        MongoIndexOptions::builder()
            .unique(options.unique)
            .expire_after(options.expire_after)
            .name(options.name)
            .build()
    });

    mongodb::IndexModel::builder()
        .keys(index.keys)
        .options(options)
        .build()
}

/// Maps a driver error, reporting unique index violations as `DuplicateKey`.
pub(crate) fn store_error(collection: &str, err: MongoError) -> DocumentStoreError {
    if let ErrorKind::Write(WriteFailure::WriteError(write_error)) = err.kind.as_ref() {
        if write_error.code == DUPLICATE_KEY_CODE {
            return DocumentStoreError::DuplicateKey(write_error.message.clone(), collection.to_string());
        }
    }

    DocumentStoreError::Backend(err.to_string())
}
