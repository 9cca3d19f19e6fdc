//! Backend-agnostic option types for store operations.
//!
//! These mirror the subset of driver options the service layer uses. Backends translate
//! them into their own representation; options a backend cannot honor are ignored.

use std::time::Duration;

use bson::Document;
use serde::{Deserialize, Serialize};

/// Options for `find`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub projection: Option<Document>,
}

impl FindOptions {
    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }
}

/// Options for `find_one`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneOptions {
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub projection: Option<Document>,
}

/// String comparison rules for aggregations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collation {
    pub locale: String,
    pub strength: Option<i32>,
}

impl Collation {
    pub fn new(locale: impl Into<String>) -> Self {
        Self { locale: locale.into(), strength: None }
    }

    pub fn with_strength(mut self, strength: i32) -> Self {
        self.strength = Some(strength);
        self
    }
}

/// Options for `aggregate`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOptions {
    pub collation: Option<Collation>,
    pub allow_disk_use: Option<bool>,
}

impl AggregateOptions {
    /// The collation applied when a caller passes no options: English, tertiary strength.
    pub fn default_collation() -> Self {
        Self {
            collation: Some(Collation::new("en").with_strength(3)),
            allow_disk_use: None,
        }
    }
}

/// Options for `update_one` and `update_many`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub upsert: Option<bool>,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: Some(true) }
    }
}

/// Which version of the document `find_one_and_update` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    Before,
    #[default]
    After,
}

/// Options for `find_one_and_update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneAndUpdateOptions {
    pub return_document: ReturnDocument,
    pub upsert: Option<bool>,
    pub sort: Option<Document>,
}

/// Options for `create_index`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    pub unique: Option<bool>,
    pub expire_after: Option<Duration>,
    pub name: Option<String>,
}

/// An index specification: key document plus options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexModel {
    pub keys: Document,
    pub options: Option<IndexOptions>,
}

impl IndexModel {
    pub fn new(keys: Document) -> Self {
        Self { keys, options: None }
    }

    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// The index name: the explicit one, or `field_dir` pairs joined with `_`.
    pub fn name(&self) -> String {
        if let Some(name) = self.options.as_ref().and_then(|o| o.name.clone()) {
            return name;
        }

        self.keys
            .iter()
            .map(|(field, direction)| format!("{field}_{direction}"))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn is_unique(&self) -> bool {
        self.options
            .as_ref()
            .and_then(|o| o.unique)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn test_index_name_defaults_to_key_pairs() {
        let model = IndexModel::new(doc! { "code": 1, "createdAt": -1 });

        assert_eq!(model.name(), "code_1_createdAt_-1");
        assert!(!model.is_unique());
    }

    #[test]
    fn test_index_name_prefers_explicit_name() {
        let model = IndexModel::new(doc! { "code": 1 }).with_options(IndexOptions {
            unique: Some(true),
            name: Some("unique_code".into()),
            ..Default::default()
        });

        assert_eq!(model.name(), "unique_code");
        assert!(model.is_unique());
    }

    #[test]
    fn test_find_one_and_update_returns_after_by_default() {
        assert_eq!(FindOneAndUpdateOptions::default().return_document, ReturnDocument::After);
    }
}
