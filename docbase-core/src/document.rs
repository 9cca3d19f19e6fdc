//! Core traits and types for entity representation and serialization.
//!
//! This module provides the fundamental trait every entity handled by a
//! [`Service`](crate::service::Service) must implement, the timestamp capability an entity can
//! opt into, and helpers for converting entities to and from BSON documents.

use bson::{DateTime, Document, de::deserialize_from_document, ser::serialize_to_document};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::DocumentStoreResult;

/// Names of the creation and modification timestamp fields of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampFields {
    /// Field set once, when the entity is inserted.
    pub created_at: &'static str,
    /// Field refreshed on every insert and update.
    pub updated_at: &'static str,
}

impl TimestampFields {
    /// The conventional `createdAt` / `updatedAt` pair.
    pub const DEFAULT: TimestampFields = TimestampFields {
        created_at: "createdAt",
        updated_at: "updatedAt",
    };
}

impl Default for TimestampFields {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Core trait that all entities stored through a service must implement.
///
/// An entity is any serde record with an `_id` field. Timestamp handling is an explicit
/// capability: override [`Entity::TIMESTAMPS`] (or use `#[entity(timestamps)]` with the derive)
/// and the service stamps both fields on insert and the modification field on update.
///
/// # Example
///
/// ```ignore
/// use docbase::document::{Entity, TimestampFields};
/// use bson::{oid::ObjectId, DateTime};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// pub struct Category {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     pub id: Option<ObjectId>,
///     pub name: String,
///     pub created_at: DateTime,
///     pub updated_at: DateTime,
/// }
///
/// impl Entity for Category {
///     const TIMESTAMPS: Option<TimestampFields> = Some(TimestampFields::DEFAULT);
///
///     fn collection_name() -> &'static str {
///         "categories"
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Timestamp fields managed by the service, `None` when the entity has none.
    const TIMESTAMPS: Option<TimestampFields> = None;

    /// Returns the default collection name for this entity.
    fn collection_name() -> &'static str;
}

/// Extension trait providing BSON conversion utilities for entities.
///
/// This trait is automatically implemented for all types that implement [`Entity`].
pub trait EntityExt: Entity {
    /// Converts this entity to a BSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the entity does not serialize to a document.
    fn to_document(&self) -> DocumentStoreResult<Document>;

    /// Creates an entity from a BSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not match the entity's shape.
    fn from_document(document: Document) -> DocumentStoreResult<Self>;

    /// Converts this entity to a document ready for insertion.
    ///
    /// When the entity declares [`Entity::TIMESTAMPS`], both fields are set to `now`.
    /// Otherwise the serialized document is returned untouched.
    fn to_insert_document(&self, now: DateTime) -> DocumentStoreResult<Document>;
}

impl<E: Entity> EntityExt for E {
    fn to_document(&self) -> DocumentStoreResult<Document> {
        Ok(serialize_to_document(self)?)
    }

    fn from_document(document: Document) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_document(document)?)
    }

    fn to_insert_document(&self, now: DateTime) -> DocumentStoreResult<Document> {
        let mut document = self.to_document()?;

        if let Some(fields) = E::TIMESTAMPS {
            document.insert(fields.created_at, now);
            document.insert(fields.updated_at, now);
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use bson::oid::ObjectId;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Stamped {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        id: Option<ObjectId>,
        name: String,
        created_at: DateTime,
        updated_at: DateTime,
    }

    impl Entity for Stamped {
        const TIMESTAMPS: Option<TimestampFields> = Some(TimestampFields::DEFAULT);

        fn collection_name() -> &'static str {
            "stamped"
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Plain {
        name: String,
        updated_at: DateTime,
    }

    impl Entity for Plain {
        fn collection_name() -> &'static str {
            "plain"
        }
    }

    #[test]
    fn test_insert_document_stamps_both_fields_with_same_instant() {
        let now = DateTime::from_millis(1_700_000_000_000);
        let entity = Stamped {
            id: None,
            name: "Shelf".into(),
            created_at: DateTime::from_millis(0),
            updated_at: DateTime::from_millis(0),
        };

        let document = entity.to_insert_document(now).unwrap();

        assert_eq!(document.get_datetime("createdAt").unwrap(), &now);
        assert_eq!(document.get_datetime("updatedAt").unwrap(), &now);
        assert!(!document.contains_key("_id"));
    }

    #[test]
    fn test_insert_document_leaves_undeclared_entities_untouched() {
        let original = DateTime::from_millis(42);
        let entity = Plain { name: "Shelf".into(), updated_at: original };

        let document = entity.to_insert_document(DateTime::from_millis(1_000)).unwrap();

        assert_eq!(document.get_datetime("updatedAt").unwrap(), &original);
        assert!(!document.contains_key("createdAt"));
    }

    #[test]
    fn test_document_round_trip_keeps_identifier() {
        let id = ObjectId::new();
        let entity = Stamped {
            id: Some(id),
            name: "Shelf".into(),
            created_at: DateTime::from_millis(1),
            updated_at: DateTime::from_millis(2),
        };

        let restored = Stamped::from_document(entity.to_document().unwrap()).unwrap();

        assert_eq!(restored.id, Some(id));
        assert_eq!(restored.name, "Shelf");
    }
}
