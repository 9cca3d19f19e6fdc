//! Audit trail of changes made by users.
//!
//! [`ChangelogUseCase`] records one [`Changelog`] entry per change. It resolves the acting
//! user through a service over any [`Actor`] entity, so the user model stays owned by the
//! application.

use bson::{Bson, DateTime, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    backend::StoreBackend,
    document::{Entity, TimestampFields},
    error::DocumentStoreError,
    service::Service,
    tenant::{DatabaseTarget, NamespaceConfig, TenantScoped},
};

/// An entity that can be recorded as the author of a change.
pub trait Actor: Entity {
    /// The identifier stored as `modifiedById`.
    fn actor_id(&self) -> ObjectId;

    /// The name stored as `modifiedBy`.
    fn display_name(&self) -> &str;
}

/// A stored audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changelog {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub action: String,
    pub field: Option<String>,
    pub old_value: Bson,
    pub new_value: Bson,
    pub modified_by: String,
    pub modified_by_id: ObjectId,
    pub object: String,
    pub object_id: ObjectId,
    pub object_name: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Entity for Changelog {
    const TIMESTAMPS: Option<TimestampFields> = Some(TimestampFields::DEFAULT);

    fn collection_name() -> &'static str {
        "change_logs"
    }
}

/// What changed, as reported by the caller. The author is resolved by the use case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogEntry {
    pub action: String,
    pub field: Option<String>,
    pub old_value: Bson,
    pub new_value: Bson,
    pub object: String,
    pub object_id: ObjectId,
    pub object_name: String,
}

#[derive(Error, Debug)]
pub enum ChangelogError {
    #[error("user {0} not found while trying to create changelog")]
    ActorNotFound(ObjectId),
    #[error(transparent)]
    Store(#[from] DocumentStoreError),
}

/// Records changelog entries authored by users of type `A`.
#[derive(Debug, Clone)]
pub struct ChangelogUseCase<B, A> {
    changelogs: Service<Changelog, B>,
    actors: Service<A, B>,
}

impl<B, A> ChangelogUseCase<B, A>
where
    B: StoreBackend + Clone,
    A: Actor,
{
    /// Uses the default collections of both entities on `backend`.
    pub fn new(backend: B) -> Self {
        Self {
            changelogs: Service::new(backend.clone()),
            actors: Service::new(backend),
        }
    }

    /// Uses the default collections of the tenant database selected by `target`.
    pub fn for_target(backend: &B, namespaces: &NamespaceConfig, target: &DatabaseTarget) -> Self
    where
        B: TenantScoped,
    {
        Self::new(backend.scoped(&namespaces.database_name(target)))
    }

    pub fn from_services(changelogs: Service<Changelog, B>, actors: Service<A, B>) -> Self {
        Self { changelogs, actors }
    }

    /// Looks up the acting user and stores the entry with its name and identifier.
    ///
    /// # Errors
    ///
    /// - [`ChangelogError::ActorNotFound`] if no user has identifier `user_id`
    /// - [`ChangelogError::Store`] if a store operation fails
    pub async fn create_changelog(
        &self,
        entry: ChangelogEntry,
        user_id: ObjectId,
    ) -> Result<ObjectId, ChangelogError> {
        let actor = self
            .actors
            .find_one(doc! { "_id": user_id }, None)
            .await?
            .ok_or(ChangelogError::ActorNotFound(user_id))?;

        let now = DateTime::now();
        let changelog = Changelog {
            id: Some(ObjectId::new()),
            action: entry.action,
            field: entry.field,
            old_value: entry.old_value,
            new_value: entry.new_value,
            modified_by: actor.display_name().to_string(),
            modified_by_id: actor.actor_id(),
            object: entry.object,
            object_id: entry.object_id,
            object_name: entry.object_name,
            created_at: now,
            updated_at: now,
        };

        let id = self.changelogs.insert_one(&changelog).await?;
        tracing::debug!(changelog_id = %id, object = %changelog.object, "Changelog recorded");

        Ok(id)
    }
}
