//! Database selection for multi-tenant deployments.
//!
//! A deployment keeps one logical database per tenant. [`NamespaceConfig`] holds the base
//! name and [`DatabaseTarget`] picks the tenant, so a service can be bound with
//! `Service::for_target(&backend, &namespaces, DatabaseTarget::Company("acme".into()))`.

use serde::{Deserialize, Serialize};

/// Which database an operation runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "camelCase")]
pub enum DatabaseTarget {
    /// An explicit database name, used as is.
    Custom(String),
    /// A company tenant database.
    Company(String),
    /// A partner tenant's administration database.
    Partner(String),
    /// The shared database.
    Global,
    /// The shared administration database.
    Admin,
}

/// Naming scheme for tenant databases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub base: String,
}

impl NamespaceConfig {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Resolves the database name for `target`.
    pub fn database_name(&self, target: &DatabaseTarget) -> String {
        let base = &self.base;

        match target {
            DatabaseTarget::Custom(name) => name.clone(),
            DatabaseTarget::Company(code) => format!("{code}_{base}"),
            DatabaseTarget::Partner(code) => format!("{code}_admin_{base}"),
            DatabaseTarget::Global => base.clone(),
            DatabaseTarget::Admin => format!("admin_{base}"),
        }
    }
}

/// A backend handle that can be rebound to another database of the same deployment.
pub trait TenantScoped: Sized {
    /// Returns a handle sharing this one's connection, bound to `database`.
    fn scoped(&self, database: &str) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_names() {
        let namespaces = NamespaceConfig::new("retail");

        assert_eq!(namespaces.database_name(&DatabaseTarget::Global), "retail");
        assert_eq!(namespaces.database_name(&DatabaseTarget::Admin), "admin_retail");
        assert_eq!(
            namespaces.database_name(&DatabaseTarget::Company("acme".into())),
            "acme_retail"
        );
        assert_eq!(
            namespaces.database_name(&DatabaseTarget::Partner("acme".into())),
            "acme_admin_retail"
        );
        assert_eq!(
            namespaces.database_name(&DatabaseTarget::Custom("scratch".into())),
            "scratch"
        );
    }

    #[test]
    fn test_target_deserializes_from_tagged_json() {
        let target: DatabaseTarget =
            serde_json::from_str(r#"{ "kind": "company", "code": "acme" }"#).unwrap();

        assert_eq!(target, DatabaseTarget::Company("acme".into()));
    }
}
