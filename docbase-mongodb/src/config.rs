//! Connection settings read from the environment.

use std::env;

use serde::{Deserialize, Serialize};

use crate::store::MongoDbStoreBuilder;

pub const URI_VAR: &str = "MONGO_URI";
pub const DATABASE_VAR: &str = "DOCBASE_DATABASE";

pub const DEFAULT_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_DATABASE: &str = "docbase";

/// Where to connect and which database to bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub uri: String,
    pub database: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            database: DEFAULT_DATABASE.to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Reads `MONGO_URI` and `DOCBASE_DATABASE`, falling back to the defaults for unset or
    /// empty variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str, default: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            uri: read(URI_VAR, DEFAULT_URI),
            database: read(DATABASE_VAR, DEFAULT_DATABASE),
        }
    }

    pub fn builder(self) -> MongoDbStoreBuilder {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults_apply_to_missing_and_blank_variables() {
        let vars = HashMap::from([(DATABASE_VAR, "  ")]);

        let config = ConnectionConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config, ConnectionConfig::default());
    }

    #[test]
    fn test_variables_override_defaults() {
        let vars = HashMap::from([
            (URI_VAR, "mongodb://db.internal:27017/?replicaSet=rs0"),
            (DATABASE_VAR, "retail"),
        ]);

        let config = ConnectionConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.uri, "mongodb://db.internal:27017/?replicaSet=rs0");
        assert_eq!(config.database, "retail");
    }
}
