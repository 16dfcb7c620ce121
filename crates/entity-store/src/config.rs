//! Where and as whom the SurrealDB backend connects
//!
//! A [`StoreConfig`] is either built in code or read from `SURREALDB_*`
//! variables. In-memory stores need none of this.

use crate::error::StateError;

pub(crate) const DEFAULT_NAMESPACE: &str = "entity_graph";
pub(crate) const DEFAULT_DATABASE: &str = "main";

/// Which SurrealDB user level the credentials sign in at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScope {
    /// Server-wide user; may define tables in any namespace.
    Root,
    /// User defined on the target namespace and database only.
    #[default]
    Database,
}

/// Remote backend connection settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Anything `surrealdb::engine::any::connect` accepts, e.g. `ws://host:8000`.
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    pub scope: AuthScope,
}

impl StoreConfig {
    /// Database-scoped credentials against the default namespace and database.
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            scope: AuthScope::Database,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_scope(mut self, scope: AuthScope) -> Self {
        self.scope = scope;
        self
    }

    /// Read `SURREALDB_ENDPOINT`, `SURREALDB_USERNAME` and
    /// `SURREALDB_PASSWORD`, which must all be set. `SURREALDB_NAMESPACE`
    /// and `SURREALDB_DATABASE` override the defaults; `SURREALDB_ROOT=true`
    /// selects [`AuthScope::Root`].
    pub fn from_env() -> std::result::Result<Self, StateError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> std::result::Result<Self, StateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| StateError::Config(format!("{key} not set")))
        };
        let mut config = Self::new(
            required("SURREALDB_ENDPOINT")?,
            required("SURREALDB_USERNAME")?,
            required("SURREALDB_PASSWORD")?,
        );
        if let Some(namespace) = lookup("SURREALDB_NAMESPACE") {
            config.namespace = namespace;
        }
        if let Some(database) = lookup("SURREALDB_DATABASE") {
            config.database = database;
        }
        if lookup("SURREALDB_ROOT").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            config.scope = AuthScope::Root;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn from_lookup_applies_defaults() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("SURREALDB_ENDPOINT", "ws://localhost:8000"),
            ("SURREALDB_USERNAME", "app"),
            ("SURREALDB_PASSWORD", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.namespace, "entity_graph");
        assert_eq!(config.database, "main");
        assert_eq!(config.scope, AuthScope::Database);
    }

    #[test]
    fn from_lookup_reads_overrides() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("SURREALDB_ENDPOINT", "ws://localhost:8000"),
            ("SURREALDB_USERNAME", "root"),
            ("SURREALDB_PASSWORD", "root"),
            ("SURREALDB_NAMESPACE", "shop"),
            ("SURREALDB_DATABASE", "catalog"),
            ("SURREALDB_ROOT", "TRUE"),
        ]))
        .unwrap();

        assert_eq!(config.namespace, "shop");
        assert_eq!(config.database, "catalog");
        assert_eq!(config.scope, AuthScope::Root);
    }

    #[test]
    fn from_lookup_requires_endpoint() {
        let err = StoreConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("SURREALDB_ENDPOINT"));
    }

    #[test]
    fn builder_methods_override_defaults() {
        let config = StoreConfig::new("ws://db", "u", "p")
            .with_scope(AuthScope::Root)
            .with_namespace("ns")
            .with_database("db");
        assert_eq!(config.scope, AuthScope::Root);
        assert_eq!(config.namespace, "ns");
        assert_eq!(config.database, "db");
    }
}
