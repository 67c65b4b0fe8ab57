//! Registry of game server groups.

use std::sync::Arc;

use flux_store::{LedgerStore, MySqlStore, StoreError};

use crate::config::ServerGroupConfig;

/// A game server group and its donation ledger.
#[derive(Clone)]
pub struct ServerGroup {
    /// Human-readable server name.
    pub name: String,
    /// Ledger in the group's login database.
    pub store: Arc<dyn LedgerStore>,
}

impl std::fmt::Debug for ServerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerGroup")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Server groups in registration order, looked up by exact name.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    groups: Vec<ServerGroup>,
}

impl ServerRegistry {
    /// Build a registry from already-opened groups.
    #[must_use]
    pub fn new(groups: Vec<ServerGroup>) -> Self {
        Self { groups }
    }

    /// Open a MySQL ledger for every configured group.
    ///
    /// # Errors
    ///
    /// Returns the first connection or schema error.
    pub async fn connect(configs: &[ServerGroupConfig]) -> Result<Self, StoreError> {
        let mut groups = Vec::with_capacity(configs.len());

        for config in configs {
            tracing::info!(
                server = %config.name,
                database = %config.login_database,
                "Connecting server group"
            );
            let store = MySqlStore::connect(&config.database_url, &config.login_database).await?;
            if config.create_schema {
                store.ensure_schema().await?;
            }
            groups.push(ServerGroup {
                name: config.name.clone(),
                store: Arc::new(store),
            });
        }

        Ok(Self::new(groups))
    }

    /// Group with exactly this name (case-sensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServerGroup> {
        self.groups.iter().find(|group| group.name == name)
    }

    /// All groups in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ServerGroup> {
        self.groups.iter()
    }

    /// Group names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.groups.iter().map(|group| group.name.as_str()).collect()
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no groups are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
