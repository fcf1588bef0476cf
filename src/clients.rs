//! Remote domain-state collaborators.
//!
//! Account, resource and aggregated-stat state is owned by other services;
//! the engine only ever sees a point-in-time snapshot fetched through one of
//! these traits. Every call takes a caller-supplied deadline and a timeout
//! surfaces as an ordinary [`crate::EngineError::Backend`] from the
//! implementation, never as partial data.

use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Account snapshots by (tenant, account ID).
pub trait AccountsClient: Send + Sync {
    fn account_snapshot(&self, tenant: &str, account_id: &str, deadline: Duration)
        -> Result<Value>;
}

/// Resource snapshots by (tenant, resource ID).
pub trait ResourcesClient: Send + Sync {
    fn resource_snapshot(
        &self,
        tenant: &str,
        resource_id: &str,
        deadline: Duration,
    ) -> Result<Value>;
}

/// Aggregated stat metrics by (tenant, stat queue ID).
pub trait StatsClient: Send + Sync {
    fn stat_metrics(&self, tenant: &str, stat_id: &str, deadline: Duration) -> Result<Value>;
}

/// Reverse destination lookup: destination group IDs claiming a number prefix.
pub trait DestinationsClient: Send + Sync {
    fn reverse_destinations(&self, prefix: &str, deadline: Duration) -> Result<Vec<String>>;
}

/// Bundle of optional domain collaborators injected into the resolver.
///
/// A rule that needs an absent collaborator fails with a resolution error;
/// deployments that never filter on remote state simply leave them unset.
#[derive(Clone, Default)]
pub struct DomainClients {
    pub accounts: Option<Arc<dyn AccountsClient>>,
    pub resources: Option<Arc<dyn ResourcesClient>>,
    pub stats: Option<Arc<dyn StatsClient>>,
    pub destinations: Option<Arc<dyn DestinationsClient>>,
}

impl DomainClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(mut self, client: Arc<dyn AccountsClient>) -> Self {
        self.accounts = Some(client);
        self
    }

    pub fn with_resources(mut self, client: Arc<dyn ResourcesClient>) -> Self {
        self.resources = Some(client);
        self
    }

    pub fn with_stats(mut self, client: Arc<dyn StatsClient>) -> Self {
        self.stats = Some(client);
        self
    }

    pub fn with_destinations(mut self, client: Arc<dyn DestinationsClient>) -> Self {
        self.destinations = Some(client);
        self
    }
}

impl std::fmt::Debug for DomainClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainClients")
            .field("accounts", &self.accounts.is_some())
            .field("resources", &self.resources.is_some())
            .field("stats", &self.stats.is_some())
            .field("destinations", &self.destinations.is_some())
            .finish()
    }
}
