use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::instance::{InstanceDescriptor, Requester};
use crate::types::{Athlete, CompletedEvent, EventKey, NationKey, Results, Tally};

/// Service discovery as seen by registry clients.
///
/// The registry implements this directly; remote processes use
/// [`crate::client::HttpDiscovery`].
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn register(&self, instance: InstanceDescriptor) -> Result<()>;

    /// Uniform random pick among live instances of the service.
    async fn resolve(&self, service_name: &str) -> Result<InstanceDescriptor>;

    /// Peers get the master, clients their sticky assignment.
    async fn resolve_for(
        &self,
        service_name: &str,
        requester: &Requester,
    ) -> Result<InstanceDescriptor>;

    async fn all_instances(&self, service_name: &str) -> Result<Vec<InstanceDescriptor>>;

    async fn beat(&self, instance_name: &str) -> Result<()>;
}

/// The authoritative store. Reads return `None` when it has nothing for the key.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn update_results_and_tallies(&self, event: &CompletedEvent) -> Result<()>;

    async fn update_current_scores(&self, event: &EventKey, scores: &[Athlete]) -> Result<()>;

    async fn get_results(&self, event: &EventKey) -> Result<Option<Results>>;

    async fn get_current_scores(&self, event: &EventKey) -> Result<Option<Vec<Athlete>>>;

    async fn get_medal_tally(&self, nation: &NationKey) -> Result<Option<Tally>>;
}

/// Replica-to-replica coordination calls (master-push mode and cache flush).
#[async_trait]
pub trait ReplicaPeer: Send + Sync {
    async fn notify_score_caching(&self, replica: &str, event: &EventKey) -> Result<()>;

    async fn notify_result_caching(&self, replica: &str, event: &EventKey) -> Result<()>;

    async fn notify_tally_caching(&self, replica: &str, nation: &NationKey) -> Result<()>;

    async fn invalidate_scores(&self, event: &EventKey) -> Result<()>;

    async fn invalidate_results(&self, event: &EventKey) -> Result<()>;

    async fn invalidate_tallies(&self, nation: &NationKey) -> Result<()>;

    /// Master only: drop interest bookkeeping and flush every listed replica.
    async fn refresh_caches(&self, replicas: Vec<InstanceDescriptor>) -> Result<()>;

    async fn clear_caches(&self) -> Result<()>;
}

/// Opens a [`ReplicaPeer`] handle for a registered replica.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, instance: &InstanceDescriptor) -> Result<Arc<dyn ReplicaPeer>>;
}

/// Delivers pushes to a display client at its last known host.
#[async_trait]
pub trait PushSink: Send + Sync {
    async fn update_scores(
        &self,
        host: &str,
        client_id: &str,
        event: &EventKey,
        scores: &[Athlete],
    ) -> Result<()>;

    async fn update_results(
        &self,
        host: &str,
        client_id: &str,
        event: &EventKey,
        results: &Results,
    ) -> Result<()>;
}
