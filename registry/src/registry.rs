// ABOUTME: In-memory service registry: instance list, heartbeats, master designation, client affinity
// ABOUTME: Peers resolve to the master; clients get a sticky random replica

use async_trait::async_trait;
use medalcast_core::error::{Error, Result};
use medalcast_core::instance::{select_master, InstanceDescriptor, Requester, REPLICA_SERVICE};
use medalcast_core::metrics::METRICS;
use medalcast_core::traits::{Discovery, PeerConnector};
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio_util::task::TaskTracker;

/// Everything the registry knows, behind one lock.
#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    /// Registration order. Duplicates are not rejected.
    pub(crate) instances: Vec<InstanceDescriptor>,
    pub(crate) heartbeats: HashMap<String, Instant>,
    pub(crate) master: Option<String>,
    /// `replica_name -> client ids` pinned to that replica.
    pub(crate) affinity: HashMap<String, HashSet<String>>,
}

impl RegistryState {
    fn matching(&self, service_name: &str) -> Vec<&InstanceDescriptor> {
        self.instances
            .iter()
            .filter(|i| i.service_name == service_name)
            .collect()
    }

    pub(crate) fn replicas(&self) -> Vec<InstanceDescriptor> {
        self.instances
            .iter()
            .filter(|i| i.is_replica())
            .cloned()
            .collect()
    }
}

/// Discovery service for the fleet.
///
/// Master changes are detected lazily, on the next peer resolve, and trigger
/// a cache refresh on the new master in the background.
pub struct ServiceRegistry {
    state: Mutex<RegistryState>,
    connector: Arc<dyn PeerConnector>,
    tasks: TaskTracker,
    drain_lock: tokio::sync::Mutex<()>,
}

impl ServiceRegistry {
    pub fn new(connector: Arc<dyn PeerConnector>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            connector,
            tasks: TaskTracker::new(),
            drain_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current_master(&self) -> Option<String> {
        self.lock().master.clone()
    }

    /// `replica_name -> sorted client ids`.
    pub fn affinity_snapshot(&self) -> HashMap<String, Vec<String>> {
        self.lock()
            .affinity
            .iter()
            .map(|(replica, clients)| {
                let mut clients: Vec<String> = clients.iter().cloned().collect();
                clients.sort();
                (replica.clone(), clients)
            })
            .collect()
    }

    pub fn instance(&self, instance_name: &str) -> Option<InstanceDescriptor> {
        self.lock()
            .instances
            .iter()
            .find(|i| i.instance_name() == instance_name)
            .cloned()
    }

    pub fn heartbeat_at(&self, instance_name: &str, at: Instant) {
        self.lock().heartbeats.insert(instance_name.to_string(), at);
        METRICS.inc_heartbeat();
    }

    /// Waits for in-flight master refreshes to finish. Concurrent waiters take turns.
    pub async fn wait_for_refreshes(&self) {
        let _turn = self.drain_lock.lock().await;
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    fn resolve_master(&self, requester: &Requester) -> Result<InstanceDescriptor> {
        let (master, replicas) = {
            let mut state = self.lock();
            let replicas = state.replicas();
            let master = select_master(&replicas)
                .cloned()
                .ok_or_else(|| Error::NoInstances(REPLICA_SERVICE.to_string()))?;

            let name = master.instance_name();
            if state.master.as_deref() == Some(name.as_str()) {
                return Ok(master);
            }
            tracing::info!(
                previous = state.master.as_deref().unwrap_or("none"),
                master = %master,
                requested_by = requester.id(),
                "New master designated"
            );
            state.master = Some(name);
            (master, replicas)
        };

        METRICS.inc_master_change();
        self.spawn_refresh(master.clone(), replicas);
        Ok(master)
    }

    fn spawn_refresh(&self, master: InstanceDescriptor, replicas: Vec<InstanceDescriptor>) {
        let connector = self.connector.clone();
        self.tasks.spawn(async move {
            let peer = match connector.connect(&master).await {
                Ok(peer) => peer,
                Err(e) => {
                    tracing::warn!(master = %master, "Could not reach new master for refresh: {}", e);
                    return;
                }
            };
            let count = replicas.len();
            match peer.refresh_caches(replicas).await {
                Ok(()) => tracing::debug!(master = %master, count, "Master refreshed fleet caches"),
                Err(e) => tracing::warn!(master = %master, "Cache refresh failed: {}", e),
            }
        });
    }

    fn resolve_client(&self, client_id: &str) -> Result<InstanceDescriptor> {
        let mut state = self.lock();
        let replicas = state.replicas();

        let sticky = state
            .affinity
            .iter()
            .find(|(_, clients)| clients.contains(client_id))
            .map(|(replica, _)| replica.clone());
        if let Some(replica) = sticky {
            if let Some(instance) = replicas.iter().find(|i| i.instance_name() == replica) {
                return Ok(instance.clone());
            }
        }

        let chosen = replicas
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| Error::NoInstances(REPLICA_SERVICE.to_string()))?;

        for clients in state.affinity.values_mut() {
            clients.remove(client_id);
        }
        state
            .affinity
            .entry(chosen.instance_name())
            .or_default()
            .insert(client_id.to_string());
        tracing::debug!(client_id, replica = %chosen, "Assigned client");
        Ok(chosen)
    }
}

#[async_trait]
impl Discovery for ServiceRegistry {
    async fn register(&self, instance: InstanceDescriptor) -> Result<()> {
        tracing::info!(instance = %instance, "Registered instance");
        let mut state = self.lock();
        if instance.is_replica() {
            state.affinity.entry(instance.instance_name()).or_default();
        }
        state.instances.push(instance);
        Ok(())
    }

    async fn resolve(&self, service_name: &str) -> Result<InstanceDescriptor> {
        self.lock()
            .matching(service_name)
            .choose(&mut rand::thread_rng())
            .map(|i| (*i).clone())
            .ok_or_else(|| Error::NoInstances(service_name.to_string()))
    }

    async fn resolve_for(
        &self,
        service_name: &str,
        requester: &Requester,
    ) -> Result<InstanceDescriptor> {
        // Only replicas have a master and client affinity.
        if service_name != REPLICA_SERVICE {
            return self.resolve(service_name).await;
        }
        match requester {
            Requester::Peer(_) => self.resolve_master(requester),
            Requester::Client(client_id) => self.resolve_client(client_id),
        }
    }

    async fn all_instances(&self, service_name: &str) -> Result<Vec<InstanceDescriptor>> {
        Ok(self
            .lock()
            .matching(service_name)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn beat(&self, instance_name: &str) -> Result<()> {
        self.heartbeat_at(instance_name, Instant::now());
        Ok(())
    }
}
