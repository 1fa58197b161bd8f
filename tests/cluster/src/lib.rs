// ABOUTME: In-process fleet for scenario tests: one registry, N replicas, shared fake backend and push sink
// ABOUTME: Replicas reach each other through a LocalConnector instead of HTTP

use medalcast_core::cache::CacheSet;
use medalcast_core::config::CacheMode;
use medalcast_core::instance::{InstanceDescriptor, Requester, REPLICA_SERVICE};
use medalcast_core::retry::RetryPolicy;
use medalcast_core::testing::{LocalConnector, MemoryBackend, RecordingPushSink};
use medalcast_core::traits::{Discovery, ReplicaPeer};
use medalcast_core::types::{Athlete, EventKey, Results};
use medalcast_registry::{LoadBalancer, ServiceRegistry};
use medalcast_replica::{Collaborators, ReplicaNode};
use std::sync::Arc;
use std::time::Duration;

pub const HOLD_TIME: Duration = Duration::from_millis(3500);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,medalcast_replica=debug,medalcast_registry=debug")
        .with_test_writer()
        .try_init();
}

pub struct Cluster {
    pub registry: Arc<ServiceRegistry>,
    pub connector: Arc<LocalConnector>,
    pub backend: Arc<MemoryBackend>,
    pub sink: Arc<RecordingPushSink>,
    /// `replicas[i]` is `replica{i+1}` at `10.0.0.{i+1}`, so the last one is master.
    pub replicas: Vec<Arc<ReplicaNode>>,
}

impl Cluster {
    pub async fn start(mode: CacheMode, count: u32) -> Self {
        Self::start_with_caches(mode, count, CacheSet::new).await
    }

    pub async fn start_with_caches(
        mode: CacheMode,
        count: u32,
        caches: impl Fn() -> CacheSet,
    ) -> Self {
        let connector = Arc::new(LocalConnector::new());
        let registry = Arc::new(ServiceRegistry::new(connector.clone()));
        let backend = Arc::new(MemoryBackend::new());
        let sink = Arc::new(RecordingPushSink::new());

        let mut replicas = Vec::new();
        for pid in 1..=count {
            let identity =
                InstanceDescriptor::new(REPLICA_SERVICE, pid, format!("10.0.0.{pid}"), 1100);
            let node = Arc::new(
                ReplicaNode::new(
                    identity,
                    mode,
                    Collaborators {
                        discovery: registry.clone(),
                        backend: backend.clone(),
                        connector: connector.clone(),
                        push_sink: sink.clone(),
                    },
                )
                .with_caches(caches())
                .with_retry(RetryPolicy::new(2, Duration::from_millis(1))),
            );
            node.register().await.unwrap();
            connector.insert(&node.name(), node.clone() as Arc<dyn ReplicaPeer>);
            replicas.push(node);
        }

        let cluster = Self {
            registry,
            connector,
            backend,
            sink,
            replicas,
        };
        // Settle mastership up front so its refresh can't race a test's reads.
        cluster.resolve_master().await;
        cluster
    }

    /// `replica{n}`, 1-based.
    pub fn replica(&self, n: usize) -> &Arc<ReplicaNode> {
        &self.replicas[n - 1]
    }

    /// Where the relay would send a write.
    pub async fn resolve_master(&self) -> Arc<ReplicaNode> {
        let master = self
            .registry
            .resolve_for(REPLICA_SERVICE, &Requester::Peer("relay1".into()))
            .await
            .unwrap();
        self.registry.wait_for_refreshes().await;
        self.replicas
            .iter()
            .find(|node| node.name() == master.instance_name())
            .cloned()
            .unwrap()
    }

    pub fn balancer(&self) -> LoadBalancer {
        LoadBalancer::new(self.registry.clone(), Duration::from_millis(1500), HOLD_TIME)
    }

    /// Waits for all background pushes and refreshes.
    pub async fn settle(&self) {
        self.registry.wait_for_refreshes().await;
        for node in &self.replicas {
            node.drain_pushes().await;
        }
    }
}

pub fn curling() -> EventKey {
    EventKey::new("curling")
}

pub fn scores(points: i64) -> Vec<Athlete> {
    vec![Athlete::new("Hasselborg", "SWE", points)]
}

pub fn podium() -> Results {
    Results {
        gold: Athlete::new("Hasselborg", "SWE", 10),
        silver: Athlete::new("Muirhead", "GBR", 8),
        bronze: Athlete::new("Fujisawa", "JPN", 7),
    }
}
