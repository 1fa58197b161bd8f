use medalcast_core::config::CacheMode;
use medalcast_core::instance::{Requester, REPLICA_SERVICE};
use medalcast_core::traits::Discovery;
use medalcast_tests::{Cluster, HOLD_TIME};
use std::collections::HashMap;
use std::time::{Duration, Instant};

async fn pin_clients(cluster: &Cluster, count: usize) -> HashMap<String, String> {
    let mut pinned = HashMap::new();
    for n in 0..count {
        let client = format!("tablet-{n}");
        let replica = cluster
            .registry
            .resolve_for(REPLICA_SERVICE, &Requester::Client(client.clone()))
            .await
            .unwrap();
        pinned.insert(client, replica.instance_name());
    }
    pinned
}

#[tokio::test]
async fn test_silent_replica_is_evicted_and_its_clients_reassigned() {
    let cluster = Cluster::start(CacheMode::ProxyPull, 3).await;
    let pinned = pin_clients(&cluster, 40).await;
    let orphans: Vec<&String> = pinned
        .iter()
        .filter(|(_, replica)| replica.as_str() == "replica2")
        .map(|(client, _)| client)
        .collect();

    let start = Instant::now();
    cluster.registry.heartbeat_at("replica2", start);
    cluster.registry.heartbeat_at("replica1", start + Duration::from_secs(3));
    cluster.registry.heartbeat_at("replica3", start + Duration::from_secs(3));

    let report = cluster.balancer().tick(start + Duration::from_secs(4));
    assert_eq!(report.evicted, vec!["replica2".to_string()]);

    let live: Vec<String> = cluster
        .registry
        .all_instances(REPLICA_SERVICE)
        .await
        .unwrap()
        .iter()
        .map(|i| i.instance_name())
        .collect();
    assert_eq!(live, vec!["replica1", "replica3"]);

    let affinity = cluster.registry.affinity_snapshot();
    assert!(!affinity.contains_key("replica2"));
    for client in orphans {
        let holder = affinity
            .iter()
            .find(|(_, clients)| clients.contains(client))
            .map(|(replica, _)| replica.as_str());
        assert!(
            matches!(holder, Some("replica1") | Some("replica3")),
            "{client} ended up on {holder:?}"
        );
    }
    let total: usize = affinity.values().map(Vec::len).sum();
    assert_eq!(total, 40);
}

#[tokio::test]
async fn test_fresh_fleet_is_untouched() {
    let cluster = Cluster::start(CacheMode::ProxyPull, 3).await;
    let start = Instant::now();
    for n in 1..=3 {
        cluster.registry.heartbeat_at(&format!("replica{n}"), start);
    }
    let report = cluster.balancer().tick(start + HOLD_TIME - Duration::from_millis(1));
    assert!(report.evicted.is_empty());
}

#[tokio::test]
async fn test_master_is_a_function_of_the_live_set() {
    let cluster = Cluster::start(CacheMode::MasterPush, 3).await;
    for _ in 0..5 {
        assert_eq!(cluster.resolve_master().await.name(), "replica3");
    }

    let start = Instant::now();
    cluster.registry.heartbeat_at("replica3", start);
    cluster.balancer().tick(start + HOLD_TIME);

    for _ in 0..5 {
        assert_eq!(cluster.resolve_master().await.name(), "replica2");
    }
}

#[tokio::test]
async fn test_clients_stay_pinned_between_ticks() {
    let cluster = Cluster::start(CacheMode::ProxyPull, 3).await;
    let pinned = pin_clients(&cluster, 10).await;
    let again = pin_clients(&cluster, 10).await;
    assert_eq!(pinned, again);
}
