use medalcast_core::config::CacheMode;
use medalcast_core::instance::{InstanceDescriptor, Requester, REPLICA_SERVICE};
use medalcast_core::testing::PushRecord;
use medalcast_core::traits::{Discovery, ReplicaPeer};
use medalcast_core::types::{CompletedEvent, NationKey, Tally};
use medalcast_tests::{curling, init_tracing, podium, scores, Cluster};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_invalidation_reaches_only_interested_replicas() {
    init_tracing();
    let cluster = Cluster::start(CacheMode::MasterPush, 3).await;
    let master = cluster.resolve_master().await;
    assert_eq!(master.name(), "replica3");
    cluster.backend.set_scores(&curling(), scores(5));

    // replica1 caches the event, replica2 never reads it
    assert_eq!(cluster.replica(1).get_scores(&curling(), "c1").await, Some(scores(5)));
    assert_eq!(
        master.interest().scores.replicas_for(&curling()),
        vec!["replica1".to_string()]
    );
    cluster.replica(2).caches().scores.put(curling(), scores(1));

    master
        .update_current_scores(&curling(), scores(10))
        .await
        .unwrap();

    // replica1 was told to drop its copy; replica2's copy was never targeted
    assert!(cluster.replica(1).caches().scores.lookup(&curling()).is_err());
    assert_eq!(cluster.replica(2).caches().scores.lookup(&curling()), Ok(scores(1)));
    assert_eq!(cluster.replica(1).get_scores(&curling(), "c1").await, Some(scores(10)));
}

#[tokio::test]
async fn test_result_interest_is_tracked_separately_from_scores() {
    let cluster = Cluster::start(CacheMode::MasterPush, 2).await;
    let master = cluster.resolve_master().await;
    cluster.backend.set_results(&curling(), podium());

    cluster.replica(1).get_results(&curling(), "c1").await;

    assert_eq!(
        master.interest().results.replicas_for(&curling()),
        vec!["replica1".to_string()]
    );
    assert!(master.interest().scores.replicas_for(&curling()).is_empty());

    master
        .update_results_and_tallies(CompletedEvent {
            name: curling(),
            result: podium(),
        })
        .await
        .unwrap();
    assert!(cluster.replica(1).caches().results.lookup(&curling()).is_err());
}

#[tokio::test]
async fn test_result_write_invalidates_medal_tallies() {
    let cluster = Cluster::start(CacheMode::MasterPush, 2).await;
    let master = cluster.resolve_master().await;
    let gbr = NationKey::new("GBR");
    cluster.backend.set_tally(Tally {
        nation: gbr.clone(),
        gold: 0,
        silver: 0,
        bronze: 0,
    });

    let before = cluster.replica(1).get_tally(&gbr, "c1").await.unwrap();
    assert_eq!(before.total(), 0);

    master
        .update_results_and_tallies(CompletedEvent {
            name: curling(),
            result: podium(),
        })
        .await
        .unwrap();

    let after = cluster.replica(1).get_tally(&gbr, "c1").await.unwrap();
    assert_eq!(after.silver, 1);
}

#[tokio::test]
async fn test_master_change_flushes_every_cache() {
    let cluster = Cluster::start(CacheMode::MasterPush, 3).await;
    cluster.backend.set_scores(&curling(), scores(5));
    for n in 1..=3 {
        cluster.replica(n).get_scores(&curling(), "c1").await;
    }
    assert!(!cluster.replica(3).interest().is_empty());

    // replica3 (the master) stops beating and is evicted
    let start = Instant::now();
    cluster.registry.heartbeat_at("replica1", start + Duration::from_secs(3));
    cluster.registry.heartbeat_at("replica2", start + Duration::from_secs(3));
    cluster.registry.heartbeat_at("replica3", start);
    let report = cluster.balancer().tick(start + Duration::from_secs(4));
    assert_eq!(report.evicted, vec!["replica3".to_string()]);

    let successor = cluster.resolve_master().await;
    assert_eq!(successor.name(), "replica2");
    assert!(cluster.replica(1).caches().is_empty());
    assert!(cluster.replica(2).caches().is_empty());
    assert!(successor.interest().is_empty());
}

#[tokio::test]
async fn test_refresh_reaches_every_listed_replica() {
    let cluster = Cluster::start(CacheMode::MasterPush, 3).await;
    for node in &cluster.replicas {
        node.caches().results.put(curling(), podium());
    }
    let master = cluster.replica(3);
    master.notify_score_caching("replica1", &curling()).await.unwrap();

    let listed = cluster.registry.all_instances(REPLICA_SERVICE).await.unwrap();
    master.refresh_caches(listed).await.unwrap();

    for node in &cluster.replicas {
        assert!(node.caches().is_empty(), "{} still caches", node.name());
    }
    assert!(master.interest().is_empty());
}

#[tokio::test]
async fn test_higher_replica_joining_takes_over() {
    let cluster = Cluster::start(CacheMode::MasterPush, 2).await;
    assert_eq!(cluster.resolve_master().await.name(), "replica2");

    cluster
        .registry
        .register(InstanceDescriptor::new(REPLICA_SERVICE, 9, "10.0.0.200", 1100))
        .await
        .unwrap();
    let master = cluster
        .registry
        .resolve_for(REPLICA_SERVICE, &Requester::Peer("relay1".into()))
        .await
        .unwrap();
    assert_eq!(master.instance_name(), "replica9");
}

#[tokio::test]
async fn test_score_write_pushes_to_each_subscriber_once() {
    let cluster = Cluster::start(CacheMode::MasterPush, 1).await;
    let r1 = cluster.replica(1);
    r1.subscribe("C1", "H1", &curling());
    r1.subscribe("C2", "H2", &curling());
    r1.caches().scores.put(curling(), scores(3));

    r1.update_current_scores(&curling(), scores(10)).await.unwrap();
    cluster.settle().await;

    assert!(r1.caches().scores.lookup(&curling()).is_err());
    assert_eq!(cluster.backend.score_writes(), vec![(curling(), scores(10))]);

    let mut pushed: Vec<(String, String)> = cluster
        .sink
        .records()
        .into_iter()
        .map(|record| match record {
            PushRecord::Scores {
                host,
                client_id,
                scores: pushed,
                ..
            } => {
                assert_eq!(pushed, scores(10));
                (host, client_id)
            }
            other => panic!("unexpected push {other:?}"),
        })
        .collect();
    pushed.sort();
    assert_eq!(
        pushed,
        vec![
            ("H1".to_string(), "C1".to_string()),
            ("H2".to_string(), "C2".to_string()),
        ]
    );
}
