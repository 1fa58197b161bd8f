use medalcast_core::cache::{CacheError, CacheSet, CacheStore};
use medalcast_core::config::CacheMode;
use medalcast_core::testing::PushRecord;
use medalcast_core::types::EventKey;
use medalcast_tests::{curling, init_tracing, scores, Cluster};
use std::time::{Duration, Instant};

fn short_ttls() -> CacheSet {
    CacheSet::with_ttls(
        Duration::from_millis(200),
        Duration::from_millis(200),
        Duration::from_millis(200),
    )
}

#[test]
fn test_value_is_fresh_for_exactly_its_ttl() {
    let store: CacheStore<EventKey, i64> = CacheStore::new(Duration::from_secs(10));
    let t0 = Instant::now();
    store.put_at(curling(), 7, t0);

    for offset in [0, 1, 5, 10] {
        assert_eq!(store.lookup_at(&curling(), t0 + Duration::from_secs(offset)), Ok(7));
    }
    assert_eq!(
        store.lookup_at(&curling(), t0 + Duration::from_millis(10_001)),
        Err(CacheError::Stale)
    );
}

#[test]
fn test_double_invalidate_is_a_single_invalidate() {
    let store: CacheStore<EventKey, i64> = CacheStore::new(Duration::from_secs(10));
    store.put(curling(), 1);
    store.invalidate(&curling());
    store.invalidate(&curling());
    assert_eq!(store.lookup(&curling()), Err(CacheError::NotCached));

    let empty: CacheStore<EventKey, i64> = CacheStore::new(Duration::from_secs(10));
    empty.invalidate(&curling());
    assert_eq!(empty.lookup(&curling()), Err(CacheError::NotCached));
}

#[tokio::test(start_paused = true)]
async fn test_replicas_serve_their_own_copy_until_it_expires() {
    init_tracing();
    let cluster = Cluster::start_with_caches(CacheMode::ProxyPull, 2, short_ttls).await;
    cluster.backend.set_scores(&curling(), scores(5));

    assert_eq!(cluster.replica(1).get_scores(&curling(), "c1").await, Some(scores(5)));

    // the write lands on replica2; replica1 is not told
    cluster
        .replica(2)
        .update_current_scores(&curling(), scores(10))
        .await
        .unwrap();
    assert_eq!(cluster.replica(1).get_scores(&curling(), "c1").await, Some(scores(5)));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(cluster.replica(1).get_scores(&curling(), "c1").await, Some(scores(10)));
}

#[tokio::test]
async fn test_proxy_pull_keeps_no_interest_anywhere() {
    let cluster = Cluster::start(CacheMode::ProxyPull, 3).await;
    cluster.backend.set_scores(&curling(), scores(5));
    for n in 1..=3 {
        cluster.replica(n).get_scores(&curling(), "c1").await;
    }
    for node in &cluster.replicas {
        assert!(node.interest().is_empty());
    }
}

#[tokio::test]
async fn test_score_push_does_not_depend_on_mode() {
    let cluster = Cluster::start(CacheMode::ProxyPull, 1).await;
    let r1 = cluster.replica(1);
    r1.subscribe("C1", "H1", &curling());
    r1.subscribe("C2", "H2", &curling());

    r1.update_current_scores(&curling(), scores(10)).await.unwrap();
    cluster.settle().await;

    let records = cluster.sink.records();
    assert_eq!(records.len(), 2);
    for host in ["H1", "H2"] {
        let hits = records
            .iter()
            .filter(|r| matches!(r, PushRecord::Scores { host: h, .. } if h == host))
            .count();
        assert_eq!(hits, 1, "{host} should get exactly one push");
    }
}
