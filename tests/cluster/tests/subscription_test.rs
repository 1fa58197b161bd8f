use medalcast_core::config::CacheMode;
use medalcast_core::testing::PushRecord;
use medalcast_core::types::CompletedEvent;
use medalcast_tests::{curling, podium, scores, Cluster};

fn result_pushes(records: &[PushRecord]) -> Vec<String> {
    let mut clients: Vec<String> = records
        .iter()
        .filter_map(|record| match record {
            PushRecord::Results { client_id, .. } => Some(client_id.clone()),
            PushRecord::Scores { .. } => None,
        })
        .collect();
    clients.sort();
    clients
}

#[tokio::test]
async fn test_results_push_is_one_shot() {
    let cluster = Cluster::start(CacheMode::MasterPush, 1).await;
    let r1 = cluster.replica(1);
    r1.subscribe("C1", "H1", &curling());
    r1.subscribe("C2", "H2", &curling());

    r1.update_results_and_tallies(CompletedEvent {
        name: curling(),
        result: podium(),
    })
    .await
    .unwrap();
    cluster.settle().await;

    assert_eq!(result_pushes(&cluster.sink.records()), vec!["C1", "C2"]);
    assert!(!r1.subscriptions().has_subscription(&curling()));
    assert!(r1.subscriptions().is_complete(&curling()));

    // later score updates for a finished event reach nobody
    r1.update_current_scores(&curling(), scores(1)).await.unwrap();
    cluster.settle().await;
    assert_eq!(cluster.sink.records().len(), 2);
}

#[tokio::test]
async fn test_late_subscriber_gets_results_immediately() {
    let cluster = Cluster::start(CacheMode::ProxyPull, 1).await;
    let r1 = cluster.replica(1);
    r1.update_results_and_tallies(CompletedEvent {
        name: curling(),
        result: podium(),
    })
    .await
    .unwrap();
    cluster.settle().await;
    assert!(cluster.sink.records().is_empty());

    r1.subscribe("C3", "H3", &curling());
    cluster.settle().await;

    assert_eq!(
        cluster.sink.records(),
        vec![PushRecord::Results {
            host: "H3".into(),
            client_id: "C3".into(),
            event: curling(),
            results: podium(),
        }]
    );
    assert!(!r1.subscriptions().has_subscription(&curling()));
}

#[tokio::test]
async fn test_unreachable_client_does_not_stop_the_batch() {
    let cluster = Cluster::start(CacheMode::ProxyPull, 1).await;
    let r1 = cluster.replica(1);
    cluster.sink.set_unreachable("H1");
    r1.subscribe("C1", "H1", &curling());
    r1.subscribe("C2", "H2", &curling());

    r1.update_current_scores(&curling(), scores(4)).await.unwrap();
    cluster.settle().await;

    let records = cluster.sink.records();
    assert_eq!(records.len(), 1);
    assert!(matches!(&records[0], PushRecord::Scores { client_id, .. } if client_id == "C2"));
}
