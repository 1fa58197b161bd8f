use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use medalcast_core::metrics::METRICS;
use medalcast_core::rpc::{
    replica_paths, EventRead, InvalidateEvent, InvalidateNation, NotifyEventCaching,
    NotifyTallyCaching, RefreshCachesRequest, SubscribeRequest, TallyRead, UpdateScoresRequest,
};
use medalcast_core::traits::ReplicaPeer;
use medalcast_core::types::{Athlete, CompletedEvent, Results, Tally};
use serde_json::json;
use std::sync::Arc;

use crate::error::ApiError;
use crate::node::ReplicaNode;

type Node = State<Arc<ReplicaNode>>;

pub fn routes(node: Arc<ReplicaNode>) -> Router {
    // Relay writes
    let relay = Router::new()
        .route(replica_paths::RELAY_RESULTS, post(relay_results))
        .route(replica_paths::RELAY_SCORES, post(relay_scores));

    // Client reads and subscriptions
    let client = Router::new()
        .route(replica_paths::RESULTS, post(results))
        .route(replica_paths::SCORES, post(scores))
        .route(replica_paths::TALLY, post(tally))
        .route(replica_paths::SUBSCRIBE, post(subscribe));

    // Replica-to-replica coordination
    let coord = Router::new()
        .route(replica_paths::NOTIFY_SCORES, post(notify_scores))
        .route(replica_paths::NOTIFY_RESULTS, post(notify_results))
        .route(replica_paths::NOTIFY_TALLIES, post(notify_tallies))
        .route(replica_paths::INVALIDATE_SCORES, post(invalidate_scores))
        .route(replica_paths::INVALIDATE_RESULTS, post(invalidate_results))
        .route(replica_paths::INVALIDATE_TALLIES, post(invalidate_tallies))
        .route(replica_paths::REFRESH, post(refresh))
        .route(replica_paths::CLEAR, post(clear));

    Router::new()
        .merge(relay)
        .merge(client)
        .merge(coord)
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(node)
}

async fn relay_results(
    State(node): Node,
    Json(completed): Json<CompletedEvent>,
) -> Result<StatusCode, ApiError> {
    node.update_results_and_tallies(completed).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn relay_scores(
    State(node): Node,
    Json(request): Json<UpdateScoresRequest>,
) -> Result<StatusCode, ApiError> {
    node.update_current_scores(&request.event, request.scores)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn results(State(node): Node, Json(read): Json<EventRead>) -> Json<Option<Results>> {
    Json(node.get_results(&read.event, &read.client_id).await)
}

async fn scores(State(node): Node, Json(read): Json<EventRead>) -> Json<Option<Vec<Athlete>>> {
    Json(node.get_scores(&read.event, &read.client_id).await)
}

async fn tally(State(node): Node, Json(read): Json<TallyRead>) -> Json<Option<Tally>> {
    Json(node.get_tally(&read.nation, &read.client_id).await)
}

async fn subscribe(State(node): Node, Json(request): Json<SubscribeRequest>) -> StatusCode {
    node.subscribe(&request.client_id, &request.client_host, &request.event);
    StatusCode::NO_CONTENT
}

async fn notify_scores(
    State(node): Node,
    Json(request): Json<NotifyEventCaching>,
) -> Result<StatusCode, ApiError> {
    node.notify_score_caching(&request.replica, &request.event)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn notify_results(
    State(node): Node,
    Json(request): Json<NotifyEventCaching>,
) -> Result<StatusCode, ApiError> {
    node.notify_result_caching(&request.replica, &request.event)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn notify_tallies(
    State(node): Node,
    Json(request): Json<NotifyTallyCaching>,
) -> Result<StatusCode, ApiError> {
    node.notify_tally_caching(&request.replica, &request.nation)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn invalidate_scores(
    State(node): Node,
    Json(request): Json<InvalidateEvent>,
) -> Result<StatusCode, ApiError> {
    node.invalidate_scores(&request.event).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn invalidate_results(
    State(node): Node,
    Json(request): Json<InvalidateEvent>,
) -> Result<StatusCode, ApiError> {
    node.invalidate_results(&request.event).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn invalidate_tallies(
    State(node): Node,
    Json(request): Json<InvalidateNation>,
) -> Result<StatusCode, ApiError> {
    node.invalidate_tallies(&request.nation).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn refresh(
    State(node): Node,
    Json(request): Json<RefreshCachesRequest>,
) -> Result<StatusCode, ApiError> {
    node.refresh_caches(request.replicas).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear(State(node): Node) -> Result<StatusCode, ApiError> {
    node.clear_caches().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health(State(node): Node) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "role": "replica",
        "instance": node.name(),
        "mode": node.mode().as_str(),
    }))
}

/// GET /metrics - Prometheus text
async fn metrics() -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        METRICS.to_prometheus(),
    )
}
