use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use medalcast_core::instance::InstanceDescriptor;
use medalcast_core::metrics::METRICS;
use medalcast_core::rpc::{
    registry_paths, BeatRequest, MasterResponse, ResolveForRequest, ServiceQuery,
};
use medalcast_core::traits::Discovery;
use serde_json::json;
use std::sync::Arc;

use crate::error::ApiError;
use crate::registry::ServiceRegistry;

pub fn routes(registry: Arc<ServiceRegistry>) -> Router {
    Router::new()
        .route(registry_paths::REGISTER, post(register))
        .route(registry_paths::RESOLVE, post(resolve))
        .route(registry_paths::RESOLVE_FOR, post(resolve_for))
        .route(registry_paths::LIST, post(list))
        .route(registry_paths::BEAT, post(beat))
        .route(registry_paths::MASTER, get(master))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(registry)
}

async fn register(
    State(registry): State<Arc<ServiceRegistry>>,
    Json(instance): Json<InstanceDescriptor>,
) -> Result<StatusCode, ApiError> {
    registry.register(instance).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn resolve(
    State(registry): State<Arc<ServiceRegistry>>,
    Json(query): Json<ServiceQuery>,
) -> Result<Json<InstanceDescriptor>, ApiError> {
    Ok(Json(registry.resolve(&query.service_name).await?))
}

async fn resolve_for(
    State(registry): State<Arc<ServiceRegistry>>,
    Json(request): Json<ResolveForRequest>,
) -> Result<Json<InstanceDescriptor>, ApiError> {
    let instance = registry
        .resolve_for(&request.service_name, &request.requester)
        .await?;
    Ok(Json(instance))
}

async fn list(
    State(registry): State<Arc<ServiceRegistry>>,
    Json(query): Json<ServiceQuery>,
) -> Result<Json<Vec<InstanceDescriptor>>, ApiError> {
    Ok(Json(registry.all_instances(&query.service_name).await?))
}

async fn beat(
    State(registry): State<Arc<ServiceRegistry>>,
    Json(request): Json<BeatRequest>,
) -> Result<StatusCode, ApiError> {
    registry.beat(&request.instance_name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn master(State(registry): State<Arc<ServiceRegistry>>) -> Json<MasterResponse> {
    Json(MasterResponse {
        master: registry.current_master(),
    })
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "role": "registry" }))
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

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use medalcast_core::instance::{Requester, REPLICA_SERVICE};
    use medalcast_core::testing::LocalConnector;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<ServiceRegistry>) {
        let registry = Arc::new(ServiceRegistry::new(Arc::new(LocalConnector::new())));
        (routes(registry.clone()), registry)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_register_then_resolve() {
        let (app, _) = app();
        let instance = InstanceDescriptor::new(REPLICA_SERVICE, 7, "10.0.0.7", 1100);

        let response = app
            .clone()
            .oneshot(post_json(
                registry_paths::REGISTER,
                serde_json::to_value(&instance).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(post_json(
                registry_paths::RESOLVE,
                json!({ "service_name": REPLICA_SERVICE }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let resolved: InstanceDescriptor = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(resolved, instance);
    }

    #[tokio::test]
    async fn test_resolve_unknown_service_is_not_found() {
        let (app, _) = app();
        let response = app
            .oneshot(post_json(
                registry_paths::RESOLVE_FOR,
                json!({
                    "service_name": "relay",
                    "requester": Requester::Client("tablet-1".into()),
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("relay"));
    }

    #[tokio::test]
    async fn test_beat_and_master_endpoints() {
        let (app, registry) = app();
        let response = app
            .clone()
            .oneshot(post_json(registry_paths::BEAT, json!({ "instance_name": "replica7" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(registry.lock().heartbeats.contains_key("replica7"));

        let response = app
            .oneshot(
                Request::builder()
                    .uri(registry_paths::MASTER)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(response).await, json!({ "master": null }));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("medalcast_heartbeats_received_total"));
    }
}
