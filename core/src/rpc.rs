// ABOUTME: JSON request bodies and route paths for the registry, replica, backend and push surfaces
// ABOUTME: Shared by the axum routers and the reqwest clients so both sides agree on the wire

use serde::{Deserialize, Serialize};

use crate::instance::{InstanceDescriptor, Requester};
use crate::types::{Athlete, EventKey, NationKey, Results};

/// Registry routes.
pub mod registry_paths {
    pub const REGISTER: &str = "/services/register";
    pub const RESOLVE: &str = "/services/resolve";
    pub const RESOLVE_FOR: &str = "/services/resolve-for";
    pub const LIST: &str = "/services/list";
    pub const BEAT: &str = "/beat";
    pub const MASTER: &str = "/master";
}

/// Replica routes.
pub mod replica_paths {
    pub const RELAY_RESULTS: &str = "/relay/results";
    pub const RELAY_SCORES: &str = "/relay/scores";
    pub const RESULTS: &str = "/results";
    pub const SCORES: &str = "/scores";
    pub const TALLY: &str = "/tally";
    pub const SUBSCRIBE: &str = "/subscribe";
    pub const NOTIFY_SCORES: &str = "/coord/notify/scores";
    pub const NOTIFY_RESULTS: &str = "/coord/notify/results";
    pub const NOTIFY_TALLIES: &str = "/coord/notify/tallies";
    pub const INVALIDATE_SCORES: &str = "/coord/invalidate/scores";
    pub const INVALIDATE_RESULTS: &str = "/coord/invalidate/results";
    pub const INVALIDATE_TALLIES: &str = "/coord/invalidate/tallies";
    pub const REFRESH: &str = "/coord/refresh";
    pub const CLEAR: &str = "/coord/clear";
}

/// Routes the backend store exposes.
pub mod backend_paths {
    pub const UPDATE_RESULTS: &str = "/results/update";
    pub const UPDATE_SCORES: &str = "/scores/update";
    pub const RESULTS: &str = "/results";
    pub const SCORES: &str = "/scores";
    pub const TALLY: &str = "/tally";
}

/// Routes a display client listens on for pushes.
pub mod push_paths {
    pub const SCORES: &str = "/push/scores";
    pub const RESULTS: &str = "/push/results";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceQuery {
    pub service_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveForRequest {
    pub service_name: String,
    pub requester: Requester,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatRequest {
    pub instance_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterResponse {
    pub master: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateScoresRequest {
    pub event: EventKey,
    pub scores: Vec<Athlete>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRead {
    pub event: EventKey,
    #[serde(default)]
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallyRead {
    pub nation: NationKey,
    #[serde(default)]
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub client_id: String,
    pub client_host: String,
    pub event: EventKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyEventCaching {
    pub replica: String,
    pub event: EventKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyTallyCaching {
    pub replica: String,
    pub nation: NationKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidateEvent {
    pub event: EventKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidateNation {
    pub nation: NationKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshCachesRequest {
    pub replicas: Vec<InstanceDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorePush {
    pub client_id: String,
    pub event: EventKey,
    pub scores: Vec<Athlete>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPush {
    pub client_id: String,
    pub event: EventKey,
    pub results: Results,
}
