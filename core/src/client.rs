// ABOUTME: reqwest-backed implementations of the collaborator traits
// ABOUTME: Used by processes talking to the registry, peers, the backend and display clients

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::instance::{InstanceDescriptor, Requester};
use crate::rpc::{
    backend_paths, push_paths, registry_paths, replica_paths, BeatRequest, EventRead,
    InvalidateEvent, InvalidateNation, NotifyEventCaching, NotifyTallyCaching,
    RefreshCachesRequest, ResolveForRequest, ResultPush, ScorePush, ServiceQuery, TallyRead,
    UpdateScoresRequest,
};
use crate::traits::{Backend, Discovery, PeerConnector, PushSink, ReplicaPeer};
use crate::types::{Athlete, CompletedEvent, EventKey, NationKey, Results, Tally};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Shared HTTP client. Only connecting is bounded; calls themselves have no deadline.
pub fn http_client() -> Result<Client> {
    Ok(Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?)
}

async fn post<B>(http: &Client, url: &str, body: &B) -> Result<reqwest::Response>
where
    B: Serialize + ?Sized,
{
    let response = http.post(url).json(body).send().await.map_err(|e| {
        if e.is_connect() || e.is_timeout() {
            Error::PeerUnreachable(format!("{url}: {e}"))
        } else {
            Error::Http(e)
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(Error::Remote {
        status: status.as_u16(),
        message,
    })
}

async fn post_json<B, R>(http: &Client, url: &str, body: &B) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    Ok(post(http, url, body).await?.json::<R>().await?)
}

async fn post_unit<B>(http: &Client, url: &str, body: &B) -> Result<()>
where
    B: Serialize + ?Sized,
{
    post(http, url, body).await?;
    Ok(())
}

/// Registry client.
#[derive(Clone)]
pub struct HttpDiscovery {
    http: Client,
    base_url: String,
}

impl HttpDiscovery {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn not_found_as_no_instances(service_name: &str, e: Error) -> Error {
        match e {
            Error::Remote { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
                Error::NoInstances(service_name.to_string())
            }
            other => other,
        }
    }
}

#[async_trait]
impl Discovery for HttpDiscovery {
    async fn register(&self, instance: InstanceDescriptor) -> Result<()> {
        post_unit(&self.http, &self.url(registry_paths::REGISTER), &instance).await
    }

    async fn resolve(&self, service_name: &str) -> Result<InstanceDescriptor> {
        let query = ServiceQuery {
            service_name: service_name.to_string(),
        };
        post_json(&self.http, &self.url(registry_paths::RESOLVE), &query)
            .await
            .map_err(|e| Self::not_found_as_no_instances(service_name, e))
    }

    async fn resolve_for(
        &self,
        service_name: &str,
        requester: &Requester,
    ) -> Result<InstanceDescriptor> {
        let request = ResolveForRequest {
            service_name: service_name.to_string(),
            requester: requester.clone(),
        };
        post_json(&self.http, &self.url(registry_paths::RESOLVE_FOR), &request)
            .await
            .map_err(|e| Self::not_found_as_no_instances(service_name, e))
    }

    async fn all_instances(&self, service_name: &str) -> Result<Vec<InstanceDescriptor>> {
        let query = ServiceQuery {
            service_name: service_name.to_string(),
        };
        post_json(&self.http, &self.url(registry_paths::LIST), &query).await
    }

    async fn beat(&self, instance_name: &str) -> Result<()> {
        let request = BeatRequest {
            instance_name: instance_name.to_string(),
        };
        post_unit(&self.http, &self.url(registry_paths::BEAT), &request).await
    }
}

/// Client for the authoritative backend store.
#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn for_instance(http: Client, instance: &InstanceDescriptor) -> Self {
        Self::new(http, instance.base_url())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn update_results_and_tallies(&self, event: &CompletedEvent) -> Result<()> {
        post_unit(&self.http, &self.url(backend_paths::UPDATE_RESULTS), event).await
    }

    async fn update_current_scores(&self, event: &EventKey, scores: &[Athlete]) -> Result<()> {
        let request = UpdateScoresRequest {
            event: event.clone(),
            scores: scores.to_vec(),
        };
        post_unit(&self.http, &self.url(backend_paths::UPDATE_SCORES), &request).await
    }

    async fn get_results(&self, event: &EventKey) -> Result<Option<Results>> {
        let read = EventRead {
            event: event.clone(),
            client_id: String::new(),
        };
        post_json(&self.http, &self.url(backend_paths::RESULTS), &read).await
    }

    async fn get_current_scores(&self, event: &EventKey) -> Result<Option<Vec<Athlete>>> {
        let read = EventRead {
            event: event.clone(),
            client_id: String::new(),
        };
        post_json(&self.http, &self.url(backend_paths::SCORES), &read).await
    }

    async fn get_medal_tally(&self, nation: &NationKey) -> Result<Option<Tally>> {
        let read = TallyRead {
            nation: nation.clone(),
            client_id: String::new(),
        };
        post_json(&self.http, &self.url(backend_paths::TALLY), &read).await
    }
}

/// Coordination client for one replica.
#[derive(Clone)]
pub struct HttpReplicaPeer {
    http: Client,
    base_url: String,
}

impl HttpReplicaPeer {
    pub fn new(http: Client, instance: &InstanceDescriptor) -> Self {
        Self {
            http,
            base_url: instance.base_url(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ReplicaPeer for HttpReplicaPeer {
    async fn notify_score_caching(&self, replica: &str, event: &EventKey) -> Result<()> {
        let request = NotifyEventCaching {
            replica: replica.to_string(),
            event: event.clone(),
        };
        post_unit(&self.http, &self.url(replica_paths::NOTIFY_SCORES), &request).await
    }

    async fn notify_result_caching(&self, replica: &str, event: &EventKey) -> Result<()> {
        let request = NotifyEventCaching {
            replica: replica.to_string(),
            event: event.clone(),
        };
        post_unit(&self.http, &self.url(replica_paths::NOTIFY_RESULTS), &request).await
    }

    async fn notify_tally_caching(&self, replica: &str, nation: &NationKey) -> Result<()> {
        let request = NotifyTallyCaching {
            replica: replica.to_string(),
            nation: nation.clone(),
        };
        post_unit(&self.http, &self.url(replica_paths::NOTIFY_TALLIES), &request).await
    }

    async fn invalidate_scores(&self, event: &EventKey) -> Result<()> {
        let request = InvalidateEvent {
            event: event.clone(),
        };
        post_unit(&self.http, &self.url(replica_paths::INVALIDATE_SCORES), &request).await
    }

    async fn invalidate_results(&self, event: &EventKey) -> Result<()> {
        let request = InvalidateEvent {
            event: event.clone(),
        };
        post_unit(&self.http, &self.url(replica_paths::INVALIDATE_RESULTS), &request).await
    }

    async fn invalidate_tallies(&self, nation: &NationKey) -> Result<()> {
        let request = InvalidateNation {
            nation: nation.clone(),
        };
        post_unit(&self.http, &self.url(replica_paths::INVALIDATE_TALLIES), &request).await
    }

    async fn refresh_caches(&self, replicas: Vec<InstanceDescriptor>) -> Result<()> {
        let request = RefreshCachesRequest { replicas };
        post_unit(&self.http, &self.url(replica_paths::REFRESH), &request).await
    }

    async fn clear_caches(&self) -> Result<()> {
        post_unit(&self.http, &self.url(replica_paths::CLEAR), &serde_json::json!({})).await
    }
}

/// Connects to replicas over HTTP. Connecting is free; failures surface on the first call.
#[derive(Clone)]
pub struct HttpPeerConnector {
    http: Client,
}

impl HttpPeerConnector {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PeerConnector for HttpPeerConnector {
    async fn connect(&self, instance: &InstanceDescriptor) -> Result<Arc<dyn ReplicaPeer>> {
        Ok(Arc::new(HttpReplicaPeer::new(self.http.clone(), instance)))
    }
}

/// Pushes to display clients listening on a fixed port at their registered host.
#[derive(Clone)]
pub struct HttpPushSink {
    http: Client,
    port: u16,
}

impl HttpPushSink {
    pub fn new(http: Client, port: u16) -> Self {
        Self { http, port }
    }

    fn url(&self, host: &str, path: &str) -> String {
        if host.contains(':') {
            format!("http://{host}{path}")
        } else {
            format!("http://{host}:{}{path}", self.port)
        }
    }
}

#[async_trait]
impl PushSink for HttpPushSink {
    async fn update_scores(
        &self,
        host: &str,
        client_id: &str,
        event: &EventKey,
        scores: &[Athlete],
    ) -> Result<()> {
        let push = ScorePush {
            client_id: client_id.to_string(),
            event: event.clone(),
            scores: scores.to_vec(),
        };
        post_unit(&self.http, &self.url(host, push_paths::SCORES), &push).await
    }

    async fn update_results(
        &self,
        host: &str,
        client_id: &str,
        event: &EventKey,
        results: &Results,
    ) -> Result<()> {
        let push = ResultPush {
            client_id: client_id.to_string(),
            event: event.clone(),
            results: results.clone(),
        };
        post_unit(&self.http, &self.url(host, push_paths::RESULTS), &push).await
    }
}
