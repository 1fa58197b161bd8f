// ABOUTME: A caching relay node: serves reads from local caches, writes through to the backend
// ABOUTME: In master-push mode the master tracks interest and writers invalidate interested peers

use async_trait::async_trait;
use futures::future::join_all;
use medalcast_core::cache::{CacheSet, CacheStore};
use medalcast_core::config::CacheMode;
use medalcast_core::error::{Error, Result};
use medalcast_core::instance::{InstanceDescriptor, Requester, REPLICA_SERVICE};
use medalcast_core::interest::InterestMaps;
use medalcast_core::metrics::METRICS;
use medalcast_core::retry::RetryPolicy;
use medalcast_core::subscription::{SubscribeOutcome, Subscriber, SubscriptionTable};
use medalcast_core::traits::{Backend, Discovery, PeerConnector, PushSink, ReplicaPeer};
use medalcast_core::types::{Athlete, CompletedEvent, EventKey, NationKey, Results, Tally};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::time::Instant;

use crate::push::PushFanout;

/// The processes a replica talks to.
pub struct Collaborators {
    pub discovery: Arc<dyn Discovery>,
    pub backend: Arc<dyn Backend>,
    pub connector: Arc<dyn PeerConnector>,
    pub push_sink: Arc<dyn PushSink>,
}

/// A key in one of the three caches.
#[derive(Debug, Clone)]
enum CacheKey {
    Scores(EventKey),
    Results(EventKey),
    Tally(NationKey),
}

impl CacheKey {
    fn invalidate_local(&self, caches: &CacheSet) {
        match self {
            Self::Scores(event) => caches.scores.invalidate(event),
            Self::Results(event) => caches.results.invalidate(event),
            Self::Tally(nation) => caches.tallies.invalidate(nation),
        }
    }

    fn register_interest(&self, interest: &InterestMaps, replica: &str) {
        match self {
            Self::Scores(event) => interest.scores.register(replica, event.clone()),
            Self::Results(event) => interest.results.register(replica, event.clone()),
            Self::Tally(nation) => interest.tallies.register(replica, nation.clone()),
        }
    }

    fn interested(&self, interest: &InterestMaps) -> Vec<String> {
        match self {
            Self::Scores(event) => interest.scores.replicas_for(event),
            Self::Results(event) => interest.results.replicas_for(event),
            Self::Tally(nation) => interest.tallies.replicas_for(nation),
        }
    }

    async fn notify(&self, master: &dyn ReplicaPeer, replica: &str) -> Result<()> {
        match self {
            Self::Scores(event) => master.notify_score_caching(replica, event).await,
            Self::Results(event) => master.notify_result_caching(replica, event).await,
            Self::Tally(nation) => master.notify_tally_caching(replica, nation).await,
        }
    }

    async fn invalidate(&self, peer: &dyn ReplicaPeer) -> Result<()> {
        match self {
            Self::Scores(event) => peer.invalidate_scores(event).await,
            Self::Results(event) => peer.invalidate_results(event).await,
            Self::Tally(nation) => peer.invalidate_tallies(nation).await,
        }
    }
}

enum Master {
    /// This node is the master.
    Local,
    Remote(Arc<dyn ReplicaPeer>),
}

/// Per-target outcome of a coordination scatter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScatterReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

pub struct ReplicaNode {
    identity: InstanceDescriptor,
    mode: CacheMode,
    caches: CacheSet,
    interest: InterestMaps,
    subscriptions: SubscriptionTable,
    discovery: Arc<dyn Discovery>,
    backend: Arc<dyn Backend>,
    connector: Arc<dyn PeerConnector>,
    push: PushFanout,
    retry: RetryPolicy,
}

impl ReplicaNode {
    pub fn new(identity: InstanceDescriptor, mode: CacheMode, collaborators: Collaborators) -> Self {
        Self {
            identity,
            mode,
            caches: CacheSet::new(),
            interest: InterestMaps::new(),
            subscriptions: SubscriptionTable::new(),
            discovery: collaborators.discovery,
            backend: collaborators.backend,
            connector: collaborators.connector,
            push: PushFanout::new(collaborators.push_sink),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the default stores, e.g. with shorter TTLs.
    pub fn with_caches(mut self, caches: CacheSet) -> Self {
        self.caches = caches;
        self
    }

    pub fn identity(&self) -> &InstanceDescriptor {
        &self.identity
    }

    pub fn name(&self) -> String {
        self.identity.instance_name()
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn caches(&self) -> &CacheSet {
        &self.caches
    }

    pub fn interest(&self) -> &InterestMaps {
        &self.interest
    }

    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    /// Announces this replica to the registry, retrying connectivity failures.
    pub async fn register(&self) -> Result<()> {
        let discovery = self.discovery.as_ref();
        let identity = &self.identity;
        self.retry
            .run("register with registry", move || async move {
                discovery.register(identity.clone()).await
            })
            .await?;
        tracing::info!(instance = %self.identity, mode = %self.mode, "Registered replica");
        Ok(())
    }

    /// Waits for in-flight pushes.
    pub async fn drain_pushes(&self) {
        self.push.drain().await;
    }

    // ---- reads ----

    pub async fn get_scores(&self, event: &EventKey, client_id: &str) -> Option<Vec<Athlete>> {
        let key = CacheKey::Scores(event.clone());
        if let Some(scores) = self.cached(&self.caches.scores, event) {
            return Some(scores);
        }
        self.announce(&key).await;

        match self.backend.get_current_scores(event).await {
            Ok(Some(scores)) => {
                self.store(&self.caches.scores, event.clone(), scores.clone());
                Some(scores)
            }
            Ok(None) => None,
            Err(e) => {
                self.backend_failed("read scores", client_id, &e);
                None
            }
        }
    }

    pub async fn get_results(&self, event: &EventKey, client_id: &str) -> Option<Results> {
        let key = CacheKey::Results(event.clone());
        if let Some(results) = self.cached(&self.caches.results, event) {
            return Some(results);
        }
        self.announce(&key).await;

        match self.backend.get_results(event).await {
            Ok(Some(results)) => {
                self.store(&self.caches.results, event.clone(), results.clone());
                Some(results)
            }
            Ok(None) => None,
            Err(e) => {
                self.backend_failed("read results", client_id, &e);
                None
            }
        }
    }

    pub async fn get_tally(&self, nation: &NationKey, client_id: &str) -> Option<Tally> {
        let key = CacheKey::Tally(nation.clone());
        if let Some(tally) = self.cached(&self.caches.tallies, nation) {
            return Some(tally);
        }
        self.announce(&key).await;

        match self.backend.get_medal_tally(nation).await {
            Ok(Some(tally)) => {
                self.store(&self.caches.tallies, nation.clone(), tally.clone());
                Some(tally)
            }
            Ok(None) => None,
            Err(e) => {
                self.backend_failed("read tally", client_id, &e);
                None
            }
        }
    }

    fn cached<K, V>(&self, store: &CacheStore<K, V>, key: &K) -> Option<V>
    where
        K: Eq + Hash,
        V: Clone,
    {
        // tokio's clock, so a paused runtime drives expiry
        let found = match self.mode {
            CacheMode::ProxyPull => store.lookup_at(key, Instant::now().into_std()),
            CacheMode::MasterPush => store.lookup(key),
        };
        match found {
            Ok(value) => {
                METRICS.inc_cache_hit();
                Some(value)
            }
            Err(_) => {
                METRICS.inc_cache_miss();
                None
            }
        }
    }

    fn store<K, V>(&self, store: &CacheStore<K, V>, key: K, value: V)
    where
        K: Eq + Hash,
        V: Clone,
    {
        match self.mode {
            CacheMode::ProxyPull => store.put_at(key, value, Instant::now().into_std()),
            CacheMode::MasterPush => store.put(key, value),
        }
    }

    fn backend_failed(&self, what: &str, client_id: &str, e: &Error) {
        METRICS.inc_backend_error();
        tracing::warn!(client_id, replica = %self.name(), "Backend failed to {}: {}", what, e);
    }

    /// Master-push only: tell the master this replica now caches `key`.
    /// Failure is logged and does not block the read.
    async fn announce(&self, key: &CacheKey) {
        if !self.mode.is_master_push() {
            return;
        }
        let me = self.name();
        let result = match self.master().await {
            Ok(Master::Local) => {
                key.register_interest(&self.interest, &me);
                Ok(())
            }
            Ok(Master::Remote(master)) => key.notify(master.as_ref(), &me).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            METRICS.inc_master_notify_failure();
            tracing::warn!(replica = %me, key = ?key, "Could not notify master of caching: {}", e);
        }
    }

    async fn master(&self) -> Result<Master> {
        let me = self.name();
        let requester = Requester::Peer(me.clone());
        let (me, requester) = (me.as_str(), &requester);
        let (discovery, connector) = (self.discovery.as_ref(), self.connector.as_ref());

        self.retry
            .run("resolve master", move || async move {
                let master = discovery.resolve_for(REPLICA_SERVICE, requester).await?;
                if master.instance_name() == me {
                    return Ok(Master::Local);
                }
                Ok(Master::Remote(connector.connect(&master).await?))
            })
            .await
    }

    // ---- writes ----

    /// Write path for live scores.
    ///
    /// The push to subscribers is scheduled before the backend write and does
    /// not depend on its outcome.
    pub async fn update_current_scores(&self, event: &EventKey, scores: Vec<Athlete>) -> Result<()> {
        if self.mode.is_master_push() {
            self.invalidate_everywhere(&CacheKey::Scores(event.clone()))
                .await;
        }

        self.push.push_scores(
            self.subscriptions.subscribers(event),
            event.clone(),
            scores.clone(),
        );

        self.backend
            .update_current_scores(event, &scores)
            .await
            .inspect_err(|e| self.backend_failed("write scores", "", e))
    }

    /// Write path for a finished event: its results plus the medal tallies it changes.
    pub async fn update_results_and_tallies(&self, completed: CompletedEvent) -> Result<()> {
        if self.mode.is_master_push() {
            let mut keys = vec![CacheKey::Results(completed.name.clone())];
            keys.extend(completed.result.nations().into_iter().map(CacheKey::Tally));
            join_all(keys.iter().map(|key| self.invalidate_everywhere(key))).await;
        }

        let subscribers = self
            .subscriptions
            .complete(&completed.name, completed.result.clone());
        self.push
            .push_results(subscribers, completed.name.clone(), completed.result.clone());

        self.backend
            .update_results_and_tallies(&completed)
            .await
            .inspect_err(|e| self.backend_failed("write results", "", e))
    }

    /// Drops `key` here and on every other replica the master saw cache it.
    async fn invalidate_everywhere(&self, key: &CacheKey) -> ScatterReport {
        key.invalidate_local(&self.caches);

        let me = self.name();
        let targets: Vec<String> = key
            .interested(&self.interest)
            .into_iter()
            .filter(|replica| *replica != me)
            .collect();
        if targets.is_empty() {
            return ScatterReport::default();
        }

        let mut report = ScatterReport::default();
        let instances = match self.discovery.all_instances(REPLICA_SERVICE).await {
            Ok(instances) => instances,
            Err(e) => {
                tracing::warn!(key = ?key, "Could not list replicas for invalidation: {}", e);
                report.failed = targets;
                METRICS.add_invalidations(0, report.failed.len() as u64);
                return report;
            }
        };

        let mut reachable = Vec::new();
        for name in targets {
            match instances.iter().find(|i| i.instance_name() == name) {
                Some(instance) => reachable.push(instance.clone()),
                None => {
                    tracing::warn!(replica = %name, "Interested replica is no longer registered");
                    report.failed.push(name);
                }
            }
        }

        let scattered = self
            .scatter("invalidate", reachable, |peer| {
                let key = key.clone();
                async move { key.invalidate(peer.as_ref()).await }
            })
            .await;
        report.delivered = scattered.delivered;
        report.failed.extend(scattered.failed);
        METRICS.add_invalidations(report.delivered.len() as u64, report.failed.len() as u64);
        report
    }

    /// Calls `call` on every target concurrently. Failures are logged per
    /// target and never retried.
    async fn scatter<F, Fut>(
        &self,
        what: &str,
        targets: Vec<InstanceDescriptor>,
        call: F,
    ) -> ScatterReport
    where
        F: Fn(Arc<dyn ReplicaPeer>) -> Fut + Sync,
        Fut: Future<Output = Result<()>> + Send,
    {
        let call = &call;
        let connector = self.connector.as_ref();
        let attempts = targets.into_iter().map(|target| async move {
            let outcome = match connector.connect(&target).await {
                Ok(peer) => call(peer).await,
                Err(e) => Err(e),
            };
            (target.instance_name(), outcome)
        });

        let mut report = ScatterReport::default();
        for (name, outcome) in join_all(attempts).await {
            match outcome {
                Ok(()) => report.delivered.push(name),
                Err(e) => {
                    tracing::warn!(replica = %name, "Failed to {} peer: {}", what, e);
                    report.failed.push(name);
                }
            }
        }
        report
    }

    // ---- subscriptions ----

    /// Subscribes `client_id` to pushes for `event`. A completed event is
    /// delivered at once and nothing is stored.
    pub fn subscribe(&self, client_id: &str, client_host: &str, event: &EventKey) {
        match self.subscriptions.subscribe(client_id, client_host, event) {
            SubscribeOutcome::Subscribed => {
                tracing::debug!(client_id, event = %event, "Client subscribed");
            }
            SubscribeOutcome::AlreadyComplete(results) => {
                tracing::debug!(client_id, event = %event, "Event already complete, pushing results");
                let subscriber = Subscriber {
                    client_id: client_id.to_string(),
                    host: Some(client_host.to_string()),
                };
                self.push
                    .push_results(vec![subscriber], event.clone(), results);
            }
        }
    }
}

#[async_trait]
impl ReplicaPeer for ReplicaNode {
    async fn notify_score_caching(&self, replica: &str, event: &EventKey) -> Result<()> {
        CacheKey::Scores(event.clone()).register_interest(&self.interest, replica);
        Ok(())
    }

    async fn notify_result_caching(&self, replica: &str, event: &EventKey) -> Result<()> {
        CacheKey::Results(event.clone()).register_interest(&self.interest, replica);
        Ok(())
    }

    async fn notify_tally_caching(&self, replica: &str, nation: &NationKey) -> Result<()> {
        CacheKey::Tally(nation.clone()).register_interest(&self.interest, replica);
        Ok(())
    }

    async fn invalidate_scores(&self, event: &EventKey) -> Result<()> {
        self.caches.scores.invalidate(event);
        Ok(())
    }

    async fn invalidate_results(&self, event: &EventKey) -> Result<()> {
        self.caches.results.invalidate(event);
        Ok(())
    }

    async fn invalidate_tallies(&self, nation: &NationKey) -> Result<()> {
        self.caches.tallies.invalidate(nation);
        Ok(())
    }

    async fn refresh_caches(&self, replicas: Vec<InstanceDescriptor>) -> Result<()> {
        self.interest.clear();

        let me = self.name();
        let (local, remote): (Vec<_>, Vec<_>) = replicas
            .into_iter()
            .partition(|replica| replica.instance_name() == me);
        if !local.is_empty() {
            self.caches.clear();
        }

        let report = self
            .scatter("clear caches on", remote, |peer| async move {
                peer.clear_caches().await
            })
            .await;
        tracing::info!(
            replica = %me,
            cleared = report.delivered.len() + local.len(),
            failed = report.failed.len(),
            "Refreshed fleet caches"
        );
        Ok(())
    }

    async fn clear_caches(&self) -> Result<()> {
        self.caches.clear();
        tracing::debug!(replica = %self.name(), "Cleared caches");
        Ok(())
    }
}
