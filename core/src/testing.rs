// ABOUTME: In-memory collaborators for tests: backend, push sink, peer connector, discovery
// ABOUTME: Enabled with the `testing` feature so the replica and registry crates can share them

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::instance::{select_master, InstanceDescriptor, Requester};
use crate::traits::{Backend, Discovery, PeerConnector, PushSink, ReplicaPeer};
use crate::types::{Athlete, CompletedEvent, EventKey, Medal, NationKey, Results, Tally};

/// Backend store kept in memory. Counts reads so tests can tell cache hits
/// from backend fetches.
#[derive(Default)]
pub struct MemoryBackend {
    scores: Mutex<HashMap<EventKey, Vec<Athlete>>>,
    results: Mutex<HashMap<EventKey, Results>>,
    tallies: Mutex<HashMap<NationKey, Tally>>,
    score_writes: Mutex<Vec<(EventKey, Vec<Athlete>)>>,
    result_writes: Mutex<Vec<CompletedEvent>>,
    reads: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scores(&self, event: &EventKey, scores: Vec<Athlete>) {
        self.scores.lock().unwrap().insert(event.clone(), scores);
    }

    pub fn set_results(&self, event: &EventKey, results: Results) {
        self.results.lock().unwrap().insert(event.clone(), results);
    }

    pub fn set_tally(&self, tally: Tally) {
        self.tallies.lock().unwrap().insert(tally.nation.clone(), tally);
    }

    pub fn score_writes(&self) -> Vec<(EventKey, Vec<Athlete>)> {
        self.score_writes.lock().unwrap().clone()
    }

    pub fn result_writes(&self) -> Vec<CompletedEvent> {
        self.result_writes.lock().unwrap().clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Makes every call fail as if the backend were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::PeerUnreachable("backend".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn update_results_and_tallies(&self, event: &CompletedEvent) -> Result<()> {
        self.check()?;
        self.result_writes.lock().unwrap().push(event.clone());
        self.results
            .lock()
            .unwrap()
            .insert(event.name.clone(), event.result.clone());
        let mut tallies = self.tallies.lock().unwrap();
        for medal in Medal::ALL {
            let nation = event.result.nation(medal).clone();
            let tally = tallies.entry(nation.clone()).or_insert(Tally {
                nation,
                gold: 0,
                silver: 0,
                bronze: 0,
            });
            match medal {
                Medal::Gold => tally.gold += 1,
                Medal::Silver => tally.silver += 1,
                Medal::Bronze => tally.bronze += 1,
            }
        }
        Ok(())
    }

    async fn update_current_scores(&self, event: &EventKey, scores: &[Athlete]) -> Result<()> {
        self.check()?;
        self.score_writes
            .lock()
            .unwrap()
            .push((event.clone(), scores.to_vec()));
        self.scores
            .lock()
            .unwrap()
            .insert(event.clone(), scores.to_vec());
        Ok(())
    }

    async fn get_results(&self, event: &EventKey) -> Result<Option<Results>> {
        self.check()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.lock().unwrap().get(event).cloned())
    }

    async fn get_current_scores(&self, event: &EventKey) -> Result<Option<Vec<Athlete>>> {
        self.check()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.scores.lock().unwrap().get(event).cloned())
    }

    async fn get_medal_tally(&self, nation: &NationKey) -> Result<Option<Tally>> {
        self.check()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.tallies.lock().unwrap().get(nation).cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushRecord {
    Scores {
        host: String,
        client_id: String,
        event: EventKey,
        scores: Vec<Athlete>,
    },
    Results {
        host: String,
        client_id: String,
        event: EventKey,
        results: Results,
    },
}

/// Records every push; hosts marked unreachable fail.
#[derive(Default)]
pub struct RecordingPushSink {
    records: Mutex<Vec<PushRecord>>,
    unreachable: Mutex<HashSet<String>>,
}

impl RecordingPushSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<PushRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn set_unreachable(&self, host: &str) {
        self.unreachable.lock().unwrap().insert(host.to_string());
    }

    fn check(&self, host: &str) -> Result<()> {
        if self.unreachable.lock().unwrap().contains(host) {
            return Err(Error::PeerUnreachable(host.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PushSink for RecordingPushSink {
    async fn update_scores(
        &self,
        host: &str,
        client_id: &str,
        event: &EventKey,
        scores: &[Athlete],
    ) -> Result<()> {
        self.check(host)?;
        self.records.lock().unwrap().push(PushRecord::Scores {
            host: host.to_string(),
            client_id: client_id.to_string(),
            event: event.clone(),
            scores: scores.to_vec(),
        });
        Ok(())
    }

    async fn update_results(
        &self,
        host: &str,
        client_id: &str,
        event: &EventKey,
        results: &Results,
    ) -> Result<()> {
        self.check(host)?;
        self.records.lock().unwrap().push(PushRecord::Results {
            host: host.to_string(),
            client_id: client_id.to_string(),
            event: event.clone(),
            results: results.clone(),
        });
        Ok(())
    }
}

/// Routes peer calls to in-process handles by instance name.
#[derive(Default)]
pub struct LocalConnector {
    peers: Mutex<HashMap<String, Arc<dyn ReplicaPeer>>>,
    down: Mutex<HashSet<String>>,
}

impl LocalConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, instance_name: &str, peer: Arc<dyn ReplicaPeer>) {
        self.peers
            .lock()
            .unwrap()
            .insert(instance_name.to_string(), peer);
    }

    /// Simulates a crashed process: connecting fails until `set_up`.
    pub fn set_down(&self, instance_name: &str) {
        self.down.lock().unwrap().insert(instance_name.to_string());
    }

    pub fn set_up(&self, instance_name: &str) {
        self.down.lock().unwrap().remove(instance_name);
    }
}

#[async_trait]
impl PeerConnector for LocalConnector {
    async fn connect(&self, instance: &InstanceDescriptor) -> Result<Arc<dyn ReplicaPeer>> {
        let name = instance.instance_name();
        if self.down.lock().unwrap().contains(&name) {
            return Err(Error::PeerUnreachable(name));
        }
        self.peers
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .ok_or(Error::PeerUnreachable(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCall {
    NotifyScores(String, EventKey),
    NotifyResults(String, EventKey),
    NotifyTallies(String, NationKey),
    InvalidateScores(EventKey),
    InvalidateResults(EventKey),
    InvalidateTallies(NationKey),
    Refresh(Vec<String>),
    Clear,
}

/// A peer that only records what it was asked to do.
#[derive(Default)]
pub struct RecordingPeer {
    calls: Mutex<Vec<PeerCall>>,
}

impl RecordingPeer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PeerCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: PeerCall) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl ReplicaPeer for RecordingPeer {
    async fn notify_score_caching(&self, replica: &str, event: &EventKey) -> Result<()> {
        self.record(PeerCall::NotifyScores(replica.to_string(), event.clone()))
    }

    async fn notify_result_caching(&self, replica: &str, event: &EventKey) -> Result<()> {
        self.record(PeerCall::NotifyResults(replica.to_string(), event.clone()))
    }

    async fn notify_tally_caching(&self, replica: &str, nation: &NationKey) -> Result<()> {
        self.record(PeerCall::NotifyTallies(replica.to_string(), nation.clone()))
    }

    async fn invalidate_scores(&self, event: &EventKey) -> Result<()> {
        self.record(PeerCall::InvalidateScores(event.clone()))
    }

    async fn invalidate_results(&self, event: &EventKey) -> Result<()> {
        self.record(PeerCall::InvalidateResults(event.clone()))
    }

    async fn invalidate_tallies(&self, nation: &NationKey) -> Result<()> {
        self.record(PeerCall::InvalidateTallies(nation.clone()))
    }

    async fn refresh_caches(&self, replicas: Vec<InstanceDescriptor>) -> Result<()> {
        self.record(PeerCall::Refresh(
            replicas.iter().map(InstanceDescriptor::instance_name).collect(),
        ))
    }

    async fn clear_caches(&self) -> Result<()> {
        self.record(PeerCall::Clear)
    }
}

/// Fixed instance list with master-by-order for peers. Records beats and registrations.
#[derive(Default)]
pub struct StaticDiscovery {
    instances: Mutex<Vec<InstanceDescriptor>>,
    beats: Mutex<Vec<String>>,
    unavailable: AtomicBool,
}

impl StaticDiscovery {
    pub fn new(instances: Vec<InstanceDescriptor>) -> Self {
        Self {
            instances: Mutex::new(instances),
            ..Self::default()
        }
    }

    pub fn beats(&self) -> Vec<String> {
        self.beats.lock().unwrap().clone()
    }

    pub fn instances(&self) -> Vec<InstanceDescriptor> {
        self.instances.lock().unwrap().clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::PeerUnreachable("registry".to_string()));
        }
        Ok(())
    }

    fn matching(&self, service_name: &str) -> Vec<InstanceDescriptor> {
        self.instances
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.service_name == service_name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn register(&self, instance: InstanceDescriptor) -> Result<()> {
        self.check()?;
        self.instances.lock().unwrap().push(instance);
        Ok(())
    }

    async fn resolve(&self, service_name: &str) -> Result<InstanceDescriptor> {
        self.check()?;
        self.matching(service_name)
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoInstances(service_name.to_string()))
    }

    async fn resolve_for(
        &self,
        service_name: &str,
        _requester: &Requester,
    ) -> Result<InstanceDescriptor> {
        self.check()?;
        let matching = self.matching(service_name);
        select_master(&matching)
            .cloned()
            .ok_or_else(|| Error::NoInstances(service_name.to_string()))
    }

    async fn all_instances(&self, service_name: &str) -> Result<Vec<InstanceDescriptor>> {
        self.check()?;
        Ok(self.matching(service_name))
    }

    async fn beat(&self, instance_name: &str) -> Result<()> {
        self.check()?;
        self.beats.lock().unwrap().push(instance_name.to_string());
        Ok(())
    }
}
