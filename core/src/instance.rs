// ABOUTME: Instance identity for registered services and the master-selection order
// ABOUTME: Identity is service name + process id; order is dotted address then port

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Service name replicas register under.
pub const REPLICA_SERVICE: &str = "replica";
/// Service name of the backend-update relay.
pub const RELAY_SERVICE: &str = "relay";
/// Service name of the authoritative backend store.
pub const BACKEND_SERVICE: &str = "backend";

/// A registered process offering a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub service_name: String,
    pub process_id: u32,
    pub address: String,
    pub port: u16,
}

impl InstanceDescriptor {
    pub fn new(
        service_name: impl Into<String>,
        process_id: u32,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            process_id,
            address: address.into(),
            port,
        }
    }

    /// Unique per process: `{service_name}{process_id}`.
    pub fn instance_name(&self) -> String {
        format!("{}{}", self.service_name, self.process_id)
    }

    pub fn is_replica(&self) -> bool {
        self.service_name == REPLICA_SERVICE
    }

    /// Base URL for HTTP calls to this instance.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }

    /// Total order used only to pick the master replica.
    ///
    /// Addresses compare as dotted numeric tuples, component by component,
    /// then ports. A component that isn't a number sorts after every numeric
    /// one and against other non-numeric components lexicographically, so the
    /// order stays total for host names too.
    pub fn master_order(&self, other: &Self) -> Ordering {
        let mut ours = self.address.split('.');
        let mut theirs = other.address.split('.');
        loop {
            match (ours.next(), theirs.next()) {
                (Some(a), Some(b)) => {
                    let ord = compare_component(a, b);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                (Some(_), None) => return Ordering::Greater,
                (None, Some(_)) => return Ordering::Less,
                (None, None) => break,
            }
        }
        self.port.cmp(&other.port)
    }
}

fn compare_component(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Highest instance by [`InstanceDescriptor::master_order`].
///
/// Ties (same address and port) resolve to the last one in iteration order,
/// matching `Iterator::max_by`.
pub fn select_master<'a, I>(instances: I) -> Option<&'a InstanceDescriptor>
where
    I: IntoIterator<Item = &'a InstanceDescriptor>,
{
    instances.into_iter().max_by(|a, b| a.master_order(b))
}

impl fmt::Display for InstanceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.instance_name(), self.address, self.port)
    }
}

/// Who is asking the registry to resolve a service.
///
/// Peers (the relay and other replicas) are always pointed at the master;
/// clients get a sticky, load-balanced assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Requester {
    Peer(String),
    Client(String),
}

impl Requester {
    pub fn id(&self) -> &str {
        match self {
            Self::Peer(id) | Self::Client(id) => id,
        }
    }
}
