//! Shared building blocks for the medalcast fleet.
//!
//! This crate provides:
//! - The plain records replicas cache and push (scores, results, tallies)
//! - Instance identity and the deterministic master order
//! - TTL-aware cache stores, the subscription table and master-side interest tracking
//! - Collaborator traits (`Discovery`, `Backend`, `ReplicaPeer`, `PushSink`) with
//!   reqwest-backed implementations
//! - Environment configuration, typed errors, bounded retry and Prometheus metrics
//!
//! The registry and replica crates build the coherence protocol on top of these.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod instance;
pub mod interest;
pub mod metrics;
pub mod retry;
pub mod rpc;
pub mod subscription;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{CacheMode, RegistryConfig, ReplicaConfig};
pub use error::{Error, Result};
pub use instance::{select_master, InstanceDescriptor, Requester, REPLICA_SERVICE};
pub use retry::RetryPolicy;
pub use traits::{Backend, Discovery, PeerConnector, PushSink, ReplicaPeer};
