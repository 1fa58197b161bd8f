//! Caching relay node for the medalcast fleet.
//!
//! A [`ReplicaNode`] answers client reads from its local caches, relays
//! writes to the backend and pushes updates to subscribed clients. Its
//! coherence mode is fixed at startup:
//!
//! - **proxy-pull**: entries expire after a per-kind TTL
//! - **master-push**: entries live until invalidated; the master replica
//!   tracks which replica cached what, and writers invalidate exactly those

mod error;
mod heartbeat;
mod node;
pub mod push;
mod routes;

pub use error::ApiError;
pub use heartbeat::spawn_heartbeat;
pub use node::{Collaborators, ReplicaNode, ScatterReport};
pub use push::{PushFanout, PushOutcome};
pub use routes::routes;
